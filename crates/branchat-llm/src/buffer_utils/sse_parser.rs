use futures::{Stream, StreamExt};

use super::buffering::CircularLineBuffer;
use crate::error::{ChatError, Result};
use crate::traits::EventStream;
use crate::StreamEvent;

/// Strategy pattern for parsing different SSE response types
pub trait SseLineParser: Send {
    /// Parse a data line into stream events
    fn parse_data_line(&self, data: &str) -> Result<Vec<StreamEvent>>;

    /// Check if this line signals end of stream
    fn is_done_marker(&self, data: &str) -> bool {
        data == "[DONE]"
    }
}

enum Line {
    Skip,
    Events(Vec<StreamEvent>),
    Done,
    Failed(ChatError),
}

fn classify<P: SseLineParser>(parser: &P, line: &str) -> Line {
    // Blank separators, comments and non-data fields (event:, id:, retry:)
    let Some(data) = line.strip_prefix("data:") else {
        return Line::Skip;
    };
    let data = data.strip_prefix(' ').unwrap_or(data);

    if parser.is_done_marker(data) {
        return Line::Done;
    }

    match parser.parse_data_line(data) {
        Ok(events) => Line::Events(events),
        Err(e) => Line::Failed(e),
    }
}

/// Generic SSE stream parser using circular buffer
///
/// Accepts any byte-chunk stream, so partial frames and several frames per
/// chunk are both handled. The end-of-stream marker produces a single
/// `Done` event and is never surfaced as content.
pub fn parse_sse_stream<S, B, E, P>(bytes: S, parser: P) -> EventStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<ChatError> + Send + 'static,
    P: SseLineParser + 'static,
{
    Box::pin(async_stream::stream! {
        let mut byte_chunks = Box::pin(bytes);
        let mut buffer = CircularLineBuffer::with_capacity(4096);
        let mut finished = false;

        'read: while let Some(chunk_result) = byte_chunks.next().await {
            match chunk_result {
                Ok(chunk) => {
                    buffer.extend(chunk.as_ref());

                    // Process all complete lines in buffer
                    while let Some(line_result) = buffer.next_line() {
                        let line = match line_result {
                            Ok(line) => line,
                            Err(e) => {
                                yield Err(e);
                                finished = true;
                                break 'read;
                            }
                        };

                        match classify(&parser, &line) {
                            Line::Skip => {}
                            Line::Events(events) => {
                                for event in events {
                                    yield Ok(event);
                                }
                            }
                            Line::Done => {
                                yield Ok(StreamEvent::Done { finish_reason: None });
                                finished = true;
                                break 'read;
                            }
                            Line::Failed(e) => {
                                yield Err(e);
                                finished = true;
                                break 'read;
                            }
                        }
                    }
                }
                Err(e) => {
                    yield Err(e.into());
                    finished = true;
                    break 'read;
                }
            }
        }

        // A final frame may arrive without its trailing newline
        let remaining = if finished { None } else { buffer.take_remaining() };
        if let Some(line_result) = remaining {
            match line_result.map(|line| classify(&parser, &line)) {
                Ok(Line::Events(events)) => {
                    for event in events {
                        yield Ok(event);
                    }
                }
                Ok(Line::Done) => yield Ok(StreamEvent::Done { finish_reason: None }),
                Ok(Line::Skip) => {}
                Ok(Line::Failed(e)) | Err(e) => yield Err(e),
            }
        }
    })
}
