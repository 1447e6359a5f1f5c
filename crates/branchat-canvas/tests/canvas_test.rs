mod common;

use std::sync::Arc;

use branchat_canvas::{Canvas, CanvasConfig, CanvasError, NodeKind, Position, SessionOutcome};
use branchat_llm::{Message, ModelSelection, ProviderId, Role};
use common::*;

fn canvas(client: Arc<ControlledClient>, files: MemoryFileReader) -> Canvas {
    Canvas::builder()
        .chat_client(ProviderId::OpenAI, client)
        .file_reader(Arc::new(files))
        .build()
        .unwrap()
}

/// Ask a root question and stream `answer` into it to completion
async fn answered(canvas: &Canvas, feeds: &mut Feeds, question: &str, answer: &str) -> String {
    let handle = canvas.ask_initial(question, ModelSelection::default()).unwrap();
    let node_id = handle.node_id().to_string();
    let feed = feeds.next().await;
    feed.chunk(answer);
    feed.finish();
    handle.wait().await.unwrap();
    node_id
}

#[tokio::test]
async fn test_initial_question_is_placed_and_selected() {
    let (client, mut feeds) = controlled_client();
    let canvas = canvas(client, MemoryFileReader::new());

    let first = answered(&canvas, &mut feeds, "What is Rust?", "A language.").await;
    let second = canvas.ask_initial("What is Go?", ModelSelection::default()).unwrap();

    let first_node = canvas.node(&first).unwrap();
    assert_eq!(first_node.position, Position::ORIGIN);
    assert_eq!(first_node.label, "Initial question (OpenAI)");
    assert_eq!(first_node.content, "What is Rust?");

    // Unattached nodes go one row below everything
    let second_node = canvas.node(second.node_id()).unwrap();
    assert_eq!(second_node.position, Position::new(0.0, 300.0));
    assert!(second_node.selected);
    assert!(!canvas.node(&first).unwrap().selected);
    assert_eq!(canvas.selected().as_deref(), Some(second.node_id()));

    let feed = feeds.next().await;
    assert_eq!(feed.request.messages, vec![Message::human("What is Go?")]);
}

#[tokio::test]
async fn test_follow_up_replays_parent_exchange() {
    let (client, mut feeds) = controlled_client();
    let canvas = canvas(client, MemoryFileReader::new());
    let parent = answered(&canvas, &mut feeds, "What is Rust?", "A systems language.").await;

    let handle = canvas
        .ask_follow_up(&parent, "Who made it?", None, ModelSelection::default())
        .unwrap();
    let feed = feeds.next().await;

    assert_eq!(
        feed.request.messages,
        vec![
            Message::human("What is Rust?"),
            Message::ai("A systems language."),
            Message::human("Who made it?"),
        ]
    );

    let child = canvas.node(handle.node_id()).unwrap();
    assert_eq!(child.label, "Continue conversation (OpenAI)");
    assert_eq!(child.position, Position::new(400.0, 0.0));
    assert!(child.selected);

    let inputs: Vec<_> = canvas.inputs_of(handle.node_id()).into_iter().map(|n| n.id).collect();
    assert_eq!(inputs, vec![parent]);
}

#[tokio::test]
async fn test_follow_up_with_anchor_text() {
    let (client, mut feeds) = controlled_client();
    let canvas = canvas(client, MemoryFileReader::new());
    let parent = answered(&canvas, &mut feeds, "Explain ownership", "Each value has a single owner.").await;

    let handle = canvas
        .ask_follow_up(&parent, "What about borrowing?", Some("a single owner"), ModelSelection::default())
        .unwrap();
    let feed = feeds.next().await;

    assert_eq!(feed.request.messages.len(), 1);
    assert_eq!(feed.last_user_turn(), "Regarding: \"a single owner\"\n\nWhat about borrowing?");
    assert_eq!(
        canvas.node(handle.node_id()).unwrap().label,
        "Follow-up: a single owner... (OpenAI)"
    );
}

#[tokio::test]
async fn test_children_of_one_parent_do_not_overlap() {
    let (client, mut feeds) = controlled_client();
    let canvas = canvas(client, MemoryFileReader::new());
    let parent = answered(&canvas, &mut feeds, "Root", "Answer").await;

    for i in 0..5 {
        canvas
            .ask_follow_up(&parent, &format!("Branch {}", i), None, ModelSelection::default())
            .unwrap();
    }

    let positions: Vec<_> = canvas.snapshot().nodes.iter().map(|n| n.position).collect();
    for (i, a) in positions.iter().enumerate() {
        for b in &positions[i + 1..] {
            assert!((a.x - b.x).abs() >= 100.0 || (a.y - b.y).abs() >= 100.0, "{:?} overlaps {:?}", a, b);
        }
    }
}

#[tokio::test]
async fn test_follow_up_on_unknown_parent_leaves_no_node() {
    let (client, _feeds) = controlled_client();
    let canvas = canvas(client.clone(), MemoryFileReader::new());

    let err = canvas
        .ask_follow_up("ghost", "Anyone there?", None, ModelSelection::default())
        .unwrap_err();

    assert!(matches!(err, CanvasError::UnknownEndpoint(ref id) if id == "ghost"));
    assert!(canvas.snapshot().nodes.is_empty());
    settle().await;
    assert!(client.requests().is_empty());
}

#[tokio::test]
async fn test_connect_rejects_cycles() {
    let (client, mut feeds) = controlled_client();
    let canvas = canvas(client, MemoryFileReader::new());
    let a = answered(&canvas, &mut feeds, "A", "a").await;
    let b = canvas.ask_follow_up(&a, "B", None, ModelSelection::default()).unwrap();
    let c = canvas
        .ask_follow_up(b.node_id(), "C", None, ModelSelection::default())
        .unwrap();

    let err = canvas.connect(c.node_id(), &a).unwrap_err();
    assert!(matches!(err, CanvasError::CycleDetected { .. }));
    assert!(matches!(canvas.connect(&a, &a), Err(CanvasError::CycleDetected { .. })));
    assert_eq!(canvas.snapshot().edges.len(), 2);

    let edge = canvas.connect(&a, c.node_id()).unwrap();
    assert_eq!(edge.id, format!("e{}-{}", a, c.node_id()));
    assert_eq!(canvas.snapshot().edges.len(), 3);
}

#[tokio::test]
async fn test_delete_cascades_edges_and_selection() {
    let (client, mut feeds) = controlled_client();
    let canvas = canvas(client, MemoryFileReader::new());
    let a = answered(&canvas, &mut feeds, "A", "a").await;
    let b = canvas.ask_follow_up(&a, "B", None, ModelSelection::default()).unwrap();
    let b_id = b.node_id().to_string();
    let c = canvas.ask_follow_up(&b_id, "C", None, ModelSelection::default()).unwrap();
    canvas.connect(&a, c.node_id()).unwrap();
    canvas.select(Some(b_id.as_str())).unwrap();

    let removed = canvas.delete_node(&b_id).unwrap();
    assert_eq!(removed.content, "B");

    let snapshot = canvas.snapshot();
    assert_eq!(snapshot.nodes.len(), 2);
    assert!(snapshot.edges.iter().all(|e| e.source != b_id && e.target != b_id));
    assert_eq!(snapshot.edges.len(), 1);
    assert_eq!(snapshot.selected, None);
    assert_eq!(b.wait().await.unwrap(), SessionOutcome::Cancelled);

    assert!(matches!(canvas.delete_node(&b_id), Err(CanvasError::UnknownNode(_))));
}

#[tokio::test]
async fn test_blank_card_answers_from_its_inputs() {
    let (client, mut feeds) = controlled_client();
    let canvas = canvas(client, MemoryFileReader::new());
    let first = answered(&canvas, &mut feeds, "Pros of Rust?", "Safety.").await;
    let second = answered(&canvas, &mut feeds, "Cons of Rust?", "Compile times.").await;

    let blank = canvas.create_blank_node().unwrap();
    let card = canvas.node(&blank).unwrap();
    assert_eq!(card.label, "Blank card");
    assert!(card.is_blank());
    assert!(card.selected);
    assert_eq!(canvas.session_state(&blank), None);

    canvas.connect(&second, &blank).unwrap();
    canvas.connect(&first, &blank).unwrap();

    let handle = canvas.ask_blank(&blank, "Summarize", ModelSelection::default()).unwrap();
    let feed = feeds.next().await;
    assert_eq!(
        feed.request.messages,
        vec![
            Message::human("Cons of Rust?"),
            Message::ai("Compile times."),
            Message::human("Pros of Rust?"),
            Message::ai("Safety."),
            Message::human("Summarize"),
        ]
    );

    assert!(matches!(
        canvas.ask_blank(&blank, "Again", ModelSelection::default()),
        Err(CanvasError::NotBlank(_))
    ));
    feed.finish();
    handle.wait().await.unwrap();
}

#[tokio::test]
async fn test_retry_rejects_nodes_without_a_question() {
    let (client, _feeds) = controlled_client();
    let canvas = canvas(client, MemoryFileReader::new());
    let blank = canvas.create_blank_node().unwrap();

    assert!(matches!(canvas.retry(&blank), Err(CanvasError::NothingToAsk(_))));
    assert!(matches!(canvas.retry("ghost"), Err(CanvasError::UnknownNode(_))));
}

#[tokio::test]
async fn test_retry_replays_the_follow_up_history() {
    let (client, mut feeds) = controlled_client();
    let canvas = canvas(client, MemoryFileReader::new());
    let parent = answered(&canvas, &mut feeds, "Explain ownership", "Each value has a single owner.").await;

    let handle = canvas
        .ask_follow_up(&parent, "And moves?", Some("single owner"), ModelSelection::default())
        .unwrap();
    let node_id = handle.node_id().to_string();
    let feed = feeds.next().await;
    let asked = feed.request.messages.clone();
    feed.fail(server_error());
    assert!(handle.wait().await.is_err());

    let retry = canvas.retry(&node_id).unwrap();
    let feed = feeds.next().await;

    assert_eq!(feed.request.messages, asked);
    assert_eq!(feed.last_user_turn(), "Regarding: \"single owner\"\n\nAnd moves?");
    feed.finish();
    retry.wait().await.unwrap();
}

#[tokio::test]
async fn test_batch_waits_for_every_read() {
    let (client, mut feeds) = controlled_client();
    let mut files = MemoryFileReader::new()
        .with_file("a.txt", "alpha")
        .with_file("b.txt", "beta")
        .with_file("c.txt", "gamma");
    let gate = files.gated("c.txt");
    let canvas = Arc::new(canvas(client, files));

    let ingest = tokio::spawn({
        let canvas = canvas.clone();
        async move {
            let uploads = [upload("a.txt"), upload("b.txt"), upload("c.txt")];
            canvas.ingest_files(&uploads, ModelSelection::default()).await
        }
    });

    settle().await;
    assert!(canvas.snapshot().nodes.is_empty());

    gate.notify_one();
    let outcome = ingest.await.unwrap().unwrap();
    assert!(outcome.failures.is_empty());
    assert_eq!(outcome.file_nodes.len(), 3);

    let snapshot = canvas.snapshot();
    let conversation_id = outcome.conversation_node().unwrap().to_string();
    let file_count = snapshot
        .nodes
        .iter()
        .filter(|n| matches!(n.kind, NodeKind::File(_)))
        .count();
    assert_eq!(file_count, 3);
    assert_eq!(snapshot.nodes.len(), 4);
    assert_eq!(snapshot.edges.len(), 3);
    assert!(snapshot.edges.iter().all(|e| e.target == conversation_id));
    assert_eq!(snapshot.selected.as_deref(), Some(conversation_id.as_str()));

    let conversation = canvas.node(&conversation_id).unwrap();
    assert_eq!(conversation.label, "Analyze files: a.txt, b.txt, c.txt");
    // Centered under the row of files, one row further down
    assert_eq!(conversation.position, Position::new(300.0, 300.0));

    let feed = feeds.next().await;
    assert_eq!(feed.request.messages.len(), 1);
    assert_eq!(feed.request.messages[0].role(), Role::User);
    let turn = feed.last_user_turn();
    assert!(turn.starts_with(&CanvasConfig::default().file_analysis_prompt));
    assert!(turn.contains("File: a.txt (text/plain)\n\nalpha"));
    assert!(turn.contains("File: c.txt (text/plain)\n\ngamma"));
}

#[tokio::test]
async fn test_failed_read_is_dropped_from_batch() {
    let (client, mut feeds) = controlled_client();
    let files = MemoryFileReader::new()
        .with_file("a.txt", "alpha")
        .with_failure("broken.bin", "permission denied")
        .with_file("c.txt", "gamma");
    let canvas = canvas(client, files);

    let uploads = [upload("a.txt"), upload("broken.bin"), upload("c.txt")];
    let outcome = canvas.ingest_files(&uploads, ModelSelection::default()).await.unwrap();

    assert_eq!(outcome.file_nodes.len(), 2);
    assert_eq!(outcome.failures.len(), 1);
    assert!(matches!(
        &outcome.failures[0],
        CanvasError::ReadFailure { name, .. } if name == "broken.bin"
    ));

    let conversation_id = outcome.conversation_node().unwrap();
    assert_eq!(canvas.inputs_of(conversation_id).len(), 2);
    assert_eq!(canvas.node(conversation_id).unwrap().label, "Analyze files: a.txt, c.txt");
    feeds.next().await;
}

#[tokio::test]
async fn test_batch_with_no_readable_file_adds_nothing() {
    let (client, _feeds) = controlled_client();
    let files = MemoryFileReader::new().with_failure("a.txt", "gone");
    let canvas = canvas(client, files);

    let outcome = canvas
        .ingest_files(&[upload("a.txt"), upload("missing.txt")], ModelSelection::default())
        .await
        .unwrap();

    assert!(outcome.session.is_none());
    assert_eq!(outcome.failures.len(), 2);
    assert!(canvas.snapshot().nodes.is_empty());
}

#[tokio::test]
async fn test_snapshot_serializes_for_rendering() {
    let (client, mut feeds) = controlled_client();
    let canvas = canvas(client, MemoryFileReader::new());
    let id = answered(&canvas, &mut feeds, "Q", "A").await;

    let json = serde_json::to_value(canvas.snapshot()).unwrap();
    assert_eq!(json["nodes"][0]["id"], id.as_str());
    assert_eq!(json["nodes"][0]["response"], "A");
    assert_eq!(json["nodes"][0]["model"]["provider"], "openai");
    assert_eq!(json["selected"], id.as_str());
}

#[test]
fn test_builder_requires_a_client() {
    assert!(Canvas::builder().build().is_err());
}
