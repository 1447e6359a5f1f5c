//! Builds the ordered message list a session sends to the model.

use branchat_llm::Message;

use crate::types::{FileInfo, Node, NodeKind};

/// Turns graph context into chat history
#[derive(Debug, Clone, Default)]
pub struct HistoryBuilder {
    system_prompt: Option<String>,
}

impl HistoryBuilder {
    pub fn new(system_prompt: Option<String>) -> Self {
        Self { system_prompt }
    }

    /// Single-turn history for a root question
    pub fn initial(&self, question: &str) -> Vec<Message> {
        let mut messages = self.preamble();
        messages.push(Message::human(question));
        messages
    }

    /// History for a question asked from `parent`.
    ///
    /// Selected text is folded into the new user turn; otherwise the
    /// parent's exchange is replayed ahead of it.
    pub fn follow_up(&self, parent: &Node, question: &str, anchor: Option<&str>) -> Vec<Message> {
        let mut messages = self.preamble();

        match anchor.map(str::trim).filter(|a| !a.is_empty()) {
            Some(anchor) => {
                messages.push(Message::human(format!("Regarding: \"{}\"\n\n{}", anchor, question)));
            }
            None => {
                push_exchange(&mut messages, parent);
                messages.push(Message::human(question));
            }
        }

        messages
    }

    /// History for a node whose context is its inbound edges, replayed in
    /// edge order ahead of `question`
    pub fn from_inputs(&self, inputs: &[&Node], question: &str) -> Vec<Message> {
        let mut messages = self.preamble();

        for input in inputs {
            match &input.kind {
                NodeKind::Conversation => push_exchange(&mut messages, input),
                NodeKind::File(info) => messages.push(Message::human(file_turn(info))),
            }
        }

        messages.push(Message::human(question));
        messages
    }

    /// Opening turn of an uploaded batch: the instruction followed by every file
    pub fn file_analysis(&self, files: &[&FileInfo], instruction: &str) -> Vec<Message> {
        let mut turn = instruction.to_string();
        for info in files {
            turn.push_str("\n\n");
            turn.push_str(&file_turn(info));
        }

        let mut messages = self.preamble();
        messages.push(Message::human(turn));
        messages
    }

    fn preamble(&self) -> Vec<Message> {
        self.system_prompt
            .iter()
            .map(|prompt| Message::system(prompt.as_str()))
            .collect()
    }
}

fn push_exchange(messages: &mut Vec<Message>, node: &Node) {
    if node.content.is_empty() {
        return;
    }
    messages.push(Message::human(node.content.as_str()));

    // Failed or unanswered exchanges contribute only the question
    if !node.error && !node.response.is_empty() {
        messages.push(Message::ai(node.response.as_str()));
    }
}

fn file_turn(info: &FileInfo) -> String {
    format!("File: {} ({})\n\n{}", info.name, info.mime, info.content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Position;
    use branchat_llm::Role;
    use chrono::Utc;

    fn answered(question: &str, answer: &str) -> Node {
        let mut node = Node::conversation("Initial question", question, Position::ORIGIN);
        node.response = answer.to_string();
        node
    }

    fn file(name: &str, content: &str) -> Node {
        Node::file(
            FileInfo {
                name: name.to_string(),
                size: content.len() as u64,
                mime: "text/plain".to_string(),
                uploaded_at: Utc::now(),
                content: content.to_string(),
            },
            Position::ORIGIN,
        )
    }

    fn roles(messages: &[Message]) -> Vec<Role> {
        messages.iter().map(Message::role).collect()
    }

    #[test]
    fn test_initial_with_system_prompt() {
        let messages = HistoryBuilder::new(Some("Be brief".to_string())).initial("What is Rust?");
        assert_eq!(messages, vec![Message::system("Be brief"), Message::human("What is Rust?")]);
    }

    #[test]
    fn test_follow_up_replays_parent_exchange() {
        let parent = answered("What is Rust?", "A systems language.");
        let messages = HistoryBuilder::default().follow_up(&parent, "Who made it?", None);

        assert_eq!(
            messages,
            vec![
                Message::human("What is Rust?"),
                Message::ai("A systems language."),
                Message::human("Who made it?"),
            ]
        );
    }

    #[test]
    fn test_follow_up_folds_anchor_text() {
        let parent = answered("What is Rust?", "A systems language with a borrow checker.");
        let messages = HistoryBuilder::default().follow_up(&parent, "Explain this", Some("borrow checker"));

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content(), "Regarding: \"borrow checker\"\n\nExplain this");
    }

    #[test]
    fn test_blank_anchor_is_ignored() {
        let parent = answered("q", "a");
        let messages = HistoryBuilder::default().follow_up(&parent, "next", Some("   "));
        assert_eq!(roles(&messages), vec![Role::User, Role::Assistant, Role::User]);
    }

    #[test]
    fn test_failed_parent_contributes_question_only() {
        let mut parent = answered("q", "Request failed: HTTP 500");
        parent.error = true;

        let messages = HistoryBuilder::default().follow_up(&parent, "retry?", None);
        assert_eq!(roles(&messages), vec![Role::User, Role::User]);
    }

    #[test]
    fn test_inputs_replay_in_edge_order() {
        let first = answered("q1", "a1");
        let notes = file("notes.txt", "hello");
        let second = answered("q2", "a2");

        let messages = HistoryBuilder::default().from_inputs(&[&first, &notes, &second], "Summarize");

        assert_eq!(
            messages,
            vec![
                Message::human("q1"),
                Message::ai("a1"),
                Message::human("File: notes.txt (text/plain)\n\nhello"),
                Message::human("q2"),
                Message::ai("a2"),
                Message::human("Summarize"),
            ]
        );
    }

    #[test]
    fn test_no_inputs_is_a_single_turn() {
        let messages = HistoryBuilder::default().from_inputs(&[], "Why?");
        assert_eq!(messages, vec![Message::human("Why?")]);
    }

    #[test]
    fn test_file_analysis_opens_with_instruction() {
        let a = file("a.md", "# A");
        let b = file("b.csv", "x,y");
        let infos = vec![a.file_info().unwrap(), b.file_info().unwrap()];

        let messages = HistoryBuilder::new(Some("sys".to_string())).file_analysis(&infos, "Analyze these");

        assert_eq!(roles(&messages), vec![Role::System, Role::User]);
        assert_eq!(
            messages[1].content(),
            "Analyze these\n\nFile: a.md (text/plain)\n\n# A\n\nFile: b.csv (text/plain)\n\nx,y"
        );
    }
}
