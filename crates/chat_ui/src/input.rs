//! Rich content model of the message input.

use std::ops::Range;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum InputNode {
    Text(String),
    /// Emoji rendered as an image; `alias` is its textual form.
    Emoji { alias: String },
    LineBreak,
}

impl InputNode {
    pub fn text(value: impl Into<String>) -> Self {
        InputNode::Text(value.into())
    }

    pub fn emoji(alias: impl Into<String>) -> Self {
        InputNode::Emoji {
            alias: alias.into(),
        }
    }

    fn serialized(&self) -> &str {
        match self {
            InputNode::Text(text) => text,
            InputNode::Emoji { alias } => alias,
            InputNode::LineBreak => "\n",
        }
    }
}

/// Input nodes plus a caret expressed as a node index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputBuffer {
    nodes: Vec<InputNode>,
    caret: usize,
}

impl InputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &[InputNode] {
        &self.nodes
    }

    pub fn caret(&self) -> usize {
        self.caret
    }

    pub fn set_caret(&mut self, caret: usize) {
        self.caret = caret.min(self.nodes.len());
    }

    /// Replaces the content and moves the caret to the end.
    pub fn replace(&mut self, nodes: Vec<InputNode>) {
        self.nodes = nodes;
        self.caret = self.nodes.len();
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.caret = 0;
    }

    pub fn insert_at_caret(&mut self, nodes: Vec<InputNode>) {
        let inserted = nodes.len();
        self.nodes.splice(self.caret..self.caret, nodes);
        self.caret += inserted;
    }

    /// Text as rendered, without emoji images.
    pub fn plain_text(&self) -> String {
        self.nodes
            .iter()
            .filter(|node| !matches!(node, InputNode::Emoji { .. }))
            .map(InputNode::serialized)
            .collect()
    }

    /// Text with emoji images serialized back to their aliases.
    pub fn serialize(&self) -> String {
        self.serialize_range(0..self.nodes.len())
    }

    pub fn serialize_range(&self, range: Range<usize>) -> String {
        let end = range.end.min(self.nodes.len());
        let start = range.start.min(end);
        self.nodes[start..end]
            .iter()
            .map(InputNode::serialized)
            .collect()
    }

    pub fn is_blank(&self) -> bool {
        self.plain_text().trim().is_empty() && self.serialize().trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> InputBuffer {
        let mut buffer = InputBuffer::new();
        buffer.replace(vec![
            InputNode::text("hi "),
            InputNode::emoji("😀"),
            InputNode::LineBreak,
            InputNode::text("there"),
        ]);
        buffer
    }

    #[test]
    fn plain_text_skips_emoji_images() {
        assert_eq!(sample().plain_text(), "hi \nthere");
        assert_eq!(sample().serialize(), "hi 😀\nthere");
    }

    #[test]
    fn emoji_only_input_is_not_blank() {
        let mut buffer = InputBuffer::new();
        buffer.replace(vec![InputNode::emoji("👍")]);
        assert!(buffer.plain_text().trim().is_empty());
        assert!(!buffer.is_blank());

        buffer.replace(vec![InputNode::text("  "), InputNode::LineBreak]);
        assert!(buffer.is_blank());
    }

    #[test]
    fn insert_at_caret_advances_caret() {
        let mut buffer = sample();
        buffer.set_caret(1);
        buffer.insert_at_caret(vec![InputNode::text("a"), InputNode::text("b")]);
        assert_eq!(buffer.caret(), 3);
        assert_eq!(buffer.serialize(), "hi ab😀\nthere");
    }

    #[test]
    fn serialize_range_clamps() {
        let buffer = sample();
        assert_eq!(buffer.serialize_range(1..2), "😀");
        assert_eq!(buffer.serialize_range(3..99), "there");
        assert_eq!(buffer.serialize_range(9..12), "");
    }
}
