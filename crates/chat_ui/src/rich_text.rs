use shared::domain::{EntityKind, MessageEntity};
use url::Url;

use crate::input::InputNode;

const VARIATION_SELECTOR: char = '\u{FE0F}';
const ZERO_WIDTH_JOINER: char = '\u{200D}';

pub trait RichTextProcessor: Send + Sync {
    fn parse_entities(&self, text: &str) -> Vec<MessageEntity>;
    /// Converts plain text into input nodes, turning emoji into images.
    fn wrap_emoji_text(&self, text: &str) -> Vec<InputNode>;
    fn wrap_rich_text(&self, text: &str) -> Vec<InputNode>;
    /// Whether the platform renders emoji natively.
    fn emoji_supported(&self) -> bool;
}

/// Whitespace-token entity parser with code-point emoji detection.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicRichText {
    emoji_supported: bool,
}

impl BasicRichText {
    pub fn new(emoji_supported: bool) -> Self {
        Self { emoji_supported }
    }
}

fn is_emoji(ch: char) -> bool {
    matches!(
        ch as u32,
        0x1F000..=0x1F2FF | 0x1F300..=0x1FAFF | 0x2600..=0x27BF | 0x2B50 | 0x2B55
    )
}

fn classify_token(token: &str) -> Option<EntityKind> {
    let lower = token.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Url::parse(token)
            .ok()
            .filter(|url| url.host_str().is_some())
            .map(|_| EntityKind::Url);
    }
    if lower.starts_with("www.") && token.len() > 4 {
        return Url::parse(&format!("https://{token}"))
            .ok()
            .map(|_| EntityKind::Url);
    }
    if let Some(name) = token.strip_prefix('@') {
        return (name.len() >= 3 && name.chars().all(|c| c.is_alphanumeric() || c == '_'))
            .then_some(EntityKind::Mention);
    }
    if let Some(tag) = token.strip_prefix('#') {
        return (!tag.is_empty() && tag.chars().all(|c| c.is_alphanumeric() || c == '_'))
            .then_some(EntityKind::Hashtag);
    }
    let (local, domain) = token.split_once('@')?;
    (!local.is_empty() && domain.contains('.') && !domain.ends_with('.')).then_some(EntityKind::Email)
}

impl RichTextProcessor for BasicRichText {
    fn parse_entities(&self, text: &str) -> Vec<MessageEntity> {
        let mut entities = Vec::new();
        let mut token_start = None;

        let chars: Vec<char> = text.chars().collect();
        for (idx, ch) in chars.iter().copied().chain(std::iter::once(' ')).enumerate() {
            if !ch.is_whitespace() {
                token_start.get_or_insert(idx);
                continue;
            }
            let Some(start) = token_start.take() else {
                continue;
            };

            let raw: String = chars[start..idx].iter().collect();
            let token = raw.trim_end_matches(|c: char| ",.!?;:)".contains(c));
            if let Some(kind) = classify_token(token) {
                entities.push(MessageEntity {
                    kind,
                    offset: start,
                    length: token.chars().count(),
                });
            }
        }

        entities
    }

    fn wrap_emoji_text(&self, text: &str) -> Vec<InputNode> {
        let mut nodes = Vec::new();
        let mut run = String::new();
        let mut chars = text.chars().peekable();

        let flush = |run: &mut String, nodes: &mut Vec<InputNode>| {
            if !run.is_empty() {
                nodes.push(InputNode::Text(std::mem::take(run)));
            }
        };

        while let Some(ch) = chars.next() {
            if ch == '\n' {
                flush(&mut run, &mut nodes);
                nodes.push(InputNode::LineBreak);
                continue;
            }
            if ch == '\r' {
                continue;
            }
            if !is_emoji(ch) {
                run.push(ch);
                continue;
            }

            flush(&mut run, &mut nodes);
            let mut alias = String::from(ch);
            while let Some(&next) = chars.peek() {
                let joins = next == VARIATION_SELECTOR
                    || next == ZERO_WIDTH_JOINER
                    || (is_emoji(next) && alias.ends_with(ZERO_WIDTH_JOINER));
                if joins || (0x1F3FB..=0x1F3FF).contains(&(next as u32)) {
                    alias.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            nodes.push(InputNode::Emoji { alias });
        }

        flush(&mut run, &mut nodes);
        nodes
    }

    fn wrap_rich_text(&self, text: &str) -> Vec<InputNode> {
        // Input nodes carry no formatting, so rich text wraps like emoji text.
        self.wrap_emoji_text(text)
    }

    fn emoji_supported(&self) -> bool {
        self.emoji_supported
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_url_entity_with_char_offsets() {
        let text = "привет https://example.com/a?b=1, ok";
        let entities = BasicRichText::default().parse_entities(text);
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].kind, EntityKind::Url);
        assert_eq!(entities[0].offset, 7);
        assert_eq!(entities[0].slice(text), "https://example.com/a?b=1");
    }

    #[test]
    fn classifies_mentions_hashtags_and_emails() {
        let kinds: Vec<EntityKind> = BasicRichText::default()
            .parse_entities("@someone #rust me@example.org www.rust-lang.org plain")
            .into_iter()
            .map(|entity| entity.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                EntityKind::Mention,
                EntityKind::Hashtag,
                EntityKind::Email,
                EntityKind::Url
            ]
        );
    }

    #[test]
    fn wraps_emoji_and_line_breaks() {
        let nodes = BasicRichText::default().wrap_emoji_text("hi 👍🏽\nok ❤️");
        assert_eq!(
            nodes,
            vec![
                InputNode::text("hi "),
                InputNode::emoji("👍🏽"),
                InputNode::LineBreak,
                InputNode::text("ok "),
                InputNode::emoji("❤️"),
            ]
        );
    }

    #[test]
    fn joins_zwj_sequences() {
        let nodes = BasicRichText::default().wrap_emoji_text("👩‍💻");
        assert_eq!(nodes, vec![InputNode::emoji("👩‍💻")]);
    }
}
