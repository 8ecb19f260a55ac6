//! Conversation to markdown document rendering.
//!
//! Pure formatting over already-extracted conversation text: a header
//! with the export metadata, one `##` section per message with rules
//! between them, and a small attribution footer. File naming follows
//! the configured template with filesystem-hostile characters mapped
//! away.

use chrono::{DateTime, Utc};

use crate::config::ExportSettings;
use crate::service::Service;
use crate::types::{ConversationSnapshot, ConversationTurn, DetectionMethod};

/// Longest title fragment allowed in a generated file name.
const MAX_TITLE_COMPONENT: usize = 100;

/// A fully extracted conversation, ready to render.
#[derive(Debug, Clone)]
pub struct ConversationExport {
    pub service: Service,
    pub title: String,
    pub turns: Vec<ConversationTurn>,
    pub url: Option<String>,
    pub captured_at: DateTime<Utc>,
}

impl ConversationExport {
    pub fn user_count(&self) -> usize {
        self.turns
            .iter()
            .filter(|turn| has_text(turn.user.as_deref()))
            .count()
    }

    pub fn assistant_count(&self) -> usize {
        self.turns
            .iter()
            .filter(|turn| has_text(turn.assistant.as_deref()))
            .count()
    }

    /// Structural summary of this export for status reporting.
    pub fn snapshot(&self, detection_method: DetectionMethod) -> ConversationSnapshot {
        let user_messages = self.user_count();
        let assistant_messages = self.assistant_count();
        ConversationSnapshot {
            service: self.service,
            title: self.title.clone(),
            user_messages,
            assistant_messages,
            total_messages: user_messages + assistant_messages,
            detection_method,
            url: self.url.clone(),
            captured_at: self.captured_at,
        }
    }
}

fn has_text(text: Option<&str>) -> bool {
    text.is_some_and(|t| !t.trim().is_empty())
}

/// Render the full markdown document for a conversation.
pub fn render_document(export: &ConversationExport, settings: &ExportSettings) -> String {
    let service = export.service;
    let title = if export.title.trim().is_empty() {
        format!("{} Conversation", service.label())
    } else {
        export.title.trim().to_string()
    };

    let mut doc = String::new();
    doc.push_str("# ");
    doc.push_str(&title);
    doc.push_str("\n\n");
    if settings.include_timestamp {
        doc.push_str(&format!(
            "*Exported: {}*\n",
            export.captured_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
    }
    doc.push_str(&format!(
        "*Service: {} {}*\n",
        service.emoji(),
        service.label()
    ));
    if let Some(url) = &export.url {
        doc.push_str(&format!("*URL: {url}*\n"));
    }
    doc.push_str("\n---\n\n");

    let blocks = speaker_blocks(export, settings);
    if blocks.is_empty() {
        doc.push_str("*No messages captured.*");
    } else {
        doc.push_str(&blocks.join("\n\n---\n\n"));
    }

    doc.push_str("\n\n---\n\n");
    doc.push_str(&format!(
        "*Exported from {} with chorus*\n",
        service.label()
    ));
    doc
}

/// One `##` section per kept message, in conversation order.
///
/// Headings gain an ordinal only when a speaker appears more than
/// once, so a single question-and-answer stays uncluttered.
fn speaker_blocks(export: &ConversationExport, settings: &ExportSettings) -> Vec<String> {
    let service = export.service;
    let number_users = settings.include_user_messages && export.user_count() > 1;
    let number_assistants = settings.include_assistant_messages && export.assistant_count() > 1;

    let mut blocks = Vec::new();
    let mut user_ordinal = 0usize;
    let mut assistant_ordinal = 0usize;

    for turn in &export.turns {
        if settings.include_user_messages {
            if let Some(text) = turn.user.as_deref().filter(|t| !t.trim().is_empty()) {
                user_ordinal += 1;
                let heading = if number_users {
                    format!("\u{1F464} User {user_ordinal}")
                } else {
                    "\u{1F464} User".to_string()
                };
                blocks.push(format!("## {heading}\n\n{}", text.trim()));
            }
        }
        if settings.include_assistant_messages {
            if let Some(text) = turn.assistant.as_deref().filter(|t| !t.trim().is_empty()) {
                assistant_ordinal += 1;
                let heading = if number_assistants {
                    format!("{} {} {assistant_ordinal}", service.emoji(), service.label())
                } else {
                    format!("{} {}", service.emoji(), service.label())
                };
                blocks.push(format!("## {heading}\n\n{}", text.trim()));
            }
        }
    }
    blocks
}

/// File name for an export, template placeholders substituted and a
/// `.md` extension appended.
pub fn file_name(export: &ConversationExport, settings: &ExportSettings) -> String {
    let title = sanitize_component(&export.title);
    let title = if title.is_empty() {
        "conversation".to_string()
    } else {
        title
    };
    let stamp = export.captured_at.format("%Y%m%d_%H%M%S").to_string();
    let name = settings
        .file_name_template
        .replace("{service}", export.service.as_str())
        .replace("{title}", &title)
        .replace("{timestamp}", &stamp);
    format!("{name}.md")
}

/// Map whitespace and filesystem-reserved characters to underscores,
/// collapsing runs, then cap the length.
fn sanitize_component(value: &str) -> String {
    let mut out = String::new();
    let mut last_underscore = false;
    for ch in value.chars() {
        let mapped = if ch.is_whitespace()
            || matches!(ch, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*')
        {
            '_'
        } else {
            ch
        };
        if mapped == '_' {
            if last_underscore {
                continue;
            }
            last_underscore = true;
        } else {
            last_underscore = false;
        }
        out.push(mapped);
    }
    out.trim_matches('_').chars().take(MAX_TITLE_COMPONENT).collect()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn sample_export() -> ConversationExport {
        ConversationExport {
            service: Service::Claude,
            title: "Rust lifetimes explained".to_string(),
            turns: vec![ConversationTurn {
                user: Some("What is a lifetime?".to_string()),
                assistant: Some("A lifetime names the scope a reference is valid for.".to_string()),
            }],
            url: Some("https://claude.ai/chat/abc".to_string()),
            captured_at: Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap(),
        }
    }

    #[test]
    fn renders_the_full_document_shape() {
        let rendered = render_document(&sample_export(), &ExportSettings::default());
        let expected = "\
# Rust lifetimes explained

*Exported: 2025-03-14 09:26:53 UTC*
*Service: \u{1F9E0} Claude*
*URL: https://claude.ai/chat/abc*

---

## \u{1F464} User

What is a lifetime?

---

## \u{1F9E0} Claude

A lifetime names the scope a reference is valid for.

---

*Exported from Claude with chorus*
";
        assert_eq!(rendered, expected);
    }

    #[test]
    fn message_filters_drop_whole_sections() {
        let settings = ExportSettings {
            include_user_messages: false,
            ..ExportSettings::default()
        };
        let rendered = render_document(&sample_export(), &settings);

        assert!(!rendered.contains("## \u{1F464} User"));
        assert!(rendered.contains("## \u{1F9E0} Claude"));
    }

    #[test]
    fn repeated_speakers_gain_ordinals() {
        let mut export = sample_export();
        export.turns.push(ConversationTurn {
            user: Some("And what about 'static?".to_string()),
            assistant: Some("'static outlives every other lifetime.".to_string()),
        });
        let rendered = render_document(&export, &ExportSettings::default());

        assert!(rendered.contains("## \u{1F464} User 1"));
        assert!(rendered.contains("## \u{1F464} User 2"));
        assert!(rendered.contains("## \u{1F9E0} Claude 2"));
    }

    #[test]
    fn empty_conversations_render_a_placeholder_body() {
        let mut export = sample_export();
        export.turns.clear();
        let rendered = render_document(&export, &ExportSettings::default());

        assert!(rendered.contains("*No messages captured.*"));
        assert!(rendered.ends_with("*Exported from Claude with chorus*\n"));
    }

    #[test]
    fn timestamp_line_is_optional() {
        let settings = ExportSettings {
            include_timestamp: false,
            ..ExportSettings::default()
        };
        let rendered = render_document(&sample_export(), &settings);
        assert!(!rendered.contains("*Exported: "));
        assert!(rendered.contains("*Service: "));
    }

    #[test]
    fn file_names_follow_the_template_with_sanitized_parts() {
        let mut export = sample_export();
        export.title = "Rust: tips & tricks?".to_string();
        let name = file_name(&export, &ExportSettings::default());
        assert_eq!(name, "claude_Rust_tips_&_tricks_20250314_092653.md");
    }

    #[test]
    fn hostile_titles_collapse_and_cap() {
        assert_eq!(sanitize_component("a//b\\\\c"), "a_b_c");
        assert_eq!(sanitize_component("  <*?>  "), "");

        let long = "x".repeat(240);
        assert_eq!(sanitize_component(&long).len(), MAX_TITLE_COMPONENT);
    }

    #[test]
    fn snapshot_counts_only_nonempty_messages() {
        let mut export = sample_export();
        export.turns.push(ConversationTurn {
            user: Some("   ".to_string()),
            assistant: None,
        });
        let snapshot = export.snapshot(DetectionMethod::ConversationTurns);

        assert_eq!(snapshot.user_messages, 1);
        assert_eq!(snapshot.assistant_messages, 1);
        assert_eq!(snapshot.total_messages, 2);
        assert_eq!(snapshot.detection_method, DetectionMethod::ConversationTurns);
    }
}
