//! Claude (claude.ai) adapter.
//!
//! The composer is a ProseMirror contenteditable, so structured-editor
//! injection leads the cascade naturally. Messages render inside
//! `data-test-render-count` wrappers with testid/class markers for the
//! two speakers, and artifact panes carry content that belongs in an
//! export but lives outside the message stream.

use crate::browser::BrowserRuntime;
use crate::errors::AutomationError;
use crate::export::ConversationExport;
use crate::extract;
use crate::locate;
use crate::page::ChatPage;
use crate::service::Service;
use crate::types::{ConnectionStatus, ConversationTurn, DetectionMethod, DocNode, SelectorSet};

use super::{SiteAdapter, Speaker};

use async_trait::async_trait;

const LOGIN_WALL: &[&str] = &[
    "button[data-testid=\"login-with-google\"]",
    "input[type=\"email\"]",
    "a[href*=\"/login\"]",
];

const RENDER_BLOCKS: &str = "div[data-test-render-count]";
const USER_MESSAGES: &str = "div[data-testid=\"user-message\"]";
const CLAUDE_MESSAGES: &str = "div.font-claude-message";
const ARTIFACT_PANES: &str = "div[data-testid=\"artifact-content\"]";

const TITLE_HEADINGS: &[&str] = &[
    "button[data-testid=\"chat-menu-trigger\"]",
    "header div.truncate",
];
const TITLE_SUFFIXES: &[&str] = &[" - Claude", " | Claude"];

pub struct ClaudeAdapter {
    selectors: SelectorSet,
}

impl ClaudeAdapter {
    pub fn new() -> Self {
        Self {
            selectors: SelectorSet::new(
                &[
                    "div[contenteditable=\"true\"].ProseMirror",
                    "div.ProseMirror",
                    "fieldset div[contenteditable=\"true\"]",
                    "div[contenteditable=\"true\"]",
                ],
                &[
                    "button[aria-label=\"Send message\"]",
                    "button[aria-label=\"Send Message\"]",
                    "button[type=\"submit\"]",
                ],
                &[CLAUDE_MESSAGES, "div[data-testid=\"chat-message-content\"]"],
                &[
                    "button[aria-label=\"Stop response\"]",
                    "button[aria-label=\"Stop Response\"]",
                    "div[data-is-streaming=\"true\"]",
                    "div.result-streaming",
                    "button[aria-label*=\"Stop\"]",
                    "div[class*=\"streaming\"]",
                    "svg.animate-spin",
                ],
                &[RENDER_BLOCKS, "div[data-testid=\"chat-turn\"]"],
            ),
        }
    }
}

impl Default for ClaudeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// Markdown appendix for any open artifact panes: a heading per
/// artifact followed by its rendered content.
fn artifact_appendix(panes: &[DocNode]) -> Option<String> {
    let mut sections = Vec::new();
    for pane in panes {
        let body = extract::extract_structured(pane);
        if body.trim().is_empty() {
            continue;
        }
        let title = pane
            .find_first(&|n| matches!(n.tag(), Some("h1" | "h2" | "h3")))
            .map(|heading| {
                heading
                    .raw_text()
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| "Artifact".to_string());
        let body = strip_leading_heading(&body, &title);
        sections.push(format!("### {title}\n\n{body}"));
    }
    if sections.is_empty() {
        None
    } else {
        Some(sections.join("\n\n"))
    }
}

/// The pane's own title heading would otherwise render twice, once as
/// the appendix heading and once inside the body.
fn strip_leading_heading(body: &str, title: &str) -> String {
    let mut lines = body.lines();
    if let Some(first) = lines.next() {
        if first.starts_with('#') && first.trim_start_matches('#').trim() == title {
            let rest: Vec<&str> = lines.skip_while(|line| line.trim().is_empty()).collect();
            return rest.join("\n");
        }
    }
    body.to_string()
}

/// Attach the artifact appendix to the newest assistant message, or as
/// its own trailing entry when the thread ends on a user message.
fn append_artifacts(turns: &mut Vec<ConversationTurn>, appendix: String) {
    for turn in turns.iter_mut().rev() {
        if let Some(assistant) = turn.assistant.as_mut() {
            assistant.push_str("\n\n");
            assistant.push_str(&appendix);
            return;
        }
    }
    turns.push(ConversationTurn {
        user: None,
        assistant: Some(appendix),
    });
}

#[async_trait]
impl<R: BrowserRuntime> SiteAdapter<R> for ClaudeAdapter {
    fn service(&self) -> Service {
        Service::Claude
    }

    fn selectors(&self) -> &SelectorSet {
        &self.selectors
    }

    async fn check_connection(
        &self,
        page: &ChatPage<'_, R>,
    ) -> Result<ConnectionStatus, AutomationError> {
        if page.any_visible(&super::owned(LOGIN_WALL)).await? {
            return Ok(ConnectionStatus::LoggedOut);
        }
        if locate::find(page, &self.selectors.message_input)
            .await?
            .is_none()
        {
            return Ok(ConnectionStatus::MissingInput);
        }
        let in_conversation = match page.current_url().await? {
            Some(url) if url.contains("/chat/") => true,
            _ => {
                !locate::find_all(page, &self.selectors.conversation_turn, 5)
                    .await?
                    .is_empty()
            }
        };
        Ok(if in_conversation {
            ConnectionStatus::Ready
        } else {
            ConnectionStatus::NotInConversation
        })
    }

    async fn gather_conversation(
        &self,
        page: &ChatPage<'_, R>,
    ) -> Result<(ConversationExport, DetectionMethod), AutomationError> {
        let title = self.extract_title(page).await;

        // Render wrappers hold one message each; the speaker shows in a
        // descendant marker.
        let blocks = page
            .snapshot_all(RENDER_BLOCKS, locate::COLLECTION_LIMIT)
            .await?;
        let mut messages = Vec::new();
        for block in &blocks {
            if let Some(user) =
                block.find_first(&|n| n.attr("data-testid") == Some("user-message"))
            {
                let text = extract::extract_text(user);
                if !text.trim().is_empty() {
                    messages.push((Speaker::User, text));
                }
            } else if let Some(claude) = block.find_first(&|n| n.has_class("font-claude-message"))
            {
                let text = extract::extract_structured(claude);
                if !text.trim().is_empty() {
                    messages.push((Speaker::Assistant, text));
                }
            }
        }

        let (mut turns, method) = if !messages.is_empty() {
            (super::fold_turns(messages), DetectionMethod::RenderCount)
        } else {
            // Speaker-marked blocks queried directly.
            let users = super::texts_of(page, USER_MESSAGES, extract::extract_text).await?;
            let assistants =
                super::texts_of(page, CLAUDE_MESSAGES, extract::extract_structured).await?;
            if !users.is_empty() || !assistants.is_empty() {
                (super::pair_turns(users, assistants), DetectionMethod::TestIds)
            } else {
                (
                    super::fallback_exchange(page, &["main", "body"]).await?,
                    DetectionMethod::Fallback,
                )
            }
        };

        let panes = page.snapshot_all(ARTIFACT_PANES, 10).await?;
        if let Some(appendix) = artifact_appendix(&panes) {
            append_artifacts(&mut turns, appendix);
        }

        let export = super::assemble(page, Service::Claude, title, turns).await?;
        Ok((export, method))
    }

    async fn extract_title(&self, page: &ChatPage<'_, R>) -> String {
        super::title_from_page(
            page,
            Service::Claude,
            TITLE_HEADINGS,
            &[USER_MESSAGES],
            TITLE_SUFFIXES,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::testutil::{ScriptedRuntime, test_client};

    #[tokio::test]
    async fn render_blocks_fold_into_turns() {
        let runtime = ScriptedRuntime::new()
            .with_url("https://claude.ai/chat/abc")
            .respond(
                "snapshotAll(\"div[data-test-render-count]",
                json!([
                    {
                        "tag": "div",
                        "attrs": {"data-test-render-count": "1"},
                        "children": [{
                            "tag": "div",
                            "attrs": {"data-testid": "user-message"},
                            "children": [{"text": "Summarize the borrow checker"}]
                        }]
                    },
                    {
                        "tag": "div",
                        "attrs": {"data-test-render-count": "1"},
                        "children": [{
                            "tag": "div",
                            "attrs": {"class": "font-claude-message"},
                            "children": [{"tag": "p", "children": [{"text": "It proves every reference is valid."}]}]
                        }]
                    }
                ]),
            );
        let client = test_client(runtime);
        let page = ChatPage::new(&client, "page-0", Service::Claude);

        let adapter = ClaudeAdapter::new();
        let (export, method) = adapter
            .gather_conversation(&page)
            .await
            .expect("gather succeeds");

        assert_eq!(method, DetectionMethod::RenderCount);
        assert_eq!(export.turns.len(), 1);
        assert_eq!(
            export.turns[0].user.as_deref(),
            Some("Summarize the borrow checker")
        );
        assert_eq!(
            export.turns[0].assistant.as_deref(),
            Some("It proves every reference is valid.")
        );
    }

    #[tokio::test]
    async fn artifact_panes_are_appended_to_the_last_reply() {
        let runtime = ScriptedRuntime::new()
            .respond(
                "snapshotAll(\"div[data-test-render-count]",
                json!([
                    {
                        "tag": "div",
                        "children": [{
                            "tag": "div",
                            "attrs": {"class": "font-claude-message"},
                            "children": [{"tag": "p", "children": [{"text": "Here is the sorter you asked for."}]}]
                        }]
                    }
                ]),
            )
            .respond(
                "snapshotAll(\"div[data-testid=\\\"artifact-content\\\"]",
                json!([
                    {
                        "tag": "div",
                        "attrs": {"data-testid": "artifact-content"},
                        "children": [
                            {"tag": "h3", "children": [{"text": "quicksort.rs"}]},
                            {
                                "tag": "pre",
                                "children": [{
                                    "tag": "code",
                                    "attrs": {"class": "language-rust"},
                                    "children": [{"text": "fn sort(v: &mut Vec<i32>) {}"}]
                                }]
                            }
                        ]
                    }
                ]),
            );
        let client = test_client(runtime);
        let page = ChatPage::new(&client, "page-0", Service::Claude);

        let adapter = ClaudeAdapter::new();
        let (export, _) = adapter
            .gather_conversation(&page)
            .await
            .expect("gather succeeds");

        let assistant = export.turns[0].assistant.as_deref().expect("assistant text");
        assert!(assistant.starts_with("Here is the sorter you asked for."));
        assert_eq!(assistant.matches("### quicksort.rs").count(), 1);
        assert!(assistant.contains("```rust"));
        assert!(assistant.contains("fn sort(v: &mut Vec<i32>) {}"));
    }

    #[tokio::test]
    async fn ready_needs_login_clear_input_and_conversation() {
        let runtime = ScriptedRuntime::new()
            .with_url("https://claude.ai/chat/xyz")
            .respond(
                "query(\"div[contenteditable=\\\"true\\\"].ProseMirror",
                json!({"count": 1, "items": [{"index": 0, "tag": "div", "editable": true, "enabled": true}]}),
            );
        let client = test_client(runtime);
        let page = ChatPage::new(&client, "page-0", Service::Claude);

        let adapter = ClaudeAdapter::new();
        let status = adapter
            .check_connection(&page)
            .await
            .expect("check succeeds");

        assert_eq!(status, ConnectionStatus::Ready);
    }

    #[test]
    fn artifact_appendix_titles_fall_back() {
        let pane = DocNode::element(
            "div",
            [],
            vec![DocNode::element(
                "p",
                [],
                vec![DocNode::text("standalone artifact body with enough text")],
            )],
        );

        let appendix = artifact_appendix(std::slice::from_ref(&pane)).expect("appendix");
        assert!(appendix.starts_with("### Artifact\n\n"));
        assert!(appendix.contains("standalone artifact body"));
    }
}
