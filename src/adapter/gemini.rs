//! Gemini (gemini.google.com) adapter.
//!
//! An Angular app with custom elements (`rich-textarea`, `user-query`,
//! `model-response`), so tag-name selectors do real work here. Replies
//! carry a `data-response-index` counter that survives re-renders,
//! which makes "newest reply" an attribute comparison instead of a
//! document-order guess. Conversation URLs look like `/app/<id>`; a
//! bare `/app` is the blank composer page.

use url::Url;

use crate::browser::BrowserRuntime;
use crate::errors::AutomationError;
use crate::export::ConversationExport;
use crate::extract;
use crate::locate;
use crate::page::ChatPage;
use crate::service::Service;
use crate::types::{ConnectionStatus, ConversationTurn, DetectionMethod, SelectorSet};

use super::SiteAdapter;

use async_trait::async_trait;

const LOGIN_WALL: &[&str] = &[
    "a[href*=\"accounts.google.com/signin\"]",
    "a[aria-label=\"Sign in\"]",
    "button[aria-label=\"Sign in\"]",
];

const CONVERSATION_CONTAINERS: &str = "div.conversation-container";
const USER_QUERIES: &str = "user-query";
const MODEL_RESPONSES: &str = "model-response";
const RESPONSE_INDEXED: &str = "[data-response-index]";

const TITLE_HEADINGS: &[&str] = &[
    "div.conversation-title.selected",
    "div[class*=\"selected\"] div.conversation-title",
];
const TITLE_SUFFIXES: &[&str] = &[" - Gemini", " | Gemini", " - Google Gemini"];

pub struct GeminiAdapter {
    selectors: SelectorSet,
}

impl GeminiAdapter {
    pub fn new() -> Self {
        Self {
            selectors: SelectorSet::new(
                &[
                    "rich-textarea div[contenteditable=\"true\"]",
                    "div.ql-editor[contenteditable=\"true\"]",
                    "div[contenteditable=\"true\"][role=\"textbox\"]",
                    "rich-textarea",
                ],
                &[
                    "button[aria-label=\"Send message\"]",
                    "button.send-button",
                    "button[mattooltip=\"Send\"]",
                ],
                &["message-content", "div.model-response-text", MODEL_RESPONSES],
                &[
                    "button[aria-label=\"Stop response\"]",
                    "mat-progress-bar",
                    "div.loading-indicator",
                    "model-response div[class*=\"pending\"]",
                ],
                &[CONVERSATION_CONTAINERS, USER_QUERIES],
            ),
        }
    }
}

impl Default for GeminiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// `/app/<id>` is a conversation; a bare `/app` is the blank composer.
fn in_conversation_path(raw: &str) -> bool {
    let Ok(url) = Url::parse(raw) else {
        return false;
    };
    let Some(mut segments) = url.path_segments() else {
        return false;
    };
    matches!(
        (segments.next(), segments.next()),
        (Some("app"), Some(id)) if !id.is_empty()
    )
}

#[async_trait]
impl<R: BrowserRuntime> SiteAdapter<R> for GeminiAdapter {
    fn service(&self) -> Service {
        Service::Gemini
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
        let by_url = page
            .current_url()
            .await?
            .as_deref()
            .is_some_and(in_conversation_path);
        let in_conversation = by_url
            || !locate::find_all(page, &self.selectors.conversation_turn, 5)
                .await?
                .is_empty();
        Ok(if in_conversation {
            ConnectionStatus::Ready
        } else {
            ConnectionStatus::NotInConversation
        })
    }

    /// Replies keep their `data-response-index` across re-renders, so
    /// the newest one is the highest index rather than the last match.
    async fn read_latest(&self, page: &ChatPage<'_, R>) -> Result<String, AutomationError> {
        let indexed = page
            .snapshot_all(RESPONSE_INDEXED, locate::COLLECTION_LIMIT)
            .await?;
        let newest = indexed.iter().max_by_key(|node| {
            node.attr("data-response-index")
                .and_then(|raw| raw.parse::<u64>().ok())
                .unwrap_or(0)
        });
        if let Some(node) = newest {
            let text = extract::extract_structured(node);
            if !text.trim().is_empty() {
                return Ok(text);
            }
        }
        super::last_response_text(page, Service::Gemini, &self.selectors.response_container).await
    }

    async fn gather_conversation(
        &self,
        page: &ChatPage<'_, R>,
    ) -> Result<(ConversationExport, DetectionMethod), AutomationError> {
        let title = self.extract_title(page).await;

        // Containers hold one exchange each, query and response side by
        // side.
        let containers = page
            .snapshot_all(CONVERSATION_CONTAINERS, locate::COLLECTION_LIMIT)
            .await?;
        let mut turns = Vec::new();
        for container in &containers {
            let user = container
                .find_first(&|n| n.tag() == Some(USER_QUERIES))
                .map(extract::extract_text)
                .filter(|text| !text.trim().is_empty());
            let assistant = container
                .find_first(&|n| {
                    n.tag() == Some("message-content") || n.tag() == Some(MODEL_RESPONSES)
                })
                .map(extract::extract_structured)
                .filter(|text| !text.trim().is_empty());
            if user.is_some() || assistant.is_some() {
                turns.push(ConversationTurn { user, assistant });
            }
        }
        if !turns.is_empty() {
            let export = super::assemble(page, Service::Gemini, title, turns).await?;
            return Ok((export, DetectionMethod::ConversationContainers));
        }

        // Custom elements queried directly.
        let users = super::texts_of(page, USER_QUERIES, extract::extract_text).await?;
        let assistants =
            super::texts_of(page, MODEL_RESPONSES, extract::extract_structured).await?;
        if !users.is_empty() || !assistants.is_empty() {
            let turns = super::pair_turns(users, assistants);
            let export = super::assemble(page, Service::Gemini, title, turns).await?;
            return Ok((export, DetectionMethod::DirectQuery));
        }

        // Class-named wrappers from older revisions of the app.
        let users = super::texts_of(page, "div.query-text", extract::extract_text).await?;
        let assistants =
            super::texts_of(page, "div.model-response-text", extract::extract_structured).await?;
        if !users.is_empty() || !assistants.is_empty() {
            let turns = super::pair_turns(users, assistants);
            let export = super::assemble(page, Service::Gemini, title, turns).await?;
            return Ok((export, DetectionMethod::CssClasses));
        }

        let turns = super::fallback_exchange(page, &["main", "body"]).await?;
        let export = super::assemble(page, Service::Gemini, title, turns).await?;
        Ok((export, DetectionMethod::Fallback))
    }

    async fn extract_title(&self, page: &ChatPage<'_, R>) -> String {
        super::title_from_page(
            page,
            Service::Gemini,
            TITLE_HEADINGS,
            &[USER_QUERIES],
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
    use crate::types::ResponseWait;

    #[test]
    fn conversation_paths_need_an_id_segment() {
        assert!(in_conversation_path("https://gemini.google.com/app/9b1c2d"));
        assert!(!in_conversation_path("https://gemini.google.com/app"));
        assert!(!in_conversation_path("https://gemini.google.com/"));
        assert!(!in_conversation_path("not a url"));
    }

    #[tokio::test]
    async fn newest_reply_is_the_highest_response_index() {
        let runtime = ScriptedRuntime::new().respond(
            "snapshotAll(\"[data-response-index]",
            json!([
                {"tag": "message-content", "attrs": {"data-response-index": "0"},
                 "children": [{"tag": "p", "children": [{"text": "first reply"}]}]},
                {"tag": "message-content", "attrs": {"data-response-index": "2"},
                 "children": [{"tag": "p", "children": [{"text": "newest reply"}]}]},
                {"tag": "message-content", "attrs": {"data-response-index": "1"},
                 "children": [{"tag": "p", "children": [{"text": "middle reply"}]}]}
            ]),
        );
        let client = test_client(runtime);
        let page = ChatPage::new(&client, "page-0", Service::Gemini);

        let adapter = GeminiAdapter::new();
        let text = adapter
            .latest_response(&page, ResponseWait::Immediate)
            .await
            .expect("reply found");

        assert_eq!(text, "newest reply");
        // Immediate mode skips the completion detector entirely.
        assert_eq!(client.browser().runtime().eval_count("anyVisible"), 0);
    }

    #[tokio::test]
    async fn containers_pair_query_and_response() {
        let runtime = ScriptedRuntime::new().respond(
            "snapshotAll(\"div.conversation-container",
            json!([{
                "tag": "div",
                "attrs": {"class": "conversation-container"},
                "children": [
                    {"tag": "user-query", "children": [{"text": "What is a trait object?"}]},
                    {"tag": "model-response", "children": [{
                        "tag": "message-content",
                        "children": [{"tag": "p", "children": [{"text": "A dynamically dispatched value."}]}]
                    }]}
                ]
            }]),
        );
        let client = test_client(runtime);
        let page = ChatPage::new(&client, "page-0", Service::Gemini);

        let adapter = GeminiAdapter::new();
        let (export, method) = adapter
            .gather_conversation(&page)
            .await
            .expect("gather succeeds");

        assert_eq!(method, DetectionMethod::ConversationContainers);
        assert_eq!(export.turns.len(), 1);
        assert_eq!(
            export.turns[0].user.as_deref(),
            Some("What is a trait object?")
        );
        assert_eq!(
            export.turns[0].assistant.as_deref(),
            Some("A dynamically dispatched value.")
        );
    }

    #[tokio::test]
    async fn bare_app_path_is_not_a_conversation() {
        let runtime = ScriptedRuntime::new()
            .with_url("https://gemini.google.com/app")
            .respond(
                "query(\"rich-textarea div",
                json!({"count": 1, "items": [{"index": 0, "tag": "div", "editable": true, "enabled": true}]}),
            );
        let client = test_client(runtime);
        let page = ChatPage::new(&client, "page-0", Service::Gemini);

        let adapter = GeminiAdapter::new();
        let status = adapter
            .check_connection(&page)
            .await
            .expect("check succeeds");

        assert_eq!(status, ConnectionStatus::NotInConversation);
    }

    #[tokio::test]
    async fn og_title_backs_the_sidebar_cascade() {
        let runtime =
            ScriptedRuntime::new().respond("attrOf", json!("Rust lifetimes - Gemini"));
        let client = test_client(runtime);
        let page = ChatPage::new(&client, "page-0", Service::Gemini);

        let adapter = GeminiAdapter::new();
        let title = adapter.extract_title(&page).await;

        assert_eq!(title, "Rust lifetimes");
    }
}
