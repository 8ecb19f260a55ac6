//! Site adapters, one driver per hosted chat application.
//!
//! Each adapter owns the selector tiers and DOM conventions of its
//! service; the mechanics of locating, injecting, submitting, and
//! waiting are shared and live in the sibling modules. Adapters are
//! stateless, so the client constructs them on demand and drives any
//! tab with the same instance.

mod chatgpt;
mod claude;
mod gemini;
mod grok;
mod perplexity;

pub use chatgpt::ChatGptAdapter;
pub use claude::ClaudeAdapter;
pub use gemini::GeminiAdapter;
pub use grok::GrokAdapter;
pub use perplexity::PerplexityAdapter;

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use url::Url;

use crate::browser::BrowserRuntime;
use crate::config::ExportSettings;
use crate::detect;
use crate::errors::AutomationError;
use crate::export::{self, ConversationExport};
use crate::extract;
use crate::inject;
use crate::locate;
use crate::page::ChatPage;
use crate::service::Service;
use crate::submit;
use crate::types::{
    ConnectionStatus, ConversationSnapshot, ConversationTurn, DetectionMethod, DocNode,
    ElementHandle, QueryItem, ResponseWait, SelectorSet, SendResult,
};

/// Minimum rendered characters before the content fallback will claim
/// the page holds a conversation at all.
const FALLBACK_CONTENT_MIN: usize = 40;

/// Driver for one hosted chat application.
///
/// The provided methods implement the send and collect flows shared by
/// every service; implementors supply selectors, connection
/// classification, and conversation recovery, and may override the
/// hooks where their DOM deviates from the common shape.
#[async_trait]
pub trait SiteAdapter<R: BrowserRuntime>: Send + Sync {
    fn service(&self) -> Service;

    /// Selector tiers for the element roles this adapter drives.
    fn selectors(&self) -> &SelectorSet;

    /// Classify the tab: logged out, missing composer, outside a
    /// conversation, or ready.
    async fn check_connection(
        &self,
        page: &ChatPage<'_, R>,
    ) -> Result<ConnectionStatus, AutomationError>;

    /// Walk the rendered conversation and recover as much text as the
    /// DOM still exposes, most specific signal first. Returns the
    /// recovered exchanges together with the counting strategy that
    /// produced them.
    async fn gather_conversation(
        &self,
        page: &ChatPage<'_, R>,
    ) -> Result<(ConversationExport, DetectionMethod), AutomationError>;

    /// Best-effort conversation title. Never fails; falls back to a
    /// generic per-service label.
    async fn extract_title(&self, page: &ChatPage<'_, R>) -> String;

    /// Service-specific work before composing, such as opening a fresh
    /// chat surface. Errors here are soft: the send continues and hits
    /// a hard condition later if the page is truly unusable.
    async fn prepare_send(&self, _page: &ChatPage<'_, R>) -> Result<(), AutomationError> {
        Ok(())
    }

    /// Deliver one message: prepare, locate the composer, inject the
    /// text, let the page settle, then trigger the send.
    ///
    /// Only two conditions are hard failures: no composer could be
    /// located, or every injection strategy missed the similarity
    /// threshold. A dispatched but unconfirmed send degrades to a
    /// warning so callers are not told a likely-successful send failed.
    async fn send_message(&self, page: &ChatPage<'_, R>, text: &str) -> SendResult {
        let service = self.service();
        let logger = page.client().logger();
        logger.info(
            format!("sending {} characters", text.chars().count()),
            Some(service.as_str()),
            None,
        );

        if let Err(error) = self.prepare_send(page).await {
            logger.debug(
                format!("pre-send preparation failed: {error}"),
                Some(service.as_str()),
                None,
            );
        }

        let input =
            match locate::required(page, "message input", &self.selectors().message_input).await {
                Ok(handle) => handle,
                Err(error) => return SendResult::failed(error.to_string()),
            };

        let injection = match inject::inject_message(page, &input, text).await {
            Ok(report) => report,
            Err(error) => return SendResult::failed(error.to_string()),
        };
        logger.debug(
            format!(
                "composer filled via {} (similarity {})",
                injection.strategy, injection.score
            ),
            Some(service.as_str()),
            None,
        );

        // Give the app a beat to enable its send button off the input
        // events before the trigger cascade starts probing it.
        let settle = Duration::from_millis(page.client().config().input_settle_ms);
        tokio::time::sleep(settle).await;

        match submit::submit_message(page, &input, self.selectors()).await {
            Ok(report) if report.verified => SendResult::succeeded(),
            Ok(report) => SendResult::with_warning(format!(
                "dispatched via {} but nothing confirmed the send within the verify window",
                report.strategy
            )),
            Err(error) => SendResult::failed(error.to_string()),
        }
    }

    /// Wait for the current generation to finish (unless `Immediate`),
    /// then read the newest assistant reply as markdown.
    async fn latest_response(
        &self,
        page: &ChatPage<'_, R>,
        wait: ResponseWait,
    ) -> Result<String, AutomationError> {
        if let ResponseWait::Window(window) = wait {
            detect::await_response(page, self.selectors(), window).await?;
        }
        self.read_latest(page).await
    }

    /// Read the newest assistant reply without waiting. The default
    /// takes the last visible response container; services whose DOM
    /// orders replies differently override this.
    async fn read_latest(&self, page: &ChatPage<'_, R>) -> Result<String, AutomationError> {
        last_response_text(page, self.service(), &self.selectors().response_container).await
    }

    /// Point-in-time message counts, recomputed from the live DOM on
    /// every call.
    async fn conversation_snapshot(
        &self,
        page: &ChatPage<'_, R>,
    ) -> Result<ConversationSnapshot, AutomationError> {
        let (export, method) = self.gather_conversation(page).await?;
        Ok(export.snapshot(method))
    }

    /// Full conversation rendered as a markdown document.
    async fn conversation_markdown(
        &self,
        page: &ChatPage<'_, R>,
        settings: &ExportSettings,
    ) -> Result<String, AutomationError> {
        let (export, _) = self.gather_conversation(page).await?;
        Ok(export::render_document(&export, settings))
    }
}

/// Construct the adapter for a service.
pub fn adapter_for<R: BrowserRuntime>(service: Service) -> Box<dyn SiteAdapter<R>> {
    match service {
        Service::ChatGpt => Box::new(ChatGptAdapter::new()),
        Service::Claude => Box::new(ClaudeAdapter::new()),
        Service::Gemini => Box::new(GeminiAdapter::new()),
        Service::Perplexity => Box::new(PerplexityAdapter::new()),
        Service::Grok => Box::new(GrokAdapter::new()),
    }
}

/// Document-order speaker tag recovered by a counting tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Speaker {
    User,
    Assistant,
}

/// Fold a document-order (speaker, text) stream into exchanges. A user
/// message opens a new turn; an assistant message fills the open turn
/// or, with no user message pending, starts an assistant-only one.
pub(crate) fn fold_turns(messages: Vec<(Speaker, String)>) -> Vec<ConversationTurn> {
    let mut turns: Vec<ConversationTurn> = Vec::new();
    for (speaker, text) in messages {
        match speaker {
            Speaker::User => turns.push(ConversationTurn {
                user: Some(text),
                assistant: None,
            }),
            Speaker::Assistant => match turns.last_mut() {
                Some(turn) if turn.assistant.is_none() => turn.assistant = Some(text),
                _ => turns.push(ConversationTurn {
                    user: None,
                    assistant: Some(text),
                }),
            },
        }
    }
    turns
}

/// Pair two independently collected text columns positionally. Used by
/// tiers that query user and assistant messages with separate selectors
/// and trust the page to keep them in lockstep.
pub(crate) fn pair_turns(users: Vec<String>, assistants: Vec<String>) -> Vec<ConversationTurn> {
    let rounds = users.len().max(assistants.len());
    let mut users = users.into_iter();
    let mut assistants = assistants.into_iter();
    (0..rounds)
        .map(|_| ConversationTurn {
            user: users.next(),
            assistant: assistants.next(),
        })
        .collect()
}

pub(crate) fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Build an actionable handle from a raw query item, for cases where a
/// tier match comes from scanning query results rather than the
/// selector cascade.
pub(crate) fn handle_for_item(selector: &str, item: &QueryItem) -> ElementHandle {
    ElementHandle {
        selector: selector.to_string(),
        index: item.index,
        tier: 0,
        tag: item.tag.clone(),
        text: item.text.clone(),
        enabled: item.enabled,
        editable: item.editable,
    }
}

/// Strip service-name suffixes like " - ChatGPT" from a document title.
/// Each suffix is removed at most once, in order.
pub(crate) fn trim_title_suffix(title: &str, suffixes: &[&str]) -> String {
    let mut title = title.trim();
    for suffix in suffixes {
        if let Some(stripped) = title.strip_suffix(suffix) {
            title = stripped.trim_end();
        }
    }
    title.to_string()
}

/// First sentence of a user message, when it is long enough to be
/// descriptive and short enough to stay a title.
pub(crate) fn first_sentence_title(text: &str) -> Option<String> {
    let sentence = text
        .split(['.', '!', '?', '\n'])
        .next()
        .unwrap_or_default()
        .trim();
    let len = sentence.chars().count();
    (len > 10 && len < 100).then(|| sentence.to_string())
}

/// Prompt carried in the page URL. Search-first services put the query
/// in a `q`/`query` parameter, which outlives the rendered heading.
pub(crate) fn title_from_query_param(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| matches!(key.as_ref(), "q" | "query"))
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| value.chars().count() > 3)
}

/// Shared title cascade: an in-page heading or sidebar entry first,
/// then the `og:title` meta, then the first sentence of the opening
/// user message, then the document title with service suffixes
/// stripped, then a `q`/`query` URL parameter, then a generic label.
/// Probe failures fall through rather than surfacing; a title is never
/// worth failing an export for.
pub(crate) async fn title_from_page<R: BrowserRuntime>(
    page: &ChatPage<'_, R>,
    service: Service,
    heading_selectors: &[&str],
    user_message_selectors: &[&str],
    suffixes: &[&str],
) -> String {
    for selector in heading_selectors {
        if let Ok(result) = page.query(selector, 3).await {
            if let Some(item) = result.items.first() {
                let text = item.text.trim();
                if !text.is_empty() {
                    return text.to_string();
                }
            }
        }
    }

    if let Ok(Some(content)) = page.attr_of("meta[property=\"og:title\"]", 0, "content").await {
        let cleaned = trim_title_suffix(&content, suffixes);
        if !cleaned.is_empty() {
            return cleaned;
        }
    }

    for selector in user_message_selectors {
        if let Ok(result) = page.query(selector, 1).await {
            if let Some(title) = result
                .items
                .first()
                .and_then(|item| first_sentence_title(&item.text))
            {
                return title;
            }
        }
    }

    if let Ok(info) = page.info().await {
        let cleaned = trim_title_suffix(&info.title, suffixes);
        // The bare brand name carries no conversation signal.
        if !cleaned.is_empty() && !cleaned.eq_ignore_ascii_case(service.label()) {
            return cleaned;
        }
    }

    if let Ok(Some(url)) = page.current_url().await {
        if let Some(title) = title_from_query_param(&url) {
            return title;
        }
    }

    format!("{} Conversation", service.label())
}

/// Markdown text of the last visible response container, document
/// order. `NotFound` when no container renders any text.
pub(crate) async fn last_response_text<R: BrowserRuntime>(
    page: &ChatPage<'_, R>,
    service: Service,
    tiers: &[String],
) -> Result<String, AutomationError> {
    let missing = AutomationError::NotFound {
        service,
        role: "assistant response",
    };
    let containers = locate::find_all(page, tiers, locate::COLLECTION_LIMIT).await?;
    let Some(last) = containers.last() else {
        return Err(missing);
    };
    let Some(node) = page.snapshot(&last.selector, last.index).await? else {
        return Err(missing);
    };
    let text = extract::extract_structured(&node);
    if text.trim().is_empty() {
        return Err(missing);
    }
    Ok(text)
}

/// Snapshot every visible match of `selector` and render each through
/// `render`, dropping blanks. The workhorse of the two-column counting
/// tiers.
pub(crate) async fn texts_of<R: BrowserRuntime>(
    page: &ChatPage<'_, R>,
    selector: &str,
    render: fn(&DocNode) -> String,
) -> Result<Vec<String>, AutomationError> {
    let nodes = page.snapshot_all(selector, locate::COLLECTION_LIMIT).await?;
    Ok(nodes
        .iter()
        .map(render)
        .filter(|text| !text.trim().is_empty())
        .collect())
}

/// Last-resort counting tier: if a content region renders enough text,
/// report a single exchange holding that text on the assistant side.
/// Counts derived from it only claim what was actually readable.
pub(crate) async fn fallback_exchange<R: BrowserRuntime>(
    page: &ChatPage<'_, R>,
    content_selectors: &[&str],
) -> Result<Vec<ConversationTurn>, AutomationError> {
    for selector in content_selectors {
        let Some(node) = page.snapshot(selector, 0).await? else {
            continue;
        };
        let text = extract::extract_structured(&node);
        if text.trim().chars().count() >= FALLBACK_CONTENT_MIN {
            return Ok(vec![ConversationTurn {
                user: None,
                assistant: Some(text),
            }]);
        }
    }
    Ok(Vec::new())
}

/// Stamp a gathered turn list into an export with the page's current
/// URL and capture time.
pub(crate) async fn assemble<R: BrowserRuntime>(
    page: &ChatPage<'_, R>,
    service: Service,
    title: String,
    turns: Vec<ConversationTurn>,
) -> Result<ConversationExport, AutomationError> {
    Ok(ConversationExport {
        service,
        title,
        turns,
        url: page.current_url().await?,
        captured_at: Utc::now(),
    })
}
