//! Grok adapter, covering both the standalone app and the X.com panel.
//!
//! Grok is reachable from grok.com and from inside X, and the two
//! surfaces share almost no DOM. The selector tiers union both so the
//! locator picks whichever surface is present, while login checks and
//! title handling branch on a URL-classified [`ServiceEnvironment`].
//! Conversation markup is the least stable of the five services, so
//! counting runs through a deep heuristic stack that bottoms out in
//! sentence-shape classification of bare text blocks.

use url::Url;

use crate::browser::BrowserRuntime;
use crate::errors::AutomationError;
use crate::export::ConversationExport;
use crate::extract;
use crate::locate;
use crate::page::ChatPage;
use crate::service::{Service, ServiceEnvironment};
use crate::types::{ConnectionStatus, DetectionMethod, DocNode, SelectorSet};

use super::{SiteAdapter, Speaker};

use async_trait::async_trait;

const STANDALONE_LOGIN: &[&str] = &[
    "a[href*=\"sign-in\"]",
    "button[data-testid=\"signin\"]",
];

const X_LOGIN: &[&str] = &[
    "a[href=\"/login\"]",
    "a[data-testid=\"loginButton\"]",
    "div[data-testid=\"loginButton\"]",
];

/// Elements that mark a page as hosting a Grok surface even when the
/// URL says nothing.
const GROK_MARKERS: &[&str] = &["div[data-testid*=\"grok\"]", "div[class*=\"grok\"]"];

const TESTID_BLOCKS: &str = "div[data-testid*=\"message\"]";
const USER_BUBBLES: &str = "div[data-testid=\"grok-user-message\"]";
const CLASS_BLOCKS: &str = "div[class*=\"message\"]";
const TEXT_BLOCKS: &str = "main div[dir=\"auto\"]";
const STRUCTURE_BLOCKS: &str = "main > div > div";

const TITLE_HEADINGS: &[&str] = &[];
const TITLE_SUFFIXES: &[&str] = &[" / X", " - Grok", " | Grok"];

const QUESTION_OPENERS: &[&str] = &[
    "how", "what", "why", "when", "where", "who", "which", "can", "could", "should", "would",
    "will", "do", "does", "is", "are", "explain", "compare", "write", "summarize",
];

pub struct GrokAdapter {
    selectors: SelectorSet,
}

impl GrokAdapter {
    pub fn new() -> Self {
        Self {
            selectors: SelectorSet::new(
                &[
                    "textarea[aria-label=\"Ask Grok anything\"]",
                    "div[contenteditable=\"true\"][aria-label*=\"Grok\"]",
                    "textarea[data-testid=\"tweetTextarea_0\"]",
                    "div[data-testid=\"tweetTextarea_0\"]",
                    "main textarea",
                ],
                &[
                    "button[aria-label=\"Submit\"]",
                    "button[data-testid=\"grok-send-button\"]",
                    "button[data-testid=\"tweetButtonInline\"]",
                    "button[type=\"submit\"]",
                ],
                &[
                    "div[data-testid=\"grok-message\"]",
                    "div[class*=\"message-bubble\"]",
                ],
                &[
                    "button[aria-label=\"Stop generating\"]",
                    "div[class*=\"thinking\"]",
                    "svg.animate-spin",
                ],
                &[TESTID_BLOCKS, CLASS_BLOCKS],
            ),
        }
    }

    /// Classify which Grok surface this tab is, URL first, then a
    /// content probe that can upgrade `Unknown` to `Embedded`.
    pub(crate) async fn environment<R: BrowserRuntime>(
        &self,
        page: &ChatPage<'_, R>,
    ) -> Result<ServiceEnvironment, AutomationError> {
        let info = page.info().await?;
        let title = (!info.title.is_empty()).then_some(info.title.as_str());
        let from_url = page
            .current_url()
            .await?
            .as_deref()
            .and_then(|raw| Url::parse(raw).ok())
            .map(|parsed| ServiceEnvironment::from_location(&parsed, title))
            .unwrap_or(ServiceEnvironment::Unknown);
        if from_url != ServiceEnvironment::Unknown {
            return Ok(from_url);
        }
        let marked = page.any_visible(&super::owned(GROK_MARKERS)).await?;
        Ok(if marked {
            ServiceEnvironment::Embedded
        } else {
            ServiceEnvironment::Unknown
        })
    }
}

impl Default for GrokAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// Sentence-shape test for "did the user write this". Question marks
/// and interrogative openers dominate; a short single line without
/// closing punctuation usually means a typed prompt.
fn looks_like_question(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return false;
    }
    if trimmed.ends_with('?') {
        return true;
    }
    let first = trimmed
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    if QUESTION_OPENERS.contains(&first.as_str()) {
        return true;
    }
    let ends_like_prose =
        trimmed.ends_with('.') || trimmed.ends_with('!') || trimmed.ends_with(':');
    !ends_like_prose && !trimmed.contains('\n') && trimmed.chars().count() < 80
}

fn classify_block(block: &DocNode, text: &str) -> Speaker {
    let marker = block.attr("data-testid").unwrap_or_default();
    if marker.contains("user") || block.class_contains("user") || block.class_contains("items-end")
    {
        Speaker::User
    } else if marker.contains("grok")
        || block.class_contains("grok")
        || block.class_contains("response")
    {
        Speaker::Assistant
    } else if looks_like_question(text) {
        Speaker::User
    } else {
        Speaker::Assistant
    }
}

fn classify_blocks(blocks: &[DocNode]) -> Vec<(Speaker, String)> {
    let mut messages = Vec::new();
    for block in blocks {
        let text = extract::extract_structured(block);
        if text.trim().is_empty() {
            continue;
        }
        let speaker = classify_block(block, &text);
        messages.push((speaker, text));
    }
    messages
}

/// Merge consecutive same-speaker entries. The weak tiers split one
/// message across several DOM blocks, which would otherwise inflate
/// the counts.
fn coalesce(messages: Vec<(Speaker, String)>) -> Vec<(Speaker, String)> {
    let mut out: Vec<(Speaker, String)> = Vec::new();
    for (speaker, text) in messages {
        match out.last_mut() {
            Some((last, buffer)) if *last == speaker => {
                buffer.push_str("\n\n");
                buffer.push_str(&text);
            }
            _ => out.push((speaker, text)),
        }
    }
    out
}

#[async_trait]
impl<R: BrowserRuntime> SiteAdapter<R> for GrokAdapter {
    fn service(&self) -> Service {
        Service::Grok
    }

    fn selectors(&self) -> &SelectorSet {
        &self.selectors
    }

    async fn check_connection(
        &self,
        page: &ChatPage<'_, R>,
    ) -> Result<ConnectionStatus, AutomationError> {
        let environment = self.environment(page).await?;
        let logged_out = match environment {
            ServiceEnvironment::Standalone => {
                page.any_visible(&super::owned(STANDALONE_LOGIN)).await?
            }
            ServiceEnvironment::Integrated | ServiceEnvironment::Embedded => {
                page.any_visible(&super::owned(X_LOGIN)).await?
            }
            ServiceEnvironment::Unknown => {
                page.any_visible(&super::owned(STANDALONE_LOGIN)).await?
                    || page.any_visible(&super::owned(X_LOGIN)).await?
            }
        };
        if logged_out {
            return Ok(ConnectionStatus::LoggedOut);
        }
        if locate::find(page, &self.selectors.message_input)
            .await?
            .is_none()
        {
            return Ok(ConnectionStatus::MissingInput);
        }
        let in_conversation = page
            .current_url()
            .await?
            .is_some_and(|url| url.contains("/chat"))
            || !locate::find_all(page, &self.selectors.conversation_turn, 5)
                .await?
                .is_empty();
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

        // Explicitly marked bubbles.
        let blocks = page
            .snapshot_all(TESTID_BLOCKS, locate::COLLECTION_LIMIT)
            .await?;
        let messages = classify_blocks(&blocks);
        if !messages.is_empty() {
            let turns = super::fold_turns(messages);
            let export = super::assemble(page, Service::Grok, title, turns).await?;
            return Ok((export, DetectionMethod::TestIds));
        }

        // Class-named rows.
        let blocks = page
            .snapshot_all(CLASS_BLOCKS, locate::COLLECTION_LIMIT)
            .await?;
        let messages = classify_blocks(&blocks);
        if !messages.is_empty() {
            let turns = super::fold_turns(messages);
            let export = super::assemble(page, Service::Grok, title, turns).await?;
            return Ok((export, DetectionMethod::ClassHeuristic));
        }

        // Bare text blocks classified by sentence shape.
        let blocks = page
            .snapshot_all(TEXT_BLOCKS, locate::COLLECTION_LIMIT)
            .await?;
        let mut messages = Vec::new();
        for block in &blocks {
            let text = extract::extract_text(block);
            if text.trim().is_empty() {
                continue;
            }
            let speaker = if looks_like_question(&text) {
                Speaker::User
            } else {
                Speaker::Assistant
            };
            messages.push((speaker, text));
        }
        let messages = coalesce(messages);
        if !messages.is_empty() {
            let turns = super::fold_turns(messages);
            let export = super::assemble(page, Service::Grok, title, turns).await?;
            return Ok((export, DetectionMethod::ContentAnalysis));
        }

        // Positional alternation over the chat column.
        let blocks = page.snapshot_all(STRUCTURE_BLOCKS, 60).await?;
        let mut messages = Vec::new();
        for block in &blocks {
            let text = extract::extract_structured(block);
            if text.trim().is_empty() {
                continue;
            }
            let speaker = if messages.len() % 2 == 0 {
                Speaker::User
            } else {
                Speaker::Assistant
            };
            messages.push((speaker, text));
        }
        if !messages.is_empty() {
            let turns = super::fold_turns(messages);
            let export = super::assemble(page, Service::Grok, title, turns).await?;
            return Ok((export, DetectionMethod::DomStructure));
        }

        let turns = super::fallback_exchange(page, &["main", "body"]).await?;
        let export = super::assemble(page, Service::Grok, title, turns).await?;
        Ok((export, DetectionMethod::Fallback))
    }

    async fn extract_title(&self, page: &ChatPage<'_, R>) -> String {
        super::title_from_page(
            page,
            Service::Grok,
            TITLE_HEADINGS,
            &[USER_BUBBLES],
            TITLE_SUFFIXES,
        )
        .await
    }
}
