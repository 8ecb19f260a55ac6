//! Perplexity (perplexity.ai) adapter.
//!
//! A search-first product: the thread is a stack of bordered sections,
//! each pairing a display-font question heading with a
//! `markdown-content-<n>` answer block. Inline citation chips are
//! stripped from the prose by the extractor, so the adapter collects
//! them separately and appends a numbered source list to each answer.

use url::Url;

use crate::browser::BrowserRuntime;
use crate::errors::AutomationError;
use crate::export::ConversationExport;
use crate::extract;
use crate::locate;
use crate::page::ChatPage;
use crate::service::Service;
use crate::types::{ConnectionStatus, ConversationTurn, DetectionMethod, DocNode, SelectorSet};

use super::SiteAdapter;

use async_trait::async_trait;

const LOGIN_WALL: &[&str] = &[
    "div[data-testid=\"login-modal\"]",
    "button[data-testid=\"login-modal-signup-button\"]",
    "button[aria-label=\"Sign in\"]",
];

const SECTION_BLOCKS: &str = "main div[class*=\"border-b\"]";
const QUESTION_BLOCKS: &str = "h1[class*=\"font-display\"], div[class*=\"font-display\"]";
const ANSWER_BLOCKS: &str = "div[id^=\"markdown-content-\"]";

const TITLE_HEADINGS: &[&str] = &["h1[class*=\"font-display\"]"];
const TITLE_SUFFIXES: &[&str] = &[" - Perplexity", " | Perplexity"];

/// Longest source list worth appending to one answer.
const SOURCES_CAP: usize = 10;

pub struct PerplexityAdapter {
    selectors: SelectorSet,
}

impl PerplexityAdapter {
    pub fn new() -> Self {
        Self {
            selectors: SelectorSet::new(
                &[
                    "textarea[placeholder*=\"Ask\"]",
                    "textarea[autofocus]",
                    "main textarea",
                    "div[contenteditable=\"true\"]",
                ],
                &[
                    "button[aria-label=\"Submit\"]",
                    "button[data-testid=\"submit-button\"]",
                ],
                &[ANSWER_BLOCKS, "div.prose"],
                &[
                    "button[aria-label=\"Stop generating response\"]",
                    "div[class*=\"animate-pulse\"]",
                    "svg.animate-spin",
                ],
                &[SECTION_BLOCKS, ANSWER_BLOCKS],
            ),
        }
    }
}

impl Default for PerplexityAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn is_question_node(node: &DocNode) -> bool {
    node.class_contains("font-display") && matches!(node.tag(), Some("h1" | "h2" | "div"))
}

fn is_answer_node(node: &DocNode) -> bool {
    node.attr("id")
        .is_some_and(|id| id.starts_with("markdown-content"))
        || node.has_class("prose")
}

/// Numbered `[label](url)` entries for the section's citation chips,
/// deduplicated by target and capped. Answers rendered without chips
/// fall back to the plain external links in the prose, filtered to
/// ones whose text reads like a source title.
fn citation_entries(section: &DocNode) -> Vec<String> {
    let chips = section.find_all(&|n| {
        n.tag() == Some("a")
            && n.class_contains("citation")
            && n.attr("href").is_some_and(|href| href.starts_with("http"))
    });
    if !chips.is_empty() {
        return numbered_sources(chips, |_| true);
    }

    let links = section.find_all(&|n| {
        n.tag() == Some("a") && n.attr("href").is_some_and(|href| href.starts_with("http"))
    });
    numbered_sources(links, plausible_source_label)
}

/// A link label descriptive enough to stand in for a citation chip.
fn plausible_source_label(label: &str) -> bool {
    let len = label.chars().count();
    len > 5 && len < 100 && !label.to_lowercase().contains("read more")
}

fn numbered_sources(anchors: Vec<&DocNode>, keep: impl Fn(&str) -> bool) -> Vec<String> {
    let mut seen: Vec<&str> = Vec::new();
    let mut entries = Vec::new();
    for anchor in anchors {
        let Some(href) = anchor.attr("href") else {
            continue;
        };
        if seen.contains(&href) {
            continue;
        }
        if entries.len() == SOURCES_CAP {
            break;
        }
        let label = anchor
            .raw_text()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if !keep(&label) {
            continue;
        }
        seen.push(href);
        let label = if label.is_empty() {
            Url::parse(href)
                .ok()
                .and_then(|url| url.host_str().map(str::to_string))
                .unwrap_or_else(|| href.to_string())
        } else {
            label
        };
        entries.push(format!("{}. [{label}]({href})", entries.len() + 1));
    }
    entries
}

#[async_trait]
impl<R: BrowserRuntime> SiteAdapter<R> for PerplexityAdapter {
    fn service(&self) -> Service {
        Service::Perplexity
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
            Some(url) if url.contains("/search/") => true,
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

        // Bordered sections pair a question heading with its answer.
        let sections = page
            .snapshot_all(SECTION_BLOCKS, locate::COLLECTION_LIMIT)
            .await?;
        let mut turns = Vec::new();
        for section in &sections {
            let user = section
                .find_first(&is_question_node)
                .map(extract::extract_text)
                .filter(|text| !text.trim().is_empty());
            let mut assistant = section
                .find_first(&is_answer_node)
                .map(extract::extract_structured)
                .filter(|text| !text.trim().is_empty());
            if let Some(text) = assistant.as_mut() {
                let citations = citation_entries(section);
                if !citations.is_empty() {
                    text.push_str("\n\n### Sources\n\n");
                    text.push_str(&citations.join("\n"));
                }
            }
            if user.is_some() || assistant.is_some() {
                turns.push(ConversationTurn { user, assistant });
            }
        }
        if !turns.is_empty() {
            let export = super::assemble(page, Service::Perplexity, title, turns).await?;
            return Ok((export, DetectionMethod::PairedSections));
        }

        // No section wrappers; zip the headings against the answer
        // blocks and trust page order.
        let questions = super::texts_of(page, QUESTION_BLOCKS, extract::extract_text).await?;
        let answers = super::texts_of(page, ANSWER_BLOCKS, extract::extract_structured).await?;
        if !questions.is_empty() || !answers.is_empty() {
            let turns = super::pair_turns(questions, answers);
            let export = super::assemble(page, Service::Perplexity, title, turns).await?;
            return Ok((export, DetectionMethod::DirectQuery));
        }

        let turns = super::fallback_exchange(page, &["main", "body"]).await?;
        let export = super::assemble(page, Service::Perplexity, title, turns).await?;
        Ok((export, DetectionMethod::Fallback))
    }

    async fn extract_title(&self, page: &ChatPage<'_, R>) -> String {
        super::title_from_page(
            page,
            Service::Perplexity,
            TITLE_HEADINGS,
            &[QUESTION_BLOCKS],
            TITLE_SUFFIXES,
        )
        .await
    }
}
