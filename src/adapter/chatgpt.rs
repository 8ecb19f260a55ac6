//! ChatGPT (chatgpt.com) adapter.
//!
//! The most structured DOM of the five services: every exchange is an
//! `article` turn container and both speakers carry an explicit
//! `data-message-author-role` marker. The main quirk is the composer,
//! which the app unmounts while switching conversations, so the send
//! path can open a fresh chat and wait for the input to come back.

use crate::browser::BrowserRuntime;
use crate::errors::AutomationError;
use crate::export::ConversationExport;
use crate::extract;
use crate::locate;
use crate::page::{ChatPage, ClickMethod};
use crate::service::Service;
use crate::types::{ConnectionStatus, DetectionMethod, SelectorSet};
use crate::wait::{self, PollSpec};

use super::{SiteAdapter, Speaker};

use async_trait::async_trait;

/// Tiered "open a new conversation" controls, most current UI first.
const NEW_CHAT_TIERS: &[&str] = &[
    "button[data-testid=\"new-chat-button\"]",
    "a[data-testid=\"create-new-chat-button\"]",
    "nav a[href=\"/\"]",
];

const LOGIN_WALL: &[&str] = &[
    "button[data-testid=\"login-button\"]",
    "button[data-testid=\"welcome-login-button\"]",
    "a[href*=\"auth/login\"]",
];

const TURN_ARTICLES: &str = "article[data-testid^=\"conversation-turn\"]";
const USER_BLOCKS: &str = "div[data-message-author-role=\"user\"]";
const ASSISTANT_BLOCKS: &str = "div[data-message-author-role=\"assistant\"]";

const TITLE_HEADINGS: &[&str] = &[
    "nav a[aria-current=\"page\"]",
    "nav li[data-testid^=\"history-item\"] a[data-active]",
];
const TITLE_SUFFIXES: &[&str] = &[" - ChatGPT", " | ChatGPT"];

/// How long the composer gets to remount after opening a new chat.
const INPUT_REAPPEAR_MS: u64 = 8_000;
const INPUT_POLL_MS: u64 = 500;

pub struct ChatGptAdapter {
    selectors: SelectorSet,
}

impl ChatGptAdapter {
    pub fn new() -> Self {
        Self {
            selectors: SelectorSet::new(
                &[
                    "#prompt-textarea",
                    "textarea[data-testid=\"prompt-textarea\"]",
                    "form div[contenteditable=\"true\"]",
                    "main textarea",
                ],
                &[
                    "button[data-testid=\"send-button\"]",
                    "button[aria-label=\"Send prompt\"]",
                    "form button[type=\"submit\"]",
                ],
                &[
                    "div[data-message-author-role=\"assistant\"] div.markdown",
                    "div[data-message-author-role=\"assistant\"]",
                    "div.markdown",
                ],
                &[
                    "button[data-testid=\"stop-button\"]",
                    "button[aria-label=\"Stop generating\"]",
                    "div.result-streaming",
                ],
                &[TURN_ARTICLES, "div[data-message-author-role]"],
            ),
        }
    }
}

impl Default for ChatGptAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: BrowserRuntime> SiteAdapter<R> for ChatGptAdapter {
    fn service(&self) -> Service {
        Service::ChatGpt
    }

    fn selectors(&self) -> &SelectorSet {
        &self.selectors
    }

    /// If the composer is unmounted, open a new chat and wait for it to
    /// come back. Failure stays soft; the send fails properly at the
    /// locate step if the composer never returns.
    async fn prepare_send(&self, page: &ChatPage<'_, R>) -> Result<(), AutomationError> {
        if locate::find(page, &self.selectors.message_input)
            .await?
            .is_some()
        {
            return Ok(());
        }
        let logger = page.client().logger();
        logger.debug(
            "composer missing, opening a new chat",
            Some(Service::ChatGpt.as_str()),
            None,
        );

        let mut opened = false;
        for selector in NEW_CHAT_TIERS {
            if let Some(handle) = locate::find(page, &super::owned(&[selector])).await? {
                if page.click(&handle, ClickMethod::Native).await? {
                    opened = true;
                    break;
                }
            }
        }
        if !opened {
            // Last resort: scan button and link texts for the label.
            for container in ["button", "a"] {
                let result = page.query(container, 40).await?;
                if let Some(item) = result
                    .items
                    .iter()
                    .find(|item| item.text.to_ascii_lowercase().contains("new chat"))
                {
                    let handle = super::handle_for_item(container, item);
                    if page.click(&handle, ClickMethod::Native).await? {
                        opened = true;
                        break;
                    }
                }
            }
        }
        if !opened {
            return Ok(());
        }

        let spec = PollSpec::from_millis(INPUT_REAPPEAR_MS, INPUT_POLL_MS);
        let outcome = wait::until(spec, || async move {
            let found = locate::find(page, &self.selectors.message_input).await?;
            Ok::<_, AutomationError>(found.map(|_| ()))
        })
        .await?;
        if !outcome.is_satisfied() {
            logger.debug(
                "composer did not remount after opening a new chat",
                Some(Service::ChatGpt.as_str()),
                None,
            );
        }
        Ok(())
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
            Some(url) if url.contains("/c/") => true,
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

        // Turn articles carry both speakers with explicit role markers.
        let articles = page
            .snapshot_all(TURN_ARTICLES, locate::COLLECTION_LIMIT)
            .await?;
        let mut messages = Vec::new();
        for article in &articles {
            let Some(block) =
                article.find_first(&|n| n.attr("data-message-author-role").is_some())
            else {
                continue;
            };
            match block.attr("data-message-author-role") {
                Some("user") => {
                    let text = extract::extract_text(block);
                    if !text.trim().is_empty() {
                        messages.push((Speaker::User, text));
                    }
                }
                Some("assistant") => {
                    let body = block
                        .find_first(&|n| n.has_class("markdown"))
                        .unwrap_or(block);
                    let text = extract::extract_structured(body);
                    if !text.trim().is_empty() {
                        messages.push((Speaker::Assistant, text));
                    }
                }
                _ => {}
            }
        }
        if !messages.is_empty() {
            let turns = super::fold_turns(messages);
            let export = super::assemble(page, Service::ChatGpt, title, turns).await?;
            return Ok((export, DetectionMethod::ConversationTurns));
        }

        // Role-marked blocks queried directly, paired positionally.
        let users = super::texts_of(page, USER_BLOCKS, extract::extract_text).await?;
        let assistants = super::texts_of(page, ASSISTANT_BLOCKS, extract::extract_structured).await?;
        if !users.is_empty() || !assistants.is_empty() {
            let turns = super::pair_turns(users, assistants);
            let export = super::assemble(page, Service::ChatGpt, title, turns).await?;
            return Ok((export, DetectionMethod::RoleAttributes));
        }

        let turns = super::fallback_exchange(page, &["main", "body"]).await?;
        let export = super::assemble(page, Service::ChatGpt, title, turns).await?;
        Ok((export, DetectionMethod::Fallback))
    }

    async fn extract_title(&self, page: &ChatPage<'_, R>) -> String {
        super::title_from_page(
            page,
            Service::ChatGpt,
            TITLE_HEADINGS,
            &[USER_BLOCKS],
            TITLE_SUFFIXES,
        )
        .await
    }
}
