//! Multi-strategy message injection.
//!
//! Chat composers split into two families: contenteditable editors
//! (ProseMirror, Quill, Lexical) and plain text controls. Each family
//! gets an ordered list of injection strategies, tried until the input
//! reads back close enough to the requested text. Verification uses an
//! edit-distance similarity score rather than equality because rich
//! editors normalize whitespace and paragraph breaks on the way in.

use std::fmt;

use crate::browser::BrowserRuntime;
use crate::errors::AutomationError;
use crate::page::{ChatPage, EditorMode};
use crate::types::ElementHandle;

/// One way of putting text into a composer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionStrategy {
    /// Rebuild the editor content as one paragraph element per line.
    StructuredEditor,
    /// Call the native value setter so framework state stays in sync.
    NativeSetter,
    /// Type character by character with key events.
    CharacterType,
    /// Synthesize a paste with a `ClipboardEvent`.
    ClipboardPaste,
    /// Assign directly to `value`/`textContent` as a last resort.
    DirectAssign,
}

impl InjectionStrategy {
    const ALL: [InjectionStrategy; 5] = [
        InjectionStrategy::StructuredEditor,
        InjectionStrategy::NativeSetter,
        InjectionStrategy::CharacterType,
        InjectionStrategy::ClipboardPaste,
        InjectionStrategy::DirectAssign,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            InjectionStrategy::StructuredEditor => "structured editor",
            InjectionStrategy::NativeSetter => "native setter",
            InjectionStrategy::ClipboardPaste => "clipboard paste",
            InjectionStrategy::CharacterType => "character typing",
            InjectionStrategy::DirectAssign => "direct assignment",
        }
    }

    fn applies_to(self, handle: &ElementHandle) -> bool {
        match self {
            InjectionStrategy::StructuredEditor => {
                handle.editable && !handle.is_text_control()
            }
            InjectionStrategy::NativeSetter => handle.is_text_control(),
            InjectionStrategy::ClipboardPaste
            | InjectionStrategy::CharacterType
            | InjectionStrategy::DirectAssign => true,
        }
    }

    /// Strategies that mutate state without firing a realistic event
    /// stream need the events dispatched separately afterwards.
    fn needs_event_dispatch(self) -> bool {
        matches!(
            self,
            InjectionStrategy::StructuredEditor
                | InjectionStrategy::NativeSetter
                | InjectionStrategy::DirectAssign
        )
    }

    /// Applicable strategies for a composer, most reliable first.
    pub fn ordered_for(handle: &ElementHandle) -> Vec<InjectionStrategy> {
        Self::ALL
            .iter()
            .copied()
            .filter(|strategy| strategy.applies_to(handle))
            .collect()
    }
}

impl fmt::Display for InjectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a message ended up in the composer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InjectionReport {
    pub strategy: InjectionStrategy,
    /// Read-back similarity against the requested text, 0 to 100.
    pub score: u8,
    /// Strategies tried, the successful one included.
    pub attempted: usize,
}

/// Put `text` into the composer behind `handle`.
///
/// Tries each applicable strategy in order and accepts the first whose
/// read-back meets the configured similarity threshold. Strategy
/// failures are logged and swallowed; only a full miss across every
/// strategy is an error.
pub async fn inject_message<R: BrowserRuntime>(
    page: &ChatPage<'_, R>,
    handle: &ElementHandle,
    text: &str,
) -> Result<InjectionReport, AutomationError> {
    let threshold = page.client().config().similarity_threshold;
    let logger = page.client().logger();
    let service = page.service();
    let mut attempted = 0usize;

    for strategy in InjectionStrategy::ordered_for(handle) {
        attempted += 1;
        if let Err(error) = page.focus(handle).await {
            logger.debug(
                format!("focus before {strategy} failed: {error}"),
                Some(service.as_str()),
                None,
            );
        }
        match attempt(page, handle, text, strategy).await {
            Ok(score) if score >= threshold => {
                logger.debug(
                    format!("{strategy} accepted at similarity {score}"),
                    Some(service.as_str()),
                    None,
                );
                return Ok(InjectionReport {
                    strategy,
                    score,
                    attempted,
                });
            }
            Ok(score) => {
                logger.debug(
                    format!("{strategy} left the input at similarity {score}"),
                    Some(service.as_str()),
                    None,
                );
            }
            Err(error) => {
                logger.debug(
                    format!("{strategy} failed: {error}"),
                    Some(service.as_str()),
                    None,
                );
            }
        }
    }

    Err(AutomationError::AllStrategiesExhausted {
        operation: "input injection",
        attempted,
    })
}

async fn attempt<R: BrowserRuntime>(
    page: &ChatPage<'_, R>,
    handle: &ElementHandle,
    text: &str,
    strategy: InjectionStrategy,
) -> Result<u8, AutomationError> {
    let outcome = match strategy {
        InjectionStrategy::StructuredEditor => {
            page.set_editor_content(handle, text, EditorMode::Structured)
                .await?
        }
        InjectionStrategy::NativeSetter => page.set_native_value(handle, text).await?,
        InjectionStrategy::ClipboardPaste => page.paste_text(handle, text).await?,
        InjectionStrategy::CharacterType => page.type_characters(handle, text).await?,
        InjectionStrategy::DirectAssign => {
            page.set_editor_content(handle, text, EditorMode::Direct)
                .await?
        }
    };
    if !outcome.ok {
        return Ok(0);
    }
    if strategy.needs_event_dispatch() {
        page.dispatch_input_events(handle).await?;
    }
    let actual = page.read_value(handle).await?;
    Ok(similarity_score(text, &actual))
}

/// Similarity between the requested text and what the composer holds,
/// from 0 (nothing in common) to 100 (identical after trimming).
///
/// Containment counts as 90 because editors that append a trailing
/// newline or swallow one still carry the full message.
pub fn similarity_score(expected: &str, actual: &str) -> u8 {
    let expected = expected.trim();
    let actual = actual.trim();
    if expected == actual {
        return 100;
    }
    if expected.is_empty() || actual.is_empty() {
        return 0;
    }
    if expected.contains(actual) || actual.contains(expected) {
        return 90;
    }
    let max_len = expected.chars().count().max(actual.chars().count());
    let distance = levenshtein(expected, actual);
    let penalty = (distance * 100 / max_len).min(100);
    100 - penalty as u8
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            current[j + 1] = substitution
                .min(prev[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut prev, &mut current);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::service::Service;
    use crate::testutil::{ScriptedRuntime, test_client};

    fn editor_handle() -> ElementHandle {
        ElementHandle {
            selector: "div.ProseMirror".to_string(),
            index: 0,
            tier: 0,
            tag: "div".to_string(),
            text: String::new(),
            enabled: true,
            editable: true,
        }
    }

    fn textarea_handle() -> ElementHandle {
        ElementHandle {
            selector: "#prompt-textarea".to_string(),
            index: 0,
            tier: 0,
            tag: "textarea".to_string(),
            text: String::new(),
            enabled: true,
            editable: true,
        }
    }

    #[test]
    fn levenshtein_counts_edits() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn similarity_tiers_behave() {
        assert_eq!(similarity_score("hello world", "hello world"), 100);
        assert_eq!(similarity_score("hello world", "  hello world \n"), 100);
        assert_eq!(similarity_score("hello world", "hello"), 90);
        assert_eq!(similarity_score("hello", "hello world and more"), 90);
        assert_eq!(similarity_score("hello", ""), 0);
        assert_eq!(similarity_score("", "leftover draft"), 0);

        let close = similarity_score("the quick brown fox", "the quick brown fix");
        let far = similarity_score("the quick brown fox", "a completely different draft");
        assert!(close >= 90, "one edit in nineteen chars scores {close}");
        assert!(far < close);
    }

    #[test]
    fn strategy_order_follows_the_composer_family() {
        let editor = InjectionStrategy::ordered_for(&editor_handle());
        assert_eq!(
            editor,
            vec![
                InjectionStrategy::StructuredEditor,
                InjectionStrategy::CharacterType,
                InjectionStrategy::ClipboardPaste,
                InjectionStrategy::DirectAssign,
            ]
        );

        let textarea = InjectionStrategy::ordered_for(&textarea_handle());
        assert_eq!(
            textarea,
            vec![
                InjectionStrategy::NativeSetter,
                InjectionStrategy::CharacterType,
                InjectionStrategy::ClipboardPaste,
                InjectionStrategy::DirectAssign,
            ]
        );
    }

    #[tokio::test]
    async fn first_strategy_wins_when_readback_matches() {
        let runtime = ScriptedRuntime::new()
            .respond("setEditorContent", json!({"ok": true, "value": ""}))
            .respond("dispatchInputEvents", json!({"ok": true, "value": ""}))
            .respond("readValue(", json!({"value": "ship the release notes"}));
        let client = test_client(runtime);
        let page = crate::page::ChatPage::new(&client, "page-0", Service::Claude);

        let report = inject_message(&page, &editor_handle(), "ship the release notes")
            .await
            .expect("injection succeeds");

        assert_eq!(report.strategy, InjectionStrategy::StructuredEditor);
        assert_eq!(report.score, 100);
        assert_eq!(report.attempted, 1);

        let runtime = client.browser().runtime();
        assert_eq!(runtime.eval_count("pasteText"), 0);
        assert_eq!(runtime.eval_count("typeCharacters"), 0);
    }

    #[tokio::test]
    async fn falls_back_when_the_editor_rejects_the_first_strategy() {
        let runtime = ScriptedRuntime::new()
            .respond("setEditorContent", json!({"ok": false}))
            .respond("typeCharacters", json!({"ok": true, "value": "hello"}))
            .respond("readValue(", json!({"value": "hello"}));
        let client = test_client(runtime);
        let page = crate::page::ChatPage::new(&client, "page-0", Service::Gemini);

        let report = inject_message(&page, &editor_handle(), "hello")
            .await
            .expect("fallback succeeds");

        assert_eq!(report.strategy, InjectionStrategy::CharacterType);
        assert_eq!(report.attempted, 2);
        // Typing sits ahead of the paste simulation, so the paste probe
        // never ran.
        assert_eq!(client.browser().runtime().eval_count("pasteText"), 0);
    }

    #[tokio::test]
    async fn exhausting_every_strategy_is_an_error() {
        // Nothing scripted, so every mutation reports a miss.
        let client = test_client(ScriptedRuntime::new());
        let page = crate::page::ChatPage::new(&client, "page-0", Service::ChatGpt);

        let err = inject_message(&page, &textarea_handle(), "hello")
            .await
            .expect_err("no strategy can land");

        match err {
            AutomationError::AllStrategiesExhausted {
                operation,
                attempted,
            } => {
                assert_eq!(operation, "input injection");
                assert_eq!(attempted, 4);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
