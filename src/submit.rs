//! Multi-strategy send triggering with optimistic verification.
//!
//! Clicking a send button is unreliable across the services: some
//! buttons ignore synthetic clicks, some stay disabled until a
//! framework tick runs, some are replaced mid-flight. The trigger
//! tries activation strategies in order until one dispatches, then
//! watches briefly for evidence the message actually left (a loading
//! indicator, a cleared composer, a disabled button). Dispatch without
//! evidence is still treated as success, just flagged unverified, so a
//! missed spinner never double-sends a message.

use std::fmt;

use crate::browser::BrowserRuntime;
use crate::errors::AutomationError;
use crate::locate;
use crate::page::{ChatPage, ClickMethod, KeyChord};
use crate::types::{ElementHandle, SelectorSet};
use crate::wait::{self, PollSpec};

const ENABLE_POLL_MS: u64 = 500;
const VERIFY_POLL_MS: u64 = 250;

/// One way of activating a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStrategy {
    /// `element.click()` on the send button.
    NativeClick,
    /// Synthetic mousedown/mouseup/click at the button center.
    SyntheticMouse,
    /// Enter keypress on the composer.
    EnterOnInput,
    /// `requestSubmit` on the enclosing form.
    FormSubmit,
    /// Strip the disabled attribute, then click.
    ForceEnable,
    /// Enter keypress on the button itself.
    KeyOnButton,
}

impl SubmitStrategy {
    const ALL: [SubmitStrategy; 6] = [
        SubmitStrategy::NativeClick,
        SubmitStrategy::SyntheticMouse,
        SubmitStrategy::EnterOnInput,
        SubmitStrategy::FormSubmit,
        SubmitStrategy::ForceEnable,
        SubmitStrategy::KeyOnButton,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SubmitStrategy::NativeClick => "native click",
            SubmitStrategy::SyntheticMouse => "synthetic mouse click",
            SubmitStrategy::EnterOnInput => "enter on input",
            SubmitStrategy::FormSubmit => "form submit",
            SubmitStrategy::ForceEnable => "force-enabled click",
            SubmitStrategy::KeyOnButton => "enter on button",
        }
    }

    fn applies(self, button: Option<&ElementHandle>, button_enabled: bool) -> bool {
        match self {
            SubmitStrategy::NativeClick
            | SubmitStrategy::SyntheticMouse
            | SubmitStrategy::KeyOnButton => button.is_some() && button_enabled,
            SubmitStrategy::ForceEnable => button.is_some(),
            SubmitStrategy::EnterOnInput | SubmitStrategy::FormSubmit => true,
        }
    }
}

impl fmt::Display for SubmitStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observation that confirmed a dispatched send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitEvidence {
    LoadingVisible,
    InputCleared,
    ButtonDisabled,
}

impl SubmitEvidence {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmitEvidence::LoadingVisible => "loading indicator appeared",
            SubmitEvidence::InputCleared => "composer cleared",
            SubmitEvidence::ButtonDisabled => "send button disabled",
        }
    }
}

/// How a send was triggered and whether it was confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitReport {
    pub strategy: SubmitStrategy,
    pub verified: bool,
    pub evidence: Option<SubmitEvidence>,
    /// Strategies tried, the dispatched one included.
    pub attempted: usize,
}

/// Trigger the send for a composed message.
///
/// Locates the send button if one exists, waits briefly for it to
/// enable, then runs activation strategies until one dispatches. The
/// first dispatched strategy ends the attempt; retrying after a
/// dispatch risks sending twice.
pub async fn submit_message<R: BrowserRuntime>(
    page: &ChatPage<'_, R>,
    input: &ElementHandle,
    selectors: &SelectorSet,
) -> Result<SubmitReport, AutomationError> {
    let config = page.client().config();
    let logger = page.client().logger();
    let service = page.service();

    let button = locate::find(page, &selectors.send_button).await?;
    let mut button_enabled = false;

    if let Some(button) = &button {
        page.scroll_into_view(button).await?;
        let spec = PollSpec::from_millis(config.enable_wait_ms, ENABLE_POLL_MS);
        let outcome = wait::until(spec, || async move {
            let state = page.element_state(button).await?;
            Ok::<_, AutomationError>(state.enabled.then_some(()))
        })
        .await?;
        button_enabled = outcome.is_satisfied();
        if !button_enabled {
            logger.debug(
                "send button never enabled, continuing with fallbacks",
                Some(service.as_str()),
                None,
            );
        }
    } else {
        logger.debug(
            "no send button found, relying on keyboard submission",
            Some(service.as_str()),
            None,
        );
    }

    let mut attempted = 0usize;
    for strategy in SubmitStrategy::ALL {
        if !strategy.applies(button.as_ref(), button_enabled) {
            continue;
        }
        attempted += 1;

        let dispatched = match dispatch(page, strategy, input, button.as_ref()).await {
            Ok(flag) => flag,
            Err(error) => {
                logger.debug(
                    format!("{strategy} failed: {error}"),
                    Some(service.as_str()),
                    None,
                );
                false
            }
        };
        if !dispatched {
            logger.debug(
                format!("{strategy} did not dispatch"),
                Some(service.as_str()),
                None,
            );
            continue;
        }

        let evidence = confirm(page, input, button.as_ref(), selectors).await?;
        match evidence {
            Some(evidence) => {
                logger.debug(
                    format!("{strategy} confirmed: {}", evidence.as_str()),
                    Some(service.as_str()),
                    None,
                );
            }
            None => {
                logger.info(
                    format!("{strategy} dispatched but nothing confirmed the send"),
                    Some(service.as_str()),
                    None,
                );
            }
        }
        return Ok(SubmitReport {
            strategy,
            verified: evidence.is_some(),
            evidence,
            attempted,
        });
    }

    Err(AutomationError::AllStrategiesExhausted {
        operation: "send submission",
        attempted,
    })
}

async fn dispatch<R: BrowserRuntime>(
    page: &ChatPage<'_, R>,
    strategy: SubmitStrategy,
    input: &ElementHandle,
    button: Option<&ElementHandle>,
) -> Result<bool, AutomationError> {
    match (strategy, button) {
        (SubmitStrategy::NativeClick, Some(button)) => {
            page.click(button, ClickMethod::Native).await
        }
        (SubmitStrategy::SyntheticMouse, Some(button)) => {
            page.click(button, ClickMethod::Mouse).await
        }
        (SubmitStrategy::ForceEnable, Some(button)) => page.click(button, ClickMethod::Force).await,
        (SubmitStrategy::KeyOnButton, Some(button)) => {
            page.press_key(button, KeyChord::Enter).await
        }
        (SubmitStrategy::EnterOnInput, _) => page.press_key(input, KeyChord::Enter).await,
        (SubmitStrategy::FormSubmit, _) => page.submit_form(input).await,
        _ => Ok(false),
    }
}

/// Watch for any sign the send went through, up to the verify window.
async fn confirm<R: BrowserRuntime>(
    page: &ChatPage<'_, R>,
    input: &ElementHandle,
    button: Option<&ElementHandle>,
    selectors: &SelectorSet,
) -> Result<Option<SubmitEvidence>, AutomationError> {
    let spec = PollSpec::from_millis(page.client().config().verify_window_ms, VERIFY_POLL_MS);
    let outcome = wait::until(spec, || async move {
        if page.any_visible(&selectors.loading_indicator).await? {
            return Ok(Some(SubmitEvidence::LoadingVisible));
        }
        let input_state = page.element_state(input).await?;
        if input_state.value.trim().is_empty() {
            return Ok(Some(SubmitEvidence::InputCleared));
        }
        if let Some(button) = button {
            let state = page.element_state(button).await?;
            if state.visible && !state.enabled {
                return Ok(Some(SubmitEvidence::ButtonDisabled));
            }
        }
        Ok::<_, AutomationError>(None)
    })
    .await?;
    Ok(outcome.into_value())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::service::Service;
    use crate::testutil::{ScriptedRuntime, test_client};

    fn input_handle() -> ElementHandle {
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

    fn selectors() -> SelectorSet {
        SelectorSet::new(
            &["#prompt-textarea"],
            &["button[data-testid=\"send-button\"]"],
            &["div.markdown"],
            &["button[aria-label=\"Stop generating\"]"],
            &["article"],
        )
    }

    #[tokio::test(start_paused = true)]
    async fn native_click_wins_when_the_spinner_confirms() {
        let runtime = ScriptedRuntime::new()
            .respond(
                "query(\"button[data-testid=\\\"send-button\\\"]",
                json!({"count": 1, "items": [{"index": 0, "tag": "button", "enabled": true}]}),
            )
            .respond("scrollIntoView", json!({"ok": true}))
            .respond(
                "elementState(\"button",
                json!({"visible": true, "enabled": true, "editable": false, "value": ""}),
            )
            .respond("click", json!({"ok": true}))
            .respond("anyVisible", json!(true));
        let client = test_client(runtime);
        let page = ChatPage::new(&client, "page-0", Service::ChatGpt);

        let report = submit_message(&page, &input_handle(), &selectors())
            .await
            .expect("submit succeeds");

        assert_eq!(report.strategy, SubmitStrategy::NativeClick);
        assert!(report.verified);
        assert_eq!(report.evidence, Some(SubmitEvidence::LoadingVisible));
        assert_eq!(report.attempted, 1);

        let runtime = client.browser().runtime();
        assert_eq!(runtime.eval_count("pressKey"), 0);
        assert_eq!(runtime.eval_count("submitForm"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_without_evidence_is_soft_success() {
        let runtime = ScriptedRuntime::new()
            .respond(
                "query(\"button[data-testid=\\\"send-button\\\"]",
                json!({"count": 1, "items": [{"index": 0, "tag": "button", "enabled": true}]}),
            )
            .respond("scrollIntoView", json!({"ok": true}))
            .respond(
                "elementState(\"button",
                json!({"visible": true, "enabled": true, "editable": false, "value": ""}),
            )
            .respond("click", json!({"ok": true}))
            .respond("anyVisible", json!(false))
            .respond(
                "elementState(\"#prompt-textarea",
                json!({"visible": true, "enabled": true, "editable": true, "value": "still here"}),
            );
        let client = test_client(runtime);
        let page = ChatPage::new(&client, "page-0", Service::ChatGpt);

        let report = submit_message(&page, &input_handle(), &selectors())
            .await
            .expect("soft success");

        assert_eq!(report.strategy, SubmitStrategy::NativeClick);
        assert!(!report.verified);
        assert!(report.evidence.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_button_falls_back_to_the_keyboard() {
        let runtime = ScriptedRuntime::new()
            .respond(
                "query(\"button[data-testid=\\\"send-button\\\"]",
                json!({"count": 0, "items": []}),
            )
            .respond("pressKey", json!({"ok": true}))
            .respond("anyVisible", json!(true));
        let client = test_client(runtime);
        let page = ChatPage::new(&client, "page-0", Service::Claude);

        let report = submit_message(&page, &input_handle(), &selectors())
            .await
            .expect("keyboard path");

        assert_eq!(report.strategy, SubmitStrategy::EnterOnInput);
        assert!(report.verified);

        let runtime = client.browser().runtime();
        assert_eq!(runtime.eval_count("click"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_button_skips_plain_clicks() {
        // The button exists but never enables; the composer clears after
        // the Enter press, confirming the keyboard send.
        let runtime = ScriptedRuntime::new()
            .respond(
                "query(\"button[data-testid=\\\"send-button\\\"]",
                json!({"count": 1, "items": [{"index": 0, "tag": "button", "enabled": false}]}),
            )
            .respond("scrollIntoView", json!({"ok": true}))
            .respond(
                "elementState(\"button",
                json!({"visible": true, "enabled": false, "editable": false, "value": ""}),
            )
            .respond("pressKey", json!({"ok": true}))
            .respond("anyVisible", json!(false))
            .respond(
                "elementState(\"#prompt-textarea",
                json!({"visible": true, "enabled": true, "editable": true, "value": ""}),
            );
        let client = test_client(runtime);
        let page = ChatPage::new(&client, "page-0", Service::Gemini);

        let report = submit_message(&page, &input_handle(), &selectors())
            .await
            .expect("keyboard fallback");

        assert_eq!(report.strategy, SubmitStrategy::EnterOnInput);
        assert_eq!(report.evidence, Some(SubmitEvidence::InputCleared));

        let native_clicks = client.browser().runtime().eval_count("\"native\"");
        assert_eq!(native_clicks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_dispatches_exhausts_the_strategies() {
        let runtime = ScriptedRuntime::new()
            .respond(
                "query(\"button[data-testid=\\\"send-button\\\"]",
                json!({"count": 0, "items": []}),
            )
            .respond("pressKey", json!({"ok": false}))
            .respond("submitForm", json!({"ok": false}));
        let client = test_client(runtime);
        let page = ChatPage::new(&client, "page-0", Service::Perplexity);

        let err = submit_message(&page, &input_handle(), &selectors())
            .await
            .expect_err("nothing dispatched");

        match err {
            AutomationError::AllStrategiesExhausted {
                operation,
                attempted,
            } => {
                assert_eq!(operation, "send submission");
                assert_eq!(attempted, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
