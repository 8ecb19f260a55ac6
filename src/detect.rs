//! Response completion detection.
//!
//! Every service shows some loading affordance while a reply streams
//! (a stop button, a spinner, a typing cursor). The detector polls for
//! it and runs a small state machine: once the indicator has been seen,
//! its disappearance means generation finished, and a short settle
//! delay absorbs the citation and syntax-highlight rendering that
//! trails the spinner. An indicator that never shows is not an error;
//! short replies routinely finish before the first poll, so the window
//! simply elapses and the extractor decides what is actually there.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::Instant;

use crate::browser::BrowserRuntime;
use crate::errors::AutomationError;
use crate::page::ChatPage;
use crate::types::SelectorSet;
use crate::wait::{self, PollOutcome, PollSpec};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How a response wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionOutcome {
    /// Whether a loading indicator was ever observed. When false the
    /// reply was already settled (or the service renders without one).
    pub observed_generation: bool,
    /// Total time spent in the detector, settle delay included.
    pub waited: Duration,
}

/// Wait for the current response to finish rendering.
///
/// Returns an error only when the service is still visibly generating
/// at the end of the window.
pub async fn await_response<R: BrowserRuntime>(
    page: &ChatPage<'_, R>,
    selectors: &SelectorSet,
    window: Duration,
) -> Result<CompletionOutcome, AutomationError> {
    let logger = page.client().logger();
    let service = page.service();
    let started = Instant::now();

    // The probe satisfies only on the seen-then-gone transition; a poll
    // that never sees the indicator keeps the wait pending.
    let saw_loading = AtomicBool::new(false);
    let saw = &saw_loading;
    let outcome = wait::until(PollSpec::new(window, POLL_INTERVAL), || async move {
        if page.any_visible(&selectors.loading_indicator).await? {
            saw.store(true, Ordering::SeqCst);
            return Ok(None);
        }
        Ok::<_, AutomationError>(saw.load(Ordering::SeqCst).then_some(()))
    })
    .await?;

    match outcome {
        PollOutcome::Satisfied { .. } => {
            let settle = page
                .client()
                .config()
                .settle_delay_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| service.settle_delay());
            logger.debug(
                format!(
                    "generation finished after {}ms, settling {}ms",
                    started.elapsed().as_millis(),
                    settle.as_millis()
                ),
                Some(service.as_str()),
                None,
            );
            tokio::time::sleep(settle).await;
            Ok(CompletionOutcome {
                observed_generation: true,
                waited: started.elapsed(),
            })
        }
        PollOutcome::TimedOut { waited } => {
            if saw_loading.load(Ordering::SeqCst) {
                return Err(AutomationError::Timeout {
                    operation: "response completion",
                    elapsed_ms: waited.as_millis() as u64,
                });
            }
            logger.debug(
                "no loading indicator observed, treating the reply as settled",
                Some(service.as_str()),
                None,
            );
            Ok(CompletionOutcome {
                observed_generation: false,
                waited,
            })
        }
    }
}
