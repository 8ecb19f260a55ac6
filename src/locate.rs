//! Tiered element location.
//!
//! Adapter selector lists are ordered from most specific to most generic,
//! so a stable `data-testid` outranks an aria-label which outranks a bare
//! tag fallback. The locator probes one tier at a time and stops at the
//! first tier with a visible match; tiers below the hit are never queried.
//! Handles record the winning tier so callers can log when a service has
//! drifted off its preferred markup.

use crate::browser::BrowserRuntime;
use crate::errors::AutomationError;
use crate::page::ChatPage;
use crate::types::{ElementHandle, QueryItem};

/// Cap on matches reported for a single-element lookup.
pub const QUERY_LIMIT: usize = 20;

/// Cap on matches when collecting repeated structures like message turns.
pub const COLLECTION_LIMIT: usize = 100;

fn handle_from(selector: &str, tier: usize, item: &QueryItem) -> ElementHandle {
    ElementHandle {
        selector: selector.to_string(),
        index: item.index,
        tier,
        tag: item.tag.clone(),
        text: item.text.clone(),
        enabled: item.enabled,
        editable: item.editable,
    }
}

/// Find the first visible element across the selector tiers.
///
/// Returns the first visible match of the first tier that has any, or
/// `None` when every tier comes up empty.
pub async fn find<R: BrowserRuntime>(
    page: &ChatPage<'_, R>,
    tiers: &[String],
) -> Result<Option<ElementHandle>, AutomationError> {
    for (tier, selector) in tiers.iter().enumerate() {
        let result = page.query(selector, QUERY_LIMIT).await?;
        if let Some(item) = result.items.first() {
            return Ok(Some(handle_from(selector, tier, item)));
        }
    }
    Ok(None)
}

/// Find every visible element of the first tier that matches anything.
///
/// Matches from different tiers are never mixed; the tier that wins
/// contributes all results.
pub async fn find_all<R: BrowserRuntime>(
    page: &ChatPage<'_, R>,
    tiers: &[String],
    limit: usize,
) -> Result<Vec<ElementHandle>, AutomationError> {
    for (tier, selector) in tiers.iter().enumerate() {
        let result = page.query(selector, limit).await?;
        if !result.items.is_empty() {
            return Ok(result
                .items
                .iter()
                .map(|item| handle_from(selector, tier, item))
                .collect());
        }
    }
    Ok(Vec::new())
}

/// Like [`find`], but a full miss is an error naming the role that could
/// not be located.
pub async fn required<R: BrowserRuntime>(
    page: &ChatPage<'_, R>,
    role: &'static str,
    tiers: &[String],
) -> Result<ElementHandle, AutomationError> {
    match find(page, tiers).await? {
        Some(handle) => Ok(handle),
        None => Err(AutomationError::NotFound {
            service: page.service(),
            role,
        }),
    }
}
