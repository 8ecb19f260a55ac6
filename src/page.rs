//! Typed page handle over the in-page probe helpers.
//!
//! [`ChatPage`] wraps one browser tab and exposes the probe surface as
//! typed async methods. Probe results come back as JSON and are parsed
//! into the crate's DOM types here, so everything above this layer
//! works with plain Rust values. Element access always goes through a
//! selector plus index; nothing caches live DOM references across
//! awaits.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::browser::{BrowserRuntime, BrowserRuntimeError};
use crate::client::ChorusClient;
use crate::dom_scripts;
use crate::errors::AutomationError;
use crate::service::Service;
use crate::types::dom::{DocNode, ElementHandle, ElementState, PageInfo, QueryResult};

mod script;

/// Content-setting paths exposed by the rich editor helper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorMode {
    /// Rebuild the editor's paragraph structure and move the caret to
    /// the end. Only works on contenteditable hosts.
    Structured,
    /// Assign the value or text content directly.
    Direct,
}

impl EditorMode {
    fn as_str(&self) -> &'static str {
        match self {
            EditorMode::Structured => "structured",
            EditorMode::Direct => "direct",
        }
    }
}

/// Click dispatch variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickMethod {
    /// `element.click()`.
    Native,
    /// Synthetic mousedown/mouseup/click at the element center.
    Mouse,
    /// Strip the disabled attribute, then click.
    Force,
}

impl ClickMethod {
    fn as_str(&self) -> &'static str {
        match self {
            ClickMethod::Native => "native",
            ClickMethod::Mouse => "mouse",
            ClickMethod::Force => "force",
        }
    }
}

/// Key presses used to trigger submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyChord {
    Enter,
    CtrlEnter,
    Space,
}

impl KeyChord {
    fn parts(&self) -> (&'static str, bool, bool) {
        match self {
            KeyChord::Enter => ("Enter", false, false),
            KeyChord::CtrlEnter => ("Enter", true, false),
            KeyChord::Space => (" ", false, false),
        }
    }
}

/// Result of an in-page mutation, with the element's text afterwards
/// so callers can verify what actually landed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MutationOutcome {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct OkFlag {
    #[serde(default)]
    ok: bool,
}

/// High-level wrapper around one managed chat tab.
pub struct ChatPage<'client, R: BrowserRuntime> {
    client: &'client ChorusClient<R>,
    page_id: String,
    service: Service,
}

impl<'client, R> ChatPage<'client, R>
where
    R: BrowserRuntime,
{
    pub fn new(
        client: &'client ChorusClient<R>,
        page_id: impl Into<String>,
        service: Service,
    ) -> Self {
        Self {
            client,
            page_id: page_id.into(),
            service,
        }
    }

    pub fn id(&self) -> &str {
        &self.page_id
    }

    pub fn service(&self) -> Service {
        self.service
    }

    pub(crate) fn client(&self) -> &ChorusClient<R> {
        self.client
    }

    async fn eval(&self, expression: &str) -> Result<JsonValue, AutomationError> {
        self.client
            .browser()
            .runtime()
            .evaluate(&self.page_id, expression)
            .await
            .map_err(AutomationError::from)
    }

    /// Evaluates a probe expression, reinstalling the helpers once if
    /// the page lost them to a hard navigation.
    async fn eval_helper(&self, expression: &str) -> Result<JsonValue, AutomationError> {
        match self.eval(expression).await {
            Err(AutomationError::Runtime(BrowserRuntimeError::Message(msg)))
                if helpers_lost(&msg) =>
            {
                self.client.logger().debug(
                    "probe helpers missing, reinstalling",
                    Some(self.service.as_str()),
                    None,
                );
                self.eval(dom_scripts::DOM_HELPERS).await?;
                self.eval(expression).await
            }
            other => other,
        }
    }

    /// Installs the probe helpers unless the page already has them.
    pub async fn ensure_helpers(&self) -> Result<(), AutomationError> {
        let present = self.eval(dom_scripts::HELPERS_PRESENT).await?;
        if !present.as_bool().unwrap_or(false) {
            self.eval(dom_scripts::DOM_HELPERS).await?;
        }
        Ok(())
    }

    pub async fn navigate(&self, url: &str) -> Result<(), AutomationError> {
        self.client
            .browser()
            .runtime()
            .navigate(&self.page_id, url)
            .await
            .map_err(AutomationError::from)
    }

    /// Location and load state reported from inside the page.
    pub async fn info(&self) -> Result<PageInfo, AutomationError> {
        let value = self.eval_helper(&script::page_info()).await?;
        if value.is_null() {
            return Ok(PageInfo::default());
        }
        parse(value)
    }

    /// Current URL, preferring the CDP target over an in-page probe.
    pub async fn current_url(&self) -> Result<Option<String>, AutomationError> {
        let runtime_url = self
            .client
            .browser()
            .runtime()
            .page_url(&self.page_id)
            .await?;
        if runtime_url.is_some() {
            return Ok(runtime_url);
        }
        let info = self.info().await?;
        Ok((!info.url.is_empty()).then_some(info.url))
    }

    /// Visible matches for a single selector.
    pub async fn query(&self, selector: &str, limit: usize) -> Result<QueryResult, AutomationError> {
        let value = self.eval_helper(&script::query(selector, limit)).await?;
        if value.is_null() {
            return Ok(QueryResult::default());
        }
        parse(value)
    }

    /// True when any of the selectors has a visible match.
    pub async fn any_visible(&self, selectors: &[String]) -> Result<bool, AutomationError> {
        if selectors.is_empty() {
            return Ok(false);
        }
        let value = self.eval_helper(&script::any_visible(selectors)).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    /// Attribute read without the visibility gate, for `meta` probes.
    pub async fn attr_of(
        &self,
        selector: &str,
        index: usize,
        name: &str,
    ) -> Result<Option<String>, AutomationError> {
        let value = self.eval_helper(&script::attr_of(selector, index, name)).await?;
        Ok(value.as_str().map(str::to_string))
    }

    /// Serialized subtree of the nth visible match, if present.
    pub async fn snapshot(
        &self,
        selector: &str,
        index: usize,
    ) -> Result<Option<DocNode>, AutomationError> {
        let value = self.eval_helper(&script::snapshot(selector, index)).await?;
        if value.is_null() {
            return Ok(None);
        }
        parse(value).map(Some)
    }

    /// Serialized subtrees of every visible match, in document order.
    pub async fn snapshot_all(
        &self,
        selector: &str,
        limit: usize,
    ) -> Result<Vec<DocNode>, AutomationError> {
        let value = self.eval_helper(&script::snapshot_all(selector, limit)).await?;
        if value.is_null() {
            return Ok(Vec::new());
        }
        parse(value)
    }

    pub async fn element_state(
        &self,
        handle: &ElementHandle,
    ) -> Result<ElementState, AutomationError> {
        let value = self
            .eval_helper(&script::element_state(&handle.selector, handle.index))
            .await?;
        if value.is_null() {
            return Ok(ElementState::default());
        }
        parse(value)
    }

    pub async fn read_value(&self, handle: &ElementHandle) -> Result<String, AutomationError> {
        let value = self
            .eval_helper(&script::read_value(&handle.selector, handle.index))
            .await?;
        Ok(value
            .get("value")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string())
    }

    pub async fn set_native_value(
        &self,
        handle: &ElementHandle,
        text: &str,
    ) -> Result<MutationOutcome, AutomationError> {
        let expr = script::set_native_value(&handle.selector, handle.index, text);
        self.mutation(&expr).await
    }

    pub async fn set_editor_content(
        &self,
        handle: &ElementHandle,
        text: &str,
        mode: EditorMode,
    ) -> Result<MutationOutcome, AutomationError> {
        let expr =
            script::set_editor_content(&handle.selector, handle.index, text, mode.as_str());
        self.mutation(&expr).await
    }

    pub async fn type_characters(
        &self,
        handle: &ElementHandle,
        text: &str,
    ) -> Result<MutationOutcome, AutomationError> {
        let expr = script::type_characters(&handle.selector, handle.index, text);
        self.mutation(&expr).await
    }

    pub async fn paste_text(
        &self,
        handle: &ElementHandle,
        text: &str,
    ) -> Result<MutationOutcome, AutomationError> {
        let expr = script::paste_text(&handle.selector, handle.index, text);
        self.mutation(&expr).await
    }

    pub async fn dispatch_input_events(
        &self,
        handle: &ElementHandle,
    ) -> Result<MutationOutcome, AutomationError> {
        let expr = script::dispatch_input_events(&handle.selector, handle.index);
        self.mutation(&expr).await
    }

    pub async fn click(
        &self,
        handle: &ElementHandle,
        method: ClickMethod,
    ) -> Result<bool, AutomationError> {
        let expr = script::click(&handle.selector, handle.index, method.as_str());
        self.ok_flag(&expr).await
    }

    pub async fn press_key(
        &self,
        handle: &ElementHandle,
        chord: KeyChord,
    ) -> Result<bool, AutomationError> {
        let (key, ctrl, shift) = chord.parts();
        let expr = script::press_key(&handle.selector, handle.index, key, ctrl, shift);
        self.ok_flag(&expr).await
    }

    pub async fn submit_form(&self, handle: &ElementHandle) -> Result<bool, AutomationError> {
        let expr = script::submit_form(&handle.selector, handle.index);
        self.ok_flag(&expr).await
    }

    pub async fn scroll_into_view(&self, handle: &ElementHandle) -> Result<bool, AutomationError> {
        let expr = script::scroll_into_view(&handle.selector, handle.index);
        self.ok_flag(&expr).await
    }

    pub async fn focus(&self, handle: &ElementHandle) -> Result<bool, AutomationError> {
        let expr = script::focus(&handle.selector, handle.index);
        self.ok_flag(&expr).await
    }

    async fn mutation(&self, expression: &str) -> Result<MutationOutcome, AutomationError> {
        let value = self.eval_helper(expression).await?;
        if value.is_null() {
            return Ok(MutationOutcome::default());
        }
        parse(value)
    }

    async fn ok_flag(&self, expression: &str) -> Result<bool, AutomationError> {
        let value = self.eval_helper(expression).await?;
        if value.is_null() {
            return Ok(false);
        }
        let flag: OkFlag = parse(value)?;
        Ok(flag.ok)
    }
}

fn parse<T: DeserializeOwned>(value: JsonValue) -> Result<T, AutomationError> {
    serde_json::from_value(value).map_err(AutomationError::from)
}

/// Exception messages that mean the helper namespace vanished, which
/// happens after hard navigations.
fn helpers_lost(message: &str) -> bool {
    message.contains("__chorus")
        || message.contains("is not defined")
        || message.contains("Cannot read properties of undefined")
}
