//! Builders for `window.__chorus` call expressions.
//!
//! Arguments are serialized through `serde_json` so selectors and
//! message text survive quoting, newlines, and unicode untouched.

use serde_json::Value as JsonValue;

fn js_str(value: &str) -> String {
    JsonValue::String(value.to_owned()).to_string()
}

fn js_str_list(values: &[String]) -> String {
    JsonValue::Array(values.iter().map(|v| JsonValue::String(v.clone())).collect()).to_string()
}

pub(crate) fn query(selector: &str, limit: usize) -> String {
    format!("window.__chorus.query({}, {limit})", js_str(selector))
}

pub(crate) fn any_visible(selectors: &[String]) -> String {
    format!("window.__chorus.anyVisible({})", js_str_list(selectors))
}

pub(crate) fn attr_of(selector: &str, index: usize, name: &str) -> String {
    format!(
        "window.__chorus.attrOf({}, {index}, {})",
        js_str(selector),
        js_str(name)
    )
}

pub(crate) fn snapshot(selector: &str, index: usize) -> String {
    format!("window.__chorus.snapshot({}, {index})", js_str(selector))
}

pub(crate) fn snapshot_all(selector: &str, limit: usize) -> String {
    format!("window.__chorus.snapshotAll({}, {limit})", js_str(selector))
}

pub(crate) fn element_state(selector: &str, index: usize) -> String {
    format!("window.__chorus.elementState({}, {index})", js_str(selector))
}

pub(crate) fn read_value(selector: &str, index: usize) -> String {
    format!("window.__chorus.readValue({}, {index})", js_str(selector))
}

pub(crate) fn set_native_value(selector: &str, index: usize, text: &str) -> String {
    format!(
        "window.__chorus.setNativeValue({}, {index}, {})",
        js_str(selector),
        js_str(text)
    )
}

pub(crate) fn set_editor_content(selector: &str, index: usize, text: &str, mode: &str) -> String {
    format!(
        "window.__chorus.setEditorContent({}, {index}, {}, {})",
        js_str(selector),
        js_str(text),
        js_str(mode)
    )
}

pub(crate) fn type_characters(selector: &str, index: usize, text: &str) -> String {
    format!(
        "window.__chorus.typeCharacters({}, {index}, {})",
        js_str(selector),
        js_str(text)
    )
}

pub(crate) fn paste_text(selector: &str, index: usize, text: &str) -> String {
    format!(
        "window.__chorus.pasteText({}, {index}, {})",
        js_str(selector),
        js_str(text)
    )
}

pub(crate) fn dispatch_input_events(selector: &str, index: usize) -> String {
    format!(
        "window.__chorus.dispatchInputEvents({}, {index})",
        js_str(selector)
    )
}

pub(crate) fn click(selector: &str, index: usize, method: &str) -> String {
    format!(
        "window.__chorus.click({}, {index}, {})",
        js_str(selector),
        js_str(method)
    )
}

pub(crate) fn press_key(selector: &str, index: usize, key: &str, ctrl: bool, shift: bool) -> String {
    format!(
        "window.__chorus.pressKey({}, {index}, {}, {ctrl}, {shift})",
        js_str(selector),
        js_str(key)
    )
}

pub(crate) fn submit_form(selector: &str, index: usize) -> String {
    format!("window.__chorus.submitForm({}, {index})", js_str(selector))
}

pub(crate) fn scroll_into_view(selector: &str, index: usize) -> String {
    format!(
        "window.__chorus.scrollIntoView({}, {index})",
        js_str(selector)
    )
}

pub(crate) fn focus(selector: &str, index: usize) -> String {
    format!("window.__chorus.focusElement({}, {index})", js_str(selector))
}

pub(crate) fn page_info() -> String {
    "window.__chorus.pageInfo()".to_string()
}
