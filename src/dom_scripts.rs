//! Embedded in-page helper script.
//!
//! The probe library is compiled into the binary so installation never
//! depends on files shipped next to the executable. Keeping the script
//! in its own `.js` file allows editors to offer proper syntax
//! highlighting while still bundling it as a string at compile time.

/// Source of the `window.__chorus` probe helpers.
pub const DOM_HELPERS: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/scripts/dom_helpers.js"
));

/// Expression that answers whether the helpers are installed.
pub const HELPERS_PRESENT: &str = "typeof window.__chorus === 'object'";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_script_exposes_the_probe_surface() {
        assert!(!DOM_HELPERS.trim().is_empty());
        assert!(DOM_HELPERS.contains("window.__chorus"));
        for export in [
            "query",
            "anyVisible",
            "attrOf",
            "snapshot",
            "snapshotAll",
            "elementState",
            "setNativeValue",
            "setEditorContent",
            "typeCharacters",
            "pasteText",
            "click",
            "pressKey",
            "submitForm",
            "pageInfo",
        ] {
            assert!(
                DOM_HELPERS.contains(export),
                "helper script should expose `{export}`"
            );
        }
    }

    #[test]
    fn reinstalling_is_guarded() {
        assert!(DOM_HELPERS.contains("if (window.__chorus && window.__chorus.version)"));
    }
}
