//! Serialized views of in-page DOM state.
//!
//! The injected helper script reports elements as plain JSON so every
//! decision (tier selection, markdown rendering, verification) happens
//! in Rust. [`DocNode`] is the snapshot shape used for extraction.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One node of a serialized DOM subtree.
///
/// Element nodes carry their tag, attributes, and children. Text nodes
/// carry the raw character data, whitespace included, so preformatted
/// blocks survive the round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocNode {
    Element {
        tag: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        attrs: BTreeMap<String, String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        children: Vec<DocNode>,
    },
    Text {
        text: String,
    },
}

impl DocNode {
    /// Element constructor used heavily by extraction tests.
    pub fn element<T, A>(tag: T, attrs: A, children: Vec<DocNode>) -> Self
    where
        T: Into<String>,
        A: IntoIterator<Item = (&'static str, &'static str)>,
    {
        DocNode::Element {
            tag: tag.into(),
            attrs: attrs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            children,
        }
    }

    pub fn text(data: impl Into<String>) -> Self {
        DocNode::Text { text: data.into() }
    }

    pub fn is_element(&self) -> bool {
        matches!(self, DocNode::Element { .. })
    }

    pub fn tag(&self) -> Option<&str> {
        match self {
            DocNode::Element { tag, .. } => Some(tag.as_str()),
            DocNode::Text { .. } => None,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        match self {
            DocNode::Element { attrs, .. } => attrs.get(name).map(String::as_str),
            DocNode::Text { .. } => None,
        }
    }

    /// Mirrors the `[class*="needle"]` selector semantics.
    pub fn class_contains(&self, needle: &str) -> bool {
        self.attr("class").is_some_and(|classes| classes.contains(needle))
    }

    /// True when the `class` attribute contains `token` as a whole word.
    pub fn has_class(&self, token: &str) -> bool {
        self.attr("class")
            .map(|classes| classes.split_whitespace().any(|c| c == token))
            .unwrap_or(false)
    }

    pub fn children(&self) -> &[DocNode] {
        match self {
            DocNode::Element { children, .. } => children,
            DocNode::Text { .. } => &[],
        }
    }

    /// Depth-first search for the first node matching `pred`, including
    /// the node itself.
    pub fn find_first<'a>(&'a self, pred: &dyn Fn(&DocNode) -> bool) -> Option<&'a DocNode> {
        if pred(self) {
            return Some(self);
        }
        self.children().iter().find_map(|child| child.find_first(pred))
    }

    /// Depth-first collection of every node matching `pred`.
    pub fn find_all<'a>(&'a self, pred: &dyn Fn(&DocNode) -> bool) -> Vec<&'a DocNode> {
        let mut hits = Vec::new();
        self.collect_matches(pred, &mut hits);
        hits
    }

    fn collect_matches<'a>(&'a self, pred: &dyn Fn(&DocNode) -> bool, hits: &mut Vec<&'a DocNode>) {
        if pred(self) {
            hits.push(self);
        }
        for child in self.children() {
            child.collect_matches(pred, hits);
        }
    }

    /// Raw concatenated character data of the subtree, no normalization.
    pub fn raw_text(&self) -> String {
        let mut out = String::new();
        self.push_raw_text(&mut out);
        out
    }

    fn push_raw_text(&self, out: &mut String) {
        match self {
            DocNode::Text { text } => out.push_str(text),
            DocNode::Element { children, .. } => {
                for child in children {
                    child.push_raw_text(out);
                }
            }
        }
    }
}

/// Address of one element on the page: a selector plus the position
/// among that selector's visible matches. Actions re-resolve it on
/// every call instead of caching a live reference across awaits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementHandle {
    pub selector: String,
    pub index: usize,
    /// Position of `selector` in the tier list it was found through.
    pub tier: usize,
    pub tag: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub editable: bool,
}

impl ElementHandle {
    pub fn is_text_control(&self) -> bool {
        matches!(self.tag.as_str(), "textarea" | "input")
    }
}

/// One visible match reported by the in-page `query` helper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryItem {
    pub index: usize,
    pub tag: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub editable: bool,
}

/// Visible-match report for a single selector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    pub count: usize,
    #[serde(default)]
    pub items: Vec<QueryItem>,
}

/// Live state of one element, used by enablement waits and send
/// verification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementState {
    pub visible: bool,
    pub enabled: bool,
    #[serde(default)]
    pub editable: bool,
    #[serde(default)]
    pub value: String,
}

/// Location and load state of the page itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "readyState")]
    pub ready_state: String,
}
