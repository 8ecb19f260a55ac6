//! Service taxonomy for the hosted chat applications chorus can drive.
//!
//! Detection is URL-based (plus page title for the Grok-on-X case) so the
//! client can route an open tab to the right adapter without touching the
//! page.  Display metadata feeds markdown headers and CLI summaries.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// A hosted AI chat application with a dedicated adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Service {
    #[serde(rename = "chatgpt")]
    ChatGpt,
    #[serde(rename = "claude")]
    Claude,
    #[serde(rename = "gemini")]
    Gemini,
    #[serde(rename = "perplexity")]
    Perplexity,
    #[serde(rename = "grok")]
    Grok,
}

impl Service {
    pub fn all() -> [Service; 5] {
        [
            Service::ChatGpt,
            Service::Claude,
            Service::Gemini,
            Service::Perplexity,
            Service::Grok,
        ]
    }

    /// The stock line-up; Grok ships disabled because the X-integrated mode
    /// is noticeably flakier than the dedicated apps.
    pub fn default_enabled() -> Vec<Service> {
        vec![
            Service::ChatGpt,
            Service::Claude,
            Service::Gemini,
            Service::Perplexity,
        ]
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "chatgpt" => Some(Service::ChatGpt),
            "claude" => Some(Service::Claude),
            "gemini" => Some(Service::Gemini),
            "perplexity" => Some(Service::Perplexity),
            "grok" => Some(Service::Grok),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Service::ChatGpt => "chatgpt",
            Service::Claude => "claude",
            Service::Gemini => "gemini",
            Service::Perplexity => "perplexity",
            Service::Grok => "grok",
        }
    }

    /// Human-facing name used in markdown headers and summaries.
    pub fn label(self) -> &'static str {
        match self {
            Service::ChatGpt => "ChatGPT",
            Service::Claude => "Claude",
            Service::Gemini => "Gemini",
            Service::Perplexity => "Perplexity",
            Service::Grok => "Grok",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Service::ChatGpt => "\u{1F916}",
            Service::Claude => "\u{1F9E0}",
            Service::Gemini => "\u{1F48E}",
            Service::Perplexity => "\u{1F50D}",
            Service::Grok => "\u{1F680}",
        }
    }

    pub fn accent_color(self) -> &'static str {
        match self {
            Service::ChatGpt => "#10a37f",
            Service::Claude => "#d97706",
            Service::Gemini => "#4285f4",
            Service::Perplexity => "#6366f1",
            Service::Grok => "#1da1f2",
        }
    }

    /// Two/three-letter abbreviation for compact status lines.
    pub fn badge(self) -> &'static str {
        match self {
            Service::ChatGpt => "GPT",
            Service::Claude => "CL",
            Service::Gemini => "GM",
            Service::Perplexity => "PX",
            Service::Grok => "GK",
        }
    }

    pub fn home_url(self) -> &'static str {
        match self {
            Service::ChatGpt => "https://chatgpt.com",
            Service::Claude => "https://claude.ai",
            Service::Gemini => "https://gemini.google.com",
            Service::Perplexity => "https://www.perplexity.ai",
            Service::Grok => "https://grok.com",
        }
    }

    /// Hard deadline for one response to finish rendering.
    pub fn response_timeout(self) -> Duration {
        match self {
            Service::Claude => Duration::from_secs(30),
            _ => Duration::from_secs(45),
        }
    }

    /// Quiet window required after the last loading indicator disappears
    /// before a response counts as complete.  Search-backed services keep
    /// rendering citations for a while after the spinner goes away.
    pub fn settle_delay(self) -> Duration {
        match self {
            Service::Gemini | Service::Perplexity => Duration::from_secs(3),
            _ => Duration::from_secs(2),
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host classification for services reachable from more than one surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceEnvironment {
    /// Dedicated app on its own origin (grok.com).
    Standalone,
    /// Chat surface inside a host product (Grok inside X.com).
    Integrated,
    /// Widget-style mount detected only from page content.
    Embedded,
    Unknown,
}

impl ServiceEnvironment {
    pub fn description(self) -> &'static str {
        match self {
            ServiceEnvironment::Standalone => "standalone app",
            ServiceEnvironment::Integrated => "integrated in X.com",
            ServiceEnvironment::Embedded => "embedded component",
            ServiceEnvironment::Unknown => "unknown environment",
        }
    }

    /// URL-only classification; page probes may upgrade `Unknown` to
    /// `Embedded` when they find service-marked elements.
    pub fn from_location(url: &Url, title: Option<&str>) -> Self {
        let host = url.host_str().unwrap_or_default();
        if host_matches(host, "grok.com") {
            return ServiceEnvironment::Standalone;
        }
        if host_matches(host, "x.com") || host_matches(host, "twitter.com") {
            let path = url.path().to_ascii_lowercase();
            let titled = title
                .map(|t| t.to_ascii_lowercase().contains("grok"))
                .unwrap_or(false);
            if path.contains("grok") || titled {
                return ServiceEnvironment::Integrated;
            }
        }
        ServiceEnvironment::Unknown
    }
}

/// Identify which service a page belongs to from its URL and title.
///
/// Grok needs the title because the X.com composer only becomes a Grok
/// surface when the Grok panel is open; a plain timeline tab matches the
/// host but not the service.
pub fn detect_service(url: &str, title: Option<&str>) -> Option<Service> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;

    if host_matches(host, "chat.openai.com")
        || host_matches(host, "chatgpt.com")
        || host_matches(host, "chat.com")
    {
        return Some(Service::ChatGpt);
    }
    if host_matches(host, "claude.ai") {
        return Some(Service::Claude);
    }
    if host_matches(host, "gemini.google.com") {
        return Some(Service::Gemini);
    }
    if host_matches(host, "perplexity.ai") {
        return Some(Service::Perplexity);
    }
    if host_matches(host, "grok.com") {
        return Some(Service::Grok);
    }
    if host_matches(host, "x.com") || host_matches(host, "twitter.com") {
        let path = parsed.path().to_ascii_lowercase();
        let titled = title
            .map(|t| t.to_ascii_lowercase().contains("grok"))
            .unwrap_or(false);
        if path.contains("grok") || titled {
            return Some(Service::Grok);
        }
    }
    None
}

fn host_matches(host: &str, expected: &str) -> bool {
    host == expected || host.ends_with(&format!(".{expected}"))
}
