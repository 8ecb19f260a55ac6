//! Shared vocabulary between site adapters and the client.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::service::Service;

/// Ordered selector tiers for the element roles an adapter drives.
///
/// Within each role the first selector that yields a visible match
/// wins; later entries are fallbacks for UI revisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorSet {
    pub message_input: Vec<String>,
    pub send_button: Vec<String>,
    pub response_container: Vec<String>,
    pub loading_indicator: Vec<String>,
    pub conversation_turn: Vec<String>,
}

impl SelectorSet {
    pub fn new(
        message_input: &[&str],
        send_button: &[&str],
        response_container: &[&str],
        loading_indicator: &[&str],
        conversation_turn: &[&str],
    ) -> Self {
        fn owned(list: &[&str]) -> Vec<String> {
            list.iter().map(|s| s.to_string()).collect()
        }

        Self {
            message_input: owned(message_input),
            send_button: owned(send_button),
            response_container: owned(response_container),
            loading_indicator: owned(loading_indicator),
            conversation_turn: owned(conversation_turn),
        }
    }
}

/// Outcome of one send attempt, reported without panicking the caller.
///
/// `success` with a `warning` means the message was handed to the page
/// but transmission could not be confirmed within the verification
/// window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendResult {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            warning: None,
            error: None,
        }
    }

    pub fn with_warning(warning: impl Into<String>) -> Self {
        Self {
            success: true,
            warning: Some(warning.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            warning: None,
            error: Some(error.into()),
        }
    }
}

/// What an adapter concluded about its tab during a connection check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionStatus {
    /// Logged in, input present, conversation surface reachable.
    Ready,
    /// A login wall or auth button is showing.
    LoggedOut,
    /// The page rendered but no message input was found.
    MissingInput,
    /// Logged in with an input, but not on a conversation surface yet.
    NotInConversation,
}

impl ConnectionStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, ConnectionStatus::Ready)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConnectionStatus::Ready => "ready",
            ConnectionStatus::LoggedOut => "logged out",
            ConnectionStatus::MissingInput => "no message input",
            ConnectionStatus::NotInConversation => "no active conversation",
        }
    }
}

/// Which counting strategy produced a conversation snapshot.
///
/// Reported alongside the numbers so callers can judge how much to
/// trust them; later variants are progressively weaker heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionMethod {
    ConversationTurns,
    RoleAttributes,
    RenderCount,
    ConversationContainers,
    DirectQuery,
    MessageRole,
    ClassHeuristic,
    PairedSections,
    TestIds,
    CssClasses,
    ContentAnalysis,
    DomStructure,
    Fallback,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::ConversationTurns => "conversation-turns",
            DetectionMethod::RoleAttributes => "role-attributes",
            DetectionMethod::RenderCount => "render-count",
            DetectionMethod::ConversationContainers => "conversation-containers",
            DetectionMethod::DirectQuery => "direct-query",
            DetectionMethod::MessageRole => "message-role",
            DetectionMethod::ClassHeuristic => "class-heuristic",
            DetectionMethod::PairedSections => "paired-sections",
            DetectionMethod::TestIds => "test-ids",
            DetectionMethod::CssClasses => "css-classes",
            DetectionMethod::ContentAnalysis => "content-analysis",
            DetectionMethod::DomStructure => "dom-structure",
            DetectionMethod::Fallback => "fallback",
        }
    }
}

impl std::fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structural summary of the visible conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSnapshot {
    pub service: Service,
    pub title: String,
    pub user_messages: usize,
    pub assistant_messages: usize,
    pub total_messages: usize,
    pub detection_method: DetectionMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub captured_at: DateTime<Utc>,
}

/// One user/assistant exchange, either side possibly absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant: Option<String>,
}

impl ConversationTurn {
    pub fn is_empty(&self) -> bool {
        self.user.is_none() && self.assistant.is_none()
    }
}

/// How long a response collection is willing to watch the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseWait {
    /// Run the completion state machine with the given deadline.
    Window(Duration),
    /// Read whatever is rendered right now.
    Immediate,
}

impl ResponseWait {
    pub fn for_service(service: Service) -> Self {
        ResponseWait::Window(service.response_timeout())
    }
}
