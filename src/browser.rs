//! Browser connection primitives.
//!
//! This module turns the high-level configuration into a strongly-typed
//! plan for either launching a local Chrome or attaching to one that is
//! already running with a DevTools endpoint. The [`BrowserRuntime`]
//! trait is the seam the automation layers drive pages through, which
//! keeps selector cascades and adapters testable with scripted
//! runtimes.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::config::{BrowserMode, ChorusConfig};

/// Error surfaced while constructing browser plans.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("connect mode requires a websocket url (set CHORUS_WEBSOCKET_URL)")]
    MissingWebsocketUrl,
}

/// Errors surfaced by runtime implementations.
#[derive(Debug, Error)]
pub enum BrowserRuntimeError {
    #[error("browser runtime error: {0}")]
    Message(String),

    #[error("browser runtime not initialized")]
    NotInitialized,

    #[error("no page registered under id {0}")]
    PageNotFound(String),

    #[error("browser runtime feature unsupported: {0}")]
    Unsupported(String),
}

/// Viewport dimensions applied to launched browsers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Viewport {
            width: 1288,
            height: 711,
        }
    }
}

/// Everything needed to launch a local Chrome instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchPlan {
    pub headless: bool,
    pub chrome_executable: Option<PathBuf>,
    pub user_data_dir: Option<PathBuf>,
    pub args: Vec<String>,
    pub viewport: Option<Viewport>,
}

/// Everything needed to attach to a running Chrome instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectPlan {
    pub websocket_url: String,
}

/// Normalised execution plan derived from the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserPlan {
    Launch(LaunchPlan),
    Connect(ConnectPlan),
}

impl BrowserPlan {
    /// Build a browser plan from the configuration.
    pub fn from_config(config: &ChorusConfig) -> Result<Self, BrowserError> {
        match config.browser {
            BrowserMode::Connect => {
                let websocket_url = config
                    .websocket_url
                    .clone()
                    .ok_or(BrowserError::MissingWebsocketUrl)?;
                Ok(BrowserPlan::Connect(ConnectPlan { websocket_url }))
            }
            BrowserMode::Launch => Ok(BrowserPlan::Launch(LaunchPlan {
                headless: config.headless,
                chrome_executable: config.chrome_executable.clone().map(PathBuf::from),
                user_data_dir: config.user_data_dir.clone().map(PathBuf::from),
                args: config.browser_args.clone(),
                viewport: Some(Viewport::default()),
            })),
        }
    }

    pub fn mode(&self) -> BrowserMode {
        match self {
            BrowserPlan::Launch(_) => BrowserMode::Launch,
            BrowserPlan::Connect(_) => BrowserMode::Connect,
        }
    }
}

/// Adapter that bridges browser plans to an actual browser.
///
/// Page ids are opaque strings owned by the runtime. Methods with
/// default bodies are optional capabilities.
#[async_trait]
pub trait BrowserRuntime: Send + Sync {
    async fn launch(&self, plan: &LaunchPlan) -> Result<(), BrowserRuntimeError>;

    async fn connect(&self, plan: &ConnectPlan) -> Result<(), BrowserRuntimeError>;

    /// Opens a tab on `url` and returns its page id.
    async fn new_page(&self, url: &str) -> Result<String, BrowserRuntimeError>;

    async fn navigate(&self, page_id: &str, url: &str) -> Result<(), BrowserRuntimeError>;

    /// Evaluates a JavaScript expression on the page and returns its
    /// JSON value.
    async fn evaluate(
        &self,
        page_id: &str,
        expression: &str,
    ) -> Result<JsonValue, BrowserRuntimeError>;

    async fn page_url(&self, _page_id: &str) -> Result<Option<String>, BrowserRuntimeError> {
        Ok(None)
    }

    async fn page_title(&self, _page_id: &str) -> Result<Option<String>, BrowserRuntimeError> {
        Ok(None)
    }

    /// Ids of every page the runtime currently knows about.
    async fn list_pages(&self) -> Result<Vec<String>, BrowserRuntimeError> {
        Ok(Vec::new())
    }

    async fn close_page(&self, _page_id: &str) -> Result<(), BrowserRuntimeError> {
        Err(BrowserRuntimeError::Unsupported(
            "page closing not supported".to_string(),
        ))
    }

    async fn shutdown(&self) -> Result<(), BrowserRuntimeError> {
        Ok(())
    }
}

#[async_trait]
impl<T> BrowserRuntime for Arc<T>
where
    T: BrowserRuntime + ?Sized,
{
    async fn launch(&self, plan: &LaunchPlan) -> Result<(), BrowserRuntimeError> {
        (**self).launch(plan).await
    }

    async fn connect(&self, plan: &ConnectPlan) -> Result<(), BrowserRuntimeError> {
        (**self).connect(plan).await
    }

    async fn new_page(&self, url: &str) -> Result<String, BrowserRuntimeError> {
        (**self).new_page(url).await
    }

    async fn navigate(&self, page_id: &str, url: &str) -> Result<(), BrowserRuntimeError> {
        (**self).navigate(page_id, url).await
    }

    async fn evaluate(
        &self,
        page_id: &str,
        expression: &str,
    ) -> Result<JsonValue, BrowserRuntimeError> {
        (**self).evaluate(page_id, expression).await
    }

    async fn page_url(&self, page_id: &str) -> Result<Option<String>, BrowserRuntimeError> {
        (**self).page_url(page_id).await
    }

    async fn page_title(&self, page_id: &str) -> Result<Option<String>, BrowserRuntimeError> {
        (**self).page_title(page_id).await
    }

    async fn list_pages(&self) -> Result<Vec<String>, BrowserRuntimeError> {
        (**self).list_pages().await
    }

    async fn close_page(&self, page_id: &str) -> Result<(), BrowserRuntimeError> {
        (**self).close_page(page_id).await
    }

    async fn shutdown(&self) -> Result<(), BrowserRuntimeError> {
        (**self).shutdown().await
    }
}

/// High-level browser client that owns planning and runtime dispatch.
pub struct ChorusBrowser<R: BrowserRuntime> {
    plan: BrowserPlan,
    runtime: R,
}

impl<R: BrowserRuntime> ChorusBrowser<R> {
    pub fn new(config: &ChorusConfig, runtime: R) -> Result<Self, BrowserError> {
        let plan = BrowserPlan::from_config(config)?;
        Ok(Self { plan, runtime })
    }

    pub fn plan(&self) -> &BrowserPlan {
        &self.plan
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// Brings the browser session up according to the plan.
    pub async fn execute(&self) -> Result<(), BrowserRuntimeError> {
        match &self.plan {
            BrowserPlan::Launch(plan) => self.runtime.launch(plan).await,
            BrowserPlan::Connect(plan) => self.runtime.connect(plan).await,
        }
    }

    pub async fn shutdown(&self) -> Result<(), BrowserRuntimeError> {
        self.runtime.shutdown().await
    }
}

impl<R: BrowserRuntime> fmt::Debug for ChorusBrowser<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChorusBrowser")
            .field("plan", &self.plan)
            .finish()
    }
}
