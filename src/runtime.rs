//! Chromiumoxide-based browser runtime.
//!
//! Implements [`BrowserRuntime`](crate::browser::BrowserRuntime) on top
//! of the `chromiumoxide` crate. The runtime either launches a local
//! Chrome or attaches to a running one over its DevTools websocket, and
//! tracks open tabs by CDP target id so higher level components can
//! drive real page interactions.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::{
    browser::{Browser, BrowserConfig},
    page::Page as ChromiumPage,
};
use futures_util::StreamExt;
use serde_json::Value as JsonValue;
use tokio::{sync::Mutex, task::JoinHandle};

use crate::browser::{BrowserRuntime, BrowserRuntimeError, ConnectPlan, LaunchPlan};

pub struct ChromiumoxideRuntime {
    state: Arc<Mutex<Option<RuntimeState>>>,
}

struct RuntimeState {
    browser: Arc<Browser>,
    _handler: JoinHandle<()>,
    pages: HashMap<String, ChromiumPage>,
}

impl ChromiumoxideRuntime {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(None)),
        }
    }

    async fn current_browser(&self) -> Result<Arc<Browser>, BrowserRuntimeError> {
        let guard = self.state.lock().await;
        guard
            .as_ref()
            .map(|state| state.browser.clone())
            .ok_or(BrowserRuntimeError::NotInitialized)
    }

    async fn ensure_browser_alive(&self) -> Result<(), BrowserRuntimeError> {
        let browser = self.current_browser().await?;
        browser
            .version()
            .await
            .map(|_| ())
            .map_err(map_chromiumoxide_error)
    }

    /// Looks up a tracked page, refreshing the tab list once when the
    /// id is unknown. Attached browsers gain and lose tabs outside our
    /// control, so a miss is not immediately fatal.
    pub async fn page(&self, page_id: &str) -> Result<ChromiumPage, BrowserRuntimeError> {
        {
            let guard = self.state.lock().await;
            let state = guard.as_ref().ok_or(BrowserRuntimeError::NotInitialized)?;
            if let Some(page) = state.pages.get(page_id) {
                return Ok(page.clone());
            }
        }

        self.refresh_pages().await?;

        let guard = self.state.lock().await;
        let state = guard.as_ref().ok_or(BrowserRuntimeError::NotInitialized)?;
        state
            .pages
            .get(page_id)
            .cloned()
            .ok_or_else(|| BrowserRuntimeError::PageNotFound(page_id.to_string()))
    }

    /// Reconciles the tracked page map with the browser's live tab set.
    async fn refresh_pages(&self) -> Result<(), BrowserRuntimeError> {
        let browser = self.current_browser().await?;
        let pages = browser.pages().await.map_err(map_chromiumoxide_error)?;

        let mut guard = self.state.lock().await;
        if let Some(state) = guard.as_mut() {
            let live: HashSet<String> = pages
                .iter()
                .map(|page| page.target_id().as_ref().to_string())
                .collect();
            state.pages.retain(|id, _| live.contains(id));
            for page in pages {
                let id = page.target_id().as_ref().to_string();
                state.pages.entry(id).or_insert(page);
            }
        }

        Ok(())
    }

    async fn install_state(&self, browser: Browser, handler: chromiumoxide::handler::Handler) {
        let new_state = RuntimeState {
            browser: Arc::new(browser),
            _handler: spawn_handler(handler),
            pages: HashMap::new(),
        };

        let old_state = {
            let mut guard = self.state.lock().await;
            guard.replace(new_state)
        };

        if let Some(state) = old_state {
            cleanup_state(state);
        }
    }
}

impl Default for ChromiumoxideRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserRuntime for ChromiumoxideRuntime {
    async fn launch(&self, plan: &LaunchPlan) -> Result<(), BrowserRuntimeError> {
        if self.state.lock().await.is_some() {
            return Ok(());
        }

        let config = build_config(plan)?;
        let (browser, handler) = Browser::launch(config)
            .await
            .map_err(map_chromiumoxide_error)?;

        self.install_state(browser, handler).await;
        self.refresh_pages().await?;
        Ok(())
    }

    async fn connect(&self, plan: &ConnectPlan) -> Result<(), BrowserRuntimeError> {
        if self.state.lock().await.is_some() {
            return Ok(());
        }

        let (browser, handler) = Browser::connect(&plan.websocket_url)
            .await
            .map_err(map_chromiumoxide_error)?;

        self.install_state(browser, handler).await;
        self.refresh_pages().await?;
        Ok(())
    }

    async fn new_page(&self, url: &str) -> Result<String, BrowserRuntimeError> {
        self.ensure_browser_alive().await?;
        let browser = self.current_browser().await?;

        let page = browser
            .new_page(url)
            .await
            .map_err(map_chromiumoxide_error)?;
        let page_id = page.target_id().as_ref().to_string();

        let mut guard = self.state.lock().await;
        if let Some(state) = guard.as_mut() {
            state.pages.insert(page_id.clone(), page);
        }

        Ok(page_id)
    }

    async fn navigate(&self, page_id: &str, url: &str) -> Result<(), BrowserRuntimeError> {
        let page = self.page(page_id).await?;
        page.goto(url).await.map_err(map_chromiumoxide_error)?;
        Ok(())
    }

    async fn evaluate(
        &self,
        page_id: &str,
        expression: &str,
    ) -> Result<JsonValue, BrowserRuntimeError> {
        let page = self.page(page_id).await?;
        let result = page
            .evaluate(expression)
            .await
            .map_err(map_chromiumoxide_error)?;
        Ok(result.value().cloned().unwrap_or(JsonValue::Null))
    }

    async fn page_url(&self, page_id: &str) -> Result<Option<String>, BrowserRuntimeError> {
        let page = self.page(page_id).await?;
        page.url().await.map_err(map_chromiumoxide_error)
    }

    async fn page_title(&self, page_id: &str) -> Result<Option<String>, BrowserRuntimeError> {
        let page = self.page(page_id).await?;
        page.get_title().await.map_err(map_chromiumoxide_error)
    }

    async fn list_pages(&self) -> Result<Vec<String>, BrowserRuntimeError> {
        self.ensure_browser_alive().await?;
        self.refresh_pages().await?;
        let guard = self.state.lock().await;
        let state = guard.as_ref().ok_or(BrowserRuntimeError::NotInitialized)?;
        Ok(state.pages.keys().cloned().collect())
    }

    async fn close_page(&self, page_id: &str) -> Result<(), BrowserRuntimeError> {
        let page = {
            let mut guard = self.state.lock().await;
            let state = guard.as_mut().ok_or(BrowserRuntimeError::NotInitialized)?;
            state
                .pages
                .remove(page_id)
                .ok_or_else(|| BrowserRuntimeError::PageNotFound(page_id.to_string()))?
        };

        page.close().await.map_err(map_chromiumoxide_error)
    }

    async fn shutdown(&self) -> Result<(), BrowserRuntimeError> {
        let state = {
            let mut guard = self.state.lock().await;
            guard.take()
        };

        if let Some(state) = state {
            cleanup_state(state);
        }

        Ok(())
    }
}

fn build_config(plan: &LaunchPlan) -> Result<BrowserConfig, BrowserRuntimeError> {
    let mut builder = BrowserConfig::builder();

    if let Some(path) = &plan.chrome_executable {
        builder = builder.chrome_executable(path);
    }

    if let Some(viewport) = plan.viewport {
        builder = builder.viewport(chromiumoxide::handler::viewport::Viewport {
            width: viewport.width,
            height: viewport.height,
            device_scale_factor: None,
            emulating_mobile: false,
            is_landscape: viewport.width >= viewport.height,
            has_touch: false,
        });
    }

    let builder = builder.args(plan.args.clone());

    let builder = if plan.headless {
        builder
    } else {
        builder.with_head()
    };

    let builder = match &plan.user_data_dir {
        Some(dir) => builder.user_data_dir(dir),
        None => builder,
    };

    builder.build().map_err(BrowserRuntimeError::Message)
}

fn map_chromiumoxide_error<E: std::fmt::Display>(err: E) -> BrowserRuntimeError {
    BrowserRuntimeError::Message(err.to_string())
}

fn spawn_handler(mut handler: chromiumoxide::handler::Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(result) = handler.next().await {
            if let Err(err) = result {
                eprintln!("chromiumoxide handler error: {err}");
            }
        }
    })
}

fn cleanup_state(mut state: RuntimeState) {
    state._handler.abort();
    state.pages.clear();
}
