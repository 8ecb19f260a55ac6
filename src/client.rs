//! High-level client that orchestrates the per-service chat tabs.
//!
//! The client owns the browser session, the session registry, and the
//! operation metrics. Operations are service-scoped: callers name a
//! [`Service`], the client resolves its registered tab and drives the
//! matching adapter. Per-service failures degrade to reported results
//! wherever the operation allows it, so one wedged site does not stop a
//! broadcast to the rest.

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::adapter;
use crate::browser::{BrowserError, BrowserRuntime, BrowserRuntimeError, ChorusBrowser};
use crate::config::ChorusConfig;
use crate::context::{SessionError, SessionRegistry};
use crate::errors::AutomationError;
use crate::export;
use crate::logging::{self, ChorusLogger, LogConfig};
use crate::metrics::{self, ChorusMetrics, Disposition, OperationKind};
use crate::page::ChatPage;
use crate::service::{Service, detect_service};
use crate::types::{ConnectionStatus, ConversationSnapshot, ResponseWait, SendResult};

/// Orchestrates the browser session and the service adapters.
pub struct ChorusClient<R: BrowserRuntime> {
    config: ChorusConfig,
    browser: ChorusBrowser<R>,
    logger: ChorusLogger,
    registry: Mutex<SessionRegistry>,
    metrics: Mutex<ChorusMetrics>,
    started: Mutex<bool>,
}

impl<R: BrowserRuntime> std::fmt::Debug for ChorusClient<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sessions = self
            .registry
            .lock()
            .map(|registry| registry.registered().len())
            .unwrap_or(0);
        f.debug_struct("ChorusClient")
            .field("plan", self.browser.plan())
            .field("open_sessions", &sessions)
            .finish()
    }
}

/// Errors surfaced by [`ChorusClient`].
#[derive(Debug, Error)]
pub enum ChorusClientError {
    #[error(transparent)]
    Runtime(#[from] BrowserRuntimeError),
    #[error(transparent)]
    Automation(#[from] AutomationError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("{service} automation is not enabled")]
    ServiceDisabled { service: Service },
    #[error("writing {path} failed: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("internal lock poisoned")]
    Poisoned,
}

/// Connection report for one registered service tab.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub service: Service,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ConnectionStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A rendered export plus the summary it was derived from, ready to be
/// written to disk.
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub service: Service,
    pub file_name: String,
    pub markdown: String,
    pub snapshot: ConversationSnapshot,
}

fn build_logger(config: &ChorusConfig) -> ChorusLogger {
    let mut log_config = LogConfig::new(config.verbose);
    log_config.use_rich = config.use_rich_logging;
    if let Some(callback) = &config.logger {
        log_config.external_logger =
            Some(logging::callback_from_string_logger(callback.clone()));
    }
    ChorusLogger::with_config(log_config)
}

impl<R: BrowserRuntime> ChorusClient<R> {
    pub fn new(config: ChorusConfig, runtime: R) -> Result<Self, BrowserError> {
        let logger = build_logger(&config);
        let browser = ChorusBrowser::new(&config, runtime)?;
        Ok(Self {
            config,
            browser,
            logger,
            registry: Mutex::new(SessionRegistry::new()),
            metrics: Mutex::new(ChorusMetrics::default()),
            started: Mutex::new(false),
        })
    }

    pub fn browser(&self) -> &ChorusBrowser<R> {
        &self.browser
    }

    pub fn config(&self) -> &ChorusConfig {
        &self.config
    }

    pub fn logger(&self) -> &ChorusLogger {
        &self.logger
    }

    /// Copy of the operation counters accumulated so far.
    pub fn metrics(&self) -> ChorusMetrics {
        self.metrics
            .lock()
            .map(|metrics| metrics.clone())
            .unwrap_or_default()
    }

    /// Services with an open tab, in canonical order.
    pub fn registered_services(&self) -> Vec<Service> {
        self.registry
            .lock()
            .map(|registry| registry.registered())
            .unwrap_or_default()
    }

    /// Deadline policy for collecting from a service, honoring the
    /// configured override.
    pub fn response_wait(&self, service: Service) -> ResponseWait {
        match self.config.response_timeout_ms {
            Some(ms) => ResponseWait::Window(Duration::from_millis(ms)),
            None => ResponseWait::for_service(service),
        }
    }

    fn lock_registry(&self) -> Result<MutexGuard<'_, SessionRegistry>, ChorusClientError> {
        self.registry.lock().map_err(|_| ChorusClientError::Poisoned)
    }

    fn ensure_enabled(&self, service: Service) -> Result<(), ChorusClientError> {
        if self.config.active_services().contains(&service) {
            Ok(())
        } else {
            Err(ChorusClientError::ServiceDisabled { service })
        }
    }

    fn record_metric(&self, operation: OperationKind, disposition: Disposition, started: Instant) {
        if let Ok(mut guard) = self.metrics.lock() {
            guard.record(operation, disposition, metrics::elapsed_ms(started));
        }
    }

    /// Bring the browser session up according to the plan. Later calls
    /// are no-ops.
    pub async fn init(&self) -> Result<(), ChorusClientError> {
        {
            let started = self.started.lock().map_err(|_| ChorusClientError::Poisoned)?;
            if *started {
                return Ok(());
            }
        }

        self.browser.execute().await?;

        let mut started = self.started.lock().map_err(|_| ChorusClientError::Poisoned)?;
        *started = true;
        Ok(())
    }

    /// Open a fresh tab on the service's home page, register it, and
    /// install the probe helpers.
    pub async fn open_session(&self, service: Service) -> Result<(), ChorusClientError> {
        self.ensure_enabled(service)?;
        self.init().await?;

        let page_id = self.browser.runtime().new_page(service.home_url()).await?;
        {
            let mut registry = self.lock_registry()?;
            registry.register(service, page_id.clone());
            registry.record_url(service, service.home_url())?;
        }

        let page = ChatPage::new(self, page_id.as_str(), service);
        page.ensure_helpers().await?;
        self.lock_registry()?.mark_helpers_installed(service)?;

        self.logger.info(
            format!("opened {} tab", service.label()),
            Some(service.as_str()),
            None,
        );
        Ok(())
    }

    /// Scan the runtime's open tabs and register every enabled service
    /// found among them. Returns the services adopted by this call.
    ///
    /// Adoption is best-effort: a tab that refuses the helper install is
    /// logged and released rather than failing the scan.
    pub async fn adopt_pages(&self) -> Result<Vec<Service>, ChorusClientError> {
        self.init().await?;
        let active = self.config.active_services();
        let mut adopted = Vec::new();

        for page_id in self.browser.runtime().list_pages().await? {
            let Some(url) = self.browser.runtime().page_url(&page_id).await? else {
                continue;
            };
            let title = self.browser.runtime().page_title(&page_id).await?;
            let Some(service) = detect_service(&url, title.as_deref()) else {
                continue;
            };
            if !active.contains(&service) {
                self.logger.debug(
                    format!("ignoring {} tab, service not enabled", service.label()),
                    Some(service.as_str()),
                    None,
                );
                continue;
            }
            let taken = {
                let registry = self.lock_registry()?;
                registry.session(service).is_some()
            };
            if taken {
                continue;
            }

            {
                let mut registry = self.lock_registry()?;
                registry.register(service, page_id.clone());
                registry.record_url(service, url.clone())?;
            }
            let page = ChatPage::new(self, page_id.as_str(), service);
            if let Err(error) = page.ensure_helpers().await {
                self.logger.error(
                    format!("helper install failed during adoption: {error}"),
                    Some(service.as_str()),
                    None,
                );
                self.lock_registry()?.remove(service);
                continue;
            }
            self.lock_registry()?.mark_helpers_installed(service)?;

            self.logger.info(
                format!("adopted existing {} tab", service.label()),
                Some(service.as_str()),
                Some(json!({ "url": url })),
            );
            adopted.push(service);
        }

        Ok(adopted)
    }

    /// Page wrapper for a service's registered tab.
    pub fn page(&self, service: Service) -> Result<ChatPage<'_, R>, ChorusClientError> {
        let registry = self.lock_registry()?;
        let session = registry
            .session(service)
            .ok_or(SessionError::NotRegistered(service))?;
        Ok(ChatPage::new(self, session.page_id().as_str(), service))
    }

    async fn ensure_session(&self, service: Service) -> Result<ChatPage<'_, R>, ChorusClientError> {
        let missing = {
            let registry = self.lock_registry()?;
            registry.session(service).is_none()
        };
        if missing {
            self.open_session(service).await?;
        }
        self.page(service)
    }

    /// Probe every registered tab and report where each service stands.
    ///
    /// A probe failure becomes part of the report instead of an error;
    /// status checks never take the client down.
    pub async fn check_connections(&self) -> Result<Vec<ServiceStatus>, ChorusClientError> {
        let services = { self.lock_registry()?.registered() };
        let mut report = Vec::with_capacity(services.len());

        for service in services {
            let page = self.page(service)?;
            let adapter = adapter::adapter_for::<R>(service);
            let url = page.current_url().await.ok().flatten();
            match adapter.check_connection(&page).await {
                Ok(status) => {
                    if let Some(url) = &url {
                        let _ = self.lock_registry()?.record_url(service, url.clone());
                    }
                    self.logger.debug(
                        format!("connection status: {}", status.label()),
                        Some(service.as_str()),
                        None,
                    );
                    report.push(ServiceStatus {
                        service,
                        status: Some(status),
                        error: None,
                        url,
                    });
                }
                Err(error) => {
                    self.logger.error(
                        format!("connection check failed: {error}"),
                        Some(service.as_str()),
                        None,
                    );
                    report.push(ServiceStatus {
                        service,
                        status: None,
                        error: Some(error.to_string()),
                        url,
                    });
                }
            }
        }
        Ok(report)
    }

    /// Send a message to one service, opening its tab first if needed.
    ///
    /// Overlapping sends to the same tab are refused with a failed
    /// result; the page cannot compose two messages at once.
    pub async fn send(
        &self,
        service: Service,
        message: &str,
    ) -> Result<SendResult, ChorusClientError> {
        let page = self.ensure_session(service).await?;
        let flag = {
            let registry = self.lock_registry()?;
            registry
                .session(service)
                .ok_or(SessionError::NotRegistered(service))?
                .send_flag()
        };
        if flag
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.logger.debug(
                "refusing overlapping send",
                Some(service.as_str()),
                None,
            );
            return Ok(SendResult::failed(format!(
                "a send to {} is already in flight",
                service.label()
            )));
        }

        let started = metrics::start_operation_timer();
        let adapter = adapter::adapter_for::<R>(service);
        let result = adapter.send_message(&page, message).await;
        flag.store(false, Ordering::SeqCst);

        {
            let mut registry = self.lock_registry()?;
            registry.set_active(service)?;
        }

        let disposition = if !result.success {
            Disposition::Failure
        } else if result.warning.is_some() {
            Disposition::Warning
        } else {
            Disposition::Success
        };
        self.record_metric(OperationKind::Send, disposition, started);

        if let Some(error) = &result.error {
            self.logger
                .error(format!("send failed: {error}"), Some(service.as_str()), None);
        }
        Ok(result)
    }

    /// Send the same message to every enabled service, in canonical
    /// order, pausing between consecutive sends.
    ///
    /// Hard per-service errors are folded into that service's result so
    /// the remaining services still receive the message.
    pub async fn broadcast(
        &self,
        message: &str,
    ) -> Result<Vec<(Service, SendResult)>, ChorusClientError> {
        let services = self.config.active_services();
        let delay = Duration::from_millis(self.config.send_delay_ms);
        let mut outcomes = Vec::with_capacity(services.len());

        for (index, service) in services.into_iter().enumerate() {
            if index > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let result = match self.send(service, message).await {
                Ok(result) => result,
                Err(error) => {
                    self.logger.error(
                        format!("broadcast leg failed: {error}"),
                        Some(service.as_str()),
                        None,
                    );
                    SendResult::failed(error.to_string())
                }
            };
            outcomes.push((service, result));
        }
        Ok(outcomes)
    }

    /// Collect the newest assistant reply from a service.
    pub async fn collect(
        &self,
        service: Service,
        wait: ResponseWait,
    ) -> Result<String, ChorusClientError> {
        let page = self.page(service)?;
        let adapter = adapter::adapter_for::<R>(service);

        let started = metrics::start_operation_timer();
        let result = adapter.latest_response(&page, wait).await;
        let disposition = if result.is_ok() {
            Disposition::Success
        } else {
            Disposition::Failure
        };
        self.record_metric(OperationKind::Collect, disposition, started);

        let text = result?;
        self.logger.info(
            format!("collected {} characters", text.chars().count()),
            Some(service.as_str()),
            None,
        );
        Ok(text)
    }

    /// Point-in-time conversation summary for a service tab.
    pub async fn snapshot(
        &self,
        service: Service,
    ) -> Result<ConversationSnapshot, ChorusClientError> {
        let page = self.page(service)?;
        let adapter = adapter::adapter_for::<R>(service);
        Ok(adapter.conversation_snapshot(&page).await?)
    }

    /// Gather and render a service's conversation as markdown, without
    /// touching the filesystem.
    pub async fn export(&self, service: Service) -> Result<ExportOutcome, ChorusClientError> {
        let page = self.page(service)?;
        let adapter = adapter::adapter_for::<R>(service);

        let started = metrics::start_operation_timer();
        let (conversation, method) = match adapter.gather_conversation(&page).await {
            Ok(pair) => pair,
            Err(error) => {
                self.record_metric(OperationKind::Export, Disposition::Failure, started);
                return Err(error.into());
            }
        };

        let markdown = export::render_document(&conversation, &self.config.export);
        let file_name = export::file_name(&conversation, &self.config.export);
        let snapshot = conversation.snapshot(method);
        self.record_metric(OperationKind::Export, Disposition::Success, started);

        self.logger.info(
            format!(
                "export ready: {} messages via {}",
                snapshot.total_messages, snapshot.detection_method
            ),
            Some(service.as_str()),
            None,
        );
        Ok(ExportOutcome {
            service,
            file_name,
            markdown,
            snapshot,
        })
    }

    /// Write a rendered export into `directory`, creating it if needed.
    pub async fn write_export(
        &self,
        outcome: &ExportOutcome,
        directory: &Path,
    ) -> Result<PathBuf, ChorusClientError> {
        tokio::fs::create_dir_all(directory)
            .await
            .map_err(|source| ChorusClientError::Io {
                path: directory.display().to_string(),
                source,
            })?;
        let path = directory.join(&outcome.file_name);
        tokio::fs::write(&path, &outcome.markdown)
            .await
            .map_err(|source| ChorusClientError::Io {
                path: path.display().to_string(),
                source,
            })?;

        self.logger.info(
            format!("wrote {}", path.display()),
            Some(outcome.service.as_str()),
            None,
        );
        Ok(path)
    }

    pub async fn shutdown(&self) -> Result<(), ChorusClientError> {
        self.browser.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{Value as JsonValue, json};

    use super::*;
    use crate::browser::{ConnectPlan, LaunchPlan};
    use crate::config::Verbosity;
    use crate::testutil::{ScriptedRuntime, test_client};
    use crate::types::DetectionMethod;

    #[tokio::test]
    async fn open_session_registers_the_home_tab() {
        let client = test_client(ScriptedRuntime::new());

        client.open_session(Service::Claude).await.expect("open");

        assert_eq!(client.registered_services(), vec![Service::Claude]);
        let runtime = client.browser().runtime();
        assert_eq!(runtime.eval_count("new_page https://claude.ai"), 1);
    }

    #[tokio::test]
    async fn disabled_services_are_refused() {
        let config = ChorusConfig {
            verbose: Verbosity::Minimal,
            enabled_services: Some(vec![Service::ChatGpt]),
            ..ChorusConfig::default()
        };
        let client = ChorusClient::new(config, ScriptedRuntime::new()).expect("client");

        let err = client
            .open_session(Service::Claude)
            .await
            .expect_err("claude is not enabled");

        assert!(matches!(
            err,
            ChorusClientError::ServiceDisabled {
                service: Service::Claude
            }
        ));
    }

    #[tokio::test]
    async fn overlapping_sends_are_refused_without_touching_the_page() {
        let client = test_client(ScriptedRuntime::new());
        client.open_session(Service::Claude).await.expect("open");

        let flag = client
            .registry
            .lock()
            .unwrap()
            .session(Service::Claude)
            .unwrap()
            .send_flag();
        flag.store(true, Ordering::SeqCst);

        let result = client
            .send(Service::Claude, "second message")
            .await
            .expect("send returns a result");

        assert!(!result.success);
        assert!(result.error.unwrap().contains("already in flight"));
        assert_eq!(client.metrics().send_attempts, 0);
        assert!(flag.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn broadcast_covers_enabled_services_in_canonical_order() {
        let client = test_client(ScriptedRuntime::new());

        let outcomes = client.broadcast("compare rust and go").await.expect("broadcast");

        // No selector resolves on a blank scripted page, so every leg
        // fails at the locator, but every enabled service was tried.
        assert_eq!(outcomes.len(), 4);
        assert!(outcomes.iter().all(|(_, result)| !result.success));

        let opened: Vec<String> = client
            .browser()
            .runtime()
            .evaluated()
            .into_iter()
            .filter(|entry| entry.starts_with("new_page "))
            .collect();
        assert_eq!(
            opened,
            vec![
                "new_page https://chatgpt.com".to_string(),
                "new_page https://claude.ai".to_string(),
                "new_page https://gemini.google.com".to_string(),
                "new_page https://www.perplexity.ai".to_string(),
            ]
        );

        let metrics = client.metrics();
        assert_eq!(metrics.send_attempts, 4);
        assert_eq!(metrics.total_failures(), 4);
    }

    #[tokio::test]
    async fn collect_reads_the_newest_reply_and_counts_the_operation() {
        let runtime = ScriptedRuntime::new()
            .respond(
                "query(\"div.font-claude-message",
                json!({
                    "count": 1,
                    "items": [{"index": 0, "tag": "div", "text": "Ownership ties every value to one owner."}]
                }),
            )
            .respond(
                "snapshot(\"div.font-claude-message",
                json!({
                    "tag": "div",
                    "attrs": {"class": "font-claude-message"},
                    "children": [{"tag": "p", "children": [{"text": "Ownership ties every value to one owner."}]}]
                }),
            );
        let client = test_client(runtime);
        client.open_session(Service::Claude).await.expect("open");

        let text = client
            .collect(Service::Claude, ResponseWait::Immediate)
            .await
            .expect("collect");

        assert_eq!(text, "Ownership ties every value to one owner.");
        let metrics = client.metrics();
        assert_eq!(metrics.collect_attempts, 1);
        assert_eq!(metrics.collect_successes, 1);
    }

    #[tokio::test]
    async fn export_renders_writes_and_records() {
        let runtime = ScriptedRuntime::new()
            .with_url("https://claude.ai/chat/abc")
            .respond(
                "snapshotAll(\"div[data-test-render-count]",
                json!([
                    {"tag": "div", "attrs": {"data-test-render-count": "1"},
                     "children": [{"tag": "div", "attrs": {"data-testid": "user-message"},
                                   "children": [{"text": "What is ownership?"}]}]},
                    {"tag": "div", "attrs": {"data-test-render-count": "2"},
                     "children": [{"tag": "div", "attrs": {"class": "font-claude-message"},
                                   "children": [{"tag": "p", "children": [{"text": "Ownership ties every value to a single owner."}]}]}]}
                ]),
            );
        let client = test_client(runtime);
        client.open_session(Service::Claude).await.expect("open");

        let outcome = client.export(Service::Claude).await.expect("export");

        assert_eq!(outcome.snapshot.detection_method, DetectionMethod::RenderCount);
        assert_eq!(outcome.snapshot.user_messages, 1);
        assert_eq!(outcome.snapshot.assistant_messages, 1);
        assert!(outcome.file_name.starts_with("claude_"));
        assert!(outcome.file_name.ends_with(".md"));
        assert!(outcome.markdown.contains("What is ownership?"));

        let dir = tempfile::tempdir().expect("tempdir");
        let path = client
            .write_export(&outcome, dir.path())
            .await
            .expect("write");
        let written = tokio::fs::read_to_string(&path).await.expect("read back");
        assert!(written.starts_with("# Claude Conversation"));
        assert!(written.contains("*URL: https://claude.ai/chat/abc*"));

        assert_eq!(client.metrics().export_successes, 1);
    }

    struct TabbedRuntime {
        inner: ScriptedRuntime,
        tabs: Vec<(&'static str, &'static str, Option<&'static str>)>,
    }

    #[async_trait]
    impl BrowserRuntime for TabbedRuntime {
        async fn launch(&self, plan: &LaunchPlan) -> Result<(), BrowserRuntimeError> {
            self.inner.launch(plan).await
        }

        async fn connect(&self, plan: &ConnectPlan) -> Result<(), BrowserRuntimeError> {
            self.inner.connect(plan).await
        }

        async fn new_page(&self, url: &str) -> Result<String, BrowserRuntimeError> {
            self.inner.new_page(url).await
        }

        async fn navigate(&self, page_id: &str, url: &str) -> Result<(), BrowserRuntimeError> {
            self.inner.navigate(page_id, url).await
        }

        async fn evaluate(
            &self,
            page_id: &str,
            expression: &str,
        ) -> Result<JsonValue, BrowserRuntimeError> {
            self.inner.evaluate(page_id, expression).await
        }

        async fn list_pages(&self) -> Result<Vec<String>, BrowserRuntimeError> {
            Ok(self.tabs.iter().map(|(id, _, _)| id.to_string()).collect())
        }

        async fn page_url(&self, page_id: &str) -> Result<Option<String>, BrowserRuntimeError> {
            Ok(self
                .tabs
                .iter()
                .find(|(id, _, _)| *id == page_id)
                .map(|(_, url, _)| url.to_string()))
        }

        async fn page_title(&self, page_id: &str) -> Result<Option<String>, BrowserRuntimeError> {
            Ok(self
                .tabs
                .iter()
                .find(|(id, _, _)| *id == page_id)
                .and_then(|(_, _, title)| title.map(str::to_string)))
        }
    }

    #[tokio::test]
    async fn adopt_pages_claims_only_enabled_recognized_tabs() {
        let runtime = TabbedRuntime {
            inner: ScriptedRuntime::new(),
            tabs: vec![
                ("tab-1", "https://claude.ai/chat/abc", Some("Claude")),
                ("tab-2", "https://example.com/article", None),
                ("tab-3", "https://grok.com/chat/x", Some("Grok")),
            ],
        };
        let config = ChorusConfig {
            verbose: Verbosity::Minimal,
            ..ChorusConfig::default()
        };
        let client = ChorusClient::new(config, runtime).expect("client");

        let adopted = client.adopt_pages().await.expect("adopt");

        assert_eq!(adopted, vec![Service::Claude]);
        assert_eq!(client.registered_services(), vec![Service::Claude]);
    }
}
