//! Scripted browser runtime for unit tests.
//!
//! Tests register substring-matched responses for the expressions a
//! code path is expected to evaluate, then assert on the recorded call
//! log. The longest matching needle wins so precise rules can coexist
//! with catch-alls; a rule's last response repeats once its queue runs
//! dry.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};

use crate::browser::{BrowserRuntime, BrowserRuntimeError, ConnectPlan, LaunchPlan};
use crate::client::ChorusClient;
use crate::config::ChorusConfig;
use crate::dom_scripts;

struct Rule {
    needle: String,
    responses: VecDeque<JsonValue>,
}

#[derive(Default)]
pub(crate) struct ScriptedRuntime {
    rules: Mutex<Vec<Rule>>,
    failures: Mutex<Vec<(String, String)>>,
    log: Mutex<Vec<String>>,
    next_page: Mutex<usize>,
    url: Mutex<Option<String>>,
    title: Mutex<Option<String>>,
}

impl ScriptedRuntime {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queues `response` for expressions containing `needle`.
    pub(crate) fn respond(self, needle: &str, response: JsonValue) -> Self {
        {
            let mut rules = self.rules.lock().expect("rules poisoned");
            if let Some(rule) = rules.iter_mut().find(|rule| rule.needle == needle) {
                rule.responses.push_back(response);
            } else {
                rules.push(Rule {
                    needle: needle.to_string(),
                    responses: VecDeque::from([response]),
                });
            }
        }
        self
    }

    pub(crate) fn respond_seq(mut self, needle: &str, responses: Vec<JsonValue>) -> Self {
        for response in responses {
            self = self.respond(needle, response);
        }
        self
    }

    /// Makes the next expression containing `needle` fail with a
    /// runtime error; consumed on first match.
    pub(crate) fn fail_once(self, needle: &str, message: &str) -> Self {
        self.failures
            .lock()
            .expect("failures poisoned")
            .push((needle.to_string(), message.to_string()));
        self
    }

    pub(crate) fn with_url(self, url: &str) -> Self {
        *self.url.lock().expect("url poisoned") = Some(url.to_string());
        self
    }

    pub(crate) fn with_title(self, title: &str) -> Self {
        *self.title.lock().expect("title poisoned") = Some(title.to_string());
        self
    }

    /// Every expression evaluated so far, in order.
    pub(crate) fn evaluated(&self) -> Vec<String> {
        self.log.lock().expect("log poisoned").clone()
    }

    pub(crate) fn eval_count(&self, needle: &str) -> usize {
        self.evaluated()
            .iter()
            .filter(|expr| expr.contains(needle))
            .count()
    }

    fn scripted_response(&self, expression: &str) -> Option<JsonValue> {
        let mut rules = self.rules.lock().expect("rules poisoned");
        let best = rules
            .iter_mut()
            .filter(|rule| expression.contains(&rule.needle))
            .max_by_key(|rule| rule.needle.len())?;
        if best.responses.len() > 1 {
            best.responses.pop_front()
        } else {
            best.responses.front().cloned()
        }
    }
}

#[async_trait]
impl BrowserRuntime for ScriptedRuntime {
    async fn launch(&self, _plan: &LaunchPlan) -> Result<(), BrowserRuntimeError> {
        Ok(())
    }

    async fn connect(&self, _plan: &ConnectPlan) -> Result<(), BrowserRuntimeError> {
        Ok(())
    }

    async fn new_page(&self, url: &str) -> Result<String, BrowserRuntimeError> {
        let mut next = self.next_page.lock().expect("page counter poisoned");
        let id = format!("page-{}", *next);
        *next += 1;
        self.log
            .lock()
            .expect("log poisoned")
            .push(format!("new_page {url}"));
        Ok(id)
    }

    async fn navigate(&self, _page_id: &str, url: &str) -> Result<(), BrowserRuntimeError> {
        self.log
            .lock()
            .expect("log poisoned")
            .push(format!("navigate {url}"));
        *self.url.lock().expect("url poisoned") = Some(url.to_string());
        Ok(())
    }

    async fn evaluate(
        &self,
        _page_id: &str,
        expression: &str,
    ) -> Result<JsonValue, BrowserRuntimeError> {
        self.log
            .lock()
            .expect("log poisoned")
            .push(expression.to_string());

        {
            let mut failures = self.failures.lock().expect("failures poisoned");
            if let Some(pos) = failures
                .iter()
                .position(|(needle, _)| expression.contains(needle))
            {
                let (_, message) = failures.remove(pos);
                return Err(BrowserRuntimeError::Message(message));
            }
        }

        if let Some(response) = self.scripted_response(expression) {
            return Ok(response);
        }
        if expression == dom_scripts::HELPERS_PRESENT {
            return Ok(json!(true));
        }
        Ok(JsonValue::Null)
    }

    async fn page_url(&self, _page_id: &str) -> Result<Option<String>, BrowserRuntimeError> {
        Ok(self.url.lock().expect("url poisoned").clone())
    }

    async fn page_title(&self, _page_id: &str) -> Result<Option<String>, BrowserRuntimeError> {
        Ok(self.title.lock().expect("title poisoned").clone())
    }
}

/// Client wired to a scripted runtime with logging kept quiet.
pub(crate) fn test_client(runtime: ScriptedRuntime) -> ChorusClient<ScriptedRuntime> {
    let config = ChorusConfig {
        verbose: crate::config::Verbosity::Minimal,
        ..ChorusConfig::default()
    };
    ChorusClient::new(config, runtime).expect("test client")
}
