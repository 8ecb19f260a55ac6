//! Per-service session bookkeeping.
//!
//! The registry records which browser tab hosts which chat service, whether
//! the in-page probe helpers have been installed there, and which service the
//! operator touched last. It is plain synchronous state; everything that
//! talks to the browser lives in [`crate::page::ChatPage`] and the adapters.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

use crate::service::Service;

pub type PageId = String;

/// Errors surfaced by [`SessionRegistry`].
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no open session for {0}")]
    NotRegistered(Service),
}

/// Bookkeeping for a single service tab.
#[derive(Debug, Clone)]
pub struct ServiceSession {
    service: Service,
    page_id: PageId,
    url: Option<String>,
    helpers_installed: bool,
    send_in_flight: Arc<AtomicBool>,
}

impl ServiceSession {
    fn new(service: Service, page_id: PageId) -> Self {
        Self {
            service,
            page_id,
            url: None,
            helpers_installed: false,
            send_in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn service(&self) -> Service {
        self.service
    }

    /// Runtime identifier of the tab hosting this service.
    pub fn page_id(&self) -> &PageId {
        &self.page_id
    }

    /// Last URL observed for the tab, if any probe recorded one.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Whether the probe helpers were installed since the last hard navigation.
    pub fn helpers_installed(&self) -> bool {
        self.helpers_installed
    }

    /// Shared flag guarding against overlapping sends to the same tab.
    ///
    /// The holder flips it with `compare_exchange` before dispatching a
    /// message and resets it when the send settles.
    pub fn send_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.send_in_flight)
    }

    /// Convenience read of the in-flight marker.
    pub fn send_in_flight(&self) -> bool {
        self.send_in_flight.load(Ordering::SeqCst)
    }
}

/// Registry of open service tabs within one chorus session.
pub struct SessionRegistry {
    sessions: HashMap<Service, ServiceSession>,
    page_index: HashMap<PageId, Service>,
    active: Option<Service>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            page_index: HashMap::new(),
            active: None,
        }
    }

    /// Register a service as living in the given tab.
    ///
    /// Registration is idempotent. Re-registering the same service with a
    /// different page id remaps the tab and resets the per-document state,
    /// since a new tab starts with a fresh document.
    pub fn register(&mut self, service: Service, page_id: impl Into<PageId>) -> &ServiceSession {
        let page_id = page_id.into();
        let mut previous_page: Option<PageId> = None;

        let session = self
            .sessions
            .entry(service)
            .and_modify(|session| {
                if session.page_id != page_id {
                    previous_page =
                        Some(std::mem::replace(&mut session.page_id, page_id.clone()));
                    session.helpers_installed = false;
                    session.url = None;
                }
            })
            .or_insert_with(|| ServiceSession::new(service, page_id.clone()));

        if let Some(old) = previous_page {
            self.page_index.remove(&old);
        }
        self.page_index.insert(session.page_id.clone(), service);
        session
    }

    /// Retrieve the session for a service, if one is open.
    pub fn session(&self, service: Service) -> Option<&ServiceSession> {
        self.sessions.get(&service)
    }

    fn session_mut(&mut self, service: Service) -> Result<&mut ServiceSession, SessionError> {
        self.sessions
            .get_mut(&service)
            .ok_or(SessionError::NotRegistered(service))
    }

    /// Mark a service as the one the operator touched last.
    pub fn set_active(&mut self, service: Service) -> Result<(), SessionError> {
        if !self.sessions.contains_key(&service) {
            return Err(SessionError::NotRegistered(service));
        }
        self.active = Some(service);
        Ok(())
    }

    /// The most recently used session, if any.
    pub fn active(&self) -> Option<&ServiceSession> {
        self.active.and_then(|service| self.sessions.get(&service))
    }

    /// Reverse lookup from a tab to the service registered there.
    pub fn service_for_page(&self, page_id: &str) -> Option<Service> {
        self.page_index.get(page_id).copied()
    }

    /// Record the URL last observed for a service tab without touching
    /// helper state. Used after read-only probes.
    pub fn record_url(
        &mut self,
        service: Service,
        url: impl Into<String>,
    ) -> Result<(), SessionError> {
        let session = self.session_mut(service)?;
        session.url = Some(url.into());
        Ok(())
    }

    /// Record a navigation of a service tab.
    ///
    /// A hard navigation replaces the document and discards the injected
    /// helpers, so the installed marker is cleared alongside the new URL.
    pub fn mark_navigated(
        &mut self,
        service: Service,
        url: impl Into<String>,
    ) -> Result<(), SessionError> {
        let session = self.session_mut(service)?;
        session.url = Some(url.into());
        session.helpers_installed = false;
        Ok(())
    }

    /// Note that the probe helpers are installed in a service tab.
    pub fn mark_helpers_installed(&mut self, service: Service) -> Result<(), SessionError> {
        self.session_mut(service)?.helpers_installed = true;
        Ok(())
    }

    /// Drop a session and its index entries. Returns `true` if one existed.
    pub fn remove(&mut self, service: Service) -> bool {
        if let Some(session) = self.sessions.remove(&service) {
            self.page_index.remove(&session.page_id);
            if self.active == Some(service) {
                self.active = None;
            }
            true
        } else {
            false
        }
    }

    /// Registered services in canonical order, regardless of insertion order.
    pub fn registered(&self) -> Vec<Service> {
        Service::all()
            .into_iter()
            .filter(|service| self.sessions.contains_key(service))
            .collect()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("session_count", &self.sessions.len())
            .field("active", &self.active)
            .finish()
    }
}
