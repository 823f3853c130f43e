use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use anyhow::Result;
use parking_lot::{Mutex, MutexGuard, RwLock};

use crate::catalog::{Catalog, CatalogItem};
use crate::feed::{self, AddressReporter, FeedSession, NoopReporter};
use crate::gate::GateState;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session {0} not found")]
    SessionNotFound(u64),
    #[error("item {0:?} not found in catalog")]
    ItemNotFound(String),
}

/// Shared handle to one session's feed, for hosts that signal from timers.
#[derive(Clone)]
pub struct FeedHandle {
    inner: Arc<Mutex<FeedSession>>,
}

impl FeedHandle {
    pub fn new(session: FeedSession) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, FeedSession> {
        self.inner.lock()
    }

    /// Non-owning reference bound to the feed's current epoch.
    pub fn downgrade(&self) -> WeakFeed {
        WeakFeed {
            inner: Arc::downgrade(&self.inner),
            epoch: self.inner.lock().epoch(),
        }
    }

    /// Callback for a dwell timer that marks `interstitial` viewed, or does
    /// nothing once the session is gone or its feed has been reset.
    pub fn viewed_signal(&self, interstitial: usize) -> impl FnOnce() + Send + 'static {
        let weak = self.downgrade();
        move || {
            weak.interstitial_viewed(interstitial);
        }
    }
}

impl fmt::Debug for FeedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_lock() {
            Some(session) => f.debug_struct("FeedHandle").field("session", &*session).finish(),
            None => f.write_str("FeedHandle { <locked> }"),
        }
    }
}

/// Non-owning reference; signals through it after teardown are dropped.
#[derive(Clone)]
pub struct WeakFeed {
    inner: Weak<Mutex<FeedSession>>,
    epoch: u64,
}

impl WeakFeed {
    pub fn interstitial_viewed(&self, interstitial: usize) -> Option<GateState> {
        let Some(inner) = self.inner.upgrade() else {
            tracing::debug!(interstitial, "feed dropped before interstitial signal");
            return None;
        };
        let gate = inner.lock().on_interstitial_viewed_in(self.epoch, interstitial);
        gate
    }
}

impl fmt::Debug for WeakFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakFeed")
            .field("alive", &(self.inner.strong_count() > 0))
            .field("epoch", &self.epoch)
            .finish()
    }
}

/// Registry of independent viewing sessions over one catalog.
pub struct Manager {
    catalog: Catalog,
    config: feed::Config,
    reporter: Arc<dyn AddressReporter>,
    sessions: RwLock<HashMap<u64, FeedHandle>>,
    next_id: AtomicU64,
}

impl Manager {
    pub fn new(catalog: Catalog, config: feed::Config) -> Self {
        Self {
            catalog,
            config,
            reporter: Arc::new(NoopReporter),
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn AddressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Opens a session starting at `start_id`, or at a random item.
    pub fn open(&self, start_id: Option<&str>) -> Result<(u64, FeedHandle)> {
        let start = match start_id {
            Some(id) => self
                .catalog
                .get(id)
                .cloned()
                .ok_or_else(|| SessionError::ItemNotFound(id.to_string()))?,
            None => self.catalog.random_item(&mut rand::thread_rng())?.clone(),
        };
        self.open_with_item(start)
    }

    /// Opens a session from an externally supplied start item, which need not
    /// be part of the catalog.
    pub fn open_with_item(&self, start: CatalogItem) -> Result<(u64, FeedHandle)> {
        let mut session = FeedSession::new(self.config.clone()).with_reporter(self.reporter.clone());
        session.initialize(start, self.catalog.clone())?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = FeedHandle::new(session);
        self.sessions.write().insert(id, handle.clone());
        tracing::info!(session = id, "session opened");
        Ok((id, handle))
    }

    pub fn get(&self, id: u64) -> Result<FeedHandle> {
        self.sessions
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| SessionError::SessionNotFound(id).into())
    }

    /// Tears a session down. Timers still holding its handle see a reset feed.
    pub fn close(&self, id: u64) -> Result<()> {
        let handle = self
            .sessions
            .write()
            .remove(&id)
            .ok_or(SessionError::SessionNotFound(id))?;
        handle.lock().reset();
        tracing::info!(session = id, "session closed");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    pub fn close_all(&self) {
        let drained: Vec<(u64, FeedHandle)> = self.sessions.write().drain().collect();
        for (_, handle) in drained {
            handle.lock().reset();
        }
    }
}
