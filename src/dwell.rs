use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Policy {
    pub duration: Duration,
    /// Fraction of the interstitial that must be on screen before the clock starts.
    pub visibility_threshold: f32,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(5),
            visibility_threshold: 0.5,
        }
    }
}

/// One-shot "viewed" clock for a single interstitial.
///
/// The clock starts the first time the interstitial is visible enough and
/// fires its callback once after the dwell duration. Cancelling, or dropping
/// the timer, stops a pending callback.
pub struct DwellTimer {
    policy: Policy,
    started_at: Option<Instant>,
    fired: Arc<AtomicBool>,
    stop: Option<Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl DwellTimer {
    pub fn new(policy: Policy) -> Self {
        Self {
            policy,
            started_at: None,
            fired: Arc::new(AtomicBool::new(false)),
            stop: None,
            handle: None,
        }
    }

    /// Feeds a visibility ratio in `[0, 1]`. Returns `true` if this call
    /// started the clock.
    pub fn observe_visibility<F>(&mut self, ratio: f32, on_viewed: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.started_at.is_some() || ratio < self.policy.visibility_threshold {
            return false;
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let fired = self.fired.clone();
        let duration = self.policy.duration;
        self.started_at = Some(Instant::now());
        self.stop = Some(stop_tx);
        self.handle = Some(thread::spawn(move || {
            match stop_rx.recv_timeout(duration) {
                Err(RecvTimeoutError::Timeout) => {
                    on_viewed();
                    fired.store(true, Ordering::SeqCst);
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    tracing::debug!("dwell timer cancelled");
                }
            }
        }));
        true
    }

    pub fn is_started(&self) -> bool {
        self.started_at.is_some()
    }

    /// True once the callback has returned.
    pub fn is_complete(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Time left before the callback fires; `None` until the clock starts.
    pub fn remaining(&self) -> Option<Duration> {
        let started = self.started_at?;
        if self.is_complete() {
            return Some(Duration::ZERO);
        }
        Some(self.policy.duration.saturating_sub(started.elapsed()))
    }

    /// Whole seconds left, rounded up, for "wait N seconds" prompts.
    pub fn remaining_secs(&self) -> Option<u64> {
        self.remaining().map(|left| {
            let secs = left.as_secs();
            if left.subsec_nanos() > 0 {
                secs + 1
            } else {
                secs
            }
        })
    }

    /// Blocks until a started clock has fired. Returns whether it completed.
    pub fn wait(&mut self) -> bool {
        self.join();
        self.is_complete()
    }

    pub fn cancel(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.join();
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.join() {
                tracing::warn!("dwell callback panicked: {err:?}");
            }
        }
    }
}

impl Drop for DwellTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
