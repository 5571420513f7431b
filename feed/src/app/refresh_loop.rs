//! Refresh Loop
//!
//! Background task that keeps a session's messages current. Polls once a
//! second, four times a second while a post is outstanding, and suspends
//! after a period without user activity until the next `touch`.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::session::FeedSession;
use crate::domain::ports::Ledger;

#[derive(Debug, Clone)]
pub struct RefreshConfig {
    pub interval: Duration,
    pub posting_interval: Duration,
    pub inactivity_timeout: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            posting_interval: Duration::from_millis(250),
            inactivity_timeout: Duration::from_secs(15 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Waiting for the next poll
    Idle,
    Polling,
    /// Waiting on the short interval while a post is outstanding
    Posting,
    /// No user activity for the inactivity timeout
    Suspended,
}

pub struct RefreshLoop;

impl RefreshLoop {
    pub fn spawn<L: Ledger + 'static>(
        session: Arc<FeedSession<L>>,
        config: RefreshConfig,
    ) -> RefreshHandle {
        let cancel = CancellationToken::new();
        let activity = Arc::new(Activity {
            last: Mutex::new(Instant::now()),
            notify: Notify::new(),
        });
        let (state_tx, state_rx) = watch::channel(LoopState::Idle);

        let task = tokio::spawn(run(
            session,
            config,
            cancel.clone(),
            activity.clone(),
            state_tx,
        ));

        RefreshHandle {
            cancel,
            activity,
            state: state_rx,
            task: Some(task),
        }
    }
}

struct Activity {
    last: Mutex<Instant>,
    notify: Notify,
}

impl Activity {
    fn last(&self) -> Instant {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Controls a running refresh loop; dropping it stops the loop
pub struct RefreshHandle {
    cancel: CancellationToken,
    activity: Arc<Activity>,
    state: watch::Receiver<LoopState>,
    task: Option<JoinHandle<()>>,
}

impl RefreshHandle {
    /// Record user activity, resuming a suspended loop
    pub fn touch(&self) {
        *self
            .activity
            .last
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
        self.activity.notify.notify_one();
    }

    pub fn state(&self) -> LoopState {
        *self.state.borrow()
    }

    /// Watch state transitions
    pub fn state_changes(&self) -> watch::Receiver<LoopState> {
        self.state.clone()
    }

    /// Cancel the loop and wait for it to finish
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                tracing::error!(error = %err, "Refresh loop panicked");
            }
        }
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run<L: Ledger>(
    session: Arc<FeedSession<L>>,
    config: RefreshConfig,
    cancel: CancellationToken,
    activity: Arc<Activity>,
    state: watch::Sender<LoopState>,
) {
    tracing::debug!(?config, "Refresh loop started");
    loop {
        if activity.last().elapsed() >= config.inactivity_timeout {
            state.send_replace(LoopState::Suspended);
            tracing::info!("No activity, suspending refresh");
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = activity.notify.notified() => continue,
            }
        }

        state.send_replace(LoopState::Polling);
        tokio::select! {
            _ = cancel.cancelled() => break,
            result = session.poll() => match result {
                Ok(0) => {}
                Ok(appended) => tracing::debug!(appended, "Loaded new messages"),
                Err(err) => tracing::warn!(error = %err, "Refresh failed"),
            },
        }

        let (next_state, delay) = if session.is_posting() {
            (LoopState::Posting, config.posting_interval)
        } else {
            (LoopState::Idle, config.interval)
        };
        state.send_replace(next_state);
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    tracing::debug!("Refresh loop stopped");
}
