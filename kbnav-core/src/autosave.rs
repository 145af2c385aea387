// Debounced auto-save: each edit restarts the timer, only the last edit is written

use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Writes `(path, content)`; called once per elapsed debounce window.
pub type PersistFn = Arc<dyn Fn(String, String) -> BoxFuture<'static, ()> + Send + Sync>;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

/// Restartable save timer.
///
/// Empty content is never written, even when it is the last edit.
/// Scheduling cancels the outstanding timer only. A save that has already
/// started keeps running in its own task, so edits never wait on the network.
pub struct AutoSaver {
    debounce: Duration,
    persist: PersistFn,
    pending: Option<JoinHandle<()>>,
}

impl AutoSaver {
    pub fn new(debounce: Duration, persist: PersistFn) -> Self {
        Self {
            debounce,
            persist,
            pending: None,
        }
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    pub fn schedule(&mut self, path: String, content: String) {
        self.cancel();

        let debounce = self.debounce;
        let persist = Arc::clone(&self.persist);
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if content.is_empty() {
                debug!("Skipping auto-save of empty {}", path);
                return;
            }
            debug!("Auto-saving {}", path);
            tokio::spawn(persist(path, content));
        }));
    }

    /// Drop the outstanding timer without saving. Returns true if one was pending.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for AutoSaver {
    fn drop(&mut self) {
        self.cancel();
    }
}
