//! Debounced persistence.
//!
//! Every mutation restarts a single quiescence timer. Only when the window
//! passes without another mutation does the save callback run, once, with the
//! content captured at the last mutation.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::manager::content::DocumentContent;

/// Receives full-document snapshots.
pub type SaveCallback = Arc<dyn Fn(DocumentContent) + Send + Sync>;

/// Owns the pending save timer. Dropping it cancels the timer.
pub struct SaveDebouncer {
    delay: Duration,
    callback: Option<SaveCallback>,
    pending: Option<JoinHandle<()>>,
}

impl SaveDebouncer {
    pub fn new(delay: Duration, callback: Option<SaveCallback>) -> Self {
        SaveDebouncer {
            delay,
            callback,
            pending: None,
        }
    }

    pub fn set_callback(&mut self, callback: SaveCallback) {
        self.callback = Some(callback);
    }

    /// Restarts the quiescence window. `content` is only evaluated when a
    /// callback is installed.
    ///
    /// Must be called from within a tokio runtime for the save to fire.
    pub fn schedule(&mut self, content: impl FnOnce() -> DocumentContent) {
        let Some(callback) = self.callback.clone() else {
            return;
        };
        self.cancel();

        let Ok(runtime) = Handle::try_current() else {
            warn!("no tokio runtime available, save skipped");
            return;
        };

        let content = content();
        let delay = self.delay;
        self.pending = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            debug!(bytes = content.text.len(), "debounced save firing");
            callback(content);
        }));
    }

    /// Cancels the pending save, if any.
    pub fn cancel(&mut self) {
        if let Some(task) = self.pending.take() {
            task.abort();
        }
    }

    /// Whether a save is scheduled and has not yet fired.
    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for SaveDebouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
