use std::sync::{Arc, OnceLock};
use tokio::sync::Notify;

use crate::error::StressError;

/// First-error-wins mailbox from runners to the coordinator.
///
/// Any number of runners may [`report`](Self::report); only the first error is kept and
/// later ones are dropped. Reporting never blocks. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct ExceptionChannel {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    first: OnceLock<StressError>,
    notify: Notify,
}

impl ExceptionChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer `error`. Returns `true` if it became the retained error, `false` if an earlier
    /// one already occupies the slot.
    pub fn report(&self, error: StressError) -> bool {
        let accepted = self.inner.first.set(error).is_ok();
        if accepted {
            self.inner.notify.notify_waiters();
        }
        accepted
    }

    /// The retained error, if any.
    pub fn get(&self) -> Option<&StressError> {
        self.inner.first.get()
    }

    pub fn has_error(&self) -> bool {
        self.inner.first.get().is_some()
    }

    /// Wait until an error is reported and return a copy of it.
    pub async fn wait(&self) -> StressError {
        loop {
            let notified = self.inner.notify.notified();
            if let Some(error) = self.inner.first.get() {
                return error.clone();
            }
            notified.await;
        }
    }
}
