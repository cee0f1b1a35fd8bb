use tokio::task::JoinHandle;

/// Handle to a live query started with `on_snapshot`. Delivery stops on
/// `unsubscribe()` or when the handle is dropped.
pub struct Subscription {
    task: JoinHandle<()>,
    cancelled: bool,
}

impl Subscription {
    pub(crate) fn new(task: JoinHandle<()>) -> Self {
        Self {
            task,
            cancelled: false,
        }
    }

    pub fn unsubscribe(&mut self) {
        if !self.cancelled {
            self.cancelled = true;
            self.task.abort();
            tracing::debug!("snapshot_subscription_cancelled");
        }
    }

    /// False once cancelled or once the underlying stream has ended.
    pub fn is_active(&self) -> bool {
        !self.cancelled && !self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
