//! Request-scoped context carrying cancellation and deadlines
//!
//! Every trait method receives a Context. The plugin server cancels it when
//! Terraform sends StopProvider. Long-running work (action polling in
//! particular) must check it between steps so a cancelled `terraform apply`
//! stops promptly.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

#[derive(Clone)]
pub struct Context {
    deadline: Option<Instant>,
    cancel: Arc<watch::Sender<bool>>,
}

impl Context {
    pub fn new() -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            deadline: None,
            cancel: Arc::new(cancel),
        }
    }

    /// Returns a context that reports cancellation once `timeout` has elapsed.
    /// Manual cancellation stays shared with the original context.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            cancel: self.cancel,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        if *self.cancel.borrow() {
            return true;
        }
        matches!(self.deadline, Some(deadline) if Instant::now() >= deadline)
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn cancelled(&self) {
        let mut rx = self.cancel.subscribe();
        let wait_cancel = async {
            // Sender lives as long as self, so wait_for only fails if it is dropped.
            let _ = rx.wait_for(|cancelled| *cancelled).await;
        };

        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = wait_cancel => {}
                    _ = tokio::time::sleep_until(deadline.into()) => {}
                }
            }
            None => wait_cancel.await,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_context_is_not_cancelled() {
        let ctx = Context::new();
        assert!(!ctx.is_cancelled());
        assert!(ctx.deadline().is_none());
    }

    #[test]
    fn manual_cancel_is_visible_to_clones() {
        let ctx = Context::new();
        let clone = ctx.clone();

        ctx.cancel();

        assert!(clone.is_cancelled());
    }

    #[test]
    fn expired_deadline_reports_cancelled() {
        let ctx = Context::new().with_timeout(Duration::from_millis(0));
        assert!(ctx.deadline().is_some());
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_future_resolves_after_cancel() {
        let ctx = Context::new();
        let waiter = ctx.clone();

        let handle = tokio::spawn(async move { waiter.cancelled().await });
        ctx.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("cancellation should be observed")
            .unwrap();
    }

    #[tokio::test]
    async fn cancelled_future_resolves_at_deadline() {
        let ctx = Context::new().with_timeout(Duration::from_millis(20));

        tokio::time::timeout(Duration::from_secs(1), ctx.cancelled())
            .await
            .expect("deadline should cancel the context");
    }
}
