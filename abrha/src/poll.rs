//! Waiting for asynchronous cloud work to settle
//!
//! Reserved IP (un)assignment and VPC peering changes return before the
//! platform has finished. The [`Poller`] refreshes a status until it reaches
//! a target, fails or runs out of time. Time comes from an injected
//! [`Clock`] so timeouts can be exercised without real sleeping.

use async_trait::async_trait;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tfplug::Context;
use thiserror::Error;

use crate::api::actions::{STATUS_COMPLETED, STATUS_IN_PROGRESS, STATUS_NEW};
use crate::api::{ApiError, Client};

#[async_trait]
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock was created
    fn now(&self) -> Duration;

    async fn sleep(&self, duration: Duration);
}

pub struct TokioClock {
    started: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            started: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.started.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await
    }
}

/// Virtual clock: `sleep` returns at once and moves time forward
#[derive(Default)]
pub struct ManualClock {
    elapsed: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, duration: Duration) {
        if let Ok(mut elapsed) = self.elapsed.lock() {
            *elapsed += duration;
        }
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.elapsed.lock().map(|e| *e).unwrap_or_default()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Wait before the first refresh
    pub delay: Duration,
    /// Wait between refreshes
    pub min_interval: Duration,
    pub timeout: Duration,
    /// Consecutive "not found" refreshes tolerated while waiting for a target
    pub not_found_checks: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(10),
            min_interval: Duration::from_secs(3),
            timeout: Duration::from_secs(60 * 60),
            not_found_checks: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    Pending(String),
    Completed(String),
    Failed(String),
    TimedOut,
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error("Error waiting for {what}: unexpected state '{state}', wanted target '{target}'")]
    UnexpectedState {
        what: String,
        state: String,
        target: String,
    },

    #[error("Error waiting for {what}: timeout while waiting for state to become '{target}' (last state: '{last_state}', timeout: {timeout:?})")]
    Timeout {
        what: String,
        target: String,
        last_state: String,
        timeout: Duration,
    },

    #[error("Error waiting for {what}: resource not found after {checks} checks")]
    NotFound { what: String, checks: u32 },

    #[error("Error waiting for {what}: {source}")]
    Api {
        what: String,
        #[source]
        source: ApiError,
    },

    #[error("Error waiting for {what}: request cancelled")]
    Cancelled { what: String },
}

/// Decides the next state from one refresh result
struct Transition<'a> {
    pending: &'a [&'a str],
    target: &'a [&'a str],
    not_found_limit: u32,
    not_found: u32,
}

impl Transition<'_> {
    fn observe(&mut self, status: Option<&str>) -> Result<PollState, u32> {
        let Some(status) = status else {
            self.not_found += 1;
            if self.not_found > self.not_found_limit {
                return Err(self.not_found);
            }
            return Ok(PollState::Pending(String::new()));
        };
        self.not_found = 0;

        if self.target.contains(&status) {
            Ok(PollState::Completed(status.to_string()))
        } else if self.pending.contains(&status) {
            Ok(PollState::Pending(status.to_string()))
        } else {
            Ok(PollState::Failed(status.to_string()))
        }
    }
}

#[derive(Clone)]
pub struct Poller {
    settings: PollSettings,
    clock: Arc<dyn Clock>,
}

impl Poller {
    pub fn new(settings: PollSettings, clock: Arc<dyn Clock>) -> Self {
        Self { settings, clock }
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    /// Sleeps on the clock unless the request is cancelled first
    async fn pause(&self, ctx: &Context, duration: Duration, what: &str) -> Result<(), PollError> {
        tokio::select! {
            _ = self.clock.sleep(duration) => Ok(()),
            _ = ctx.cancelled() => Err(PollError::Cancelled { what: what.to_string() }),
        }
    }

    /// Refreshes until the status is in `target`.
    ///
    /// `refresh` yields `Ok(None)` when the object is not found. Returns the
    /// final status.
    pub async fn wait<F, Fut>(
        &self,
        ctx: &Context,
        what: &str,
        pending: &[&str],
        target: &[&str],
        mut refresh: F,
    ) -> Result<String, PollError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<String>, ApiError>>,
    {
        let started = self.clock.now();
        let mut transition = Transition {
            pending,
            target,
            not_found_limit: self.settings.not_found_checks,
            not_found: 0,
        };
        let mut last_state = String::new();

        tracing::debug!("Waiting for {} (target: {:?})", what, target);
        self.pause(ctx, self.settings.delay, what).await?;

        loop {
            if ctx.is_cancelled() {
                return Err(PollError::Cancelled {
                    what: what.to_string(),
                });
            }

            let state = if self.clock.now().saturating_sub(started) > self.settings.timeout {
                PollState::TimedOut
            } else {
                let status = refresh().await.map_err(|source| PollError::Api {
                    what: what.to_string(),
                    source,
                })?;
                transition
                    .observe(status.as_deref())
                    .map_err(|checks| PollError::NotFound {
                        what: what.to_string(),
                        checks,
                    })?
            };

            match state {
                PollState::Completed(status) => {
                    tracing::info!("Finished waiting for {}: {}", what, status);
                    return Ok(status);
                }
                PollState::Failed(status) => {
                    return Err(PollError::UnexpectedState {
                        what: what.to_string(),
                        state: status,
                        target: target.join(", "),
                    })
                }
                PollState::TimedOut => {
                    return Err(PollError::Timeout {
                        what: what.to_string(),
                        target: target.join(", "),
                        last_state,
                        timeout: self.settings.timeout,
                    })
                }
                PollState::Pending(status) => {
                    if !status.is_empty() && status != last_state {
                        tracing::debug!("{}: state is now '{}'", what, status);
                    }
                    last_state = status;
                }
            }

            self.pause(ctx, self.settings.min_interval, what).await?;
        }
    }

    /// Refreshes until the object is gone. Statuses in `pending` keep the
    /// wait going; anything else is a failure.
    pub async fn wait_until_gone<F, Fut>(
        &self,
        ctx: &Context,
        what: &str,
        pending: &[&str],
        mut refresh: F,
    ) -> Result<(), PollError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<String>, ApiError>>,
    {
        const GONE: &str = "gone";

        let result = self
            .wait(ctx, what, pending, &[GONE], || {
                let next = refresh();
                async move { next.await.map(|status| Some(status.unwrap_or_else(|| GONE.to_string()))) }
            })
            .await;
        result.map(|_| ())
    }

    /// Waits for an action to reach `completed`
    pub async fn wait_for_action(
        &self,
        ctx: &Context,
        client: &Client,
        action_id: i64,
        what: &str,
    ) -> Result<(), PollError> {
        self.wait(
            ctx,
            what,
            &[STATUS_NEW, STATUS_IN_PROGRESS],
            &[STATUS_COMPLETED],
            || async move {
                match client.actions().get(action_id).await {
                    Ok(action) => Ok(Some(action.status)),
                    Err(e) if e.is_not_found() => Ok(None),
                    Err(e) => Err(e),
                }
            },
        )
        .await
        .map(|_| ())
    }
}

impl Default for Poller {
    fn default() -> Self {
        Self::new(PollSettings::default(), Arc::new(TokioClock::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_helpers::create_test_client;
    use mockito::Server;
    use std::collections::VecDeque;

    fn manual_poller() -> (Poller, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (Poller::new(PollSettings::default(), clock.clone()), clock)
    }

    fn scripted(
        statuses: &[Option<&str>],
    ) -> impl FnMut() -> std::future::Ready<Result<Option<String>, ApiError>> {
        let mut queue: VecDeque<Option<String>> =
            statuses.iter().map(|s| s.map(str::to_string)).collect();
        move || {
            let next = if queue.len() > 1 {
                queue.pop_front().flatten()
            } else {
                queue.front().cloned().flatten()
            };
            std::future::ready(Ok(next))
        }
    }

    #[tokio::test]
    async fn completes_after_in_progress() {
        let (poller, clock) = manual_poller();
        let status = poller
            .wait(
                &Context::new(),
                "action (1) to complete",
                &["new", "in-progress"],
                &["completed"],
                scripted(&[Some("new"), Some("in-progress"), Some("completed")]),
            )
            .await
            .unwrap();

        assert_eq!(status, "completed");
        // initial delay plus two intervals
        assert_eq!(clock.now(), Duration::from_secs(16));
    }

    #[tokio::test]
    async fn stuck_action_times_out() {
        let (poller, clock) = manual_poller();
        let err = poller
            .wait(
                &Context::new(),
                "reserved IP (192.0.2.1) to assign",
                &["new", "in-progress"],
                &["completed"],
                scripted(&[Some("in-progress")]),
            )
            .await
            .unwrap_err();

        match &err {
            PollError::Timeout { last_state, .. } => assert_eq!(last_state, "in-progress"),
            other => panic!("expected timeout, got {:?}", other),
        }
        assert!(err
            .to_string()
            .starts_with("Error waiting for reserved IP (192.0.2.1) to assign"));
        assert!(clock.now() > Duration::from_secs(60 * 60));
    }

    #[tokio::test]
    async fn unexpected_status_fails() {
        let (poller, _) = manual_poller();
        let err = poller
            .wait(
                &Context::new(),
                "action (1) to complete",
                &["new", "in-progress"],
                &["completed"],
                scripted(&[Some("new"), Some("errored")]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::UnexpectedState { ref state, .. } if state == "errored"));
    }

    #[tokio::test]
    async fn tolerates_limited_not_found() {
        let (poller, _) = manual_poller();
        let mut script = vec![None; 20];
        script.push(Some("ACTIVE"));
        let status = poller
            .wait(
                &Context::new(),
                "VPC peering (p-1) to become active",
                &["PROVISIONING"],
                &["ACTIVE"],
                scripted(&script),
            )
            .await
            .unwrap();
        assert_eq!(status, "ACTIVE");

        let err = poller
            .wait(
                &Context::new(),
                "VPC peering (p-1) to become active",
                &["PROVISIONING"],
                &["ACTIVE"],
                scripted(&[None]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::NotFound { checks: 21, .. }));
    }

    #[tokio::test]
    async fn wait_until_gone_finishes_on_not_found() {
        let (poller, _) = manual_poller();
        tokio_test::assert_ok!(
            poller
                .wait_until_gone(
                    &Context::new(),
                    "VPC peering (p-1) to be deleted",
                    &["DELETING"],
                    scripted(&[Some("DELETING"), Some("DELETING"), None]),
                )
                .await
        );
    }

    #[tokio::test]
    async fn cancelled_context_stops_waiting() {
        let (poller, _) = manual_poller();
        let ctx = Context::new();
        ctx.cancel();
        let err = poller
            .wait(
                &ctx,
                "action (1) to complete",
                &["in-progress"],
                &["completed"],
                scripted(&[Some("in-progress")]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn action_wait_reads_action_status() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/v2/actions/42")
            .with_body(r#"{"action":{"id":42,"status":"completed","type":"assign_ip"}}"#)
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        let (poller, _) = manual_poller();
        tokio_test::assert_ok!(
            poller
                .wait_for_action(&Context::new(), &client, 42, "action (42) to complete")
                .await
        );
    }
}
