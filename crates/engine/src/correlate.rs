//! Dispatch-run correlation.
//!
//! The workflow dispatch endpoint returns no identifier for the run it
//! starts, so the correlator has to find that run itself. It captures a
//! timestamp immediately before dispatching, then polls the (newest-first)
//! run listing until the newest entry was created strictly after that
//! moment. The gap between "dispatch accepted" and "run visible in listings"
//! is an eventual-consistency window on the remote side; bounded exponential
//! backoff keeps total latency in check while tolerating the typical
//! few-second propagation delay.
//!
//! Only the newest entry is inspected. A run dispatched by another actor
//! inside the polling window would be picked up instead of ours; that race
//! is inherent to timestamp-only discrimination and is accepted here.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use gust_api::{ActionsApi, DispatchBody};
use gust_types::InputMap;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::EngineError;

/// Polls beyond the first are capped at this many.
pub const MAX_POLL_ATTEMPTS: u32 = 5;
/// Backoff before the second poll; doubles after every stale poll.
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// The run a dispatch was correlated with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelatedRun {
    pub id: u64,
    /// Human-facing URL from the run's detail view.
    pub url: String,
}

/// Dispatches a workflow and identifies the run it created.
///
/// Holds the retry policy as immutable state; one instance serves one
/// invocation. Cancelling the supplied token aborts any in-flight listing
/// call or backoff sleep promptly with [`EngineError::Cancelled`].
pub struct Correlator<'a, A> {
    api: &'a A,
    cancel: CancellationToken,
    max_attempts: u32,
    initial_backoff: Duration,
}

impl<'a, A: ActionsApi + Sync> Correlator<'a, A> {
    /// Create a correlator with the default polling policy.
    pub fn new(api: &'a A, cancel: CancellationToken) -> Self {
        Self {
            api,
            cancel,
            max_attempts: MAX_POLL_ATTEMPTS,
            initial_backoff: INITIAL_BACKOFF,
        }
    }

    /// Override the polling policy.
    pub fn with_policy(mut self, max_attempts: u32, initial_backoff: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.initial_backoff = initial_backoff;
        self
    }

    /// Dispatch `workflow_file` on `repo` and return the run it started.
    ///
    /// The reference timestamp is captured before the dispatch request goes
    /// out, so a run created while the request is in flight still counts as
    /// newer. A rejected dispatch is terminal; so is a listing transport
    /// failure, an empty run history, and an exhausted polling budget.
    pub async fn dispatch_and_correlate(
        &self,
        repo: &str,
        workflow_file: &str,
        ref_name: &str,
        inputs: &InputMap,
    ) -> Result<CorrelatedRun, EngineError> {
        let body = DispatchBody {
            ref_name: ref_name.to_string(),
            inputs: inputs.clone(),
        };

        let dispatched_at = Utc::now();
        self.cancellable(self.api.dispatch_workflow(repo, workflow_file, &body))
            .await?
            .map_err(EngineError::Dispatch)?;
        debug!(repo, workflow_file, "workflow dispatch accepted");

        let id = self.poll_for_run(repo, workflow_file, dispatched_at).await?;

        let detail = self
            .cancellable(self.api.run_detail(repo, id))
            .await?
            .map_err(|source| EngineError::DetailFetch { id, source })?;

        Ok(CorrelatedRun {
            id,
            url: detail.html_url,
        })
    }

    /// Poll the run listing until its newest entry postdates `dispatched_at`.
    async fn poll_for_run(
        &self,
        repo: &str,
        workflow_file: &str,
        dispatched_at: DateTime<Utc>,
    ) -> Result<u64, EngineError> {
        let mut backoff = self.initial_backoff;

        for attempt in 0..=self.max_attempts {
            let listing = self
                .cancellable(self.api.list_workflow_runs(repo, workflow_file))
                .await??;

            if listing.total_count == 0 || listing.runs.is_empty() {
                return Err(EngineError::NoRuns {
                    workflow: workflow_file.to_string(),
                });
            }

            let newest = &listing.runs[0];
            if newest.created_at > dispatched_at {
                debug!(run_id = newest.id, attempt, "correlated freshly created run");
                return Ok(newest.id);
            }

            if attempt < self.max_attempts {
                debug!(
                    attempt,
                    backoff_secs = backoff.as_secs(),
                    "newest run predates dispatch, backing off"
                );
                self.cancellable(sleep(backoff)).await?;
                backoff *= 2;
            }
        }

        Err(EngineError::CorrelationTimeout {
            polls: self.max_attempts + 1,
        })
    }

    /// Race `operation` against cancellation of the caller's token.
    async fn cancellable<T>(&self, operation: impl Future<Output = T>) -> Result<T, EngineError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(EngineError::Cancelled),
            value = operation => Ok(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use gust_api::{
        ActionsApi, ApiError, DispatchBody, RunDetail, RunList, RunSummary, WorkflowDescriptor,
    };
    use gust_types::InputMap;
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    use super::Correlator;
    use crate::error::EngineError;

    const RUN_URL: &str = "https://github.com/owner/name/actions/runs/42";

    /// Replays a fixed sequence of run listings; the final listing repeats
    /// once the script is exhausted. Records the (virtual) time of each poll.
    struct ScriptedApi {
        listings: Vec<RunList>,
        fail_dispatch: bool,
        fail_detail: bool,
        polls: AtomicUsize,
        poll_times: Mutex<Vec<Instant>>,
        dispatched: Mutex<Option<DispatchBody>>,
        cancel_on_poll: Option<(usize, CancellationToken)>,
    }

    impl ScriptedApi {
        fn new(listings: Vec<RunList>) -> Self {
            Self {
                listings,
                fail_dispatch: false,
                fail_detail: false,
                polls: AtomicUsize::new(0),
                poll_times: Mutex::new(Vec::new()),
                dispatched: Mutex::new(None),
                cancel_on_poll: None,
            }
        }

        fn poll_count(&self) -> usize {
            self.polls.load(Ordering::SeqCst)
        }

        fn sleep_durations(&self) -> Vec<Duration> {
            let times = self.poll_times.lock().unwrap();
            times.windows(2).map(|pair| pair[1] - pair[0]).collect()
        }
    }

    #[async_trait]
    impl ActionsApi for ScriptedApi {
        async fn list_workflows(&self, _repo: &str) -> Result<Vec<WorkflowDescriptor>, ApiError> {
            unreachable!("correlation never lists workflows")
        }

        async fn dispatch_workflow(
            &self,
            _repo: &str,
            _workflow_file: &str,
            body: &DispatchBody,
        ) -> Result<(), ApiError> {
            if self.fail_dispatch {
                return Err(ApiError::Status {
                    status: 422,
                    message: "Workflow does not have 'workflow_dispatch' trigger".to_string(),
                });
            }
            *self.dispatched.lock().unwrap() = Some(body.clone());
            Ok(())
        }

        async fn list_workflow_runs(
            &self,
            _repo: &str,
            _workflow_file: &str,
        ) -> Result<RunList, ApiError> {
            let poll = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            self.poll_times.lock().unwrap().push(Instant::now());
            if let Some((cancel_at, token)) = &self.cancel_on_poll {
                if poll == *cancel_at {
                    token.cancel();
                }
            }

            let index = (poll - 1).min(self.listings.len() - 1);
            Ok(self.listings[index].clone())
        }

        async fn run_detail(&self, _repo: &str, run_id: u64) -> Result<RunDetail, ApiError> {
            if self.fail_detail {
                return Err(ApiError::Status {
                    status: 500,
                    message: "boom".to_string(),
                });
            }
            assert_eq!(run_id, 42);
            Ok(RunDetail {
                html_url: RUN_URL.to_string(),
            })
        }
    }

    fn listing(id: u64, created_at: DateTime<Utc>) -> RunList {
        RunList {
            total_count: 1,
            runs: vec![RunSummary {
                id,
                url: format!("https://api.github.com/repos/owner/name/actions/runs/{id}"),
                created_at,
            }],
        }
    }

    fn stale() -> RunList {
        listing(17, Utc::now() - chrono::Duration::seconds(10))
    }

    fn fresh() -> RunList {
        // Far enough in the future to postdate the in-test dispatch moment.
        listing(42, Utc::now() + chrono::Duration::seconds(60))
    }

    fn inputs() -> InputMap {
        let mut map = InputMap::new();
        map.insert("environment".to_string(), "staging".to_string());
        map
    }

    #[tokio::test(start_paused = true)]
    async fn correlates_on_first_poll_without_sleeping() {
        let api = ScriptedApi::new(vec![fresh()]);
        let correlator = Correlator::new(&api, CancellationToken::new());

        let start = Instant::now();
        let run = correlator
            .dispatch_and_correlate("owner/name", "deploy.yml", "main", &inputs())
            .await
            .unwrap();

        assert_eq!(run.id, 42);
        assert_eq!(run.url, RUN_URL);
        assert_eq!(api.poll_count(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);

        let body = api.dispatched.lock().unwrap().clone().unwrap();
        assert_eq!(body.ref_name, "main");
        assert_eq!(body.inputs, inputs());
    }

    #[tokio::test(start_paused = true)]
    async fn backs_off_exponentially_until_a_new_run_appears() {
        let api = ScriptedApi::new(vec![stale(), stale(), stale(), fresh()]);
        let correlator = Correlator::new(&api, CancellationToken::new());

        let run = correlator
            .dispatch_and_correlate("owner/name", "deploy.yml", "main", &InputMap::new())
            .await
            .unwrap();

        assert_eq!(run.id, 42);
        assert_eq!(api.poll_count(), 4);
        assert_eq!(
            api.sleep_durations(),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_after_six_stale_polls() {
        let api = ScriptedApi::new(vec![stale()]);
        let correlator = Correlator::new(&api, CancellationToken::new());

        let start = Instant::now();
        let err = correlator
            .dispatch_and_correlate("owner/name", "deploy.yml", "", &InputMap::new())
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::CorrelationTimeout { polls: 6 }));
        assert_eq!(api.poll_count(), 6);
        // Sleeps of 1+2+4+8+16 seconds, and none after the final poll.
        assert_eq!(start.elapsed(), Duration::from_secs(31));
    }

    #[tokio::test(start_paused = true)]
    async fn fails_fast_when_the_workflow_has_no_runs() {
        let api = ScriptedApi::new(vec![RunList {
            total_count: 0,
            runs: Vec::new(),
        }]);
        let correlator = Correlator::new(&api, CancellationToken::new());

        let start = Instant::now();
        let err = correlator
            .dispatch_and_correlate("owner/name", "deploy.yml", "", &InputMap::new())
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::NoRuns { .. }));
        assert_eq!(api.poll_count(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_then_fresh_listing_correlates_on_the_second_poll() {
        let api = ScriptedApi::new(vec![stale(), fresh()]);
        let correlator = Correlator::new(&api, CancellationToken::new());

        let run = correlator
            .dispatch_and_correlate("owner/name", "deploy.yml", "main", &InputMap::new())
            .await
            .unwrap();

        assert_eq!(run.id, 42);
        assert_eq!(api.poll_count(), 2);
        assert_eq!(api.sleep_durations(), vec![Duration::from_secs(1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_backoff_aborts_the_loop() {
        let token = CancellationToken::new();
        let mut api = ScriptedApi::new(vec![stale()]);
        api.cancel_on_poll = Some((2, token.clone()));
        let correlator = Correlator::new(&api, token);

        let err = correlator
            .dispatch_and_correlate("owner/name", "deploy.yml", "", &InputMap::new())
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Cancelled));
        assert_eq!(api.poll_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_dispatch_is_terminal_and_never_polls() {
        let mut api = ScriptedApi::new(vec![fresh()]);
        api.fail_dispatch = true;
        let correlator = Correlator::new(&api, CancellationToken::new());

        let err = correlator
            .dispatch_and_correlate("owner/name", "deploy.yml", "main", &InputMap::new())
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Dispatch(_)));
        assert_eq!(api.poll_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn detail_fetch_failure_keeps_the_run_id() {
        let mut api = ScriptedApi::new(vec![fresh()]);
        api.fail_detail = true;
        let correlator = Correlator::new(&api, CancellationToken::new());

        let err = correlator
            .dispatch_and_correlate("owner/name", "deploy.yml", "main", &InputMap::new())
            .await
            .unwrap_err();

        match err {
            EngineError::DetailFetch { id, .. } => assert_eq!(id, 42),
            other => panic!("expected DetailFetch, got {other:?}"),
        }
    }
}
