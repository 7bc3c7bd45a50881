//! Asynchronous extraction job orchestrator.
//!
//! Call-end events are acknowledged synchronously and queued here; the
//! extraction pipeline runs on worker tasks decoupled from the request
//! cycle. Each job moves through a visible state machine
//! (`Queued -> Running -> Succeeded | Failed`) recorded on an in-memory
//! status board, so running jobs stay observable.
//!
//! Jobs for different conversations run concurrently. Jobs touching the
//! same owner scope serialize on a per-scope async mutex: at most one
//! concurrent merge per (caller, agent), which is the one strict
//! ordering guarantee the dedup invariant needs. Failed jobs are not
//! re-enqueued automatically -- operational retry is an external
//! decision. Only the extraction step retries locally (bounded, backoff,
//! retryable errors only); store writes are never retried.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use memvox_types::config::MemoryConfig;
use memvox_types::error::{JobError, MergeError, StoreError};
use memvox_types::job::{ExtractionJob, JobState, JobStatus};
use memvox_types::memory::OwnerScope;

use crate::dedup::MergeEngine;
use crate::extract::MemoryExtractor;
use crate::llm::LlmProvider;
use crate::profile::{AgentProfileCache, ProfileSource};
use crate::retry::RetryPolicy;
use crate::store::MemoryStore;

/// Upper bound on existing records loaded for one merge pass.
const MERGE_QUERY_LIMIT: usize = 1_000;

/// Enqueueing a job failed; the event is acknowledged but not queued.
#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    #[error("extraction queue full")]
    Full,
    #[error("orchestrator shut down")]
    Closed,
}

/// Observable job states, keyed by conversation id.
#[derive(Default)]
pub struct JobBoard {
    states: DashMap<String, JobState>,
}

impl JobBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, conversation_id: &str) -> Option<JobState> {
        self.states.get(conversation_id).map(|s| s.clone())
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn set_status(&self, conversation_id: &str, status: JobStatus) {
        self.states
            .entry(conversation_id.to_string())
            .and_modify(|state| {
                state.status = status;
                state.updated_at = Utc::now();
            })
            .or_insert_with(|| JobState {
                conversation_id: conversation_id.to_string(),
                status,
                attempt_count: 0,
                error: None,
                updated_at: Utc::now(),
            });
    }

    fn set_attempt(&self, conversation_id: &str, attempt: u32) {
        if let Some(mut state) = self.states.get_mut(conversation_id) {
            state.attempt_count = attempt;
            state.updated_at = Utc::now();
        }
    }

    fn set_failed(&self, conversation_id: &str, error: &JobError) {
        if let Some(mut state) = self.states.get_mut(conversation_id) {
            state.status = JobStatus::Failed;
            state.error = Some(error.to_string());
            state.updated_at = Utc::now();
        }
    }

    fn remove(&self, conversation_id: &str) {
        self.states.remove(conversation_id);
    }
}

/// Per-owner-scope merge guards.
///
/// Keyed mutexes only -- there is no global lock, so different scopes
/// merge concurrently while one scope's merges serialize.
#[derive(Default)]
pub struct ScopeLocks {
    locks: DashMap<OwnerScope, Arc<Mutex<()>>>,
}

impl ScopeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn acquire(&self, scope: &OwnerScope) -> Arc<Mutex<()>> {
        self.locks
            .entry(scope.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// The per-job processing pipeline: profile refresh, extraction with
/// bounded retry, scope-serialized merge, persistence.
pub struct JobPipeline<S, P, F> {
    store: Arc<S>,
    llm: Arc<P>,
    profiles: Arc<AgentProfileCache<F>>,
    merge: MergeEngine,
    retry: RetryPolicy,
    model: String,
    board: Arc<JobBoard>,
    locks: Arc<ScopeLocks>,
}

impl<S, P, F> JobPipeline<S, P, F>
where
    S: MemoryStore,
    P: LlmProvider,
    F: ProfileSource,
{
    pub fn new(
        store: Arc<S>,
        llm: Arc<P>,
        profiles: Arc<AgentProfileCache<F>>,
        config: &MemoryConfig,
        retry: RetryPolicy,
        model: String,
    ) -> Self {
        Self {
            store,
            llm,
            profiles,
            merge: MergeEngine::new(config.similarity_threshold),
            retry,
            model,
            board: Arc::new(JobBoard::new()),
            locks: Arc::new(ScopeLocks::new()),
        }
    }

    pub fn board(&self) -> Arc<JobBoard> {
        Arc::clone(&self.board)
    }

    /// Run one job to a terminal state, recording transitions on the board.
    #[tracing::instrument(
        name = "extraction_job",
        skip(self, job),
        fields(conversation_id = %job.conversation_id, scope = %job.scope)
    )]
    pub async fn run(&self, job: ExtractionJob) {
        self.board.set_status(&job.conversation_id, JobStatus::Running);

        match self.process(&job).await {
            Ok((created, reinforced)) => {
                tracing::info!(created, reinforced, "extraction job succeeded");
                self.board
                    .set_status(&job.conversation_id, JobStatus::Succeeded);
            }
            Err(e) => {
                tracing::error!(error = %e, "extraction job failed");
                self.board.set_failed(&job.conversation_id, &e);
            }
        }
    }

    async fn process(&self, job: &ExtractionJob) -> Result<(usize, usize), JobError> {
        // Profile refresh is best-effort: a missing profile degrades
        // greeting personalization, it does not block memory capture.
        if let Err(e) = self.profiles.get(&job.scope.agent).await {
            tracing::warn!(agent_id = %job.scope.agent, error = %e, "profile refresh failed");
        }

        let candidates = self.extract_with_retry(job).await?;
        if candidates.is_empty() {
            tracing::info!("no memories extracted; nothing to store");
            return Ok((0, 0));
        }

        // At-most-one concurrent merge per owner scope. The guard is
        // scoped to this (caller, agent) key only.
        let lock = self.locks.acquire(&job.scope);
        let _guard = lock.lock().await;

        let existing = self.store.query_scope(&job.scope, MERGE_QUERY_LIMIT).await?;
        let outcome = self
            .merge
            .merge(&candidates, &existing, &job.scope, &job.conversation_id);

        // Store writes are not retried: a blind retry could double-write.
        for record in &outcome.created {
            self.store.insert(record).await?;
        }
        for record in &outcome.reinforced {
            match self.store.reinforce(record).await {
                Ok(()) => {}
                Err(StoreError::Status { code: 404, .. }) => {
                    // The target existed when this merge loaded it. Its
                    // disappearance means the scope serialization was
                    // violated somewhere -- a correctness bug.
                    let conflict = MergeError::Conflict(format!(
                        "reinforcement target {} vanished mid-merge",
                        record.id
                    ));
                    tracing::error!(record_id = %record.id, "merge conflict under scope serialization");
                    return Err(conflict.into());
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok((outcome.created.len(), outcome.reinforced.len()))
    }

    async fn extract_with_retry(
        &self,
        job: &ExtractionJob,
    ) -> Result<Vec<memvox_types::memory::MemoryCandidate>, JobError> {
        let mut attempt = 1u32;
        loop {
            self.board.set_attempt(&job.conversation_id, attempt);
            match MemoryExtractor::extract(
                self.llm.as_ref(),
                &self.model,
                &job.transcript,
                &job.scope,
                &job.conversation_id,
            )
            .await
            {
                Ok(candidates) => return Ok(candidates),
                Err(e) if e.is_retryable() && self.retry.should_retry(attempt) => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        delay_secs = delay.as_secs(),
                        error = %e,
                        "extraction failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Handle for enqueueing jobs and shutting the workers down.
pub struct Orchestrator {
    tx: mpsc::Sender<ExtractionJob>,
    board: Arc<JobBoard>,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Spawn the dispatcher task consuming the bounded queue.
    ///
    /// Each received job runs on its own task, so jobs for different
    /// scopes proceed concurrently; same-scope jobs serialize inside
    /// the pipeline.
    pub fn spawn<S, P, F>(
        pipeline: Arc<JobPipeline<S, P, F>>,
        queue_capacity: usize,
        cancel: CancellationToken,
    ) -> Self
    where
        S: MemoryStore + Send + Sync + 'static,
        P: LlmProvider + Send + Sync + 'static,
        F: ProfileSource + Send + Sync + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<ExtractionJob>(queue_capacity);
        let board = pipeline.board();
        let dispatcher_cancel = cancel.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = dispatcher_cancel.cancelled() => {
                        tracing::info!("orchestrator shutting down");
                        break;
                    }
                    received = rx.recv() => {
                        match received {
                            Some(job) => {
                                let pipeline = Arc::clone(&pipeline);
                                tokio::spawn(async move { pipeline.run(job).await });
                            }
                            None => break,
                        }
                    }
                }
            }
        });

        Self { tx, board, cancel }
    }

    /// Queue a job for asynchronous processing.
    ///
    /// Returns an error when the bounded queue is full or the
    /// orchestrator has shut down; the caller reports the event as
    /// not-queued rather than blocking the webhook response.
    pub fn enqueue(&self, job: ExtractionJob) -> Result<(), EnqueueError> {
        let conversation_id = job.conversation_id.clone();
        self.board.set_status(&conversation_id, JobStatus::Queued);

        match self.tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.board.remove(&conversation_id);
                tracing::error!(conversation_id = %conversation_id, "extraction queue full; job dropped");
                Err(EnqueueError::Full)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.board.remove(&conversation_id);
                Err(EnqueueError::Closed)
            }
        }
    }

    pub fn board(&self) -> Arc<JobBoard> {
        Arc::clone(&self.board)
    }

    /// Signal the dispatcher to stop accepting work.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use memvox_types::error::{ProfileError, StoreError};
    use memvox_types::event::TranscriptTurn;
    use memvox_types::llm::{CompletionRequest, CompletionResponse, LlmError, StopReason, Usage};
    use memvox_types::memory::{AgentId, CallerId, MemoryHit, MemoryRecord};

    struct MockStore {
        inserts: AtomicUsize,
        reinforces: AtomicUsize,
        fail_inserts: bool,
        merge_delay_ms: u64,
        active_merges: AtomicUsize,
        max_concurrent_merges: AtomicUsize,
    }

    impl Default for MockStore {
        fn default() -> Self {
            Self {
                inserts: AtomicUsize::new(0),
                reinforces: AtomicUsize::new(0),
                fail_inserts: false,
                merge_delay_ms: 0,
                active_merges: AtomicUsize::new(0),
                max_concurrent_merges: AtomicUsize::new(0),
            }
        }
    }

    impl MemoryStore for MockStore {
        async fn query_scope(
            &self,
            _scope: &OwnerScope,
            _limit: usize,
        ) -> Result<Vec<MemoryRecord>, StoreError> {
            let active = self.active_merges.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_concurrent_merges
                .fetch_max(active, Ordering::SeqCst);
            if self.merge_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.merge_delay_ms)).await;
            }
            self.active_merges.fetch_sub(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        async fn query_caller(
            &self,
            _caller: &CallerId,
            _limit: usize,
        ) -> Result<Vec<MemoryRecord>, StoreError> {
            Ok(Vec::new())
        }

        async fn search(
            &self,
            _caller: &CallerId,
            _query: &str,
            _agent: Option<&AgentId>,
            _limit: usize,
        ) -> Result<Vec<MemoryHit>, StoreError> {
            Ok(Vec::new())
        }

        async fn insert(&self, _record: &MemoryRecord) -> Result<(), StoreError> {
            if self.fail_inserts {
                return Err(StoreError::Status {
                    code: 503,
                    body: "unavailable".to_string(),
                });
            }
            self.inserts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn reinforce(&self, _record: &MemoryRecord) -> Result<(), StoreError> {
            self.reinforces.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct MockLlm {
        calls: AtomicUsize,
        fail_first: usize,
        reply: String,
    }

    impl MockLlm {
        fn replying(reply: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_first: 0,
                reply: reply.to_string(),
            }
        }
    }

    impl LlmProvider for MockLlm {
        fn name(&self) -> &str {
            "mock"
        }

        async fn complete(
            &self,
            _request: &CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                return Err(LlmError::Overloaded("529".to_string()));
            }
            Ok(CompletionResponse {
                id: "resp_1".to_string(),
                content: self.reply.clone(),
                model: "test-model".to_string(),
                stop_reason: StopReason::EndTurn,
                usage: Usage::default(),
            })
        }
    }

    struct MockProfiles;

    impl ProfileSource for MockProfiles {
        async fn fetch_profile(
            &self,
            _agent_id: &AgentId,
        ) -> Result<memvox_types::agent::ProfileData, ProfileError> {
            Ok(memvox_types::agent::ProfileData {
                display_name: "Support Line".to_string(),
                first_message: None,
            })
        }
    }

    const TWO_CANDIDATES: &str = r#"[
        {"content": "Caller ordered product XYZ-789", "category": "factual", "importance": 7},
        {"content": "Caller prefers express shipping", "category": "preference", "importance": 6}
    ]"#;

    fn pipeline(
        store: MockStore,
        llm: MockLlm,
    ) -> Arc<JobPipeline<MockStore, MockLlm, MockProfiles>> {
        Arc::new(JobPipeline::new(
            Arc::new(store),
            Arc::new(llm),
            Arc::new(AgentProfileCache::new(MockProfiles, 24)),
            &MemoryConfig::default(),
            RetryPolicy::new(3, Duration::from_millis(1), 2),
            "test-model".to_string(),
        ))
    }

    fn job(conversation_id: &str, caller: &str) -> ExtractionJob {
        ExtractionJob {
            conversation_id: conversation_id.to_string(),
            scope: OwnerScope::new(caller, "agent_01"),
            transcript: vec![TranscriptTurn {
                role: "user".to_string(),
                message: "I want product XYZ-789, ship express".to_string(),
            }],
            duration_secs: 120,
            call_status: "done".to_string(),
            enqueued_at: Utc::now(),
        }
    }

    async fn wait_terminal(board: &JobBoard, conversation_id: &str) -> JobState {
        for _ in 0..200 {
            if let Some(state) = board.get(conversation_id) {
                if state.status.is_terminal() {
                    return state;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {conversation_id} did not reach a terminal state");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_success_flow_creates_records() {
        let pipeline = pipeline(MockStore::default(), MockLlm::replying(TWO_CANDIDATES));
        let board = pipeline.board();
        let orchestrator = Orchestrator::spawn(Arc::clone(&pipeline), 16, CancellationToken::new());

        orchestrator.enqueue(job("conv_1", "+15551234567")).unwrap();
        let state = wait_terminal(&board, "conv_1").await;

        assert_eq!(state.status, JobStatus::Succeeded);
        assert_eq!(state.attempt_count, 1);
        assert_eq!(pipeline.store.inserts.load(Ordering::SeqCst), 2);
        assert_eq!(pipeline.store.reinforces.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_empty_extraction_succeeds_without_writes() {
        let pipeline = pipeline(MockStore::default(), MockLlm::replying("[]"));
        let board = pipeline.board();
        let orchestrator = Orchestrator::spawn(Arc::clone(&pipeline), 16, CancellationToken::new());

        orchestrator.enqueue(job("conv_1", "+15551234567")).unwrap();
        let state = wait_terminal(&board, "conv_1").await;

        assert_eq!(state.status, JobStatus::Succeeded);
        assert_eq!(pipeline.store.inserts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_store_failure_marks_job_failed() {
        let store = MockStore {
            fail_inserts: true,
            ..Default::default()
        };
        let pipeline = pipeline(store, MockLlm::replying(TWO_CANDIDATES));
        let board = pipeline.board();
        let orchestrator = Orchestrator::spawn(Arc::clone(&pipeline), 16, CancellationToken::new());

        orchestrator.enqueue(job("conv_1", "+15551234567")).unwrap();
        let state = wait_terminal(&board, "conv_1").await;

        assert_eq!(state.status, JobStatus::Failed);
        assert!(state.error.as_deref().unwrap_or_default().contains("503"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_transient_llm_failure_retries_then_succeeds() {
        let llm = MockLlm {
            calls: AtomicUsize::new(0),
            fail_first: 1,
            reply: TWO_CANDIDATES.to_string(),
        };
        let pipeline = pipeline(MockStore::default(), llm);
        let board = pipeline.board();
        let orchestrator = Orchestrator::spawn(Arc::clone(&pipeline), 16, CancellationToken::new());

        orchestrator.enqueue(job("conv_1", "+15551234567")).unwrap();
        let state = wait_terminal(&board, "conv_1").await;

        assert_eq!(state.status, JobStatus::Succeeded);
        assert_eq!(state.attempt_count, 2);
        assert_eq!(pipeline.llm.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unparseable_response_fails_without_retry() {
        let pipeline = pipeline(
            MockStore::default(),
            MockLlm::replying("no json here, sorry"),
        );
        let board = pipeline.board();
        let orchestrator = Orchestrator::spawn(Arc::clone(&pipeline), 16, CancellationToken::new());

        orchestrator.enqueue(job("conv_1", "+15551234567")).unwrap();
        let state = wait_terminal(&board, "conv_1").await;

        assert_eq!(state.status, JobStatus::Failed);
        assert_eq!(state.attempt_count, 1);
        assert_eq!(pipeline.llm.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_same_scope_jobs_serialize_merges() {
        let store = MockStore {
            merge_delay_ms: 50,
            ..Default::default()
        };
        let pipeline = pipeline(store, MockLlm::replying(TWO_CANDIDATES));
        let board = pipeline.board();
        let orchestrator = Orchestrator::spawn(Arc::clone(&pipeline), 16, CancellationToken::new());

        orchestrator.enqueue(job("conv_1", "+15551234567")).unwrap();
        orchestrator.enqueue(job("conv_2", "+15551234567")).unwrap();

        wait_terminal(&board, "conv_1").await;
        wait_terminal(&board, "conv_2").await;

        assert_eq!(
            pipeline.store.max_concurrent_merges.load(Ordering::SeqCst),
            1,
            "same-scope merges must never overlap"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_different_scopes_merge_concurrently() {
        let store = MockStore {
            merge_delay_ms: 50,
            ..Default::default()
        };
        let pipeline = pipeline(store, MockLlm::replying(TWO_CANDIDATES));
        let board = pipeline.board();
        let orchestrator = Orchestrator::spawn(Arc::clone(&pipeline), 16, CancellationToken::new());

        orchestrator.enqueue(job("conv_1", "+15551111111")).unwrap();
        orchestrator.enqueue(job("conv_2", "+15552222222")).unwrap();

        wait_terminal(&board, "conv_1").await;
        wait_terminal(&board, "conv_2").await;

        assert!(
            pipeline.store.max_concurrent_merges.load(Ordering::SeqCst) >= 2,
            "different scopes should be free to merge concurrently"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_enqueue_after_shutdown_fails() {
        let pipeline = pipeline(MockStore::default(), MockLlm::replying("[]"));
        let orchestrator = Orchestrator::spawn(Arc::clone(&pipeline), 16, CancellationToken::new());

        orchestrator.shutdown();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let result = orchestrator.enqueue(job("conv_1", "+15551234567"));
        assert!(result.is_err());
    }
}
