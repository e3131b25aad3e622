//! Comparison fan-out
//!
//! [`ComparisonOrchestrator::compare`] materializes one pending entry per
//! provider, then spawns one independent call per provider. Each call owns
//! the only writer to its own slot and settles it exactly once, so a slow or
//! failing provider never touches anyone else's entry.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::ComparisonBackend;
use crate::error::{CompareError, Result};
use crate::types::{Completion, ProviderResult, ProviderStatus};

/// Configuration for the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Budget for a single provider call; generation is slow
    pub call_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(120),
        }
    }
}

/// Fans one prompt out to many providers
pub struct ComparisonOrchestrator {
    backend: Arc<dyn ComparisonBackend>,
    config: OrchestratorConfig,
}

impl ComparisonOrchestrator {
    pub fn new(backend: Arc<dyn ComparisonBackend>, config: OrchestratorConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Start a new comparison run.
    ///
    /// An empty `provider_ids` means "use the backend's default set". The
    /// prompt is validated before anything else happens, so an invalid prompt
    /// never creates entries or issues calls. Duplicate ids keep their first
    /// position. Every call starts a fresh, independent run.
    pub async fn compare(&self, prompt: &str, provider_ids: &[String]) -> Result<ComparisonRun> {
        if prompt.trim().is_empty() {
            return Err(CompareError::InvalidInput);
        }

        let providers = if provider_ids.is_empty() {
            debug!("No providers selected, resolving default set");
            self.backend.available_providers().await?
        } else {
            provider_ids.to_vec()
        };

        let providers = dedup_preserving_order(providers);
        if providers.is_empty() {
            return Err(CompareError::NoProviders);
        }

        Ok(self.launch(prompt, providers))
    }

    fn launch(&self, prompt: &str, providers: Vec<String>) -> ComparisonRun {
        let run_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let (settled_tx, settled_rx) = mpsc::unbounded_channel();

        // All entries exist before the first call is issued
        let (slots, entries): (Vec<Slot>, Vec<watch::Receiver<ProviderResult>>) = providers
            .into_iter()
            .enumerate()
            .map(|(index, provider_id)| Slot::new(index, provider_id))
            .unzip();

        info!("Comparison run {} started with {} providers", run_id, entries.len());

        let prompt: Arc<str> = Arc::from(prompt);
        for slot in slots {
            tokio::spawn(call_provider(
                run_id,
                self.backend.clone(),
                prompt.clone(),
                slot,
                self.config.call_timeout,
                cancel.clone(),
                settled_tx.clone(),
            ));
        }

        ComparisonRun {
            id: run_id,
            remaining: entries.len(),
            entries,
            settled_rx,
            _cancel_on_drop: cancel.drop_guard(),
        }
    }
}

fn dedup_preserving_order(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter()
        .filter(|id| {
            let fresh = seen.insert(id.clone());
            if !fresh {
                warn!("Ignoring duplicate provider '{}'", id);
            }
            fresh
        })
        .collect()
}

/// Sole writer for one provider's entry
struct Slot {
    index: usize,
    provider_id: String,
    tx: watch::Sender<ProviderResult>,
}

impl Slot {
    fn new(index: usize, provider_id: String) -> (Self, watch::Receiver<ProviderResult>) {
        let (tx, rx) = watch::channel(ProviderResult::pending(provider_id.clone()));
        (
            Self {
                index,
                provider_id,
                tx,
            },
            rx,
        )
    }

    /// Publish the terminal state. Consumes the slot, so it can only happen once.
    fn settle(self, outcome: Result<Completion>) -> usize {
        let status = match outcome {
            Ok(Completion { text, metadata }) => ProviderStatus::Success { text, metadata },
            Err(e) => ProviderStatus::Error {
                error_message: e.to_string(),
            },
        };
        self.tx.send_modify(|entry| entry.status = status);
        self.index
    }
}

async fn call_provider(
    run_id: Uuid,
    backend: Arc<dyn ComparisonBackend>,
    prompt: Arc<str>,
    slot: Slot,
    timeout: Duration,
    cancel: CancellationToken,
    settled: mpsc::UnboundedSender<usize>,
) {
    let started = Instant::now();

    let outcome = tokio::select! {
        _ = cancel.cancelled() => {
            debug!("Run {} dropped, abandoning call to {}", run_id, slot.provider_id);
            return;
        }
        outcome = tokio::time::timeout(timeout, backend.complete(&prompt, &slot.provider_id)) => {
            outcome.unwrap_or(Err(CompareError::Timeout(timeout)))
        }
    };

    let elapsed_ms = started.elapsed().as_millis();
    match &outcome {
        Ok(_) => info!(
            "Run {}: {} answered in {}ms",
            run_id, slot.provider_id, elapsed_ms
        ),
        Err(e) if e.is_timeout() => warn!(
            "Run {}: {} timed out after {:?}",
            run_id, slot.provider_id, timeout
        ),
        Err(e) => warn!(
            "Run {}: {} failed after {}ms: {}",
            run_id, slot.provider_id, elapsed_ms, e
        ),
    }

    let index = slot.settle(outcome);
    // The run may already be gone; nobody is listening then
    let _ = settled.send(index);
}

/// One comparison run's results.
///
/// Entries are in request order and never reorder. Reading is always
/// possible, including while calls are in flight. Dropping the run cancels
/// whatever is still outstanding.
pub struct ComparisonRun {
    id: Uuid,
    entries: Vec<watch::Receiver<ProviderResult>>,
    settled_rx: mpsc::UnboundedReceiver<usize>,
    remaining: usize,
    _cancel_on_drop: DropGuard,
}

impl std::fmt::Debug for ComparisonRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComparisonRun")
            .field("id", &self.id)
            .field("providers", &self.entries.len())
            .field("remaining", &self.remaining)
            .finish()
    }
}

impl ComparisonRun {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current state of every entry, in request order
    pub fn snapshot(&self) -> Vec<ProviderResult> {
        self.entries.iter().map(|rx| rx.borrow().clone()).collect()
    }

    /// Current state of one entry
    pub fn get(&self, index: usize) -> Option<ProviderResult> {
        self.entries.get(index).map(|rx| rx.borrow().clone())
    }

    /// Number of entries still pending
    pub fn pending_count(&self) -> usize {
        self.entries.iter().filter(|rx| rx.borrow().is_pending()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.pending_count() == 0
    }

    /// Observe a single entry; the receiver sees exactly one change, the settlement
    pub fn subscribe(&self, index: usize) -> Option<watch::Receiver<ProviderResult>> {
        self.entries.get(index).cloned()
    }

    /// Wait for the next provider to settle, in completion order.
    /// Returns `None` once every provider has been reported.
    pub async fn next_settled(&mut self) -> Option<(usize, ProviderResult)> {
        if self.remaining == 0 {
            return None;
        }
        let index = self.settled_rx.recv().await?;
        self.remaining -= 1;
        let entry = self.entries[index].borrow().clone();
        Some((index, entry))
    }

    /// Wait until every provider has settled and return the final snapshot
    pub async fn wait_all(mut self) -> Vec<ProviderResult> {
        while self.next_settled().await.is_some() {}
        self.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use crate::types::ResponseMetadata;

    /// How a mock provider should behave
    #[derive(Clone)]
    enum Behavior {
        Answer { text: &'static str, delay_ms: u64 },
        Fail { message: &'static str, delay_ms: u64 },
        Hang,
    }

    struct MockBackend {
        behaviors: HashMap<String, Behavior>,
        defaults: Vec<String>,
        calls: Mutex<Vec<String>>,
    }

    impl MockBackend {
        fn new(behaviors: &[(&str, Behavior)]) -> Self {
            Self {
                behaviors: behaviors
                    .iter()
                    .map(|(id, b)| (id.to_string(), b.clone()))
                    .collect(),
                defaults: Vec::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn with_defaults(mut self, ids: &[&str]) -> Self {
            self.defaults = ids.iter().map(|s| s.to_string()).collect();
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ComparisonBackend for MockBackend {
        async fn available_providers(&self) -> Result<Vec<String>> {
            Ok(self.defaults.clone())
        }

        async fn complete(&self, _prompt: &str, provider_id: &str) -> Result<Completion> {
            self.calls.lock().unwrap().push(provider_id.to_string());
            match self.behaviors.get(provider_id).cloned() {
                Some(Behavior::Answer { text, delay_ms }) => {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    Ok(Completion {
                        text: text.to_string(),
                        metadata: Some(ResponseMetadata {
                            latency_ms: Some(delay_ms),
                            ..Default::default()
                        }),
                    })
                }
                Some(Behavior::Fail { message, delay_ms }) => {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    Err(CompareError::Provider(message.to_string()))
                }
                Some(Behavior::Hang) => std::future::pending().await,
                None => Err(CompareError::MissingResult(provider_id.to_string())),
            }
        }

        async fn check_health(&self) -> Result<()> {
            Ok(())
        }
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn orchestrator(backend: Arc<MockBackend>) -> ComparisonOrchestrator {
        ComparisonOrchestrator::new(backend, OrchestratorConfig::default())
    }

    #[test]
    fn test_orchestrator_config_default() {
        assert_eq!(OrchestratorConfig::default().call_timeout, Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_entries_created_pending_in_request_order() {
        let backend = Arc::new(MockBackend::new(&[
            ("gpt-x", Behavior::Answer { text: "a", delay_ms: 50 }),
            ("claude-y", Behavior::Answer { text: "b", delay_ms: 50 }),
            ("llama-z", Behavior::Answer { text: "c", delay_ms: 50 }),
        ]));
        let run = orchestrator(backend)
            .compare("Explain gravity", &ids(&["gpt-x", "claude-y", "llama-z"]))
            .await
            .unwrap();

        let snapshot = run.snapshot();
        assert_eq!(snapshot.len(), 3);
        let order: Vec<_> = snapshot.iter().map(|r| r.provider_id.as_str()).collect();
        assert_eq!(order, vec!["gpt-x", "claude-y", "llama-z"]);
        assert!(snapshot.iter().all(|r| r.is_pending()));
        assert_eq!(run.pending_count(), 3);
    }

    #[tokio::test]
    async fn test_success_and_error_are_isolated() {
        let backend = Arc::new(MockBackend::new(&[
            ("gpt-x", Behavior::Answer { text: "Mass attracts mass.", delay_ms: 20 }),
            ("claude-y", Behavior::Fail { message: "rate limited", delay_ms: 5 }),
        ]));
        let run = orchestrator(backend)
            .compare("Explain gravity", &ids(&["gpt-x", "claude-y"]))
            .await
            .unwrap();

        let results = run.wait_all().await;
        assert_eq!(results[0].provider_id, "gpt-x");
        assert_eq!(results[0].text(), Some("Mass attracts mass."));
        assert!(results[0].error_message().is_none());
        assert_eq!(results[0].metadata().unwrap().latency_ms, Some(20));

        assert_eq!(results[1].provider_id, "claude-y");
        assert!(results[1].is_error());
        assert_eq!(results[1].error_message(), Some("rate limited"));
        assert!(results[1].text().is_none());
    }

    #[tokio::test]
    async fn test_next_settled_reports_completion_order() {
        let backend = Arc::new(MockBackend::new(&[
            ("slow", Behavior::Answer { text: "s", delay_ms: 60 }),
            ("fast", Behavior::Answer { text: "f", delay_ms: 5 }),
        ]));
        let mut run = orchestrator(backend)
            .compare("hi", &ids(&["slow", "fast"]))
            .await
            .unwrap();

        let (first_index, first) = run.next_settled().await.unwrap();
        assert_eq!(first_index, 1);
        assert_eq!(first.provider_id, "fast");
        // Order of the snapshot is unaffected by who finished first
        let snapshot = run.snapshot();
        assert_eq!(snapshot[0].provider_id, "slow");
        assert!(snapshot[0].is_pending());
        assert!(snapshot[1].is_success());

        let (second_index, _) = run.next_settled().await.unwrap();
        assert_eq!(second_index, 0);
        assert!(run.next_settled().await.is_none());
        assert!(run.is_complete());
    }

    #[tokio::test]
    async fn test_status_is_monotonic() {
        let backend = Arc::new(MockBackend::new(&[(
            "gpt-x",
            Behavior::Answer { text: "done", delay_ms: 10 },
        )]));
        let run = orchestrator(backend)
            .compare("hi", &ids(&["gpt-x"]))
            .await
            .unwrap();

        let mut rx = run.subscribe(0).unwrap();
        assert!(rx.borrow().is_pending());
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_success());
        // The writer is gone after settling, so no further change can ever arrive
        assert!(rx.changed().await.is_err());
        assert!(rx.borrow().is_success());
    }

    #[tokio::test]
    async fn test_empty_prompt_is_rejected_without_calls() {
        let backend = Arc::new(MockBackend::new(&[(
            "gpt-x",
            Behavior::Answer { text: "a", delay_ms: 0 },
        )]));
        let result = orchestrator(backend.clone())
            .compare("   ", &ids(&["gpt-x"]))
            .await;
        assert!(matches!(result, Err(CompareError::InvalidInput)));
        tokio::task::yield_now().await;
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_selection_uses_default_set() {
        let backend = Arc::new(
            MockBackend::new(&[
                ("openai", Behavior::Answer { text: "o", delay_ms: 0 }),
                ("ollama", Behavior::Answer { text: "l", delay_ms: 0 }),
            ])
            .with_defaults(&["openai", "ollama"]),
        );
        let run = orchestrator(backend).compare("hi", &[]).await.unwrap();
        let order: Vec<_> = run.snapshot().into_iter().map(|r| r.provider_id).collect();
        assert_eq!(order, vec!["openai", "ollama"]);
        let results = run.wait_all().await;
        assert!(results.iter().all(|r| r.is_success()));
    }

    #[tokio::test]
    async fn test_empty_default_set_is_an_error() {
        let backend = Arc::new(MockBackend::new(&[]));
        let result = orchestrator(backend).compare("hi", &[]).await;
        assert!(matches!(result, Err(CompareError::NoProviders)));
    }

    #[tokio::test]
    async fn test_duplicates_keep_first_position() {
        let backend = Arc::new(MockBackend::new(&[
            ("a", Behavior::Answer { text: "a", delay_ms: 0 }),
            ("b", Behavior::Answer { text: "b", delay_ms: 0 }),
        ]));
        let run = orchestrator(backend)
            .compare("hi", &ids(&["a", "b", "a"]))
            .await
            .unwrap();
        assert_eq!(run.len(), 2);
        let results = run.wait_all().await;
        assert_eq!(results[0].provider_id, "a");
        assert_eq!(results[1].provider_id, "b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_call_timeout_only_affects_slow_provider() {
        let backend = Arc::new(MockBackend::new(&[
            ("stuck", Behavior::Hang),
            ("quick", Behavior::Answer { text: "ok", delay_ms: 10 }),
        ]));
        let orchestrator = ComparisonOrchestrator::new(
            backend,
            OrchestratorConfig {
                call_timeout: Duration::from_secs(2),
            },
        );
        let run = orchestrator
            .compare("hi", &ids(&["stuck", "quick"]))
            .await
            .unwrap();

        let results = run.wait_all().await;
        assert!(results[0].is_error());
        assert!(results[0].error_message().unwrap().contains("timed out"));
        assert_eq!(results[1].text(), Some("ok"));
    }

    #[tokio::test]
    async fn test_runs_are_independent() {
        let backend = Arc::new(MockBackend::new(&[(
            "gpt-x",
            Behavior::Answer { text: "a", delay_ms: 5 },
        )]));
        let orchestrator = orchestrator(backend.clone());

        let first = orchestrator.compare("one", &ids(&["gpt-x"])).await.unwrap();
        let second = orchestrator.compare("two", &ids(&["gpt-x"])).await.unwrap();
        assert_ne!(first.id(), second.id());

        let first_results = first.wait_all().await;
        assert!(first_results[0].is_success());
        // The second run's entry is its own, settled independently
        let second_results = second.wait_all().await;
        assert!(second_results[0].is_success());
        assert_eq!(backend.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_dropping_run_abandons_calls() {
        let backend = Arc::new(MockBackend::new(&[("stuck", Behavior::Hang)]));
        let run = orchestrator(backend)
            .compare("hi", &ids(&["stuck"]))
            .await
            .unwrap();
        let mut rx = run.subscribe(0).unwrap();
        drop(run);
        // The task exits without settling, dropping the only writer
        assert!(rx.changed().await.is_err());
        assert!(rx.borrow().is_pending());
    }

    #[test]
    fn test_dedup_preserving_order() {
        assert_eq!(
            dedup_preserving_order(ids(&["b", "a", "b", "c", "a"])),
            ids(&["b", "a", "c"])
        );
    }
}
