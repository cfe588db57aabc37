//! Benchmark runner
//!
//! Executes the configured workflow for every (prompt set, provider, model)
//! triple and turns each execution into a [`RunRecord`].

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use orchestrator::{workflow_by_name, GraphError, ModelPort, WorkflowDefinition, WorkflowError};
use reasonbench_agent::{CapabilityTable, ChatClient, LlmError, ProviderConfig};
use tracing::Instrument;

use crate::{OutcomeSender, PromptSet, RunIdentity, RunOutcome, RunRecord, SuccessReport};

/// Reason attached to runs deduplicated within one invocation
pub const ALREADY_RUN: &str = "already run in this session";

/// Builds the chat client for one (provider, model)
pub trait ClientFactory: Send + Sync {
    fn client(&self, provider: &ProviderConfig, model: &str) -> Result<Arc<dyn ChatClient>, LlmError>;
}

/// Clients built from `reasonbench.toml` provider entries
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfiguredClients;

impl ClientFactory for ConfiguredClients {
    fn client(&self, provider: &ProviderConfig, model: &str) -> Result<Arc<dyn ChatClient>, LlmError> {
        reasonbench_agent::llm::connect(provider, model)
    }
}

/// Configuration for the benchmark runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Runs in flight at once; results keep enumeration order
    pub concurrency: usize,
    /// Built-in workflow to execute
    pub workflow: String,
    /// Wall-clock limit for a whole run (all nodes)
    pub run_timeout: Option<Duration>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            workflow: orchestrator::workflow::REASONING.to_string(),
            run_timeout: None,
        }
    }
}

/// Benchmark runner
///
/// Keeps the set of identities already executed, so calling [`run_all`]
/// twice on the same runner skips everything the first call ran.
///
/// [`run_all`]: BenchmarkRunner::run_all
pub struct BenchmarkRunner {
    config: RunnerConfig,
    workflow: WorkflowDefinition,
    clients: Arc<dyn ClientFactory>,
    executed: Mutex<HashSet<RunIdentity>>,
}

impl BenchmarkRunner {
    /// Create a new benchmark runner
    pub fn new(config: RunnerConfig, workflow: WorkflowDefinition, clients: Arc<dyn ClientFactory>) -> Self {
        Self {
            config,
            workflow,
            clients,
            executed: Mutex::new(HashSet::new()),
        }
    }

    /// Runner for the named built-in workflow with configured clients
    pub fn with_defaults(config: RunnerConfig) -> anyhow::Result<Self> {
        let workflow = workflow_by_name(&config.workflow).ok_or_else(|| {
            anyhow::anyhow!(
                "Unknown workflow '{}' (expected one of: {})",
                config.workflow,
                orchestrator::WORKFLOW_NAMES.join(", ")
            )
        })??;
        Ok(Self::new(config, workflow, Arc::new(ConfiguredClients)))
    }

    pub fn workflow(&self) -> &WorkflowDefinition {
        &self.workflow
    }

    /// Number of identities claimed so far
    pub fn executed_count(&self) -> usize {
        self.executed.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Mark an identity as executed; false when it already was and `force` is off
    fn claim(&self, identity: &RunIdentity, force: bool) -> bool {
        let mut executed = self.executed.lock().unwrap_or_else(|e| e.into_inner());
        let fresh = executed.insert(identity.clone());
        fresh || force
    }

    /// Run every triple, in prompt set / provider / model order
    ///
    /// Each record is sent to `sink` the moment its run finishes, so with
    /// concurrency the sink sees completion order while the returned vector
    /// keeps enumeration order. Per-run failures become
    /// [`RunOutcome::Failed`]; a graph configuration defect aborts the batch.
    pub async fn run_all(
        &self,
        prompt_sets: &[PromptSet],
        providers: &[ProviderConfig],
        force_rerun: bool,
        sink: Option<&OutcomeSender>,
    ) -> Result<Vec<RunRecord>, GraphError> {
        let capabilities = CapabilityTable::resolve(providers);
        let triples: Vec<(&PromptSet, &ProviderConfig, &str)> = prompt_sets
            .iter()
            .flat_map(|set| {
                providers.iter().flat_map(move |provider| {
                    provider
                        .models
                        .iter()
                        .map(move |model| (set, provider, model.as_str()))
                })
            })
            .collect();

        tracing::info!(
            workflow = %self.workflow.name(),
            runs = triples.len(),
            concurrency = self.config.concurrency,
            "Starting benchmark"
        );

        let capabilities = &capabilities;
        let mut runs = stream::iter(triples)
            .map(|(set, provider, model)| async move {
                let record = match self.run_one(set, provider, model, capabilities, force_rerun).await {
                    Ok(record) => record,
                    Err(e) => return Err(e),
                };
                if let Some(tx) = sink {
                    if tx.send(record.clone()).is_err() {
                        tracing::warn!("Result sink closed; continuing without persistence");
                    }
                }
                Ok::<_, GraphError>(record)
            })
            .buffered(self.config.concurrency.max(1));

        let mut records = Vec::new();
        while let Some(result) = runs.next().await {
            records.push(result?);
        }

        Ok(records)
    }

    async fn run_one(
        &self,
        set: &PromptSet,
        provider: &ProviderConfig,
        model: &str,
        capabilities: &CapabilityTable,
        force: bool,
    ) -> Result<RunRecord, GraphError> {
        let identity = RunIdentity::new(&set.name, &provider.name, model);
        let span = tracing::info_span!(
            "run",
            prompt = %identity.prompt,
            provider = %identity.provider,
            model = %identity.model
        );

        async move {
            let timestamp = Utc::now();
            let start = Instant::now();

            if !self.claim(&identity, force) {
                tracing::info!("Skipping, {}", ALREADY_RUN);
                return Ok(RunRecord {
                    identity,
                    outcome: RunOutcome::Skipped {
                        reason: ALREADY_RUN.to_string(),
                    },
                    duration_ms: 0,
                    timestamp,
                });
            }

            let outcome = match self.execute(set, provider, model, capabilities).await {
                Ok(outcome) => outcome,
                Err(e) => return Err(e),
            };
            let duration_ms = start.elapsed().as_millis() as u64;

            match &outcome {
                RunOutcome::Success(report) => tracing::info!(
                    duration_ms,
                    fallback_nodes = ?report.fallback_nodes,
                    verified = report.verification().map(|v| v.is_correct),
                    "Run succeeded"
                ),
                RunOutcome::Failed { error } => {
                    tracing::warn!(duration_ms, error = %error, "Run failed")
                }
                RunOutcome::Skipped { .. } => {}
            }

            Ok(RunRecord {
                identity,
                outcome,
                duration_ms,
                timestamp,
            })
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        set: &PromptSet,
        provider: &ProviderConfig,
        model: &str,
        capabilities: &CapabilityTable,
    ) -> Result<RunOutcome, GraphError> {
        let capability = capabilities.get(&provider.name, model);
        let initial = set.seed().build(&capability);

        let client = match self.clients.client(provider, model) {
            Ok(client) => client,
            Err(e) => {
                return Ok(RunOutcome::Failed {
                    error: format!("Client error: {}", e),
                })
            }
        };

        let graph = self.workflow.instantiate(ModelPort::new(client, capability));
        let result = match self.config.run_timeout {
            Some(limit) => match tokio::time::timeout(limit, graph.run(initial)).await {
                Ok(result) => result,
                Err(_) => {
                    return Ok(RunOutcome::Failed {
                        error: format!("Timeout after {:?}", limit),
                    })
                }
            },
            None => graph.run(initial).await,
        };

        match result {
            Ok(run) => Ok(RunOutcome::Success(SuccessReport::from_run(run))),
            Err(WorkflowError::Step(e)) => Ok(RunOutcome::Failed {
                error: e.to_string(),
            }),
            Err(WorkflowError::Graph(e)) => {
                tracing::error!(error = %e, "Workflow graph is misconfigured");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reasonbench_agent::llm::ScriptedClient;
    use reasonbench_agent::{Message, OutputSchema, ProviderKind, StructuredReply};

    struct Scripted(ScriptedClient);

    impl ClientFactory for Scripted {
        fn client(&self, _: &ProviderConfig, _: &str) -> Result<Arc<dyn ChatClient>, LlmError> {
            Ok(Arc::new(self.0.clone()))
        }
    }

    struct Refusing;

    impl ClientFactory for Refusing {
        fn client(&self, provider: &ProviderConfig, _: &str) -> Result<Arc<dyn ChatClient>, LlmError> {
            Err(LlmError::MissingApiKey(format!("{}_KEY", provider.name.to_uppercase())))
        }
    }

    fn runner(clients: Arc<dyn ClientFactory>) -> BenchmarkRunner {
        let workflow = orchestrator::reasoning_workflow().unwrap();
        BenchmarkRunner::new(RunnerConfig::default(), workflow, clients)
    }

    fn provider() -> ProviderConfig {
        ProviderConfig::new("local", ProviderKind::Scripted).with_models(vec!["m1", "m2"])
    }

    #[test]
    fn test_runner_config_default() {
        let config = RunnerConfig::default();
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.workflow, "reasoning");
        assert!(config.run_timeout.is_none());
    }

    #[test]
    fn test_with_defaults_rejects_unknown_workflow() {
        let config = RunnerConfig {
            workflow: "tree-of-thought".to_string(),
            ..Default::default()
        };
        assert!(BenchmarkRunner::with_defaults(config).is_err());
    }

    #[test]
    fn test_claim_is_once_unless_forced() {
        let runner = runner(Arc::new(Refusing));
        let id = RunIdentity::new("p", "local", "m1");
        assert!(runner.claim(&id, false));
        assert!(!runner.claim(&id, false));
        assert!(runner.claim(&id, true));
        assert_eq!(runner.executed_count(), 1);
    }

    #[tokio::test]
    async fn test_client_error_becomes_failed_record() {
        let runner = runner(Arc::new(Refusing));
        let sets = vec![PromptSet::new("cubes", "What is 3^3?")];

        let records = runner.run_all(&sets, &[provider()], false, None).await.unwrap();

        assert_eq!(records.len(), 2);
        for record in &records {
            match &record.outcome {
                RunOutcome::Failed { error } => assert!(error.contains("LOCAL_KEY")),
                other => panic!("expected failure, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_records_follow_enumeration_order() {
        let client = ScriptedClient::new("m").without_structured_output();
        let runner = runner(Arc::new(Scripted(client)));
        let sets = vec![PromptSet::new("a", "1+1?"), PromptSet::new("b", "2+2?")];

        let records = runner.run_all(&sets, &[provider()], false, None).await.unwrap();

        let ids: Vec<String> = records.iter().map(|r| r.identity.to_string()).collect();
        assert_eq!(ids, vec!["a/local/m1", "a/local/m2", "b/local/m1", "b/local/m2"]);
        assert!(records.iter().all(|r| r.outcome.is_success()));
    }

    /// Delays every call before answering
    struct Slow {
        inner: ScriptedClient,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl ChatClient for Slow {
        async fn invoke(&self, messages: &[Message]) -> Result<String, LlmError> {
            tokio::time::sleep(self.delay).await;
            self.inner.invoke(messages).await
        }

        async fn invoke_structured(
            &self,
            messages: &[Message],
            schema: &OutputSchema,
        ) -> Result<StructuredReply, LlmError> {
            tokio::time::sleep(self.delay).await;
            self.inner.invoke_structured(messages, schema).await
        }

        fn model(&self) -> &str {
            self.inner.model()
        }
    }

    /// Provider "slow" stalls each call; every other provider answers at once
    struct SlowFirst;

    impl ClientFactory for SlowFirst {
        fn client(&self, provider: &ProviderConfig, model: &str) -> Result<Arc<dyn ChatClient>, LlmError> {
            let inner = ScriptedClient::new(model).without_structured_output();
            let delay = if provider.name == "slow" {
                Duration::from_millis(300)
            } else {
                Duration::ZERO
            };
            Ok(Arc::new(Slow { inner, delay }))
        }
    }

    #[tokio::test]
    async fn test_finished_runs_reach_sink_before_slower_earlier_ones() {
        let workflow = orchestrator::reasoning_workflow().unwrap();
        let config = RunnerConfig {
            concurrency: 2,
            ..Default::default()
        };
        let runner = BenchmarkRunner::new(config, workflow, Arc::new(SlowFirst));
        let sets = vec![PromptSet::new("a", "1+1?")];
        let providers = vec![
            ProviderConfig::new("slow", ProviderKind::Scripted).with_models(vec!["m1"]),
            ProviderConfig::new("fast", ProviderKind::Scripted).with_models(vec!["m1"]),
        ];
        let (tx, mut rx) = crate::outcome_channel();

        let records = runner.run_all(&sets, &providers, false, Some(&tx)).await.unwrap();
        drop(tx);

        let mut streamed = Vec::new();
        while let Some(record) = rx.recv().await {
            streamed.push(record.identity.provider);
        }
        assert_eq!(streamed, vec!["fast", "slow"]);

        let returned: Vec<&str> = records.iter().map(|r| r.identity.provider.as_str()).collect();
        assert_eq!(returned, vec!["slow", "fast"]);
    }

    #[tokio::test]
    async fn test_records_are_streamed_to_sink() {
        let client = ScriptedClient::new("m").without_structured_output();
        let runner = runner(Arc::new(Scripted(client)));
        let sets = vec![PromptSet::new("a", "1+1?")];
        let (tx, mut rx) = crate::outcome_channel();

        runner.run_all(&sets, &[provider()], false, Some(&tx)).await.unwrap();
        drop(tx);

        let mut streamed = Vec::new();
        while let Some(record) = rx.recv().await {
            streamed.push(record.identity.model);
        }
        assert_eq!(streamed, vec!["m1", "m2"]);
    }
}
