//! End-to-end benchmark runs against scripted providers

use std::collections::HashMap;
use std::sync::Arc;

use orchestrator::{reasoning_workflow, NodePrompt};
use reasonbench::{
    outcome_channel, BenchmarkRunner, BenchmarkSummary, ClientFactory, PromptSet, ResultSink,
    ResultsDocument, RunOutcome, RunnerConfig,
};
use reasonbench_agent::llm::{CallKind, ScriptedClient};
use reasonbench_agent::{
    ChatClient, LlmError, ProviderConfig, ProviderKind, Role, SystemPromptFallback,
};
use serde_json::json;

/// One scripted client per provider name
#[derive(Default)]
struct ScriptedProviders {
    clients: HashMap<String, ScriptedClient>,
}

impl ScriptedProviders {
    fn with(mut self, provider: &str, client: ScriptedClient) -> Self {
        self.clients.insert(provider.to_string(), client);
        self
    }
}

impl ClientFactory for ScriptedProviders {
    fn client(&self, provider: &ProviderConfig, model: &str) -> Result<Arc<dyn ChatClient>, LlmError> {
        self.clients
            .get(&provider.name)
            .map(|c| Arc::new(c.clone()) as Arc<dyn ChatClient>)
            .ok_or_else(|| LlmError::Transport(format!("no client for {}/{}", provider.name, model)))
    }
}

fn structured_client() -> ScriptedClient {
    ScriptedClient::new("scripted")
        .with_structured(
            "ProblemAnalysis",
            json!({"problem_type": "mathematical", "key_constraints": ["integer"], "approach": "repeated multiplication"}),
        )
        .with_structured(
            "Solution",
            json!({"answer": "27", "reasoning_steps": ["3*3=9", "9*3=27"], "confidence": "high"}),
        )
        .with_structured(
            "Verification",
            json!({"is_correct": true, "issues_found": [], "final_answer": "27"}),
        )
}

fn text_client() -> ScriptedClient {
    ScriptedClient::new("scripted")
        .without_structured_output()
        .with_default_text("Approach: multiply three times.\nAnswer: 27\nThis is correct.")
}

fn provider(name: &str, models: &[&str]) -> ProviderConfig {
    ProviderConfig::new(name, ProviderKind::Scripted).with_models(models.to_vec())
}

fn cubes() -> PromptSet {
    PromptSet::new("cubes", "What is 3^3?").with_system_prompt("You are a careful mathematician.")
}

fn runner(config: RunnerConfig, clients: ScriptedProviders) -> BenchmarkRunner {
    BenchmarkRunner::new(config, reasoning_workflow().unwrap(), Arc::new(clients))
}

#[tokio::test]
async fn test_structured_run_produces_verified_answer() {
    let client = structured_client();
    let runner = runner(
        RunnerConfig::default(),
        ScriptedProviders::default().with("local", client.clone()),
    );

    let records = runner
        .run_all(&[cubes()], &[provider("local", &["m1"])], false, None)
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    let RunOutcome::Success(ref report) = records[0].outcome else {
        panic!("expected success, got {:?}", records[0].outcome);
    };
    assert_eq!(report.answer().as_deref(), Some("27"));
    assert!(report.verification().unwrap().is_correct);
    assert!(report.fallback_nodes.is_empty());
    assert_eq!(report.trace, vec!["analyze", "solve", "verify"]);
    assert!(report.pending_nodes.is_empty());

    let calls = client.calls();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|c| matches!(c.kind, CallKind::Structured(_))));
    assert!(calls.iter().all(|c| c.has_role(Role::System)));
}

#[tokio::test]
async fn test_unstructured_models_still_succeed() {
    let runner = runner(
        RunnerConfig::default(),
        ScriptedProviders::default().with("local", text_client()),
    );

    let records = runner
        .run_all(&[cubes()], &[provider("local", &["m1"])], false, None)
        .await
        .unwrap();

    let RunOutcome::Success(ref report) = records[0].outcome else {
        panic!("expected success, got {:?}", records[0].outcome);
    };
    assert_eq!(report.fallback_nodes, vec!["analyze", "solve", "verify"]);
    assert_eq!(report.answer().as_deref(), Some("27"));

    let verification = report.verification().unwrap();
    assert!(verification.is_correct);
    assert_eq!(verification.final_answer, "27");
}

#[tokio::test]
async fn test_providers_without_system_role_never_receive_one() {
    let omit = text_client();
    let prepend = text_client();
    let mut prepending = provider("prepend", &["m1"]).with_system_prompt_support(false);
    prepending.system_prompt_fallback = SystemPromptFallback::PrependToUser;

    let runner = runner(
        RunnerConfig::default(),
        ScriptedProviders::default()
            .with("omit", omit.clone())
            .with("prepend", prepend.clone()),
    );
    let providers = vec![
        provider("omit", &["m1"]).with_system_prompt_support(false),
        prepending,
    ];

    let records = runner.run_all(&[cubes()], &providers, false, None).await.unwrap();
    assert!(records.iter().all(|r| r.outcome.is_success()));

    for call in omit.calls() {
        assert!(!call.has_role(Role::System));
        assert!(!call.messages[0].content.contains("careful mathematician"));
    }
    for call in prepend.calls() {
        assert!(!call.has_role(Role::System));
        assert!(call.messages[0].content.starts_with("You are a careful mathematician."));
    }
}

#[tokio::test]
async fn test_node_can_opt_out_of_system_prompt() {
    let client = structured_client();
    let set = cubes().with_node(
        "verify",
        NodePrompt {
            prompt: String::new(),
            system_prompt_included: false,
        },
    );
    let runner = runner(
        RunnerConfig::default(),
        ScriptedProviders::default().with("local", client.clone()),
    );

    runner
        .run_all(&[set], &[provider("local", &["m1"])], false, None)
        .await
        .unwrap();

    let calls = client.calls();
    assert!(calls[0].has_role(Role::System));
    assert!(calls[1].has_role(Role::System));
    assert!(!calls[2].has_role(Role::System));
}

#[tokio::test]
async fn test_second_pass_skips_everything() {
    let client = structured_client();
    let runner = runner(
        RunnerConfig::default(),
        ScriptedProviders::default().with("local", client.clone()),
    );
    let providers = vec![provider("local", &["m1", "m2"])];

    let first = runner.run_all(&[cubes()], &providers, false, None).await.unwrap();
    assert!(first.iter().all(|r| r.outcome.is_success()));
    let calls_after_first = client.calls().len();

    let second = runner.run_all(&[cubes()], &providers, false, None).await.unwrap();
    assert_eq!(second.len(), 2);
    assert!(second.iter().all(|r| r.outcome.is_skipped()));
    assert_eq!(client.calls().len(), calls_after_first);
    assert_eq!(runner.executed_count(), 2);
}

#[tokio::test]
async fn test_force_rerun_executes_again() {
    let client = structured_client();
    let runner = runner(
        RunnerConfig::default(),
        ScriptedProviders::default().with("local", client.clone()),
    );
    let providers = vec![provider("local", &["m1"])];

    runner.run_all(&[cubes()], &providers, false, None).await.unwrap();
    let again = runner.run_all(&[cubes()], &providers, true, None).await.unwrap();

    assert!(again[0].outcome.is_success());
    assert_eq!(client.calls().len(), 6);
}

#[tokio::test]
async fn test_failing_provider_is_isolated() {
    let runner = runner(
        RunnerConfig::default(),
        ScriptedProviders::default()
            .with("broken", ScriptedClient::new("x").failing("401 unauthorized"))
            .with("local", structured_client()),
    );
    let providers = vec![
        provider("broken", &["m1"]),
        provider("local", &["m1"]),
        provider("unconfigured", &["m1"]),
    ];

    let records = runner.run_all(&[cubes()], &providers, false, None).await.unwrap();

    assert_eq!(records.len(), 3);
    match &records[0].outcome {
        RunOutcome::Failed { error } => {
            assert!(error.contains("analyze"));
            assert!(error.contains("401 unauthorized"));
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(records[1].outcome.is_verified_correct());
    assert!(records[2].outcome.is_failed());

    let summary = BenchmarkSummary::from_records(&records);
    assert_eq!(summary.successful, 1);
    assert_eq!(summary.failed, 2);
}

#[tokio::test]
async fn test_concurrent_runs_keep_enumeration_order() {
    let config = RunnerConfig {
        concurrency: 4,
        ..Default::default()
    };
    let runner = runner(
        config,
        ScriptedProviders::default()
            .with("a", structured_client())
            .with("b", text_client()),
    );
    let sets = vec![cubes(), PromptSet::new("sum", "What is 2 + 2?")];
    let providers = vec![provider("a", &["m1", "m2"]), provider("b", &["m1"])];

    let records = runner.run_all(&sets, &providers, false, None).await.unwrap();

    let ids: Vec<String> = records.iter().map(|r| r.identity.to_string()).collect();
    assert_eq!(
        ids,
        vec![
            "cubes/a/m1",
            "cubes/a/m2",
            "cubes/b/m1",
            "sum/a/m1",
            "sum/a/m2",
            "sum/b/m1",
        ]
    );
}

#[tokio::test]
async fn test_results_file_tracks_every_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results").join("benchmark_results_test.json");
    let runner = runner(
        RunnerConfig::default(),
        ScriptedProviders::default()
            .with("local", structured_client())
            .with("broken", ScriptedClient::new("x").failing("connection refused")),
    );
    let providers = vec![provider("local", &["m1"]), provider("broken", &["m1"])];

    let (tx, rx) = outcome_channel();
    let sink = tokio::spawn(ResultSink::new("reasoning", Some(path.clone())).consume(rx));
    runner.run_all(&[cubes()], &providers, false, Some(&tx)).await.unwrap();
    drop(tx);
    let in_memory = sink.await.unwrap();

    let on_disk = ResultsDocument::load(&path).unwrap();
    assert_eq!(on_disk.results.len(), 2);
    assert_eq!(on_disk.prompts_used, vec!["cubes"]);
    assert_eq!(on_disk.workflow, "reasoning");
    assert_eq!(on_disk.summary.successful, 1);
    assert_eq!(on_disk.summary.failed, 1);
    assert_eq!(in_memory.results.len(), on_disk.results.len());
}
