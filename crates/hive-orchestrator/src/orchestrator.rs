use crate::checkpoint::{AbandonEntry, Checkpoint, FailureEntry};
use crate::graph::{AgentState, DependencyGraph, FailureDisposition};
use crate::prompts::build_prompt;
use crate::templates::{default_handoffs, RoleTemplates};
use chrono::Utc;
use hive_agent::{AgentRunner, BackendFactory, Pacer, RetryPolicy, SessionLimits};
use hive_core::{AgentResult, AgentTask, HiveResult, RunContext, ToolCall, WorkflowSpec};
use hive_coord::{CommunicationHub, FileCoordinator, LoopConfig, LoopDetector};
use hive_tools::{register_builtins, ContentSynthesizer, InvokeOutcome, ToolInvoker, ToolRegistry};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Attribution id for files the orchestrator writes on an agent's behalf.
const ORCHESTRATOR_ID: &str = "orchestrator";

/// Tunables for one orchestration run.
#[derive(Clone)]
pub struct OrchestratorConfig {
    /// Maximum agents admitted to one wave.
    pub max_parallel: usize,
    /// Failed-attempt budget per agent before recovery escalates.
    pub max_retries: u32,
    /// Checkpoint after this many completions.
    pub checkpoint_every: u32,
    /// Inter-launch delay between agents in a parallel wave.
    pub launch_stagger: Duration,
    /// How long running sessions get after cancellation before being killed.
    pub cancel_grace: Duration,
    /// Bounded wait for tool-level path locks.
    pub lock_wait: Duration,
    /// Shared LLM request budget per minute.
    pub requests_per_min: f64,
    /// Write-attempt and reasoning caps.
    pub loop_config: LoopConfig,
    /// Per-session tool and wall-clock budgets.
    pub limits: SessionLimits,
    /// Transport retry policy.
    pub retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_parallel: 3,
            max_retries: 2,
            checkpoint_every: 2,
            launch_stagger: Duration::from_secs(3),
            cancel_grace: Duration::from_secs(30),
            lock_wait: Duration::from_secs(10),
            requests_per_min: 20.0,
            loop_config: LoopConfig::default(),
            limits: SessionLimits::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every agent completed or was safely abandoned with synthesis.
    Success,
    /// A critical agent was abandoned without substitute.
    CriticalAbandoned,
    /// Pending agents with unmet dependencies and nothing running.
    Deadlock,
    /// The run was cancelled externally.
    Cancelled,
}

/// Final summary of one run; serialized into `final_context.json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// The run id.
    pub run_id: Uuid,
    /// How the run ended.
    pub outcome: RunOutcome,
    /// Completed agent ids.
    pub completed: Vec<String>,
    /// Agents that failed at least once, with retry history.
    pub failed: Vec<FailureEntry>,
    /// Abandoned agents with reasons.
    pub abandoned: Vec<AbandonEntry>,
    /// Wall-clock duration.
    pub duration_ms: u64,
}

impl RunReport {
    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self.outcome {
            RunOutcome::Success => 0,
            RunOutcome::CriticalAbandoned => 1,
            RunOutcome::Deadlock => 2,
            RunOutcome::Cancelled => 3,
        }
    }
}

/// Handle for cancelling a running orchestration from outside.
#[derive(Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Requests cancellation: no further waves are admitted, running
    /// sessions get the grace period, then they are killed.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// The top-level orchestration engine.
///
/// Consults the dependency graph for waves of ready agents, drives each
/// through an [`AgentRunner`] session, records results in the hub, and
/// applies recovery (retry, handoff, direct synthesis, abandonment) when a
/// session fails. Another agent's outputs become observable only after it
/// completes; partial outputs from a running agent are never exposed.
pub struct Orchestrator {
    run: Arc<RunContext>,
    hub: Arc<CommunicationHub>,
    coordinator: Arc<FileCoordinator>,
    detector: Arc<LoopDetector>,
    invoker: Arc<ToolInvoker>,
    pacer: Arc<Pacer>,
    graph: Mutex<DependencyGraph>,
    templates: RoleTemplates,
    handoffs: HashMap<String, String>,
    backend_factory: BackendFactory,
    config: OrchestratorConfig,
    cancelled: Arc<AtomicBool>,
}

impl Orchestrator {
    /// Wires up all components for one run. Rejects invalid workflows
    /// (duplicate ids, unknown dependencies, cycles) before scheduling.
    pub fn new(
        spec: &WorkflowSpec,
        run: RunContext,
        backend_factory: BackendFactory,
        config: OrchestratorConfig,
    ) -> HiveResult<Self> {
        let graph = DependencyGraph::new(spec, config.max_retries)?;
        let run = Arc::new(run);
        let project = run
            .project_root
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("project")
            .to_string();
        let hub = Arc::new(CommunicationHub::new());
        let coordinator = Arc::new(FileCoordinator::new());
        let detector = Arc::new(LoopDetector::with_config(config.loop_config));
        let mut registry = ToolRegistry::new();
        register_builtins(&mut registry);
        let invoker = Arc::new(
            ToolInvoker::new(
                Arc::new(registry),
                coordinator.clone(),
                detector.clone(),
                run.clone(),
                hub.clone(),
                Arc::new(ContentSynthesizer::new(project)),
            )?
            .with_lock_wait(config.lock_wait),
        );
        let pacer = Arc::new(Pacer::new(config.requests_per_min));

        Ok(Self {
            run,
            hub,
            coordinator,
            detector,
            invoker,
            pacer,
            graph: Mutex::new(graph),
            templates: RoleTemplates::default(),
            handoffs: default_handoffs(),
            backend_factory,
            config,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Replaces the role templates.
    pub fn with_templates(mut self, templates: RoleTemplates) -> Self {
        self.templates = templates;
        self
    }

    /// Replaces the handoff map.
    pub fn with_handoffs(mut self, handoffs: HashMap<String, String>) -> Self {
        self.handoffs = handoffs;
        self
    }

    /// The shared hub (artifacts, attributions, results).
    pub fn hub(&self) -> &Arc<CommunicationHub> {
        &self.hub
    }

    /// The file coordinator (diagnostics).
    pub fn coordinator(&self) -> &Arc<FileCoordinator> {
        &self.coordinator
    }

    /// A handle that cancels this run from another task.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.cancelled.clone())
    }

    /// Current scheduling state of an agent (diagnostics and tests).
    pub async fn agent_state(&self, id: &str) -> Option<AgentState> {
        self.graph.lock().await.state(id).cloned()
    }

    /// Loads a checkpoint, placing recorded agents in their terminal sets.
    /// The next [`Orchestrator::run`] continues from `recompute_ready`.
    pub async fn resume_from(&self, path: &Path) -> HiveResult<()> {
        let checkpoint = Checkpoint::load(path).await?;
        let abandoned: Vec<(String, String, bool)> = checkpoint
            .abandoned
            .iter()
            .map(|a| (a.agent_id.clone(), a.reason.clone(), a.deliverables_synthesized))
            .collect();
        self.hub.restore(checkpoint.hub).await;
        self.graph
            .lock()
            .await
            .apply_checkpoint(&checkpoint.completed, &abandoned);
        info!(
            completed = checkpoint.completed.len(),
            abandoned = abandoned.len(),
            "Resumed from checkpoint"
        );
        Ok(())
    }

    /// Runs the workflow to a terminal state and writes
    /// `final_context.json`. Managed endings (deadlock, critical
    /// abandonment, cancellation) are reported in the outcome, not as `Err`.
    pub async fn run(&self) -> HiveResult<RunReport> {
        let started = Instant::now();
        tokio::fs::create_dir_all(&self.run.project_root).await?;
        info!(run_id = %self.run.run_id, "Starting orchestration run");

        let mut since_checkpoint = 0u32;
        let outcome = 'run: loop {
            if self.cancelled.load(Ordering::SeqCst) {
                warn!("Cancellation requested; no further waves admitted");
                break RunOutcome::Cancelled;
            }

            // Select and admit the next wave.
            let wave: Vec<(AgentTask, Option<String>)> = {
                let mut graph = self.graph.lock().await;
                graph.recompute_ready();
                if graph.is_done() {
                    // Covers criticals abandoned outside a wave, e.g. by a
                    // cascade applied from a resumed checkpoint.
                    if graph.critical_abandoned().is_empty() {
                        break RunOutcome::Success;
                    }
                    break RunOutcome::CriticalAbandoned;
                }
                if graph.is_deadlocked() {
                    error!(graph = %graph.dump(), "Deadlock: pending agents with unmet dependencies");
                    break RunOutcome::Deadlock;
                }
                let ids = graph.next_wave(self.config.max_parallel);
                let mut entries = Vec::new();
                for id in ids {
                    if let Some(task) = graph.task(&id).cloned() {
                        let previous_failure = if graph.attempts(&id) > 0 {
                            graph.last_error(&id)
                        } else {
                            None
                        };
                        graph.mark_running(&id);
                        entries.push((task, previous_failure));
                    }
                }
                entries
            };

            info!(
                agents = ?wave.iter().map(|(t, _)| t.id.as_str()).collect::<Vec<_>>(),
                "Admitting wave"
            );

            let mut handles = Vec::new();
            for (index, (task, previous_failure)) in wave.into_iter().enumerate() {
                let prompt = self
                    .build_agent_prompt(&task, previous_failure.as_deref())
                    .await;
                let system = self.templates.get(&task.role_template_id).to_string();
                let runner = AgentRunner::new(
                    (self.backend_factory)(&task),
                    self.invoker.clone(),
                    self.detector.clone(),
                    self.pacer.clone(),
                )
                .with_system_prompt(system)
                .with_limits(self.config.limits)
                .with_retry_policy(self.config.retry.clone());
                let stagger = self
                    .config
                    .launch_stagger
                    .checked_mul(index as u32)
                    .unwrap_or_default();
                let agent_id = task.id.clone();
                let spawn_id = agent_id.clone();
                let handle = tokio::spawn(async move {
                    if !stagger.is_zero() {
                        tokio::time::sleep(stagger).await;
                    }
                    runner.run(&spawn_id, &prompt).await
                });
                handles.push((agent_id, handle));
            }

            // Await the entire wave before recomputing readiness.
            let mut results: Vec<AgentResult> = Vec::new();
            for (agent_id, mut handle) in handles {
                let result = if self.cancelled.load(Ordering::SeqCst) {
                    match tokio::time::timeout(self.config.cancel_grace, &mut handle).await {
                        Ok(joined) => unwrap_join(&agent_id, joined),
                        Err(_) => {
                            handle.abort();
                            warn!(agent = %agent_id, "Session killed after cancellation grace");
                            AgentResult::failed(agent_id.as_str(), "session killed on cancellation")
                        }
                    }
                } else {
                    unwrap_join(&agent_id, handle.await)
                };
                results.push(result);
            }

            let mut fatal = None;
            for result in results {
                let agent_id = result.agent_id.clone();
                // Cascade release: an agent holds no locks past its session.
                self.coordinator.release_all(&agent_id).await;
                self.hub.record_result(result.clone()).await;

                if result.success {
                    self.detector.reset_agent(&agent_id);
                    self.hub
                        .push_completed_line(&format!(
                            "{}: ok ({} files)",
                            agent_id,
                            result.files_created.len()
                        ))
                        .await;
                    self.graph.lock().await.mark_completed(&agent_id);
                    info!(
                        agent = %agent_id,
                        duration_ms = result.duration_ms,
                        files = result.files_created.len(),
                        "Agent completed"
                    );
                    since_checkpoint += 1;
                    if since_checkpoint >= self.config.checkpoint_every {
                        since_checkpoint = 0;
                        if let Err(e) = self.write_checkpoint().await {
                            warn!(error = %e, "Checkpoint write failed");
                        }
                    }
                } else {
                    let error = result
                        .error
                        .clone()
                        .unwrap_or_else(|| "unknown failure".to_string());
                    warn!(agent = %agent_id, error = %error, "Agent session failed");
                    let disposition = self.graph.lock().await.mark_failed(&agent_id, &error);
                    if disposition == FailureDisposition::Exhausted {
                        self.recover(&agent_id, &error).await?;
                    }
                }
            }
            // A recovery cascade may have abandoned a critical dependent
            // that never ran; any critical abandonment without substitute
            // or synthesized deliverables is fatal.
            let critical = self.graph.lock().await.critical_abandoned();
            if !critical.is_empty() {
                error!(agents = ?critical, "Critical agent abandoned without substitute");
                fatal = Some(RunOutcome::CriticalAbandoned);
            }
            if let Some(outcome) = fatal {
                break 'run outcome;
            }
        };

        let report = self.build_report(outcome, started).await;
        if let Err(e) = self.write_final_context(&report).await {
            warn!(error = %e, "Failed to write final context");
        }
        info!(
            outcome = ?report.outcome,
            completed = report.completed.len(),
            abandoned = report.abandoned.len(),
            duration_ms = report.duration_ms,
            "Run finished"
        );
        Ok(report)
    }

    async fn build_agent_prompt(&self, task: &AgentTask, previous_failure: Option<&str>) -> String {
        let completed = self.hub.summarize_completed().await;
        let artifacts = self
            .hub
            .artifacts_matching(&task.interests, &task.depends_on)
            .await;
        build_prompt(
            task,
            &self.run.requirements,
            &completed,
            &artifacts,
            previous_failure,
        )
    }

    /// Recovery escalation for an agent whose retries are exhausted.
    /// Whether an abandonment here (or a dependent cascaded by it) is fatal
    /// is decided by the caller's `critical_abandoned` scan.
    async fn recover(&self, agent_id: &str, error: &str) -> HiveResult<()> {
        let task = { self.graph.lock().await.task(agent_id).cloned() };
        let Some(task) = task else {
            return Ok(());
        };

        // 1. Handoff via the static map.
        let substitute = self
            .handoffs
            .get(agent_id)
            .or_else(|| self.handoffs.get(&task.role_template_id))
            .cloned();
        if let Some(sub_id) = substitute {
            let mut graph = self.graph.lock().await;
            if !graph.contains(&sub_id) {
                let mut sub_task = task.clone();
                sub_task.id = sub_id.clone();
                sub_task.role_template_id = sub_id.clone();
                graph.substitute(agent_id, sub_task)?;
                drop(graph);
                self.detector.reset_agent(agent_id);
                self.hub
                    .push_completed_line(&format!("{agent_id}: fail (handed off to {sub_id})"))
                    .await;
                info!(agent = %agent_id, substitute = %sub_id, "Handoff recovery");
                return Ok(());
            }
        }

        // 2. Direct synthesis of declared deliverables, written through the
        // tool pipeline and attributed to the orchestrator.
        if !task.expected_deliverables.is_empty() {
            let mut all_ok = true;
            for deliverable in &task.expected_deliverables {
                let resolved = match self.run.resolve_path(deliverable) {
                    Ok(path) => path,
                    Err(e) => {
                        warn!(path = %deliverable, error = %e, "Deliverable path rejected");
                        all_ok = false;
                        continue;
                    }
                };
                if self.hub.has_file(&resolved).await {
                    continue;
                }
                let call = ToolCall {
                    id: format!("synthesis-{}", Uuid::new_v4()),
                    name: "write_file".to_string(),
                    arguments: serde_json::json!({
                        "path": deliverable,
                        "reasoning": format!("fallback deliverable for abandoned agent {agent_id}"),
                    }),
                };
                match self.invoker.invoke(ORCHESTRATOR_ID, &call).await {
                    InvokeOutcome::Completed { result, .. } if !result.is_error => {
                        info!(agent = %agent_id, path = %deliverable, "Synthesized deliverable");
                    }
                    InvokeOutcome::Completed { result, .. } => {
                        warn!(agent = %agent_id, path = %deliverable, error = %result.content, "Deliverable synthesis failed");
                        all_ok = false;
                    }
                    InvokeOutcome::LoopDetected { .. } => {
                        all_ok = false;
                    }
                }
            }
            if all_ok {
                self.graph.lock().await.mark_abandoned(
                    agent_id,
                    "retries exhausted; deliverables synthesized",
                    true,
                );
                self.detector.reset_agent(agent_id);
                self.hub
                    .push_completed_line(&format!(
                        "{agent_id}: fail ({} deliverables synthesized)",
                        task.expected_deliverables.len()
                    ))
                    .await;
                return Ok(());
            }
        }

        // 3. Abandon with dependents; the graph cascades transitive failure.
        self.graph
            .lock()
            .await
            .mark_abandoned(agent_id, &format!("retries exhausted: {error}"), false);
        self.detector.reset_agent(agent_id);
        self.hub
            .push_completed_line(&format!("{agent_id}: fail"))
            .await;
        Ok(())
    }

    async fn build_report(&self, outcome: RunOutcome, started: Instant) -> RunReport {
        let graph = self.graph.lock().await;
        let failed = graph
            .failure_records()
            .into_iter()
            .map(|(agent_id, last_error, retry_history, substitute)| FailureEntry {
                agent_id,
                last_error,
                retry_history,
                substitute,
            })
            .collect();
        let abandoned = graph
            .abandoned()
            .into_iter()
            .map(|(agent_id, reason, deliverables_synthesized)| AbandonEntry {
                agent_id,
                reason,
                deliverables_synthesized,
            })
            .collect();
        RunReport {
            run_id: self.run.run_id,
            outcome,
            completed: graph.completed(),
            failed,
            abandoned,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    async fn write_checkpoint(&self) -> HiveResult<()> {
        let (completed, abandoned, failed) = {
            let graph = self.graph.lock().await;
            let abandoned = graph
                .abandoned()
                .into_iter()
                .map(|(agent_id, reason, deliverables_synthesized)| AbandonEntry {
                    agent_id,
                    reason,
                    deliverables_synthesized,
                })
                .collect();
            let failed = graph
                .failure_records()
                .into_iter()
                .map(|(agent_id, last_error, retry_history, substitute)| FailureEntry {
                    agent_id,
                    last_error,
                    retry_history,
                    substitute,
                })
                .collect();
            (graph.completed(), abandoned, failed)
        };
        let checkpoint = Checkpoint {
            run_id: self.run.run_id,
            completed,
            failed,
            abandoned,
            hub: self.hub.snapshot().await,
            saved_at: Utc::now(),
        };
        let path = self.run.project_root.join("checkpoint.json");
        checkpoint.save(&path).await?;
        info!(path = %path.display(), "Checkpoint written");
        Ok(())
    }

    async fn write_final_context(&self, report: &RunReport) -> HiveResult<()> {
        let snapshot = self.hub.snapshot().await;
        let body = serde_json::json!({
            "run_id": report.run_id,
            "outcome": report.outcome,
            "completed": report.completed,
            "failed": report.failed,
            "abandoned": report.abandoned,
            "artifacts": snapshot.artifacts,
            "file_registry": snapshot.files,
            "decisions": snapshot.decisions,
            "completed_tasks": snapshot.completed_tasks,
            "timings": {"duration_ms": report.duration_ms},
        });
        let path = self.run.project_root.join("final_context.json");
        tokio::fs::write(&path, serde_json::to_vec_pretty(&body)?).await?;
        info!(path = %path.display(), "Final context written");
        Ok(())
    }
}

fn unwrap_join(
    agent_id: &str,
    joined: Result<AgentResult, tokio::task::JoinError>,
) -> AgentResult {
    match joined {
        Ok(result) => result,
        Err(e) => {
            error!(agent = %agent_id, error = %e, "Agent task panicked");
            AgentResult::failed(agent_id, format!("agent task panicked: {e}"))
        }
    }
}
