//! Agent loop controller: runs the answer state machine for each
//! requirement row.
//!
//! Each row gets a fresh [`AgentState`] and its own [`RowTrace`]; nothing
//! is shared between rows, so a failing row cannot disturb the next one.
//! Rows are processed sequentially and answers come back in input order.

use async_trait::async_trait;
use rfp_harness_core::graph::{run_graph, AgentState, EntryRoute, GraphNodes, SufficiencyRoute};
use rfp_harness_core::models::{ContextWindow, Scope};
use rfp_harness_core::store::{has_indexed_files, Store};
use rfp_harness_core::window::assemble_windows;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::generate::{generate_answer, APOLOGY};
use crate::judge::judge_sufficiency;
use crate::llm::ModelClient;
use crate::retriever::Retriever;
use crate::trace::{Level, RowMeta, RowTrace, TraceEvent, Tracer};

#[derive(Debug, Clone, Copy)]
pub struct AgentSettings {
    pub breadth_seed: u32,
    pub step_limit: u32,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            breadth_seed: 3,
            step_limit: 25,
        }
    }
}

/// Labels shared by every row of one batch.
#[derive(Debug, Clone)]
pub struct BatchLabel {
    pub session_id: String,
    pub rfp_name: String,
}

impl BatchLabel {
    /// Session id `{rfp}_{project}_{YYYY-MM-DD_HHMMSS}` in UTC.
    pub fn new(rfp_name: &str, project_name: &str) -> Self {
        let ts = chrono::Utc::now().format("%Y-%m-%d_%H%M%S");
        Self {
            session_id: format!("{}_{}_{}", rfp_name, project_name, ts),
            rfp_name: rfp_name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowStatus {
    Answered,
    Failed { reason: String },
}

/// Result of one row, with the details tests and traces care about.
#[derive(Debug, Clone)]
pub struct RowReport {
    /// Never empty.
    pub answer: String,
    pub status: RowStatus,
    /// Breadth used by each retrieval, in order.
    pub breadth_trail: Vec<u32>,
    pub generations: usize,
}

pub struct RfpAgent {
    store: Arc<dyn Store>,
    retriever: Retriever,
    model: ModelClient,
    tracer: Option<Arc<dyn Tracer>>,
    settings: AgentSettings,
}

impl RfpAgent {
    pub fn new(
        store: Arc<dyn Store>,
        retriever: Retriever,
        model: ModelClient,
        settings: AgentSettings,
    ) -> Self {
        Self {
            store,
            retriever,
            model,
            tracer: None,
            settings,
        }
    }

    pub fn with_tracer(mut self, tracer: Option<Arc<dyn Tracer>>) -> Self {
        self.tracer = tracer;
        self
    }

    pub fn settings(&self) -> AgentSettings {
        self.settings
    }

    /// Answer every row in order with the configured breadth seed and step
    /// limit. The output has the same length as `rows`.
    pub async fn process_row_batch(&self, rows: &[String], scope: Scope) -> Vec<String> {
        let settings = self.settings;
        self.process_row_batch_with(rows, scope, settings.breadth_seed, settings.step_limit)
            .await
    }

    /// [`process_row_batch`](Self::process_row_batch) with a per-call
    /// `breadth_seed` and `step_budget`.
    pub async fn process_row_batch_with(
        &self,
        rows: &[String],
        scope: Scope,
        breadth_seed: u32,
        step_budget: u32,
    ) -> Vec<String> {
        let label = BatchLabel::new("batch", &scope.project_id.to_string());
        let settings = AgentSettings {
            breadth_seed,
            step_limit: step_budget,
        };
        self.run_rows(rows, scope, &label, settings)
            .await
            .into_iter()
            .map(|r| r.answer)
            .collect()
    }

    /// Like [`process_row_batch`](Self::process_row_batch), returning full reports.
    pub async fn process_rows(
        &self,
        rows: &[String],
        scope: Scope,
        label: &BatchLabel,
    ) -> Vec<RowReport> {
        self.run_rows(rows, scope, label, self.settings).await
    }

    pub async fn process_row(&self, requirement: &str, meta: RowMeta) -> RowReport {
        self.run_row(requirement, meta, self.settings).await
    }

    async fn run_rows(
        &self,
        rows: &[String],
        scope: Scope,
        label: &BatchLabel,
        settings: AgentSettings,
    ) -> Vec<RowReport> {
        let mut reports = Vec::with_capacity(rows.len());
        for (i, requirement) in rows.iter().enumerate() {
            let meta = RowMeta {
                session_id: label.session_id.clone(),
                rfp_name: label.rfp_name.clone(),
                row_number: i + 1,
                scope,
            };
            reports.push(self.run_row(requirement, meta, settings).await);
        }

        if let Some(tracer) = &self.tracer {
            if let Err(e) = tracer.flush() {
                warn!("failed to flush traces: {:#}", e);
            }
        }
        reports
    }

    async fn run_row(
        &self,
        requirement: &str,
        meta: RowMeta,
        settings: AgentSettings,
    ) -> RowReport {
        let row_number = meta.row_number;
        let scope = meta.scope;
        let trace = self.tracer.as_ref().map(|t| t.start_row(meta));
        let mut run = RowRun {
            agent: self,
            scope,
            trace,
            breadth_trail: Vec::new(),
            generations: 0,
        };

        let state = AgentState::new(requirement, settings.breadth_seed, settings.step_limit);

        match run_graph(&mut run, state).await {
            Ok(state) => {
                let answer = if state.answer.trim().is_empty() {
                    APOLOGY.to_string()
                } else {
                    state.answer
                };
                info!(
                    row = row_number,
                    retrievals = run.breadth_trail.len(),
                    final_breadth = state.retrieval_breadth,
                    "row answered"
                );
                run.record(
                    Level::Info,
                    TraceEvent::Outcome {
                        message: "answered".to_string(),
                    },
                );
                RowReport {
                    answer,
                    status: RowStatus::Answered,
                    breadth_trail: run.breadth_trail,
                    generations: run.generations,
                }
            }
            Err(e) => {
                let reason = e.to_string();
                error!(row = row_number, "row failed: {}", reason);
                run.record(
                    Level::Error,
                    TraceEvent::Outcome {
                        message: reason.clone(),
                    },
                );
                RowReport {
                    answer: APOLOGY.to_string(),
                    status: RowStatus::Failed { reason },
                    breadth_trail: run.breadth_trail,
                    generations: run.generations,
                }
            }
        }
    }
}

/// Node implementations bound to one row.
struct RowRun<'a> {
    agent: &'a RfpAgent,
    scope: Scope,
    trace: Option<Box<dyn RowTrace>>,
    breadth_trail: Vec<u32>,
    generations: usize,
}

impl<'a> RowRun<'a> {
    fn record(&mut self, level: Level, event: TraceEvent) {
        if let Some(trace) = self.trace.as_mut() {
            trace.record(level, event);
        }
    }
}

#[async_trait]
impl<'a> GraphNodes for RowRun<'a> {
    async fn route_entry(&mut self, _state: &AgentState) -> EntryRoute {
        match has_indexed_files(self.agent.store.as_ref(), self.scope).await {
            Ok(true) => EntryRoute::Retrieve,
            Ok(false) => {
                info!(scope = %self.scope, "no indexed files, answering without retrieval");
                EntryRoute::DirectAnswer
            }
            Err(e) => {
                warn!(scope = %self.scope, "file lookup failed, answering without retrieval: {:#}", e);
                EntryRoute::DirectAnswer
            }
        }
    }

    async fn retrieve(&mut self, state: &AgentState) -> Vec<ContextWindow> {
        let breadth = state.retrieval_breadth;
        self.breadth_trail.push(breadth);

        let matches = self
            .agent
            .retriever
            .search(&state.requirement, self.scope, breadth as usize)
            .await;
        let windows = match assemble_windows(self.agent.store.as_ref(), &matches).await {
            Ok(windows) => windows,
            Err(e) => {
                warn!(breadth, "context assembly failed: {:#}", e);
                Vec::new()
            }
        };

        let level = if windows.is_empty() {
            Level::Warning
        } else {
            Level::Info
        };
        self.record(
            level,
            TraceEvent::Retrieval {
                query: state.requirement.clone(),
                breadth,
                matches,
                windows: windows.len(),
            },
        );
        windows
    }

    async fn judge(&mut self, state: &AgentState) -> SufficiencyRoute {
        let judgement = judge_sufficiency(state, &self.agent.model).await;
        self.record(
            Level::Info,
            TraceEvent::Evaluation {
                verdict: judgement.verdict,
                retrieve_more: judgement.route == SufficiencyRoute::RetrieveMore,
            },
        );
        judgement.route
    }

    async fn generate(&mut self, state: &AgentState) -> String {
        self.generations += 1;
        let generated = generate_answer(state, &self.agent.model).await;
        let level = if generated.fallback {
            Level::Warning
        } else {
            Level::Info
        };
        self.record(
            level,
            TraceEvent::Generation {
                answer: generated.answer.clone(),
                fallback: generated.fallback,
            },
        );
        generated.answer
    }
}
