//! The per-row answer state machine.
//!
//! ```text
//!            ┌──────────── no indexed files ─────────────┐
//!  START ────┤                                           ▼
//!            └──▶ retrieve ──── sufficient ────────▶ generate ──▶ END
//!                   ▲  │
//!                   │  └── insufficient ──▶ increase_breadth
//!                   └──────────────────────────────┘
//! ```
//!
//! [`run_graph`] walks this table for one row. Every node execution costs
//! one step from [`AgentState::remaining_steps`]; a walk that would run a
//! node with no steps left stops with [`GraphError::StepLimitExceeded`].
//! That ceiling is the termination guarantee. The judge's
//! [`sufficiency_precheck`] is a softer guard that normally reaches
//! `generate` well before the ceiling.

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::error::GraphError;
use crate::models::ContextWindow;
use crate::verdict::SufficiencyVerdict;

/// Steps kept in reserve for the final answer. At or below this many
/// remaining steps the judge routes straight to `generate`.
pub const RESERVED_STEPS: u32 = 2;

/// Mutable per-row record, owned by exactly one walk.
#[derive(Debug, Clone, Serialize)]
pub struct AgentState {
    pub requirement: String,
    /// Latest retrieval snapshot. Replaced, never appended, on each retrieve.
    pub supporting_docs: Vec<ContextWindow>,
    /// Nearest neighbours requested per retrieval. Only ever grows.
    pub retrieval_breadth: u32,
    /// Node executions left before the ceiling. Only ever shrinks.
    pub remaining_steps: u32,
    pub answer: String,
    step_limit: u32,
}

impl AgentState {
    pub fn new(requirement: impl Into<String>, breadth_seed: u32, step_limit: u32) -> Self {
        Self {
            requirement: requirement.into(),
            supporting_docs: Vec::new(),
            retrieval_breadth: breadth_seed.max(1),
            remaining_steps: step_limit,
            answer: String::new(),
            step_limit,
        }
    }

    pub fn step_limit(&self) -> u32 {
        self.step_limit
    }

    /// Consume one step for the node about to run.
    pub fn take_step(&mut self) -> Result<(), GraphError> {
        if self.remaining_steps == 0 {
            return Err(GraphError::StepLimitExceeded {
                limit: self.step_limit,
            });
        }
        self.remaining_steps -= 1;
        Ok(())
    }

    /// The `increase_breadth` node: request one more neighbour next time.
    pub fn increase_breadth(&mut self) {
        self.retrieval_breadth = self.retrieval_breadth.saturating_add(1);
    }
}

/// Graph nodes. `Generate` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Retrieve,
    IncreaseBreadth,
    Generate,
}

/// Outcome of the `START` edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryRoute {
    Retrieve,
    DirectAnswer,
}

/// Outcome of the sufficiency judge after `retrieve`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SufficiencyRoute {
    Generate,
    RetrieveMore,
}

impl Node {
    pub fn entry(route: EntryRoute) -> Node {
        match route {
            EntryRoute::Retrieve => Node::Retrieve,
            EntryRoute::DirectAnswer => Node::Generate,
        }
    }

    pub fn after_retrieve(route: SufficiencyRoute) -> Node {
        match route {
            SufficiencyRoute::Generate => Node::Generate,
            SufficiencyRoute::RetrieveMore => Node::IncreaseBreadth,
        }
    }

    pub fn after_increase_breadth() -> Node {
        Node::Retrieve
    }
}

/// Route without consulting the model: `Generate` when there is nothing to
/// judge or the step budget is nearly spent, `None` when the model decides.
pub fn sufficiency_precheck(state: &AgentState) -> Option<SufficiencyRoute> {
    if state.supporting_docs.is_empty() || state.remaining_steps <= RESERVED_STEPS {
        Some(SufficiencyRoute::Generate)
    } else {
        None
    }
}

/// Only an explicit `YES` ends retrieval; `NO` and unparseable output widen it.
pub fn route_for_verdict(verdict: &SufficiencyVerdict) -> SufficiencyRoute {
    if verdict.is_sufficient() {
        SufficiencyRoute::Generate
    } else {
        SufficiencyRoute::RetrieveMore
    }
}

/// Side-effecting node implementations for one row.
#[async_trait]
pub trait GraphNodes: Send {
    /// Decide the `START` edge.
    async fn route_entry(&mut self, state: &AgentState) -> EntryRoute;
    /// Fetch a fresh supporting-docs snapshot at `state.retrieval_breadth`.
    async fn retrieve(&mut self, state: &AgentState) -> Vec<ContextWindow>;
    /// Decide the edge after `retrieve`.
    async fn judge(&mut self, state: &AgentState) -> SufficiencyRoute;
    /// Produce the final answer text.
    async fn generate(&mut self, state: &AgentState) -> String;
}

/// Walk the graph from `START` to `END` for one row.
pub async fn run_graph<N>(nodes: &mut N, mut state: AgentState) -> Result<AgentState, GraphError>
where
    N: GraphNodes + ?Sized,
{
    let mut node = Node::entry(nodes.route_entry(&state).await);

    loop {
        state.take_step()?;
        debug!(
            node = ?node,
            breadth = state.retrieval_breadth,
            remaining_steps = state.remaining_steps,
            "graph step"
        );

        node = match node {
            Node::Retrieve => {
                state.supporting_docs = nodes.retrieve(&state).await;
                Node::after_retrieve(nodes.judge(&state).await)
            }
            Node::IncreaseBreadth => {
                state.increase_breadth();
                Node::after_increase_breadth()
            }
            Node::Generate => {
                state.answer = nodes.generate(&state).await;
                return Ok(state);
            }
        };
    }
}
