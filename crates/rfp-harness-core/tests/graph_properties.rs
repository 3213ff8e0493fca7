//! Property tests for the answer state machine: every walk terminates within
//! its step limit and retrieval breadth only ever grows.

use async_trait::async_trait;
use proptest::prelude::*;
use proptest::test_runner::Config;

use rfp_harness_core::graph::{
    run_graph, sufficiency_precheck, AgentState, EntryRoute, GraphNodes, SufficiencyRoute,
};
use rfp_harness_core::models::ContextWindow;

struct Walk {
    has_files: bool,
    verdicts: Vec<bool>,
    judged: usize,
    retrieve_breadths: Vec<u32>,
    remaining_seen: Vec<u32>,
    empty_retrievals: bool,
}

#[async_trait]
impl GraphNodes for Walk {
    async fn route_entry(&mut self, _state: &AgentState) -> EntryRoute {
        if self.has_files {
            EntryRoute::Retrieve
        } else {
            EntryRoute::DirectAnswer
        }
    }

    async fn retrieve(&mut self, state: &AgentState) -> Vec<ContextWindow> {
        self.retrieve_breadths.push(state.retrieval_breadth);
        self.remaining_seen.push(state.remaining_steps);
        if self.empty_retrievals {
            return Vec::new();
        }
        vec![ContextWindow {
            source: "s".into(),
            text: "t".into(),
        }]
    }

    async fn judge(&mut self, state: &AgentState) -> SufficiencyRoute {
        if let Some(route) = sufficiency_precheck(state) {
            return route;
        }
        let yes = self.verdicts.get(self.judged).copied().unwrap_or(false);
        self.judged += 1;
        if yes {
            SufficiencyRoute::Generate
        } else {
            SufficiencyRoute::RetrieveMore
        }
    }

    async fn generate(&mut self, _state: &AgentState) -> String {
        "answer".to_string()
    }
}

fn block_on<F: std::future::Future>(f: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(f)
}

proptest! {
    #![proptest_config(Config::with_cases(256))]

    #[test]
    fn walk_terminates_within_step_limit(
        has_files in any::<bool>(),
        verdicts in proptest::collection::vec(any::<bool>(), 0..30),
        seed in 1_u32..10,
        limit in 0_u32..60,
        empty_retrievals in any::<bool>(),
    ) {
        let mut walk = Walk {
            has_files,
            verdicts,
            judged: 0,
            retrieve_breadths: Vec::new(),
            remaining_seen: Vec::new(),
            empty_retrievals,
        };
        let result = block_on(run_graph(&mut walk, AgentState::new("req", seed, limit)));

        // Each retrieve is paired with at most one breadth increase, so the
        // number of retrievals is bounded by the step limit.
        prop_assert!(walk.retrieve_breadths.len() as u32 <= limit);

        if limit >= 2 {
            let state = result.expect("limit >= 2 always reaches generate");
            prop_assert_eq!(state.answer, "answer");
        } else if has_files || limit == 0 {
            prop_assert!(result.is_err());
        }
    }

    #[test]
    fn breadth_is_monotonic_and_steps_only_shrink(
        verdicts in proptest::collection::vec(any::<bool>(), 0..30),
        seed in 1_u32..10,
        limit in 2_u32..60,
    ) {
        let mut walk = Walk {
            has_files: true,
            verdicts,
            judged: 0,
            retrieve_breadths: Vec::new(),
            remaining_seen: Vec::new(),
            empty_retrievals: false,
        };
        let state = block_on(run_graph(&mut walk, AgentState::new("req", seed, limit))).unwrap();

        prop_assert_eq!(walk.retrieve_breadths[0], seed);
        for pair in walk.retrieve_breadths.windows(2) {
            prop_assert_eq!(pair[1], pair[0] + 1);
        }
        for pair in walk.remaining_seen.windows(2) {
            prop_assert!(pair[1] < pair[0]);
        }
        prop_assert!(state.retrieval_breadth >= seed);
    }
}
