//! Sufficiency judge: decides whether the current supporting docs are
//! enough to answer, or whether retrieval should widen.

use rfp_harness_core::graph::{route_for_verdict, sufficiency_precheck, AgentState, SufficiencyRoute};
use rfp_harness_core::prompt::format_context;
use rfp_harness_core::verdict::{parse_verdict, SufficiencyVerdict};
use tracing::{debug, warn};

use crate::llm::ModelClient;

#[derive(Debug, Clone)]
pub struct Judgement {
    pub route: SufficiencyRoute,
    /// Parsed model output; `None` when the model was not consulted or failed.
    pub verdict: Option<SufficiencyVerdict>,
}

/// Route after a retrieval.
///
/// Empty docs or a nearly spent step budget go straight to generation
/// without a model call. A failed model call also generates with whatever
/// context exists. Otherwise only an explicit `YES` stops retrieval.
pub async fn judge_sufficiency(state: &AgentState, model: &ModelClient) -> Judgement {
    if let Some(route) = sufficiency_precheck(state) {
        debug!(
            docs = state.supporting_docs.len(),
            remaining_steps = state.remaining_steps,
            "sufficiency decided without model"
        );
        return Judgement {
            route,
            verdict: None,
        };
    }

    let context = format_context(&state.supporting_docs);
    match model
        .sufficiency_completion(&context, &state.requirement)
        .await
    {
        Some(raw) => {
            let verdict = parse_verdict(&raw);
            let route = route_for_verdict(&verdict);
            debug!(decision = ?verdict.decision, ?route, "sufficiency verdict");
            Judgement {
                route,
                verdict: Some(verdict),
            }
        }
        None => {
            warn!("sufficiency check unavailable, generating with current context");
            Judgement {
                route: SufficiencyRoute::Generate,
                verdict: None,
            }
        }
    }
}
