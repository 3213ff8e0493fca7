//! Answer generator: drafts the final response for a requirement row.

use rfp_harness_core::graph::AgentState;
use rfp_harness_core::prompt::format_context;
use tracing::warn;

use crate::llm::ModelClient;

/// Answer written when the model produces nothing usable.
pub const APOLOGY: &str = "I apologize, but I was unable to generate a response at this time.";

#[derive(Debug, Clone)]
pub struct Generated {
    pub answer: String,
    /// True when [`APOLOGY`] replaced the model output.
    pub fallback: bool,
}

/// Draft an answer from the current supporting docs (possibly none).
/// The returned answer is never empty.
pub async fn generate_answer(state: &AgentState, model: &ModelClient) -> Generated {
    let context = format_context(&state.supporting_docs);
    match model.answer_completion(&context, &state.requirement).await {
        Some(text) if !text.trim().is_empty() => Generated {
            answer: text,
            fallback: false,
        },
        Some(_) => {
            warn!("model returned an empty answer");
            apology()
        }
        None => apology(),
    }
}

pub fn apology() -> Generated {
    Generated {
        answer: APOLOGY.to_string(),
        fallback: true,
    }
}
