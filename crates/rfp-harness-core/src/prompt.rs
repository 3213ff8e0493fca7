//! Prompt templates and context formatting.
//!
//! Two templates drive the pipeline: `sufficiency_evaluator` (placeholders
//! `{context}` and `{question}`) and `rfp_expert` (placeholders `{context}`
//! and `{requirement}`). A rendered prompt is the system text, a blank
//! line, then the filled template.

use serde::Deserialize;

use crate::models::ContextWindow;

/// A system message plus a template with `{name}` placeholders.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PromptTemplate {
    pub system: String,
    pub template: String,
}

impl PromptTemplate {
    /// Fill placeholders in one pass. Substituted values are never rescanned,
    /// so context text containing `{question}` stays literal. Unknown
    /// placeholders are left untouched.
    pub fn render(&self, vars: &[(&str, &str)]) -> String {
        let mut filled = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();

        while let Some(open) = rest.find('{') {
            filled.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let replaced = after.find('}').and_then(|close| {
                let name = &after[..close];
                vars.iter()
                    .find(|(k, _)| *k == name)
                    .map(|(_, v)| (*v, close))
            });
            match replaced {
                Some((value, close)) => {
                    filled.push_str(value);
                    rest = &after[close + 1..];
                }
                None => {
                    filled.push('{');
                    rest = after;
                }
            }
        }
        filled.push_str(rest);

        format!("{}\n\n{}", self.system, filled)
    }
}

/// The templates used by the judge and the answer generator.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PromptSet {
    pub rfp_expert: PromptTemplate,
    pub sufficiency_evaluator: PromptTemplate,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            rfp_expert: PromptTemplate {
                system: RFP_EXPERT_SYSTEM.to_string(),
                template: RFP_EXPERT_TEMPLATE.to_string(),
            },
            sufficiency_evaluator: PromptTemplate {
                system: SUFFICIENCY_SYSTEM.to_string(),
                template: SUFFICIENCY_TEMPLATE.to_string(),
            },
        }
    }
}

impl PromptSet {
    pub fn answer_prompt(&self, context: &str, requirement: &str) -> String {
        self.rfp_expert
            .render(&[("context", context), ("requirement", requirement)])
    }

    pub fn sufficiency_prompt(&self, context: &str, question: &str) -> String {
        self.sufficiency_evaluator
            .render(&[("context", context), ("question", question)])
    }
}

/// Join windows into one context block, each prefixed with its source.
pub fn format_context(windows: &[ContextWindow]) -> String {
    windows
        .iter()
        .map(|w| format!("Source: {}\nContent:\n{}", w.source, w.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

const RFP_EXPERT_SYSTEM: &str = "You are an expert proposal writer answering requirements from a \
Request for Proposal on behalf of a vendor. Answer precisely and professionally, using only the \
supporting material when it is relevant. If the material does not cover the requirement, say so \
and give the best general answer you can without inventing specific facts.";

const RFP_EXPERT_TEMPLATE: &str = "Supporting material from previous proposals and product documentation:
{context}

Requirement:
{requirement}

Write the response to this requirement.";

const SUFFICIENCY_SYSTEM: &str = "You evaluate whether retrieved context contains enough \
information to answer a question. Be strict: answer YES only if the context directly supports a \
complete answer.";

const SUFFICIENCY_TEMPLATE: &str = "Context:
{context}

Question:
{question}

Reply in exactly this format:
Response: YES or NO
Explanation: <one sentence>
Additional Information Needed (if NO): <what is missing>";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_fills_placeholders_after_system() {
        let t = PromptTemplate {
            system: "SYS".into(),
            template: "C={context} Q={question}".into(),
        };
        assert_eq!(t.render(&[("context", "ctx"), ("question", "q?")]), "SYS\n\nC=ctx Q=q?");
    }

    #[test]
    fn substituted_values_are_not_rescanned() {
        let t = PromptTemplate {
            system: "S".into(),
            template: "{context}|{question}".into(),
        };
        let out = t.render(&[("context", "{question}"), ("question", "real")]);
        assert_eq!(out, "S\n\n{question}|real");
    }

    #[test]
    fn unknown_and_unclosed_braces_stay_literal() {
        let t = PromptTemplate {
            system: "S".into(),
            template: "{json} {context} {".into(),
        };
        assert_eq!(t.render(&[("context", "x")]), "S\n\n{json} x {");
    }

    #[test]
    fn context_lists_each_source() {
        let ctx = format_context(&[
            ContextWindow {
                source: "a.pdf".into(),
                text: "alpha".into(),
            },
            ContextWindow {
                source: "https://b.example".into(),
                text: "beta".into(),
            },
        ]);
        assert_eq!(
            ctx,
            "Source: a.pdf\nContent:\nalpha\n\nSource: https://b.example\nContent:\nbeta"
        );
    }

    #[test]
    fn empty_context_is_empty_string() {
        assert_eq!(format_context(&[]), "");
    }

    #[test]
    fn default_templates_carry_their_placeholders() {
        let prompts = PromptSet::default();
        let p = prompts.sufficiency_prompt("CTX", "Q");
        assert!(p.contains("CTX") && p.contains("Q") && p.contains("Response: YES or NO"));
        let a = prompts.answer_prompt("CTX", "REQ");
        assert!(a.contains("CTX") && a.contains("REQ"));
    }
}
