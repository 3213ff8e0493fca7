//! Language model trait.
//!
//! The application crate provides HTTP-backed implementations; tests use
//! scripted fakes.

use anyhow::Result;
use async_trait::async_trait;

/// A text-completion model.
///
/// `Err` means the call failed. `Ok` with an empty or degenerate string is
/// a successful completion and must not be treated as a failure by the
/// model itself; callers decide what an empty answer means.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Returns the model identifier used in logs and traces.
    fn model_name(&self) -> &str;

    /// Complete `prompt` at the given sampling temperature.
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String>;
}
