//! Scripted collaborators for driving `RfpAgent` without network access.

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use rfp_harness::agent::{AgentSettings, RfpAgent};
use rfp_harness::llm::ModelClient;
use rfp_harness::retriever::Retriever;
use rfp_harness::retry::BackoffPolicy;
use rfp_harness_core::embedding::EmbeddingProvider;
use rfp_harness_core::llm::LanguageModel;
use rfp_harness_core::models::{ChunkText, FileRecord, MatchPoint, Scope};
use rfp_harness_core::prompt::{PromptSet, PromptTemplate};
use rfp_harness_core::store::memory::InMemoryStore;
use rfp_harness_core::store::{Store, VectorIndex};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub struct FixedEmbedder;

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    fn model_name(&self) -> &str {
        "fixed"
    }
    fn dims(&self) -> usize {
        1
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0]).collect())
    }
}

/// Returns `hits` (truncated to `k`) and records every requested `k`.
pub struct ScriptedIndex {
    pub hits: Vec<MatchPoint>,
    pub fail: bool,
    pub requested: Mutex<Vec<usize>>,
}

impl ScriptedIndex {
    pub fn new(hits: Vec<MatchPoint>) -> Arc<Self> {
        Arc::new(Self {
            hits,
            fail: false,
            requested: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            hits: Vec::new(),
            fail: true,
            requested: Mutex::new(Vec::new()),
        })
    }

    pub fn requested(&self) -> Vec<usize> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl VectorIndex for ScriptedIndex {
    async fn nearest_neighbors(
        &self,
        _query_vec: &[f32],
        _scope: Scope,
        k: usize,
    ) -> Result<Vec<MatchPoint>> {
        self.requested.lock().unwrap().push(k);
        if self.fail {
            bail!("index offline");
        }
        Ok(self.hits.iter().take(k).cloned().collect())
    }
}

pub fn hit(file_id: i64, user_id: i64, chunk_number: i64) -> MatchPoint {
    MatchPoint {
        vector_id: format!("{}-{}", file_id, chunk_number),
        file_id: Some(file_id),
        user_id: Some(user_id),
        chunk_number: Some(chunk_number),
        distance: 0.9,
    }
}

/// Outcome of one scripted model call.
#[derive(Clone, Debug)]
pub enum Reply {
    Text(String),
    Fail,
}

pub fn text(s: &str) -> Reply {
    Reply::Text(s.to_string())
}

/// Tells judge and answer prompts apart by their system line.
pub struct ScriptedModel {
    judge_replies: Mutex<VecDeque<Reply>>,
    judge_default: Reply,
    answer_reply: Reply,
    pub judge_prompts: Mutex<Vec<String>>,
    pub answer_prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(judge_replies: Vec<Reply>, judge_default: Reply, answer_reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            judge_replies: Mutex::new(judge_replies.into()),
            judge_default,
            answer_reply,
            judge_prompts: Mutex::new(Vec::new()),
            answer_prompts: Mutex::new(Vec::new()),
        })
    }

    /// Judge always says YES; answers echo a fixed draft.
    pub fn agreeable() -> Arc<Self> {
        Self::new(Vec::new(), text("Response: YES\nExplanation: covered"), text("Draft answer"))
    }

    pub fn judge_calls(&self) -> usize {
        self.judge_prompts.lock().unwrap().len()
    }

    pub fn answer_calls(&self) -> usize {
        self.answer_prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str, _temperature: f32) -> Result<String> {
        let reply = if prompt.starts_with("JUDGE") {
            self.judge_prompts.lock().unwrap().push(prompt.to_string());
            self.judge_replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.judge_default.clone())
        } else {
            self.answer_prompts.lock().unwrap().push(prompt.to_string());
            self.answer_reply.clone()
        };
        match reply {
            Reply::Text(s) => Ok(s),
            Reply::Fail => bail!("model rejected request"),
        }
    }
}

pub fn test_prompts() -> PromptSet {
    PromptSet {
        rfp_expert: PromptTemplate {
            system: "ANSWER".to_string(),
            template: "{context}\n---\n{requirement}".to_string(),
        },
        sufficiency_evaluator: PromptTemplate {
            system: "JUDGE".to_string(),
            template: "{context}\n---\n{question}".to_string(),
        },
    }
}

/// Which [`Store`] lookup [`FaultyStore`] fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    ProjectFiles,
    ChunksInRange,
}

/// Delegates to an [`InMemoryStore`] except for one failing lookup.
pub struct FaultyStore {
    pub inner: Arc<InMemoryStore>,
    pub fault: Fault,
}

impl FaultyStore {
    pub fn new(inner: Arc<InMemoryStore>, fault: Fault) -> Arc<Self> {
        Arc::new(Self { inner, fault })
    }
}

#[async_trait]
impl Store for FaultyStore {
    async fn project_files(&self, scope: Scope) -> Result<Vec<FileRecord>> {
        if self.fault == Fault::ProjectFiles {
            bail!("database is locked");
        }
        self.inner.project_files(scope).await
    }

    async fn chunks_in_range(
        &self,
        file_id: i64,
        user_id: i64,
        start: i64,
        end: i64,
    ) -> Result<Vec<ChunkText>> {
        if self.fault == Fault::ChunksInRange {
            bail!("disk I/O error");
        }
        self.inner.chunks_in_range(file_id, user_id, start, end).await
    }

    async fn file_display_name(&self, file_id: i64, user_id: i64) -> Result<String> {
        self.inner.file_display_name(file_id, user_id).await
    }
}

pub fn agent(
    store: Arc<InMemoryStore>,
    index: Arc<ScriptedIndex>,
    model: Arc<ScriptedModel>,
    settings: AgentSettings,
) -> RfpAgent {
    agent_over(store, index, model, settings)
}

pub fn agent_over(
    store: Arc<dyn Store>,
    index: Arc<ScriptedIndex>,
    model: Arc<ScriptedModel>,
    settings: AgentSettings,
) -> RfpAgent {
    let retriever = Retriever::new(Arc::new(FixedEmbedder), index, BackoffPolicy::none());
    let client = ModelClient::new(model, test_prompts(), BackoffPolicy::none());
    RfpAgent::new(store, retriever, client, settings)
}

pub fn numbered_chunks(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("chunk {}", i)).collect()
}
