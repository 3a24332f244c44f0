// src/testing/mod.rs
// Deterministic in-process doubles for the capability seams

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream;

use crate::llm::{PromptMessage, TextGenerator, TokenStream};
use crate::memory::{EmbeddingFunction, IndexPoint, MemoryRecord, Scope, VectorIndex};

/// Embeds text as a normalized character histogram. Identical text embeds
/// identically and shared vocabulary raises cosine similarity, which is
/// enough for ranking assertions without a model.
pub struct MockEmbeddings {
    dimensions: usize,
    failing: AtomicBool,
}

impl MockEmbeddings {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            failing: AtomicBool::new(false),
        }
    }

    /// Make every call fail until switched back, simulating an outage.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for ch in text.chars() {
            vector[(ch as usize) % self.dimensions] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingFunction for MockEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("embeddings backend is down"));
        }
        Ok(self.vector_for(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("embeddings backend is down"));
        }
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Vector index held in a `Mutex<Vec<_>>`, preserving insertion order for
/// scroll and ranking by cosine similarity for query.
#[derive(Default)]
pub struct InMemoryIndex {
    points: Mutex<Vec<IndexPoint>>,
    failing: AtomicBool,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.points.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of stored records in insertion order.
    pub fn records(&self) -> Vec<MemoryRecord> {
        self.points
            .lock()
            .map(|points| points.iter().map(|p| p.record.clone()).collect())
            .unwrap_or_default()
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(anyhow::anyhow!("vector index is down"))
        } else {
            Ok(())
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<IndexPoint>>> {
        self.points
            .lock()
            .map_err(|_| anyhow::anyhow!("index mutex poisoned"))
    }
}

fn matches_scope(record: &MemoryRecord, scope: &Scope) -> bool {
    if record.user_id != scope.user_id {
        return false;
    }
    match &scope.conversation_id {
        Some(conv) => record.conversation_id.as_deref() == Some(conv.as_str()),
        None => true,
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn upsert(&self, new_points: Vec<IndexPoint>) -> Result<()> {
        self.check_available()?;
        let mut points = self.lock()?;
        for point in new_points {
            match points.iter_mut().find(|p| p.record.id == point.record.id) {
                Some(existing) => *existing = point,
                None => points.push(point),
            }
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], scope: &Scope, k: usize) -> Result<Vec<MemoryRecord>> {
        self.check_available()?;
        let points = self.lock()?;
        let mut scored: Vec<MemoryRecord> = points
            .iter()
            .filter(|p| matches_scope(&p.record, scope))
            .map(|p| {
                let mut record = p.record.clone();
                record.score = Some(cosine(vector, &p.vector));
                record
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn scroll(&self, scope: &Scope, limit: Option<usize>) -> Result<Vec<MemoryRecord>> {
        self.check_available()?;
        let points = self.lock()?;
        let mut records: Vec<MemoryRecord> = points
            .iter()
            .filter(|p| matches_scope(&p.record, scope))
            .map(|p| p.record.clone())
            .collect();
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    async fn delete(&self, ids: &[u64]) -> Result<()> {
        self.check_available()?;
        let mut points = self.lock()?;
        points.retain(|p| !ids.contains(&p.record.id));
        Ok(())
    }

    async fn delete_by_scope(&self, scope: &Scope) -> Result<()> {
        self.check_available()?;
        let mut points = self.lock()?;
        points.retain(|p| !matches_scope(&p.record, scope));
        Ok(())
    }
}

/// Generator that replays a fixed script of deltas, with optional mid-stream
/// failure or an indefinite stall for cancellation tests.
pub struct ScriptedGenerator {
    deltas: Vec<String>,
    fail_after: Option<usize>,
    stall_after: Option<usize>,
    last_prompt: Mutex<Option<Vec<PromptMessage>>>,
}

impl ScriptedGenerator {
    pub fn new(deltas: &[&str]) -> Self {
        Self {
            deltas: deltas.iter().map(|d| d.to_string()).collect(),
            fail_after: None,
            stall_after: None,
            last_prompt: Mutex::new(None),
        }
    }

    /// Yield `n` deltas, then end the stream with an error.
    pub fn fail_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Yield `n` deltas, then never produce another item. The consumer must
    /// cancel to make progress.
    pub fn stall_after(mut self, n: usize) -> Self {
        self.stall_after = Some(n);
        self
    }

    /// The prompt passed to the most recent call, for context assertions.
    pub fn last_prompt(&self) -> Option<Vec<PromptMessage>> {
        self.last_prompt.lock().ok().and_then(|p| p.clone())
    }

    fn capture_prompt(&self, messages: &[PromptMessage]) {
        if let Ok(mut prompt) = self.last_prompt.lock() {
            *prompt = Some(messages.to_vec());
        }
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String> {
        self.capture_prompt(messages);
        if self.fail_after.is_some() {
            return Err(anyhow::anyhow!("scripted generation failure"));
        }
        Ok(self.deltas.concat())
    }

    async fn stream(&self, messages: &[PromptMessage]) -> Result<TokenStream> {
        self.capture_prompt(messages);
        let deltas = self.deltas.clone();
        let fail_after = self.fail_after;
        let stall_after = self.stall_after;

        enum Step {
            Delta(String),
            Fail,
            Stall,
        }

        let mut steps: Vec<Step> = Vec::new();
        for (i, delta) in deltas.into_iter().enumerate() {
            if fail_after == Some(i) {
                steps.push(Step::Fail);
                break;
            }
            if stall_after == Some(i) {
                steps.push(Step::Stall);
                break;
            }
            steps.push(Step::Delta(delta));
        }
        match (fail_after, stall_after) {
            (Some(n), _) if n >= steps.len() => steps.push(Step::Fail),
            (_, Some(n)) if n >= steps.len() => steps.push(Step::Stall),
            _ => {}
        }

        let stream = stream::unfold(steps.into_iter(), |mut steps| async move {
            match steps.next() {
                Some(Step::Delta(delta)) => Some((Ok(delta), steps)),
                Some(Step::Fail) => Some((Err(anyhow::anyhow!("scripted stream failure")), steps)),
                Some(Step::Stall) => {
                    futures::future::pending::<()>().await;
                    None
                }
                None => None,
            }
        });

        Ok(Box::pin(stream))
    }
}
