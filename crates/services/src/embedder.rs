//! Embedder (spec §4.2): text -> fixed-dimension vector, with sentence-aware
//! chunking and averaging for long input.
//!
//! Grounded on `original_source/.../embeddings/generator.py` for the
//! chunking algorithm and on `crates/services/src/embedding_client.rs`
//! (teacher's Ollama HTTP client) for the remote backend. The default
//! backend is local (`fastembed`, already an unused teacher dependency) so
//! the embedder works offline, matching spec.md's "locally hosted" framing;
//! the Ollama backend remains available for installs that prefer a single
//! model server for both generation and embeddings.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::error::EmbeddingError;
use std::sync::{Arc, OnceLock};

#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    pub embedding: Vec<f32>,
    pub chunk_count: usize,
    pub token_estimate: usize,
    pub model_name: String,
    pub success: bool,
    pub error_message: Option<String>,
}

impl EmbeddingResult {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            embedding: Vec::new(),
            chunk_count: 0,
            token_estimate: 0,
            model_name: String::new(),
            success: false,
            error_message: Some(message.into()),
        }
    }
}

/// Opaque "text -> vectors" backend. Implementations own model loading.
pub trait EmbeddingBackend: Send + Sync {
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
    fn dimension(&self) -> usize;
    fn model_name(&self) -> &str;
}

/// Local backend via `fastembed` (ONNX runtime, no network round-trip).
/// The model handle is loaded once behind a `OnceLock` and never mutated
/// after publication (spec §9 "global model cache via class attribute").
pub struct FastEmbedBackend {
    model_name: String,
    dimension: usize,
    model: OnceLock<Arc<parking_lot::Mutex<fastembed::TextEmbedding>>>,
}

impl FastEmbedBackend {
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            dimension: 384, // all-MiniLM-L6-v2 and comparable small models
            model: OnceLock::new(),
        }
    }

    fn get_or_init(&self) -> Result<&Arc<parking_lot::Mutex<fastembed::TextEmbedding>>, EmbeddingError> {
        if self.model.get().is_none() {
            let init_options = fastembed::InitOptions::new(fastembed::EmbeddingModel::AllMiniLML6V2)
                .with_show_download_progress(false);
            let model = fastembed::TextEmbedding::try_new(init_options)
                .map_err(|e| EmbeddingError::ModelLoad(e.to_string()))?;
            let _ = self.model.set(Arc::new(parking_lot::Mutex::new(model)));
        }
        Ok(self.model.get().expect("model initialized above"))
    }
}

impl EmbeddingBackend for FastEmbedBackend {
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let model = self.get_or_init()?;
        let mut guard = model.lock();
        let embeddings = guard
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::Backend(e.to_string()))?;
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[derive(Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embedding: Vec<f32>,
}

/// Remote backend: Ollama's `/api/embeddings` endpoint. Ollama has no batch
/// embedding call, so chunks are sent sequentially.
pub struct OllamaEmbeddingBackend {
    http: Client,
    base_url: String,
    model_name: String,
    dimension: usize,
}

impl OllamaEmbeddingBackend {
    pub fn new(base_url: &str, model_name: &str, dimension: usize) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model_name: model_name.to_string(),
            dimension,
        }
    }
}

impl EmbeddingBackend for OllamaEmbeddingBackend {
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let rt = tokio::runtime::Handle::try_current()
            .map_err(|_| EmbeddingError::Backend("no tokio runtime available for embedding request".into()))?;
        tokio::task::block_in_place(|| {
            rt.block_on(async {
                let mut out = Vec::with_capacity(texts.len());
                for text in texts {
                    let req = OllamaEmbedRequest { model: &self.model_name, prompt: text };
                    let url = format!("{}/api/embeddings", self.base_url);
                    let resp = self
                        .http
                        .post(&url)
                        .json(&req)
                        .send()
                        .await
                        .map_err(|e| EmbeddingError::Backend(e.to_string()))?;
                    if !resp.status().is_success() {
                        return Err(EmbeddingError::Backend(format!("ollama embeddings returned {}", resp.status())));
                    }
                    let body: OllamaEmbedResponse =
                        resp.json().await.map_err(|e| EmbeddingError::Backend(e.to_string()))?;
                    out.push(body.embedding);
                }
                Ok(out)
            })
        })
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Splits on "sentence-ending punctuation followed by whitespace" (spec
/// §4.2 step 3). The `regex` crate has no lookbehind support, so this is a
/// manual scan rather than the `(?<=[.!?])\s+` pattern a backtracking engine
/// would use.
fn split_into_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let chars: Vec<(usize, char)> = text.char_indices().collect();

    let mut i = 0usize;
    while i < chars.len() {
        let (byte_idx, ch) = chars[i];
        if matches!(ch, '.' | '!' | '?') {
            if let Some(&(_, next)) = chars.get(i + 1) {
                if next.is_whitespace() {
                    let end = byte_idx + ch.len_utf8();
                    sentences.push(text[start..end].to_string());
                    // Skip the whitespace run.
                    let mut j = i + 1;
                    while let Some(&(_, c)) = chars.get(j) {
                        if c.is_whitespace() {
                            j += 1;
                        } else {
                            break;
                        }
                    }
                    start = chars.get(j).map(|&(b, _)| b).unwrap_or(text.len());
                    i = j;
                    continue;
                }
            }
        }
        i += 1;
    }
    if start < text.len() {
        sentences.push(text[start..].to_string());
    }

    sentences.into_iter().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
}

/// Greedily pack sentences into chunks up to `chunk_size` estimated tokens.
/// A single oversize sentence becomes its own chunk. Successive chunks
/// share the tail sentences of the previous chunk whose total estimated
/// tokens fit within `chunk_overlap` (spec §4.2 step 3).
fn chunk_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if estimate_tokens(trimmed) <= chunk_size {
        return vec![trimmed.to_string()];
    }

    let sentences = split_into_sentences(trimmed);
    if sentences.is_empty() {
        return vec![trimmed.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_tokens = 0usize;

    for sentence in sentences {
        let sentence_tokens = estimate_tokens(&sentence);

        if sentence_tokens > chunk_size {
            if !current.is_empty() {
                chunks.push(current.join(" "));
                current.clear();
                current_tokens = 0;
            }
            chunks.push(sentence);
            continue;
        }

        if current_tokens + sentence_tokens > chunk_size && !current.is_empty() {
            chunks.push(current.join(" "));

            let mut overlap: Vec<String> = Vec::new();
            let mut overlap_tokens = 0usize;
            for s in current.iter().rev() {
                let t = estimate_tokens(s);
                if overlap_tokens + t <= chunk_overlap {
                    overlap.insert(0, s.clone());
                    overlap_tokens += t;
                } else {
                    break;
                }
            }
            current = overlap;
            current_tokens = overlap_tokens;
        }

        current.push(sentence);
        current_tokens += sentence_tokens;
    }

    if !current.is_empty() {
        chunks.push(current.join(" "));
    }

    chunks
}

pub struct Embedder {
    backend: Arc<dyn EmbeddingBackend>,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Embedder {
    pub fn new(backend: Arc<dyn EmbeddingBackend>, chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { backend, chunk_size, chunk_overlap }
    }

    pub fn with_defaults(backend: Arc<dyn EmbeddingBackend>) -> Self {
        Self::new(backend, 512, 50)
    }

    pub fn dimension(&self) -> usize {
        self.backend.dimension()
    }

    /// Step 1: empty/whitespace input fails. Step 2-3: chunk. Step 4: one
    /// call to encode all chunks. Step 5: average if multiple chunks.
    pub fn generate(&self, text: &str) -> EmbeddingResult {
        if text.trim().is_empty() {
            return EmbeddingResult::failure(EmbeddingError::EmptyInput.to_string());
        }

        let chunks = chunk_text(text, self.chunk_size, self.chunk_overlap);
        if chunks.is_empty() {
            return EmbeddingResult::failure("no valid chunks generated from text");
        }

        let vectors = match self.backend.encode(&chunks) {
            Ok(v) => v,
            Err(e) => return EmbeddingResult::failure(e.to_string()),
        };

        let embedding = if vectors.len() == 1 {
            vectors.into_iter().next().unwrap()
        } else {
            average(&vectors)
        };

        EmbeddingResult {
            chunk_count: chunks.len(),
            token_estimate: estimate_tokens(text),
            model_name: self.backend.model_name().to_string(),
            success: true,
            error_message: None,
            embedding,
        }
    }

    pub fn generate_batch(&self, texts: &[String]) -> Vec<EmbeddingResult> {
        texts.iter().map(|t| self.generate(t)).collect()
    }
}

fn average(vectors: &[Vec<f32>]) -> Vec<f32> {
    let dim = vectors[0].len();
    let mut sum = vec![0.0f32; dim];
    for v in vectors {
        for (i, x) in v.iter().enumerate() {
            sum[i] += x;
        }
    }
    let n = vectors.len() as f32;
    sum.iter().map(|x| x / n).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubBackend {
        dim: usize,
    }

    impl EmbeddingBackend for StubBackend {
        fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            // Deterministic stand-in: vector is the chunk's length repeated.
            Ok(texts.iter().map(|t| vec![t.len() as f32; self.dim]).collect())
        }
        fn dimension(&self) -> usize {
            self.dim
        }
        fn model_name(&self) -> &str {
            "stub"
        }
    }

    #[test]
    fn empty_input_fails() {
        let embedder = Embedder::with_defaults(Arc::new(StubBackend { dim: 4 }));
        let result = embedder.generate("   ");
        assert!(!result.success);
    }

    #[test]
    fn short_text_is_single_chunk() {
        let embedder = Embedder::with_defaults(Arc::new(StubBackend { dim: 4 }));
        let result = embedder.generate("hello there.");
        assert!(result.success);
        assert_eq!(result.chunk_count, 1);
    }

    #[test]
    fn determinism_same_text_same_vector() {
        let embedder = Embedder::with_defaults(Arc::new(StubBackend { dim: 4 }));
        let a = embedder.generate("repeatable text here.");
        let b = embedder.generate("repeatable text here.");
        assert_eq!(a.embedding, b.embedding);
    }

    #[test]
    fn long_text_chunks_and_averages() {
        let long_text = "Sentence one is here. ".repeat(200);
        let chunks = chunk_text(&long_text, 50, 10);
        assert!(chunks.len() > 1);
        let embedder = Embedder::new(Arc::new(StubBackend { dim: 4 }), 50, 10);
        let result = embedder.generate(&long_text);
        assert!(result.success);
        assert_eq!(result.chunk_count, chunks.len());
    }

    #[test]
    fn oversize_single_sentence_forms_its_own_chunk() {
        let huge_sentence = "a".repeat(1000);
        let text = format!("short one. {huge_sentence}. short two.");
        let chunks = chunk_text(&text, 10, 5);
        assert!(chunks.iter().any(|c| c.contains(&huge_sentence)));
    }
}
