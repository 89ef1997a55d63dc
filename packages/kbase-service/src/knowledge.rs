use std::{
	collections::HashSet,
	fs,
	path::{Path, PathBuf},
	sync::Arc,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use kbase_chunking::{ChunkingConfig, TokenCounter};
use kbase_config::{Config, EmbeddingProviderConfig, Knowledge, LlmProviderConfig, ProviderConfig};
use kbase_domain::{ErrorCode, Exchange};
use kbase_storage::TenantLayout;

use crate::{
	Answer, BoxFuture, Error, IngestReport, KnowledgeEngine, Providers, Result, Retriever,
};

pub const INDEX_FILE: &str = "index.json";

const SYSTEM_PROMPT: &str = "You are a knowledge base assistant. Answer the user's question using \
only the reference material provided. If the material does not cover the question, say so \
briefly. Reply in the language of the question.";

#[derive(Debug, Clone)]
pub struct KnowledgeSettings {
	pub embedding: EmbeddingProviderConfig,
	pub rerank: ProviderConfig,
	pub generation: LlmProviderConfig,
	pub knowledge: Knowledge,
}
impl KnowledgeSettings {
	pub fn from_config(cfg: &Config) -> Self {
		Self {
			embedding: cfg.providers.embedding.clone(),
			rerank: cfg.providers.rerank.clone(),
			generation: cfg.providers.generation.clone(),
			knowledge: cfg.knowledge.clone(),
		}
	}

	fn chunking(&self) -> ChunkingConfig {
		ChunkingConfig {
			max_tokens: self.knowledge.max_tokens,
			overlap_tokens: self.knowledge.overlap_tokens,
		}
	}

	fn accepts(&self, path: &Path) -> bool {
		let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
			return false;
		};
		let ext = ext.to_ascii_lowercase();

		self.knowledge.text_extensions.iter().any(|allowed| allowed == &ext)
	}
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Index {
	model: String,
	dimensions: u32,
	chunks: Vec<IndexedChunk>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexedChunk {
	chunk_id: String,
	source: String,
	chunk_index: usize,
	text: String,
	vector: Vec<f32>,
}

struct Ranked<'a> {
	chunk: &'a IndexedChunk,
	score: f32,
}

/// Default engine: chunked plain-text files embedded into a per-tenant JSON index, searched by
/// cosine similarity and reranked before generation.
#[derive(Clone)]
pub struct VectorKnowledgeEngine {
	settings: Arc<KnowledgeSettings>,
	providers: Providers,
	tokenizer: Arc<dyn TokenCounter + Send + Sync>,
}
impl VectorKnowledgeEngine {
	pub fn new(
		settings: KnowledgeSettings,
		providers: Providers,
		tokenizer: Arc<dyn TokenCounter + Send + Sync>,
	) -> Self {
		Self { settings: Arc::new(settings), providers, tokenizer }
	}

	async fn ingest_files(&self, layout: &TenantLayout, files: &[PathBuf]) -> Result<IngestReport> {
		let feature_store_id = layout.feature_store_id();
		let chunking = self.settings.chunking();
		let mut report = IngestReport::default();
		let mut index = Index {
			model: self.settings.embedding.model.clone(),
			dimensions: self.settings.embedding.dimensions,
			chunks: Vec::new(),
		};

		for path in files {
			if !self.settings.accepts(path) {
				tracing::debug!(feature_store_id, path = %path.display(), "Skipped unsupported file.");

				report.skip += 1;

				continue;
			}

			let text = match fs::read_to_string(path) {
				Ok(text) => text,
				Err(err) => {
					tracing::warn!(
						feature_store_id,
						path = %path.display(),
						error = %err,
						"Failed to read document."
					);

					report.fail += 1;

					continue;
				},
			};
			let chunks = kbase_chunking::split_text(&text, &chunking, self.tokenizer.as_ref());

			if chunks.is_empty() {
				report.skip += 1;

				continue;
			}

			let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
			let vectors =
				match self.providers.embedding.embed(&self.settings.embedding, &texts).await {
					Ok(vectors) if vectors.len() == texts.len() => vectors,
					Ok(vectors) => {
						tracing::warn!(
							feature_store_id,
							path = %path.display(),
							expected = texts.len(),
							actual = vectors.len(),
							"Embedding count mismatch."
						);

						report.fail += 1;

						continue;
					},
					Err(err) => {
						tracing::warn!(
							feature_store_id,
							path = %path.display(),
							error = %err,
							"Failed to embed document."
						);

						report.fail += 1;

						continue;
					},
				};
			let source = source_name(path);

			for (chunk, vector) in chunks.into_iter().zip(vectors) {
				index.chunks.push(IndexedChunk {
					chunk_id: chunk_id(&source, chunk.chunk_index, &chunk.text),
					source: source.clone(),
					chunk_index: chunk.chunk_index,
					text: chunk.text,
					vector,
				});
			}

			report.success += 1;
		}

		if report.success > 0 {
			write_index(&layout.workdir(), &index)?;

			tracing::info!(feature_store_id, chunks = index.chunks.len(), "Wrote feature store index.");
		}

		Ok(report)
	}

	async fn calibrate_throttle(
		&self,
		layout: &TenantLayout,
		positive: &[String],
		negative: &[String],
	) -> Result<f64> {
		let index = read_index(&layout.workdir())?;

		if index.chunks.is_empty() {
			return Err(Error::InvalidRequest {
				message: format!("feature store {} has no indexed chunks", layout.feature_store_id()),
			});
		}

		let positive = best_scores(&self.settings, &self.providers, &index, positive).await?;
		let negative = best_scores(&self.settings, &self.providers, &index, negative).await?;
		let throttle = choose_throttle(&positive, &negative);

		tracing::info!(
			feature_store_id = layout.feature_store_id(),
			positive = positive.len(),
			negative = negative.len(),
			throttle,
			"Calibrated reject throttle."
		);

		Ok(throttle)
	}
}
impl KnowledgeEngine for VectorKnowledgeEngine {
	fn ingest<'a>(
		&'a self,
		layout: &'a TenantLayout,
		files: &'a [PathBuf],
	) -> BoxFuture<'a, Result<IngestReport>> {
		Box::pin(self.ingest_files(layout, files))
	}

	fn calibrate<'a>(
		&'a self,
		layout: &'a TenantLayout,
		positive: &'a [String],
		negative: &'a [String],
	) -> BoxFuture<'a, Result<f64>> {
		Box::pin(self.calibrate_throttle(layout, positive, negative))
	}

	fn open<'a>(
		&'a self,
		layout: &'a TenantLayout,
		reject_throttle: f64,
	) -> BoxFuture<'a, Result<Box<dyn Retriever>>> {
		Box::pin(async move {
			let index = read_index(&layout.workdir())?;
			let retriever: Box<dyn Retriever> = Box::new(VectorRetriever {
				settings: self.settings.clone(),
				providers: self.providers.clone(),
				index,
				reject_throttle,
			});

			Ok(retriever)
		})
	}
}

struct VectorRetriever {
	settings: Arc<KnowledgeSettings>,
	providers: Providers,
	index: Index,
	reject_throttle: f64,
}
impl VectorRetriever {
	async fn respond(&self, query: &str, history: &[Exchange]) -> Result<Answer> {
		let query = query.trim();

		if query.is_empty() {
			return Ok(Answer::rejected(ErrorCode::NotAQuestion));
		}
		if self.index.chunks.is_empty() {
			return Ok(Answer::rejected(ErrorCode::NoSearchResult));
		}

		let ranked = rank(&self.settings, &self.providers, &self.index, query).await?;
		let Some(best) = ranked.first() else {
			return Ok(Answer::rejected(ErrorCode::NoSearchResult));
		};

		if f64::from(best.score) < self.reject_throttle {
			tracing::debug!(
				best_score = best.score,
				reject_throttle = self.reject_throttle,
				"Query scored below the reject throttle."
			);

			return Ok(Answer::rejected(ErrorCode::Unrelated));
		}

		let context = build_context(&ranked, self.settings.knowledge.max_context_chars);
		let messages = build_messages(query, history, &context);
		let text = self.providers.generation.generate(&self.settings.generation, &messages).await?;

		Ok(Answer { code: ErrorCode::Success, text, references: references(&ranked) })
	}
}
impl Retriever for VectorRetriever {
	fn answer<'a>(
		&'a self,
		query: &'a str,
		history: &'a [Exchange],
	) -> BoxFuture<'a, Result<Answer>> {
		Box::pin(self.respond(query, history))
	}
}

/// Cosine top-k over the index followed by a rerank pass, best first, truncated to
/// `rerank_top_n`.
async fn rank<'a>(
	settings: &KnowledgeSettings,
	providers: &Providers,
	index: &'a Index,
	query: &str,
) -> Result<Vec<Ranked<'a>>> {
	let knowledge = &settings.knowledge;
	let texts = [query.to_string()];
	let vectors = providers.embedding.embed(&settings.embedding, &texts).await?;
	let Some(query_vec) = vectors.first() else {
		return Err(Error::Provider { message: "embedding provider returned no vector".to_string() });
	};
	let mut candidates: Vec<Ranked<'a>> = index
		.chunks
		.iter()
		.filter_map(|chunk| {
			cosine(query_vec, &chunk.vector).map(|score| Ranked { chunk, score })
		})
		.collect();

	candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
	candidates.truncate(knowledge.top_k as usize);

	if candidates.is_empty() {
		return Ok(candidates);
	}

	let docs: Vec<String> = candidates.iter().map(|c| c.chunk.text.clone()).collect();
	let scores = providers.rerank.rerank(&settings.rerank, query, &docs).await?;

	for (candidate, score) in candidates.iter_mut().zip(scores) {
		candidate.score = score;
	}

	candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
	candidates.truncate(knowledge.rerank_top_n as usize);

	Ok(candidates)
}

async fn best_scores(
	settings: &KnowledgeSettings,
	providers: &Providers,
	index: &Index,
	questions: &[String],
) -> Result<Vec<f32>> {
	let mut out = Vec::with_capacity(questions.len());

	for question in questions {
		let question = question.trim();

		if question.is_empty() {
			continue;
		}

		let ranked = rank(settings, providers, index, question).await?;

		out.push(ranked.first().map(|r| r.score).unwrap_or(0.0));
	}

	Ok(out)
}

pub fn cosine(lhs: &[f32], rhs: &[f32]) -> Option<f32> {
	if lhs.is_empty() || lhs.len() != rhs.len() {
		return None;
	}

	let mut dot = 0.0_f32;
	let mut lhs_norm = 0.0_f32;
	let mut rhs_norm = 0.0_f32;

	for (l, r) in lhs.iter().zip(rhs) {
		dot += l * r;
		lhs_norm += l * l;
		rhs_norm += r * r;
	}

	if lhs_norm <= f32::EPSILON || rhs_norm <= f32::EPSILON {
		return None;
	}

	Some((dot / (lhs_norm.sqrt() * rhs_norm.sqrt())).clamp(-1.0, 1.0))
}

/// Midpoint between the strongest negative and the weakest positive when the two sets separate;
/// otherwise the strongest negative, which keeps every negative example rejected.
pub fn choose_throttle(positive: &[f32], negative: &[f32]) -> f64 {
	let min_positive = positive.iter().copied().map(f64::from).reduce(f64::min);
	let max_negative = negative.iter().copied().map(f64::from).reduce(f64::max);

	match (min_positive, max_negative) {
		(Some(pos), Some(neg)) if neg < pos => (pos + neg) / 2.0,
		(_, Some(neg)) => neg,
		(Some(pos), None) => pos,
		(None, None) => 0.0,
	}
}

fn build_context(ranked: &[Ranked<'_>], max_chars: usize) -> String {
	let mut context = String::new();
	let mut used = 0_usize;

	for item in ranked {
		let remaining = max_chars.saturating_sub(used);

		if remaining == 0 {
			break;
		}

		let piece: String = item.chunk.text.chars().take(remaining).collect();

		used += piece.chars().count();

		if !context.is_empty() {
			context.push_str("\n\n");
		}

		context.push_str(&piece);
	}

	context
}

fn build_messages(query: &str, history: &[Exchange], context: &str) -> Vec<Value> {
	let mut messages = vec![serde_json::json!({ "role": "system", "content": SYSTEM_PROMPT })];

	for exchange in history {
		messages.push(serde_json::json!({ "role": "user", "content": exchange.user }));
		messages.push(serde_json::json!({ "role": "assistant", "content": exchange.bot }));
	}

	messages.push(serde_json::json!({
		"role": "user",
		"content": format!("Reference material:\n{context}\n\nQuestion:\n{query}"),
	}));

	messages
}

fn references(ranked: &[Ranked<'_>]) -> Vec<Value> {
	let mut seen = HashSet::new();

	ranked
		.iter()
		.filter(|r| seen.insert(r.chunk.source.as_str()))
		.map(|r| Value::String(r.chunk.source.clone()))
		.collect()
}

fn source_name(path: &Path) -> String {
	path.file_name()
		.map(|name| name.to_string_lossy().into_owned())
		.unwrap_or_else(|| path.display().to_string())
}

fn chunk_id(source: &str, chunk_index: usize, text: &str) -> String {
	let mut hasher = blake3::Hasher::new();

	hasher.update(source.as_bytes());
	hasher.update(&chunk_index.to_le_bytes());
	hasher.update(text.as_bytes());

	hasher.finalize().to_hex().to_string()
}

fn read_index(workdir: &Path) -> Result<Index> {
	let path = workdir.join(INDEX_FILE);

	if !path.is_file() {
		return Ok(Index::default());
	}

	let raw = fs::read(&path).map_err(|err| Error::Storage {
		message: format!("failed to read {}: {err}", path.display()),
	})?;

	Ok(serde_json::from_slice(&raw)?)
}

fn write_index(workdir: &Path, index: &Index) -> Result<()> {
	let path = workdir.join(INDEX_FILE);
	let tmp = workdir.join(format!("{INDEX_FILE}.tmp"));
	let raw = serde_json::to_vec(index)?;

	fs::write(&tmp, raw).map_err(|err| Error::Storage {
		message: format!("failed to write {}: {err}", tmp.display()),
	})?;
	fs::rename(&tmp, &path).map_err(|err| Error::Storage {
		message: format!("failed to replace {}: {err}", path.display()),
	})
}
