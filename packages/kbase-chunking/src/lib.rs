pub use tokenizers::Tokenizer;
use unicode_segmentation::UnicodeSegmentation;

pub type TokenizerError = tokenizers::Error;

#[derive(Clone, Debug)]
pub struct ChunkingConfig {
	pub max_tokens: u32,
	pub overlap_tokens: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
	pub chunk_index: usize,
	pub start_offset: usize,
	pub end_offset: usize,
	pub text: String,
}

/// Token accounting used to size chunks.
pub trait TokenCounter {
	fn count(&self, text: &str) -> usize;

	/// The last `tokens` tokens of `text`, rendered back to text.
	fn tail(&self, text: &str, tokens: usize) -> String;
}
impl TokenCounter for Tokenizer {
	fn count(&self, text: &str) -> usize {
		match self.encode(text, false) {
			Ok(encoding) => encoding.len(),
			Err(err) => {
				tracing::error!(error = %err, "Tokenizer failed to encode chunk candidate.");

				0
			},
		}
	}

	fn tail(&self, text: &str, tokens: usize) -> String {
		let encoding = match self.encode(text, false) {
			Ok(encoding) => encoding,
			Err(err) => {
				tracing::error!(error = %err, "Tokenizer failed to encode overlap tail.");

				return String::new();
			},
		};
		let ids = encoding.get_ids();
		let start = ids.len().saturating_sub(tokens);

		match self.decode(&ids[start..], true) {
			Ok(decoded) => decoded,
			Err(err) => {
				tracing::error!(error = %err, "Tokenizer failed to decode overlap tail.");

				String::new()
			},
		}
	}
}

pub fn load_tokenizer(repo: &str) -> Result<Tokenizer, TokenizerError> {
	Tokenizer::from_pretrained(repo, None)
}

/// Packs whole sentences into chunks of at most `max_tokens`, carrying `overlap_tokens` of the
/// previous chunk into the next one. A single sentence longer than the budget becomes its own
/// chunk.
pub fn split_text<C>(text: &str, cfg: &ChunkingConfig, counter: &C) -> Vec<Chunk>
where
	C: TokenCounter + ?Sized,
{
	let mut chunks = Vec::new();
	let mut current = String::new();
	let mut current_start = 0_usize;
	let mut last_end = 0_usize;

	for (idx, sentence) in text.split_sentence_bound_indices() {
		let candidate = format!("{current}{sentence}");

		if counter.count(&candidate) > cfg.max_tokens as usize && !current.trim().is_empty() {
			chunks.push(Chunk {
				chunk_index: chunks.len(),
				start_offset: current_start,
				end_offset: last_end,
				text: current.clone(),
			});

			let overlap = if cfg.overlap_tokens == 0 {
				String::new()
			} else {
				counter.tail(&current, cfg.overlap_tokens as usize)
			};

			current_start = last_end.saturating_sub(overlap.len());
			current = overlap;
		}
		if current.is_empty() {
			current_start = idx;
		}

		current.push_str(sentence);

		last_end = idx + sentence.len();
	}

	if !current.trim().is_empty() {
		chunks.push(Chunk {
			chunk_index: chunks.len(),
			start_offset: current_start,
			end_offset: last_end,
			text: current,
		});
	}

	chunks
}
