use color_eyre::{Result, eyre};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
	data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
	index: Option<usize>,
	embedding: Vec<f32>,
}

/// Embeds `texts` in one request. The result holds one vector per input, in input order.
pub async fn embed(
	cfg: &kbase_config::EmbeddingProviderConfig,
	texts: &[String],
) -> Result<Vec<Vec<f32>>> {
	if texts.is_empty() {
		return Ok(Vec::new());
	}

	let body = serde_json::json!({
		"model": cfg.model,
		"input": texts,
		"dimensions": cfg.dimensions,
	});
	let res = crate::client(cfg.timeout_ms)?
		.post(crate::endpoint(&cfg.api_base, &cfg.path))
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?
		.error_for_status()?;
	let vectors = into_vectors(res.json().await?, cfg.dimensions as usize)?;

	if vectors.len() != texts.len() {
		return Err(eyre::eyre!(
			"Embedding provider returned {} vectors for {} inputs.",
			vectors.len(),
			texts.len()
		));
	}

	Ok(vectors)
}

fn into_vectors(res: EmbeddingResponse, dimensions: usize) -> Result<Vec<Vec<f32>>> {
	let mut items: Vec<(usize, Vec<f32>)> = res
		.data
		.into_iter()
		.enumerate()
		.map(|(position, item)| (item.index.unwrap_or(position), item.embedding))
		.collect();

	if let Some((index, vector)) = items.iter().find(|(_, vector)| vector.len() != dimensions) {
		return Err(eyre::eyre!(
			"Embedding {index} has {} dimensions; expected {dimensions}.",
			vector.len()
		));
	}

	items.sort_by_key(|(index, _)| *index);

	Ok(items.into_iter().map(|(_, vector)| vector).collect())
}
