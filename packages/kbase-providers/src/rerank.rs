use color_eyre::Result;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RerankResponse {
	#[serde(alias = "data")]
	results: Vec<RerankHit>,
}

#[derive(Debug, Deserialize)]
struct RerankHit {
	index: usize,
	#[serde(alias = "score")]
	relevance_score: f32,
}

/// Scores `docs` against `query`; the result is aligned with `docs` by position and documents the
/// server left out score zero.
pub async fn rerank(
	cfg: &kbase_config::ProviderConfig,
	query: &str,
	docs: &[String],
) -> Result<Vec<f32>> {
	if docs.is_empty() {
		return Ok(Vec::new());
	}

	let body = serde_json::json!({ "model": cfg.model, "query": query, "documents": docs });
	let res = crate::client(cfg.timeout_ms)?
		.post(crate::endpoint(&cfg.api_base, &cfg.path))
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?
		.error_for_status()?;

	Ok(align_scores(res.json().await?, docs.len()))
}

fn align_scores(res: RerankResponse, doc_count: usize) -> Vec<f32> {
	let mut scores = vec![0.0_f32; doc_count];

	for hit in res.results {
		match scores.get_mut(hit.index) {
			Some(slot) => *slot = hit.relevance_score,
			None => tracing::warn!(index = hit.index, doc_count, "Rerank result index out of range."),
		}
	}

	scores
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn aligns_scores_with_documents() {
		let res: RerankResponse = serde_json::from_value(serde_json::json!({
			"data": [
				{ "index": 2, "score": 0.1 },
				{ "index": 0, "score": 0.7 },
				{ "index": 9, "score": 0.9 }
			]
		}))
		.expect("response should deserialize");

		assert_eq!(align_scores(res, 3), vec![0.7, 0.0, 0.1]);
	}

	#[test]
	fn accepts_relevance_score_results() {
		let res: RerankResponse = serde_json::from_value(serde_json::json!({
			"results": [{ "index": 0, "relevance_score": 0.42 }]
		}))
		.expect("response should deserialize");

		assert_eq!(align_scores(res, 1), vec![0.42]);
	}
}
