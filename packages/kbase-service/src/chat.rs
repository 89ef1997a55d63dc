use kbase_domain::{ErrorCode, QueryPayload, merge_history};

use crate::{ResourceCache, Result, StatusReporter};

/// Answers one chat query against the tenant's cached retriever and reports exactly one chat
/// response.
pub async fn run(
	cache: &mut ResourceCache,
	reporter: &StatusReporter,
	payload: &QueryPayload,
) -> Result<()> {
	let feature_store_id = payload.feature_store_id.as_str();
	let query_id = payload.query_id.as_str();
	let retriever = match cache.get(feature_store_id).await {
		Ok(retriever) => retriever,
		Err(err) => {
			tracing::warn!(feature_store_id, query_id, error = %err, "Failed to load retriever.");

			return reporter.chat_code(feature_store_id, query_id, ErrorCode::InternalError).await;
		},
	};

	if !payload.images.is_empty() {
		tracing::debug!(
			feature_store_id,
			query_id,
			images = payload.images.len(),
			"Image inputs are not supported and were ignored."
		);
	}

	let history = merge_history(&payload.history);

	if history.ends_with_user {
		tracing::warn!(feature_store_id, query_id, "Chat history should not end with a user turn.");
	}

	match retriever.answer(&payload.content, &history.exchanges).await {
		Ok(answer) if answer.code.is_success() =>
			reporter
				.chat_state(
					feature_store_id,
					query_id,
					ErrorCode::Success,
					ErrorCode::Success.describe(),
					answer.text,
					answer.references,
				)
				.await,
		Ok(answer) => {
			tracing::info!(
				feature_store_id,
				query_id,
				code = answer.code.code(),
				reason = answer.code.describe(),
				"Retriever declined to answer."
			);

			reporter.chat_code(feature_store_id, query_id, ErrorCode::InternalError).await
		},
		Err(err) => {
			tracing::error!(feature_store_id, query_id, error = %err, "Chat generation failed.");

			reporter
				.chat_state(
					feature_store_id,
					query_id,
					ErrorCode::Failed,
					err.to_string(),
					String::new(),
					Vec::new(),
				)
				.await
		},
	}
}
