use kbase_domain::{ErrorCode, TaskKind, TunePayload};
use kbase_storage::TenantLayout;

use crate::{KnowledgeEngine, Result, Settings, StatusReporter};

pub const MISSING_SAMPLES: &str = "Positive or negative examples are empty. Fill in real user questions as positive examples and a few off-topic chit-chat lines as negative examples.";
pub const NOT_BUILT: &str = "The knowledge base was not built or its build was interrupted. Please build the knowledge base again.";

/// Recalibrates a built feature store's reject throttle from example questions.
pub async fn run(
	settings: &Settings,
	engine: &dyn KnowledgeEngine,
	reporter: &StatusReporter,
	payload: &TunePayload,
) -> Result<()> {
	let feature_store_id = payload.feature_store_id.as_str();

	if payload.positive.is_empty() || payload.negative.is_empty() {
		tracing::info!(
			feature_store_id,
			positive = payload.positive.len(),
			negative = payload.negative.len(),
			"Rejected sample update with empty examples."
		);

		return reporter
			.task_state(feature_store_id, TaskKind::Tune, ErrorCode::BadParameter, MISSING_SAMPLES)
			.await;
	}

	let layout = match TenantLayout::new(&settings.feature_store_base_dir, feature_store_id) {
		Ok(layout) if layout.is_complete() => layout,
		Ok(_) | Err(_) => {
			tracing::warn!(feature_store_id, "Sample update requested for an unbuilt feature store.");

			return reporter
				.task_state(feature_store_id, TaskKind::Tune, ErrorCode::InternalError, NOT_BUILT)
				.await;
		},
	};

	match calibrate(engine, &layout, payload).await {
		Ok(reject_throttle) => {
			tracing::info!(feature_store_id, reject_throttle, "Updated feature store reject throttle.");

			reporter.task_code(feature_store_id, TaskKind::Tune, ErrorCode::Success).await
		},
		Err(err) => {
			tracing::error!(feature_store_id, error = %err, "Sample update failed.");

			reporter
				.task_state(feature_store_id, TaskKind::Tune, ErrorCode::Failed, err.to_string())
				.await
		},
	}
}

async fn calibrate(
	engine: &dyn KnowledgeEngine,
	layout: &TenantLayout,
	payload: &TunePayload,
) -> Result<f64> {
	let reject_throttle = engine.calibrate(layout, &payload.positive, &payload.negative).await?;

	layout.write_reject_throttle(reject_throttle)?;

	Ok(reject_throttle)
}
