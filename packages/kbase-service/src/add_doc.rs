use std::path::{Path, PathBuf};

use kbase_domain::{BuildPayload, ErrorCode, TaskKind};
use kbase_storage::TenantLayout;

use crate::{IngestReport, KnowledgeEngine, Result, Settings, StatusReporter};

pub const NO_FILES_PROCESSED: &str = "no files processed";

/// Builds (or rebuilds) a feature store from the payload's files and reports one terminal
/// status.
///
/// Only a missing config template escapes as an error; it is a deployment fault and no tenant
/// state has been touched when it is detected.
pub async fn run(
	settings: &Settings,
	engine: &dyn KnowledgeEngine,
	reporter: &StatusReporter,
	payload: &BuildPayload,
) -> Result<()> {
	let feature_store_id = payload.feature_store_id.as_str();
	let files = resolve_files(&payload.file_abs_base, &payload.file_list);
	let layout = match prepare_layout(settings, payload) {
		Ok(layout) => layout,
		Err(err) if err.is_fatal() => return Err(err),
		Err(err) => {
			tracing::error!(feature_store_id, error = %err, "Failed to prepare feature store layout.");

			return reporter
				.task_state(feature_store_id, TaskKind::Build, ErrorCode::Failed, err.to_string())
				.await;
		},
	};

	match engine.ingest(&layout, &files).await {
		Ok(report) => {
			let (code, status) = classify(&report, files.len());

			tracing::info!(
				feature_store_id,
				total = files.len(),
				success = report.success,
				fail = report.fail,
				skip = report.skip,
				"Feature store ingestion finished."
			);

			reporter.task_state(feature_store_id, TaskKind::Build, code, status).await
		},
		Err(err) => {
			tracing::error!(feature_store_id, error = %err, "Feature store ingestion failed.");

			reporter
				.task_state(feature_store_id, TaskKind::Build, ErrorCode::Failed, err.to_string())
				.await
		},
	}
}

/// Maps ingestion counts against the number of requested files to a terminal status.
pub fn classify(report: &IngestReport, total: usize) -> (ErrorCode, String) {
	if report.success == total {
		return (ErrorCode::Success, ErrorCode::Success.describe().to_string());
	}
	if report.success == 0 {
		return (ErrorCode::Failed, NO_FILES_PROCESSED.to_string());
	}

	(
		ErrorCode::Success,
		format!(
			"Processed {} files, skipped {}, {} failed. Please check the file formats.",
			report.success, report.skip, report.fail
		),
	)
}

fn resolve_files(base: &str, names: &[String]) -> Vec<PathBuf> {
	let base = Path::new(base);

	names.iter().map(|name| base.join(name)).collect()
}

fn prepare_layout(settings: &Settings, payload: &BuildPayload) -> Result<TenantLayout> {
	let layout = TenantLayout::new(&settings.feature_store_base_dir, &payload.feature_store_id)?;

	layout.ensure_dirs()?;
	layout.seed_config(&settings.config_template)?;
	layout.write_description(&payload.name)?;

	Ok(layout)
}
