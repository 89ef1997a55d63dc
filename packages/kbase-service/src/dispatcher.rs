use std::{path::PathBuf, sync::Arc, time::Duration};

use kbase_config::{Config, DecodeErrorPolicy};
use kbase_domain::{Decoded, ErrorCode, Task, TaskKind, decode_task};

use crate::{
	Error, KnowledgeEngine, ResourceCache, Result, StatusReporter, TaskQueue, add_doc, chat,
	update_sample,
};

const BASE_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF_MS: u64 = 30_000;

#[derive(Debug, Clone)]
pub struct Settings {
	pub feature_store_base_dir: PathBuf,
	pub config_template: PathBuf,
	pub on_decode_error: DecodeErrorPolicy,
}
impl Settings {
	pub fn from_config(cfg: &Config) -> Self {
		Self {
			feature_store_base_dir: cfg.storage.feature_store_base_dir.clone(),
			config_template: cfg.storage.config_template.clone(),
			on_decode_error: cfg.dispatch.on_decode_error,
		}
	}
}

/// What the loop did with one raw message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
	/// The handler ran and published its terminal status.
	Handled,
	/// The envelope named an unknown task type; nothing was published.
	Dropped,
	/// The message could not be decoded and the skip policy is active.
	Skipped,
	/// The handler hit an unexpected fault; it was logged and the loop moves on.
	Faulted,
}

/// Single consumer of the task queue. Tasks run strictly one at a time; the resource cache
/// relies on that for open/invalidate exclusivity.
pub struct Dispatcher {
	settings: Settings,
	queue: Arc<dyn TaskQueue>,
	engine: Arc<dyn KnowledgeEngine>,
	reporter: StatusReporter,
	cache: ResourceCache,
}
impl Dispatcher {
	pub fn new(
		settings: Settings,
		queue: Arc<dyn TaskQueue>,
		engine: Arc<dyn KnowledgeEngine>,
		reporter: StatusReporter,
		max_len: usize,
	) -> Self {
		let cache =
			ResourceCache::new(settings.feature_store_base_dir.clone(), max_len, engine.clone());

		Self { settings, queue, engine, reporter, cache }
	}

	pub fn cache(&self) -> &ResourceCache {
		&self.cache
	}

	/// Consumes tasks until a fatal error occurs.
	pub async fn run(&mut self) -> Result<()> {
		let mut queue_failures = 0_u32;

		tracing::info!(
			max_len = self.cache.max_len(),
			on_decode_error = ?self.settings.on_decode_error,
			"Task dispatcher started."
		);

		loop {
			match self.run_once().await {
				Ok(_) => {
					queue_failures = 0;
				},
				Err(Error::Queue { message }) => {
					queue_failures = queue_failures.saturating_add(1);

					let backoff = backoff_for_attempt(queue_failures);

					tracing::error!(
						error = %message,
						attempt = queue_failures,
						backoff_ms = backoff.as_millis() as u64,
						"Task queue receive failed."
					);
					tokio::time::sleep(backoff).await;
				},
				Err(err) => {
					tracing::error!(error = %err, "Task dispatcher stopped.");

					return Err(err);
				},
			}
		}
	}

	/// Waits for one message and processes it. `Ok(None)` means the queue wait timed out.
	pub async fn run_once(&mut self) -> Result<Option<TaskOutcome>> {
		let Some(raw) = self.queue.pop().await? else {
			return Ok(None);
		};

		self.handle_message(&raw).await.map(Some)
	}

	/// Decodes and runs one message. Returns `Err` only for failures that must end the loop.
	pub async fn handle_message(&mut self, raw: &str) -> Result<TaskOutcome> {
		let task = match decode_task(raw) {
			Ok(Decoded::Task(task)) => task,
			Ok(Decoded::Unknown { kind }) => {
				tracing::warn!(task = %kind, "Dropped task with unknown type.");

				return Ok(TaskOutcome::Dropped);
			},
			Err(err) => match self.settings.on_decode_error {
				DecodeErrorPolicy::Fatal => return Err(err.into()),
				DecodeErrorPolicy::Skip => {
					tracing::error!(error = %err, "Skipped malformed task message.");

					return Ok(TaskOutcome::Skipped);
				},
			},
		};
		let kind = task.kind();
		let feature_store_id = task.feature_store_id().to_string();

		match self.dispatch(task).await {
			Ok(()) => Ok(TaskOutcome::Handled),
			Err(err) if err.is_fatal() => Err(err),
			Err(err) => {
				tracing::error!(
					feature_store_id = %feature_store_id,
					task = %kind,
					error = %err,
					"Task handler faulted."
				);

				Ok(TaskOutcome::Faulted)
			},
		}
	}

	async fn dispatch(&mut self, task: Task) -> Result<()> {
		let kind = task.kind();

		tracing::info!(feature_store_id = task.feature_store_id(), task = %kind, "Dispatching task.");

		match task {
			Task::Build(payload) => {
				self.begin_mutation(&payload.feature_store_id, kind).await;

				add_doc::run(&self.settings, self.engine.as_ref(), &self.reporter, &payload).await
			},
			Task::Tune(payload) => {
				self.begin_mutation(&payload.feature_store_id, kind).await;

				update_sample::run(&self.settings, self.engine.as_ref(), &self.reporter, &payload)
					.await
			},
			Task::Query(payload) => chat::run(&mut self.cache, &self.reporter, &payload).await,
		}
	}

	/// Drops any cached retriever, then announces the task. A failed announcement is logged and
	/// the handler still runs, so the task keeps its single terminal status.
	async fn begin_mutation(&mut self, feature_store_id: &str, kind: TaskKind) {
		self.cache.invalidate(feature_store_id);

		if let Err(err) =
			self.reporter.task_code(feature_store_id, kind, ErrorCode::WorkInProgress).await
		{
			tracing::warn!(
				feature_store_id,
				task = %kind,
				error = %err,
				"Failed to publish work-in-progress status."
			);
		}
	}
}

fn backoff_for_attempt(attempt: u32) -> Duration {
	let exp = attempt.max(1).saturating_sub(1).min(6);
	let base = BASE_BACKOFF_MS.saturating_mul(1 << exp);

	Duration::from_millis(base.min(MAX_BACKOFF_MS))
}
