mod error;

pub use error::{Error, Result};

use std::{
	collections::VecDeque,
	fs,
	path::{Path, PathBuf},
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
};

use serde_json::Value;
use tempfile::TempDir;

use kbase_config::DecodeErrorPolicy;
use kbase_domain::{ErrorCode, Exchange};
use kbase_service::{
	Answer, BoxFuture, Channel, IngestReport, KnowledgeEngine, ResponseSink, Retriever, Settings,
	TaskQueue,
};
use kbase_storage::TenantLayout;

pub const TEMPLATE_BODY: &str = "[feature_store]\nreject_throttle = 0.5\n";

/// A throwaway feature store root plus a config template beside it.
pub struct TempBase {
	dir: TempDir,
	base: PathBuf,
	template: PathBuf,
}
impl TempBase {
	pub fn new() -> Result<Self> {
		let this = Self::without_template()?;

		fs::write(&this.template, TEMPLATE_BODY)?;

		Ok(this)
	}

	/// Same layout, but the template file is never written.
	pub fn without_template() -> Result<Self> {
		let dir = tempfile::tempdir()?;
		let base = dir.path().join("feature_stores");
		let template = dir.path().join("config-template.ini");

		fs::create_dir_all(&base)?;

		Ok(Self { dir, base, template })
	}

	pub fn base(&self) -> &Path {
		&self.base
	}

	pub fn template(&self) -> &Path {
		&self.template
	}

	pub fn settings(&self, on_decode_error: DecodeErrorPolicy) -> Settings {
		Settings {
			feature_store_base_dir: self.base.clone(),
			config_template: self.template.clone(),
			on_decode_error,
		}
	}

	pub fn layout(&self, feature_store_id: &str) -> Result<TenantLayout> {
		Ok(TenantLayout::new(&self.base, feature_store_id)?)
	}

	/// Creates a tenant that looks fully built, with the given reject throttle.
	pub fn build_tenant(&self, feature_store_id: &str, reject_throttle: f64) -> Result<TenantLayout> {
		let layout = self.layout(feature_store_id)?;

		layout.ensure_dirs()?;
		fs::write(layout.config_path(), TEMPLATE_BODY)?;
		layout.write_reject_throttle(reject_throttle)?;
		layout.write_description(feature_store_id)?;

		Ok(layout)
	}

	/// Writes an upload file under `uploads/` and returns that directory.
	pub fn write_upload(&self, name: &str, body: &str) -> Result<PathBuf> {
		let uploads = self.dir.path().join("uploads");
		let path = uploads.join(name);

		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)?;
		}

		fs::write(path, body)?;

		Ok(uploads)
	}
}

/// FIFO task source. An empty queue behaves like a transport wait that timed out.
#[derive(Default)]
pub struct MemoryQueue {
	items: Mutex<VecDeque<String>>,
	failures: AtomicUsize,
}
impl MemoryQueue {
	pub fn new<I, S>(items: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			items: Mutex::new(items.into_iter().map(Into::into).collect()),
			failures: AtomicUsize::new(0),
		}
	}

	/// The next `count` pops fail with a queue error before any item is handed out.
	pub fn fail_next(&self, count: usize) {
		self.failures.store(count, Ordering::SeqCst);
	}

	pub fn push(&self, raw: impl Into<String>) {
		lock(&self.items).push_back(raw.into());
	}

	pub fn len(&self) -> usize {
		lock(&self.items).len()
	}

	pub fn is_empty(&self) -> bool {
		lock(&self.items).is_empty()
	}
}
impl TaskQueue for MemoryQueue {
	fn pop(&self) -> BoxFuture<'_, kbase_service::Result<Option<String>>> {
		if take_failure(&self.failures) {
			return Box::pin(async {
				Err(kbase_service::Error::Queue { message: "connection reset".to_string() })
			});
		}

		let next = lock(&self.items).pop_front();

		Box::pin(async move { Ok(next) })
	}
}

/// Captures every published response, decoded back to JSON, in publish order.
#[derive(Default)]
pub struct RecordingSink {
	messages: Mutex<Vec<(Channel, Value)>>,
	failures: AtomicUsize,
	attempts: AtomicUsize,
}
impl RecordingSink {
	/// The next `count` pushes fail and are not recorded.
	pub fn fail_next(&self, count: usize) {
		self.failures.store(count, Ordering::SeqCst);
	}

	/// Every push seen so far, failed ones included.
	pub fn attempts(&self) -> usize {
		self.attempts.load(Ordering::SeqCst)
	}

	pub fn all(&self) -> Vec<(Channel, Value)> {
		lock(&self.messages).clone()
	}

	pub fn task_messages(&self) -> Vec<Value> {
		self.on(Channel::Task)
	}

	pub fn chat_messages(&self) -> Vec<Value> {
		self.on(Channel::Chat)
	}

	pub fn len(&self) -> usize {
		lock(&self.messages).len()
	}

	pub fn is_empty(&self) -> bool {
		lock(&self.messages).is_empty()
	}

	fn on(&self, channel: Channel) -> Vec<Value> {
		lock(&self.messages)
			.iter()
			.filter(|(c, _)| *c == channel)
			.map(|(_, body)| body.clone())
			.collect()
	}
}
impl ResponseSink for RecordingSink {
	fn push<'a>(&'a self, channel: Channel, body: &'a str) -> BoxFuture<'a, kbase_service::Result<()>> {
		self.attempts.fetch_add(1, Ordering::SeqCst);

		if take_failure(&self.failures) {
			return Box::pin(async {
				Err(kbase_service::Error::Queue { message: "response push rejected".to_string() })
			});
		}

		Box::pin(async move {
			let value: Value = serde_json::from_str(body)?;

			lock(&self.messages).push((channel, value));

			Ok(())
		})
	}
}

#[derive(Default)]
struct Calls {
	ingests: AtomicUsize,
	calibrations: AtomicUsize,
	opens: AtomicUsize,
	open_throttles: Mutex<Vec<f64>>,
	histories: Mutex<Vec<Vec<Exchange>>>,
}

/// Scripted knowledge engine that counts how often each collaborator entry point runs.
pub struct StubEngine {
	report: IngestReport,
	ingest_error: Option<String>,
	throttle: f64,
	calibrate_error: Option<String>,
	answer: Answer,
	answer_error: Option<String>,
	calls: Arc<Calls>,
}
impl StubEngine {
	pub fn new() -> Self {
		Self {
			report: IngestReport::default(),
			ingest_error: None,
			throttle: 0.35,
			calibrate_error: None,
			answer: Answer {
				code: ErrorCode::Success,
				text: "stub answer".to_string(),
				references: vec![Value::from("README.md")],
			},
			answer_error: None,
			calls: Arc::new(Calls::default()),
		}
	}

	pub fn with_report(mut self, report: IngestReport) -> Self {
		self.report = report;

		self
	}

	pub fn with_ingest_error(mut self, message: impl Into<String>) -> Self {
		self.ingest_error = Some(message.into());

		self
	}

	pub fn with_throttle(mut self, throttle: f64) -> Self {
		self.throttle = throttle;

		self
	}

	pub fn with_calibrate_error(mut self, message: impl Into<String>) -> Self {
		self.calibrate_error = Some(message.into());

		self
	}

	pub fn with_answer(mut self, answer: Answer) -> Self {
		self.answer = answer;

		self
	}

	pub fn with_answer_error(mut self, message: impl Into<String>) -> Self {
		self.answer_error = Some(message.into());

		self
	}

	pub fn ingests(&self) -> usize {
		self.calls.ingests.load(Ordering::SeqCst)
	}

	pub fn calibrations(&self) -> usize {
		self.calls.calibrations.load(Ordering::SeqCst)
	}

	pub fn opens(&self) -> usize {
		self.calls.opens.load(Ordering::SeqCst)
	}

	pub fn open_throttles(&self) -> Vec<f64> {
		lock(&self.calls.open_throttles).clone()
	}

	/// Merged histories seen by opened retrievers, one entry per answered query.
	pub fn histories(&self) -> Vec<Vec<Exchange>> {
		lock(&self.calls.histories).clone()
	}
}
impl Default for StubEngine {
	fn default() -> Self {
		Self::new()
	}
}
impl KnowledgeEngine for StubEngine {
	fn ingest<'a>(
		&'a self,
		_layout: &'a TenantLayout,
		_files: &'a [PathBuf],
	) -> BoxFuture<'a, kbase_service::Result<IngestReport>> {
		self.calls.ingests.fetch_add(1, Ordering::SeqCst);

		let result = match &self.ingest_error {
			Some(message) => Err(kbase_service::Error::Provider { message: message.clone() }),
			None => Ok(self.report),
		};

		Box::pin(async move { result })
	}

	fn calibrate<'a>(
		&'a self,
		_layout: &'a TenantLayout,
		_positive: &'a [String],
		_negative: &'a [String],
	) -> BoxFuture<'a, kbase_service::Result<f64>> {
		self.calls.calibrations.fetch_add(1, Ordering::SeqCst);

		let result = match &self.calibrate_error {
			Some(message) => Err(kbase_service::Error::Provider { message: message.clone() }),
			None => Ok(self.throttle),
		};

		Box::pin(async move { result })
	}

	fn open<'a>(
		&'a self,
		_layout: &'a TenantLayout,
		reject_throttle: f64,
	) -> BoxFuture<'a, kbase_service::Result<Box<dyn Retriever>>> {
		self.calls.opens.fetch_add(1, Ordering::SeqCst);
		lock(&self.calls.open_throttles).push(reject_throttle);

		let retriever: Box<dyn Retriever> = Box::new(StubRetriever {
			answer: self.answer.clone(),
			error: self.answer_error.clone(),
			calls: self.calls.clone(),
		});

		Box::pin(async move { Ok(retriever) })
	}
}

struct StubRetriever {
	answer: Answer,
	error: Option<String>,
	calls: Arc<Calls>,
}
impl Retriever for StubRetriever {
	fn answer<'a>(
		&'a self,
		_query: &'a str,
		history: &'a [Exchange],
	) -> BoxFuture<'a, kbase_service::Result<Answer>> {
		lock(&self.calls.histories).push(history.to_vec());

		let result = match &self.error {
			Some(message) => Err(kbase_service::Error::Provider { message: message.clone() }),
			None => Ok(self.answer.clone()),
		};

		Box::pin(async move { result })
	}
}

fn take_failure(failures: &AtomicUsize) -> bool {
	failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok()
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(|err| err.into_inner())
}
