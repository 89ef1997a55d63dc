use std::{sync::Arc, time::Duration};

use serde_json::{Value, json};

use kbase_config::DecodeErrorPolicy;
use kbase_domain::{ErrorCode, Exchange};
use kbase_service::{
	Answer, Dispatcher, Error, IngestReport, StatusReporter, TaskOutcome, add_doc, update_sample,
};
use kbase_testkit::{MemoryQueue, RecordingSink, StubEngine, TempBase};

struct Harness {
	base: TempBase,
	queue: Arc<MemoryQueue>,
	sink: Arc<RecordingSink>,
	engine: Arc<StubEngine>,
	dispatcher: Dispatcher,
}
impl Harness {
	fn new(engine: StubEngine) -> Self {
		Self::with_policy(engine, DecodeErrorPolicy::Fatal)
	}

	fn with_policy(engine: StubEngine, policy: DecodeErrorPolicy) -> Self {
		let base = TempBase::new().expect("Failed to create temp base.");

		Self::on(base, engine, policy)
	}

	fn on(base: TempBase, engine: StubEngine, policy: DecodeErrorPolicy) -> Self {
		Self::with_queue(base, engine, policy, MemoryQueue::default())
	}

	fn with_queue(
		base: TempBase,
		engine: StubEngine,
		policy: DecodeErrorPolicy,
		queue: MemoryQueue,
	) -> Self {
		let queue = Arc::new(queue);
		let sink = Arc::new(RecordingSink::default());
		let engine = Arc::new(engine);
		let dispatcher = Dispatcher::new(
			base.settings(policy),
			queue.clone(),
			engine.clone(),
			StatusReporter::new(sink.clone()),
			4,
		);

		Self { base, queue, sink, engine, dispatcher }
	}

	async fn handle(&mut self, message: Value) -> TaskOutcome {
		self.dispatcher.handle_message(&message.to_string()).await.expect("Dispatch should not fail.")
	}
}

fn build(feature_store_id: &str, base: &str, files: &[&str]) -> Value {
	json!({
		"type": "FS_ADD_DOC",
		"payload": {
			"name": "Product manual",
			"feature_store_id": feature_store_id,
			"file_abs_base": base,
			"file_list": files,
		}
	})
}

fn tune(feature_store_id: &str, positive: &[&str], negative: &[&str]) -> Value {
	json!({
		"type": "FS_UPDATE_SAMPLE",
		"payload": { "feature_store_id": feature_store_id, "positive": positive, "negative": negative }
	})
}

fn chat(feature_store_id: &str, history: Value) -> Value {
	json!({
		"type": "CHAT",
		"payload": {
			"feature_store_id": feature_store_id,
			"query_id": "q-1",
			"content": "How do I reset the device?",
			"images": [],
			"history": history,
		}
	})
}

fn codes(messages: &[Value]) -> Vec<i64> {
	messages.iter().map(|m| m["code"].as_i64().expect("code should be an integer")).collect()
}

#[tokio::test]
async fn tune_with_empty_positive_is_bad_parameter_and_writes_nothing() {
	let mut h = Harness::new(StubEngine::new());
	let outcome = h.handle(tune("fs-1", &[], &["hello"])).await;
	let tasks = h.sink.task_messages();
	let layout = h.base.layout("fs-1").expect("valid id");

	assert_eq!(outcome, TaskOutcome::Handled);
	assert_eq!(codes(&tasks), vec![10, 12]);
	assert_eq!(tasks[1]["status"], update_sample::MISSING_SAMPLES);
	assert_eq!(tasks[1]["type"], "FS_UPDATE_SAMPLE");
	assert!(!layout.config_path().exists());
	assert_eq!(h.engine.calibrations(), 0);
}

#[tokio::test]
async fn tune_on_unbuilt_tenant_is_internal_error() {
	let mut h = Harness::new(StubEngine::new());

	h.handle(tune("fs-1", &["how to reset"], &["nice weather"])).await;

	let tasks = h.sink.task_messages();

	assert_eq!(codes(&tasks), vec![10, 13]);
	assert_eq!(tasks[1]["status"], update_sample::NOT_BUILT);
	assert_eq!(h.engine.calibrations(), 0);
}

#[tokio::test]
async fn tune_persists_calibrated_throttle() {
	let mut h = Harness::new(StubEngine::new().with_throttle(0.42));
	let layout = h.base.build_tenant("fs-1", 0.5).expect("Failed to build tenant.");

	h.handle(tune("fs-1", &["how to reset"], &["nice weather"])).await;

	assert_eq!(codes(&h.sink.task_messages()), vec![10, 0]);
	assert_eq!(layout.read_reject_throttle().expect("read failed"), 0.42);
}

#[tokio::test]
async fn tune_calibration_error_reports_failed() {
	let mut h = Harness::new(StubEngine::new().with_calibrate_error("rerank offline"));
	let layout = h.base.build_tenant("fs-1", 0.5).expect("Failed to build tenant.");

	h.handle(tune("fs-1", &["how to reset"], &["nice weather"])).await;

	let tasks = h.sink.task_messages();

	assert_eq!(codes(&tasks), vec![10, 11]);
	assert!(tasks[1]["status"].as_str().is_some_and(|s| s.contains("rerank offline")));
	assert_eq!(layout.read_reject_throttle().expect("read failed"), 0.5);
}

#[tokio::test]
async fn build_partial_success_reports_every_count() {
	let report = IngestReport { success: 3, fail: 1, skip: 1 };
	let mut h = Harness::new(StubEngine::new().with_report(report));
	let files = ["a.md", "b.md", "c.md", "d.pdf", "e.bin"];

	h.handle(build("fs-1", "/uploads", &files)).await;

	let tasks = h.sink.task_messages();
	let layout = h.base.layout("fs-1").expect("valid id");

	assert_eq!(codes(&tasks), vec![10, 0]);
	assert_eq!(tasks[0]["status"], "work in progress");
	assert_eq!(
		tasks[1]["status"],
		"Processed 3 files, skipped 1, 1 failed. Please check the file formats."
	);
	assert!(layout.is_complete());
	assert_eq!(layout.read_description().expect("read failed"), "Product manual");
	assert_eq!(layout.read_reject_throttle().expect("read failed"), 0.5);
}

#[tokio::test]
async fn build_with_no_success_fails() {
	let report = IngestReport { success: 0, fail: 2, skip: 0 };
	let mut h = Harness::new(StubEngine::new().with_report(report));

	h.handle(build("fs-1", "/uploads", &["a.md", "b.md"])).await;

	let tasks = h.sink.task_messages();

	assert_eq!(codes(&tasks), vec![10, 11]);
	assert_eq!(tasks[1]["status"], add_doc::NO_FILES_PROCESSED);
}

#[tokio::test]
async fn build_full_success_is_plain_success() {
	let report = IngestReport { success: 2, fail: 0, skip: 0 };
	let mut h = Harness::new(StubEngine::new().with_report(report));

	h.handle(build("fs-1", "/uploads", &["a.md", "b.md"])).await;

	let tasks = h.sink.task_messages();

	assert_eq!(codes(&tasks), vec![10, 0]);
	assert_eq!(tasks[1]["status"], "success");
}

#[tokio::test]
async fn build_ingest_error_reports_failed_with_message() {
	let mut h = Harness::new(StubEngine::new().with_ingest_error("embedding server down"));

	let outcome = h.handle(build("fs-1", "/uploads", &["a.md"])).await;
	let tasks = h.sink.task_messages();

	assert_eq!(outcome, TaskOutcome::Handled);
	assert_eq!(codes(&tasks), vec![10, 11]);
	assert!(tasks[1]["status"].as_str().is_some_and(|s| s.contains("embedding server down")));
}

#[tokio::test]
async fn build_without_template_is_fatal() {
	let base = TempBase::without_template().expect("Failed to create temp base.");
	let mut h = Harness::on(base, StubEngine::new(), DecodeErrorPolicy::Fatal);
	let message = build("fs-1", "/uploads", &["a.md"]).to_string();
	let result = h.dispatcher.handle_message(&message).await;

	assert!(matches!(result, Err(ref err) if err.is_fatal()));
	assert_eq!(codes(&h.sink.task_messages()), vec![10]);
	assert_eq!(h.engine.ingests(), 0);
}

#[tokio::test]
async fn unknown_type_is_dropped_and_loop_continues() {
	let mut h = Harness::new(StubEngine::new());

	h.base.build_tenant("fs-1", 0.5).expect("Failed to build tenant.");
	h.queue.push(json!({ "type": "FS_DELETE", "payload": { "feature_store_id": "fs-1" } }).to_string());
	h.queue.push(chat("fs-1", json!([])).to_string());

	let first = h.dispatcher.run_once().await.expect("Dispatch should not fail.");

	assert_eq!(first, Some(TaskOutcome::Dropped));
	assert!(h.sink.is_empty());

	let second = h.dispatcher.run_once().await.expect("Dispatch should not fail.");

	assert_eq!(second, Some(TaskOutcome::Handled));
	assert_eq!(h.sink.len(), 1);
	assert!(h.queue.is_empty());
}

#[tokio::test]
async fn empty_queue_is_a_timeout() {
	let mut h = Harness::new(StubEngine::new());

	assert_eq!(h.dispatcher.run_once().await.expect("Dispatch should not fail."), None);
}

#[tokio::test]
async fn malformed_message_is_fatal_by_default() {
	let mut h = Harness::new(StubEngine::new());
	let result = h.dispatcher.handle_message("{not json").await;

	assert!(matches!(result, Err(ref err @ Error::Decode(_)) if err.is_fatal()));
	assert!(h.sink.is_empty());
}

#[tokio::test]
async fn malformed_message_is_skipped_under_skip_policy() {
	let mut h = Harness::with_policy(StubEngine::new(), DecodeErrorPolicy::Skip);

	h.queue.push("{not json");
	h.queue.push(json!({ "type": "CHAT", "payload": { "query_id": "q" } }).to_string());

	assert_eq!(h.dispatcher.run_once().await.expect("skip"), Some(TaskOutcome::Skipped));
	assert_eq!(h.dispatcher.run_once().await.expect("skip"), Some(TaskOutcome::Skipped));
	assert!(h.sink.is_empty());
}

#[tokio::test]
async fn query_reports_answer_without_progress_message() {
	let mut h = Harness::new(StubEngine::new());

	h.base.build_tenant("fs-1", 0.5).expect("Failed to build tenant.");
	h.handle(chat("fs-1", json!([]))).await;

	let chats = h.sink.chat_messages();

	assert!(h.sink.task_messages().is_empty());
	assert_eq!(chats.len(), 1);
	assert_eq!(chats[0]["feature_store_id"], "fs-1");
	assert_eq!(chats[0]["query_id"], "q-1");
	assert_eq!(chats[0]["response"]["code"], 0);
	assert_eq!(chats[0]["response"]["text"], "stub answer");
	assert_eq!(chats[0]["response"]["references"], json!(["README.md"]));
}

#[tokio::test]
async fn query_merges_history_before_answering() {
	let mut h = Harness::new(StubEngine::new());
	let history = json!([
		{ "sender": 0, "content": "a" },
		{ "sender": 1, "content": "b" },
		{ "sender": 1, "content": "c" },
	]);

	h.base.build_tenant("fs-1", 0.5).expect("Failed to build tenant.");
	h.handle(chat("fs-1", history)).await;

	assert_eq!(h.engine.histories(), vec![vec![Exchange::new("a", "b\nc")]]);
}

#[tokio::test]
async fn query_on_unbuilt_tenant_is_internal_error() {
	let mut h = Harness::new(StubEngine::new());

	h.handle(chat("fs-missing", json!([]))).await;

	let chats = h.sink.chat_messages();

	assert_eq!(chats.len(), 1);
	assert_eq!(chats[0]["response"]["code"], 13);
	assert_eq!(h.engine.opens(), 0);
}

#[tokio::test]
async fn declined_answer_is_reported_as_internal_error() {
	let engine = StubEngine::new().with_answer(Answer::rejected(ErrorCode::Unrelated));
	let mut h = Harness::new(engine);

	h.base.build_tenant("fs-1", 0.5).expect("Failed to build tenant.");
	h.handle(chat("fs-1", json!([]))).await;

	let chats = h.sink.chat_messages();

	assert_eq!(chats[0]["response"]["code"], 13);
	assert_eq!(chats[0]["response"]["text"], "");
}

#[tokio::test]
async fn answer_error_is_reported_as_failed() {
	let mut h = Harness::new(StubEngine::new().with_answer_error("llm timeout"));

	h.base.build_tenant("fs-1", 0.5).expect("Failed to build tenant.");
	h.handle(chat("fs-1", json!([]))).await;

	let chats = h.sink.chat_messages();

	assert_eq!(chats.len(), 1);
	assert_eq!(chats[0]["response"]["code"], 11);
	assert!(chats[0]["response"]["status"].as_str().is_some_and(|s| s.contains("llm timeout")));
}

#[tokio::test]
async fn mutation_invalidates_cached_retriever() {
	let mut h = Harness::new(StubEngine::new().with_throttle(0.35));

	h.base.build_tenant("fs-1", 0.5).expect("Failed to build tenant.");
	h.handle(chat("fs-1", json!([]))).await;
	h.handle(chat("fs-1", json!([]))).await;

	assert_eq!(h.engine.opens(), 1);
	assert!(h.dispatcher.cache().contains("fs-1"));

	h.handle(tune("fs-1", &["how to reset"], &["nice weather"])).await;

	assert!(!h.dispatcher.cache().contains("fs-1"));

	h.handle(chat("fs-1", json!([]))).await;

	assert_eq!(h.engine.opens(), 2);
	assert_eq!(h.engine.open_throttles(), vec![0.5, 0.35]);
}

#[tokio::test]
async fn progress_precedes_terminal_status() {
	let report = IngestReport { success: 1, fail: 0, skip: 0 };
	let mut h = Harness::new(StubEngine::new().with_report(report));

	h.base.build_tenant("fs-1", 0.5).expect("Failed to build tenant.");
	h.handle(chat("fs-1", json!([]))).await;
	h.handle(build("fs-1", "/uploads", &["a.md"])).await;

	let all = h.sink.all();

	assert_eq!(all.len(), 3);
	assert_eq!(all[1].1["code"], 10);
	assert_eq!(all[2].1["code"], 0);
	assert!(!h.dispatcher.cache().contains("fs-1"));
}

#[tokio::test]
async fn failed_progress_push_still_invalidates_and_builds() {
	let report = IngestReport { success: 1, fail: 0, skip: 0 };
	let mut h = Harness::new(StubEngine::new().with_report(report));

	h.base.build_tenant("fs-1", 0.5).expect("Failed to build tenant.");
	h.handle(chat("fs-1", json!([]))).await;
	h.handle(chat("fs-1", json!([]))).await;

	assert!(h.dispatcher.cache().contains("fs-1"));

	h.sink.fail_next(1);

	let outcome = h.handle(build("fs-1", "/uploads", &["a.md"])).await;

	assert_eq!(outcome, TaskOutcome::Handled);
	assert_eq!(h.engine.ingests(), 1);
	assert!(!h.dispatcher.cache().contains("fs-1"));
	assert_eq!(codes(&h.sink.task_messages()), vec![0]);
	assert_eq!(h.sink.attempts(), 4);
}

#[tokio::test]
async fn failed_terminal_push_is_faulted_and_next_task_runs() {
	let report = IngestReport { success: 1, fail: 0, skip: 0 };
	let mut h = Harness::new(StubEngine::new().with_report(report));

	h.base.build_tenant("fs-1", 0.5).expect("Failed to build tenant.");
	h.sink.fail_next(2);

	let outcome = h.handle(build("fs-1", "/uploads", &["a.md"])).await;

	assert_eq!(outcome, TaskOutcome::Faulted);
	assert_eq!(h.engine.ingests(), 1);
	assert!(h.sink.is_empty());

	let next = h.handle(chat("fs-1", json!([]))).await;

	assert_eq!(next, TaskOutcome::Handled);
	assert_eq!(h.sink.chat_messages().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn run_backs_off_on_queue_errors_and_stops_on_fatal_decode() {
	let base = TempBase::new().expect("Failed to create temp base.");

	base.build_tenant("fs-1", 0.5).expect("Failed to build tenant.");

	let queue = MemoryQueue::new([chat("fs-1", json!([])).to_string(), "{not json".to_string()]);

	queue.fail_next(3);

	let mut h = Harness::with_queue(base, StubEngine::new(), DecodeErrorPolicy::Fatal, queue);
	let started = tokio::time::Instant::now();
	let result = h.dispatcher.run().await;

	assert!(matches!(result, Err(Error::Decode(_))));
	assert!(started.elapsed() >= Duration::from_millis(500 + 1_000 + 2_000));
	assert_eq!(h.sink.chat_messages().len(), 1);
	assert!(h.queue.is_empty());
}
