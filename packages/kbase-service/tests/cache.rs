use std::sync::Arc;

use kbase_service::{Error, ResourceCache};
use kbase_testkit::{StubEngine, TempBase};

fn cache_with(base: &TempBase, engine: &Arc<StubEngine>, max_len: usize) -> ResourceCache {
	ResourceCache::new(base.base().to_path_buf(), max_len, engine.clone())
}

#[tokio::test]
async fn overflow_evicts_the_least_recently_used_tenant() {
	for max_len in 1..=4_usize {
		let base = TempBase::new().expect("Failed to create temp base.");
		let engine = Arc::new(StubEngine::new());
		let mut cache = cache_with(&base, &engine, max_len);
		let ids: Vec<String> = (0..=max_len).map(|i| format!("fs-{i}")).collect();

		for id in &ids {
			base.build_tenant(id, 0.5).expect("Failed to build tenant.");
		}
		for id in &ids[..max_len] {
			cache.get(id).await.expect("Expected a retriever.");
		}

		// Touch the oldest entry so the second oldest becomes the victim.
		let victim = if max_len > 1 {
			cache.get(&ids[0]).await.expect("Expected a cached retriever.");

			&ids[1]
		} else {
			&ids[0]
		};
		let before: Vec<(String, u64)> = ids[..max_len]
			.iter()
			.map(|id| (id.clone(), cache.last_access(id).expect("Entry should be resident.")))
			.collect();
		let oldest = before.iter().min_by_key(|(_, tick)| *tick).map(|(id, _)| id.clone());

		assert_eq!(oldest.as_ref(), Some(victim));

		cache.get(&ids[max_len]).await.expect("Expected a retriever.");

		assert_eq!(cache.len(), max_len);
		assert!(!cache.contains(victim));
		assert!(cache.contains(&ids[max_len]));
		assert_eq!(engine.opens(), max_len + 1);
	}
}

#[tokio::test]
async fn hits_do_not_reopen() {
	let base = TempBase::new().expect("Failed to create temp base.");
	let engine = Arc::new(StubEngine::new());
	let mut cache = cache_with(&base, &engine, 2);

	base.build_tenant("fs-a", 0.5).expect("Failed to build tenant.");

	cache.get("fs-a").await.expect("Expected a retriever.");

	let first = cache.last_access("fs-a");

	cache.get("fs-a").await.expect("Expected a cached retriever.");

	assert_eq!(engine.opens(), 1);
	assert!(cache.last_access("fs-a") > first);
}

#[tokio::test]
async fn missing_tenant_is_not_found_without_opening() {
	let base = TempBase::new().expect("Failed to create temp base.");
	let engine = Arc::new(StubEngine::new());
	let mut cache = cache_with(&base, &engine, 2);
	let result = cache.get("fs-missing").await;

	assert!(matches!(result, Err(Error::NotFound { .. })));
	assert_eq!(engine.opens(), 0);
	assert!(cache.is_empty());
}

#[tokio::test]
async fn workdir_without_config_is_not_found() {
	let base = TempBase::new().expect("Failed to create temp base.");
	let engine = Arc::new(StubEngine::new());
	let mut cache = cache_with(&base, &engine, 2);
	let layout = base.layout("fs-partial").expect("valid id");

	layout.ensure_dirs().expect("Failed to create dirs.");

	assert!(matches!(cache.get("fs-partial").await, Err(Error::NotFound { .. })));
	assert_eq!(engine.opens(), 0);
}

#[tokio::test]
async fn not_found_does_not_evict() {
	let base = TempBase::new().expect("Failed to create temp base.");
	let engine = Arc::new(StubEngine::new());
	let mut cache = cache_with(&base, &engine, 1);

	base.build_tenant("fs-a", 0.5).expect("Failed to build tenant.");

	cache.get("fs-a").await.expect("Expected a retriever.");

	assert!(cache.get("fs-missing").await.is_err());
	assert!(cache.contains("fs-a"));
}

#[tokio::test]
async fn invalidate_then_get_reopens_with_fresh_throttle() {
	let base = TempBase::new().expect("Failed to create temp base.");
	let engine = Arc::new(StubEngine::new());
	let mut cache = cache_with(&base, &engine, 2);
	let layout = base.build_tenant("fs-a", 0.25).expect("Failed to build tenant.");

	cache.get("fs-a").await.expect("Expected a retriever.");
	layout.write_reject_throttle(0.75).expect("Failed to update throttle.");

	assert!(cache.invalidate("fs-a"));
	assert!(!cache.invalidate("fs-a"));

	cache.get("fs-a").await.expect("Expected a reopened retriever.");

	assert_eq!(engine.opens(), 2);
	assert_eq!(engine.open_throttles(), vec![0.25, 0.75]);
}

#[tokio::test]
async fn invalid_tenant_ids_are_rejected() {
	let base = TempBase::new().expect("Failed to create temp base.");
	let engine = Arc::new(StubEngine::new());
	let mut cache = cache_with(&base, &engine, 2);

	for id in ["", "..", "a/b"] {
		assert!(matches!(cache.get(id).await, Err(Error::InvalidRequest { .. })), "id {id:?}");
	}

	assert_eq!(engine.opens(), 0);
}
