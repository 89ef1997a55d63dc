use std::{
	collections::{BTreeMap, HashMap},
	path::PathBuf,
	sync::Arc,
};

use kbase_storage::TenantLayout;

use crate::{Error, KnowledgeEngine, Result, Retriever};

struct CacheEntry {
	handle: Box<dyn Retriever>,
	last_access: u64,
}

/// Bounded map from feature store id to its opened retriever, evicting the least recently used
/// entry when full.
///
/// `last_access` is a logical clock that advances on every hit or insert, so it is strictly
/// increasing across the cache and `recency` can be keyed by it. Every mutation takes
/// `&mut self`; a caller that shares the cache across tasks must serialize access per tenant so
/// an invalidation cannot interleave with a lazy open.
pub struct ResourceCache {
	base_dir: PathBuf,
	max_len: usize,
	engine: Arc<dyn KnowledgeEngine>,
	entries: HashMap<String, CacheEntry>,
	recency: BTreeMap<u64, String>,
	clock: u64,
}
impl ResourceCache {
	pub fn new(base_dir: PathBuf, max_len: usize, engine: Arc<dyn KnowledgeEngine>) -> Self {
		Self {
			base_dir,
			max_len: max_len.max(1),
			engine,
			entries: HashMap::new(),
			recency: BTreeMap::new(),
			clock: 0,
		}
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn max_len(&self) -> usize {
		self.max_len
	}

	pub fn contains(&self, feature_store_id: &str) -> bool {
		self.entries.contains_key(feature_store_id)
	}

	pub fn last_access(&self, feature_store_id: &str) -> Option<u64> {
		self.entries.get(feature_store_id).map(|entry| entry.last_access)
	}

	/// Returns the tenant's retriever, opening it on a miss.
	///
	/// A miss fails with [`Error::NotFound`] when the tenant's workdir or config file is absent,
	/// without evicting anything or calling the engine.
	pub async fn get(&mut self, feature_store_id: &str) -> Result<&dyn Retriever> {
		if !self.entries.contains_key(feature_store_id) {
			let layout = TenantLayout::new(&self.base_dir, feature_store_id)?;

			if !layout.is_built() {
				return Err(Error::NotFound {
					message: format!("feature store {feature_store_id} has no workdir or config"),
				});
			}

			let reject_throttle = layout.read_reject_throttle()?;

			if self.entries.len() >= self.max_len {
				self.evict_lru();
			}

			let handle = self.engine.open(&layout, reject_throttle).await?;

			self.entries.insert(feature_store_id.to_string(), CacheEntry { handle, last_access: 0 });

			tracing::info!(
				feature_store_id,
				reject_throttle,
				resident = self.entries.len(),
				"Opened feature store retriever."
			);
		}

		self.touch(feature_store_id)
	}

	/// Drops the tenant's retriever if one is resident.
	pub fn invalidate(&mut self, feature_store_id: &str) -> bool {
		let Some(entry) = self.entries.remove(feature_store_id) else {
			return false;
		};

		self.recency.remove(&entry.last_access);

		drop(entry);

		tracing::info!(feature_store_id, "Invalidated cached feature store retriever.");

		true
	}

	fn touch(&mut self, feature_store_id: &str) -> Result<&dyn Retriever> {
		self.clock += 1;

		let tick = self.clock;
		let entry = self.entries.get_mut(feature_store_id).ok_or_else(|| Error::NotFound {
			message: format!("feature store {feature_store_id} is not cached"),
		})?;

		self.recency.remove(&entry.last_access);
		self.recency.insert(tick, feature_store_id.to_string());

		entry.last_access = tick;

		Ok(entry.handle.as_ref())
	}

	fn evict_lru(&mut self) {
		let Some((last_access, victim)) = self.recency.pop_first() else {
			return;
		};

		self.entries.remove(&victim);

		tracing::info!(feature_store_id = %victim, last_access, "Evicted least recently used retriever.");
	}
}
