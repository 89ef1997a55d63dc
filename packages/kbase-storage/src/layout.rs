use std::{
	fs,
	path::{Component, Path, PathBuf},
};

use crate::{Error, Result, tenant_config};

pub const WORKDIR: &str = "workdir";
pub const REPODIR: &str = "repodir";
pub const CONFIG_FILE: &str = "config.ini";
pub const DESCRIPTION_FILE: &str = "desc";

/// On-disk namespace of one feature store under the shared base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantLayout {
	feature_store_id: String,
	root: PathBuf,
}
impl TenantLayout {
	pub fn new(base: &Path, feature_store_id: &str) -> Result<Self> {
		validate_feature_store_id(feature_store_id)?;

		Ok(Self { feature_store_id: feature_store_id.to_string(), root: base.join(feature_store_id) })
	}

	pub fn feature_store_id(&self) -> &str {
		&self.feature_store_id
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	pub fn workdir(&self) -> PathBuf {
		self.root.join(WORKDIR)
	}

	pub fn repodir(&self) -> PathBuf {
		self.root.join(REPODIR)
	}

	pub fn config_path(&self) -> PathBuf {
		self.root.join(CONFIG_FILE)
	}

	pub fn description_path(&self) -> PathBuf {
		self.root.join(DESCRIPTION_FILE)
	}

	/// Workspace and config exist, so a retriever can be opened.
	pub fn is_built(&self) -> bool {
		self.workdir().is_dir() && self.config_path().is_file()
	}

	/// Every artifact a build leaves behind exists, so the store can be tuned.
	pub fn is_complete(&self) -> bool {
		self.is_built() && self.repodir().is_dir()
	}

	pub fn ensure_dirs(&self) -> Result<()> {
		for dir in [self.workdir(), self.repodir()] {
			fs::create_dir_all(&dir).map_err(Error::io(&dir))?;
		}

		Ok(())
	}

	/// Copies `template` into place unless the tenant already has a config. Returns whether a
	/// copy happened.
	pub fn seed_config(&self, template: &Path) -> Result<bool> {
		let config_path = self.config_path();

		if config_path.is_file() {
			return Ok(false);
		}
		if !template.is_file() {
			return Err(Error::MissingTemplate { path: template.to_path_buf() });
		}

		fs::copy(template, &config_path).map_err(Error::io(&config_path))?;

		tracing::info!(
			feature_store_id = %self.feature_store_id,
			template = %template.display(),
			"Seeded feature store config from template."
		);

		Ok(true)
	}

	pub fn write_description(&self, name: &str) -> Result<()> {
		let path = self.description_path();

		fs::write(&path, name).map_err(Error::io(&path))
	}

	pub fn read_description(&self) -> Result<String> {
		let path = self.description_path();

		fs::read_to_string(&path).map_err(Error::io(&path))
	}

	pub fn read_reject_throttle(&self) -> Result<f64> {
		if !self.is_built() {
			return Err(Error::NotFound(format!(
				"feature store {} has no workdir or config",
				self.feature_store_id
			)));
		}

		tenant_config::read_reject_throttle(&self.config_path())
	}

	pub fn write_reject_throttle(&self, value: f64) -> Result<()> {
		tenant_config::write_reject_throttle(&self.config_path(), value)
	}
}

fn validate_feature_store_id(feature_store_id: &str) -> Result<()> {
	if feature_store_id.trim().is_empty() {
		return Err(Error::InvalidArgument("feature_store_id must be non-empty.".to_string()));
	}

	let mut components = Path::new(feature_store_id).components();
	let single_normal = matches!(components.next(), Some(Component::Normal(_)))
		&& components.next().is_none();

	if !single_normal {
		return Err(Error::InvalidArgument(format!(
			"feature_store_id {feature_store_id:?} must be a single path component."
		)));
	}

	Ok(())
}
