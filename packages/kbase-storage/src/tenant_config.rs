use std::{fs, path::Path};

use toml::{Table, Value};

use crate::{Error, Result};

pub const FEATURE_STORE_SECTION: &str = "feature_store";
pub const REJECT_THROTTLE_KEY: &str = "reject_throttle";

pub fn read_reject_throttle(path: &Path) -> Result<f64> {
	let table = read_table(path)?;
	let value = table
		.get(FEATURE_STORE_SECTION)
		.and_then(Value::as_table)
		.and_then(|section| section.get(REJECT_THROTTLE_KEY))
		.ok_or_else(|| Error::InvalidConfig {
			path: path.to_path_buf(),
			message: format!("missing {FEATURE_STORE_SECTION}.{REJECT_THROTTLE_KEY}"),
		})?;

	match value {
		Value::Float(value) => Ok(*value),
		Value::Integer(value) => Ok(*value as f64),
		other => Err(Error::InvalidConfig {
			path: path.to_path_buf(),
			message: format!("{REJECT_THROTTLE_KEY} must be a number, found {}", other.type_str()),
		}),
	}
}

/// Rewrites `reject_throttle` and keeps every other key in the file.
pub fn write_reject_throttle(path: &Path, value: f64) -> Result<()> {
	if !value.is_finite() {
		return Err(Error::InvalidArgument(format!("{REJECT_THROTTLE_KEY} must be finite.")));
	}

	let mut table = read_table(path)?;
	let section = table
		.entry(FEATURE_STORE_SECTION.to_string())
		.or_insert_with(|| Value::Table(Table::new()));
	let Some(section) = section.as_table_mut() else {
		return Err(Error::InvalidConfig {
			path: path.to_path_buf(),
			message: format!("{FEATURE_STORE_SECTION} must be a table"),
		});
	};

	section.insert(REJECT_THROTTLE_KEY.to_string(), Value::Float(value));

	let rendered = toml::to_string(&table).map_err(|err| Error::InvalidConfig {
		path: path.to_path_buf(),
		message: err.to_string(),
	})?;

	fs::write(path, rendered).map_err(Error::io(path))
}

fn read_table(path: &Path) -> Result<Table> {
	let raw = fs::read_to_string(path).map_err(Error::io(path))?;

	toml::from_str(&raw)
		.map_err(|err| Error::InvalidConfig { path: path.to_path_buf(), message: err.to_string() })
}
