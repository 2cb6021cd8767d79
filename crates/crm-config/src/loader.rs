//! Multi-file configuration loading.
//!
//! Handles `include = [...]` directives so deployments can keep carrier
//! credentials in a separate file from pacing settings, while rejecting
//! duplicate sections and circular includes.

use crate::{resolve_env_vars, Config, ConfigError};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Loader that resolves includes relative to a base directory.
pub struct ConfigLoader {
	/// Base path for resolving relative includes.
	base_path: PathBuf,
	/// Files already loaded, to prevent circular includes.
	loaded_files: HashSet<PathBuf>,
	/// Which file each top-level section came from, for error reporting.
	section_sources: HashMap<String, PathBuf>,
}

impl ConfigLoader {
	pub fn new(base_path: impl AsRef<Path>) -> Self {
		Self {
			base_path: base_path.as_ref().to_path_buf(),
			loaded_files: HashSet::new(),
			section_sources: HashMap::new(),
		}
	}

	/// Loads a configuration file and all of its includes.
	pub async fn load_config(
		&mut self,
		config_path: impl AsRef<Path>,
	) -> Result<Config, ConfigError> {
		let config_path = self.resolve_path(config_path)?;

		let main_content = self.load_file(&config_path).await?;
		let mut main_toml: toml::Value = toml::from_str(&main_content)?;

		let includes = extract_includes(&main_toml)?;
		if includes.is_empty() {
			let config: Config = main_content.parse()?;
			return Ok(config);
		}

		// Strip the include directive, then merge each included file in,
		// refusing duplicate top-level sections.
		if let Some(table) = main_toml.as_table_mut() {
			table.remove("include");
		}
		if let Some(main_table) = main_toml.as_table() {
			for key in main_table.keys() {
				self.section_sources
					.insert(key.clone(), config_path.clone());
			}
		}

		for include_path in includes {
			let resolved_path = self.resolve_path(&include_path)?;
			let include_content = self.load_file(&resolved_path).await?;
			let include_toml: toml::Value = toml::from_str(&include_content)?;

			if let Some(include_table) = include_toml.as_table() {
				for key in include_table.keys() {
					if let Some(existing) = self.section_sources.get(key) {
						return Err(ConfigError::Validation(format!(
							"Duplicate section '{}' found in {} and {}. \
							Each top-level section must be unique across all configuration files.",
							key,
							existing.display(),
							resolved_path.display()
						)));
					}
					self.section_sources
						.insert(key.clone(), resolved_path.clone());
				}

				if let Some(main_table) = main_toml.as_table_mut() {
					for (key, value) in include_table {
						main_table.insert(key.clone(), value.clone());
					}
				}
			}
		}

		let config_str = toml::to_string(&main_toml).map_err(|e| {
			ConfigError::Parse(format!("Failed to serialize combined config: {}", e))
		})?;
		let config: Config = config_str.parse()?;
		Ok(config)
	}

	/// Loads a file and resolves environment variables.
	async fn load_file(&mut self, path: &Path) -> Result<String, ConfigError> {
		let canonical_path = path.canonicalize().map_err(|e| {
			ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Cannot resolve path {}: {}", path.display(), e),
			))
		})?;

		if !self.loaded_files.insert(canonical_path.clone()) {
			return Err(ConfigError::Validation(format!(
				"Circular include detected: {} was already loaded",
				canonical_path.display()
			)));
		}

		let content = tokio::fs::read_to_string(path).await?;
		resolve_env_vars(&content)
	}

	/// Resolves a path relative to the base path, verifying it exists.
	fn resolve_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, ConfigError> {
		let path = path.as_ref();
		let resolved = if path.is_absolute() {
			path.to_path_buf()
		} else {
			self.base_path.join(path)
		};

		if !resolved.exists() {
			return Err(ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Configuration file not found: {}", resolved.display()),
			)));
		}

		Ok(resolved)
	}
}

/// Extracts include directives (string or array of strings).
fn extract_includes(toml: &toml::Value) -> Result<Vec<PathBuf>, ConfigError> {
	let mut includes = Vec::new();

	if let Some(include_value) = toml.get("include") {
		if let Some(include_array) = include_value.as_array() {
			for item in include_array {
				match item.as_str() {
					Some(path_str) => includes.push(PathBuf::from(path_str)),
					None => {
						return Err(ConfigError::Validation(
							"Include array must contain only strings".into(),
						))
					},
				}
			}
		} else if let Some(path_str) = include_value.as_str() {
			includes.push(PathBuf::from(path_str));
		} else {
			return Err(ConfigError::Validation(
				"Include must be a string or array of strings".into(),
			));
		}
	}

	Ok(includes)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;
	use tempfile::TempDir;

	const BASE_SECTIONS: &str = r#"
[storage]
primary = "memory"
[storage.implementations.memory]

[tracking]
priority = ["fixture"]
[tracking.implementations.fixture]

[notification]
primary = "log"
from_address = "orders@example.com"
[notification.implementations.log]
"#;

	#[tokio::test]
	async fn single_file_config() {
		let temp_dir = TempDir::new().unwrap();
		let config_path = temp_dir.path().join("config.toml");
		fs::write(
			&config_path,
			format!("[crm]\nid = \"wrapcrm-test\"\n{}", BASE_SECTIONS),
		)
		.unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let config = loader.load_config(&config_path).await.unwrap();
		assert_eq!(config.crm.id, "wrapcrm-test");
	}

	#[tokio::test]
	async fn config_with_includes() {
		let temp_dir = TempDir::new().unwrap();

		let main_config = r#"
include = ["backends.toml"]
[crm]
id = "wrapcrm-test"
"#;
		fs::write(temp_dir.path().join("main.toml"), main_config).unwrap();
		fs::write(temp_dir.path().join("backends.toml"), BASE_SECTIONS).unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let config = loader.load_config("main.toml").await.unwrap();
		assert_eq!(config.crm.id, "wrapcrm-test");
		assert_eq!(config.storage.primary, "memory");
	}

	#[tokio::test]
	async fn duplicate_section_rejected() {
		let temp_dir = TempDir::new().unwrap();

		let main_config = r#"
include = ["dup.toml"]
[crm]
id = "wrapcrm-test"
"#;
		let dup_config = "[crm]\nid = \"other\"\n";
		fs::write(temp_dir.path().join("main.toml"), main_config).unwrap();
		fs::write(temp_dir.path().join("dup.toml"), dup_config).unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let result = loader.load_config("main.toml").await;
		assert!(result
			.unwrap_err()
			.to_string()
			.contains("Duplicate section 'crm'"));
	}

	#[tokio::test]
	async fn self_include_detected() {
		let temp_dir = TempDir::new().unwrap();
		let config = r#"
include = ["self.toml"]
[crm]
id = "wrapcrm-test"
"#;
		fs::write(temp_dir.path().join("self.toml"), config).unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let result = loader.load_config("self.toml").await;
		assert!(result.unwrap_err().to_string().contains("already loaded"));
	}
}
