//! `params.yaml`: non-secret settings shared by all jobs, with one block per
//! source and deployment environment.
//!
//! ```yaml
//! project_raw: acme-raw
//! slack_channel_id: C0123
//! sources:
//!   - name: andhra_pradesh_ccp
//!     environments:
//!       - name: prod
//!         dataset: ccp
//!       - name: dev
//!         dataset: ccp_dev
//! ```

use crate::{environment::Environment, error::ConfigError};
use serde::{Deserialize, de::DeserializeOwned};
use serde_yaml::{Mapping, Value};
use std::{fs, path::Path};

#[derive(Debug, Clone, Deserialize)]
struct SourceEntry {
    name: String,
    #[serde(default)]
    environments: Vec<Mapping>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParamsFile {
    #[serde(default)]
    sources: Vec<SourceEntry>,
    #[serde(flatten)]
    globals: Mapping,
}

impl ParamsFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content).map_err(|e| match e {
            ConfigError::Yaml { source, .. } => ConfigError::Yaml {
                what: path.display().to_string(),
                source,
            },
            other => other,
        })
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|source| ConfigError::Yaml {
            what: "params".into(),
            source,
        })
    }

    /// Top-level values, without any source block applied.
    pub fn globals(&self) -> SourceParams {
        SourceParams {
            values: self.globals.clone(),
        }
    }

    fn block(&self, source: &str, environment: Environment) -> Result<&Mapping, ConfigError> {
        let entry = self
            .sources
            .iter()
            .find(|s| s.name == source)
            .ok_or_else(|| ConfigError::UnknownSource(source.to_string()))?;

        entry
            .environments
            .iter()
            .find(|env| env.get("name").and_then(Value::as_str) == Some(environment.as_str()))
            .ok_or_else(|| ConfigError::UnknownEnvironment {
                source_name: source.to_string(),
                environment: environment.to_string(),
            })
    }

    /// Top-level values overlaid with the `environment` block of `source`.
    pub fn resolve(&self, source: &str, environment: Environment) -> Result<SourceParams, ConfigError> {
        let mut values = self.globals.clone();
        for (key, value) in self.block(source, environment)? {
            if key.as_str() != Some("name") {
                values.insert(key.clone(), value.clone());
            }
        }
        Ok(SourceParams { values })
    }

    /// Only the values set in the `environment` block of `source`.
    pub fn resolve_block(&self, source: &str, environment: Environment) -> Result<SourceParams, ConfigError> {
        let mut values = self.block(source, environment)?.clone();
        values.remove("name");
        Ok(SourceParams { values })
    }
}

/// Parameters of one source in one environment.
#[derive(Debug, Clone, Default)]
pub struct SourceParams {
    values: Mapping,
}

impl SourceParams {
    pub fn from_mapping(values: Mapping) -> Self {
        SourceParams { values }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn require_str(&self, key: &str) -> Result<&str, ConfigError> {
        self.get_str(key)
            .ok_or_else(|| ConfigError::missing(format!("parameter `{key}`")))
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.values.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_yaml::from_value(value.clone())
                .map(Some)
                .map_err(|source| ConfigError::Yaml {
                    what: format!("parameter `{key}`"),
                    source,
                }),
        }
    }

    pub fn mapping(&self, key: &str) -> Result<Mapping, ConfigError> {
        Ok(self.get::<Mapping>(key)?.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARAMS: &str = r#"
project_raw: acme-raw
slack_channel_id: C-GLOBAL
sources:
  - name: andhra_pradesh_ccp
    environments:
      - name: prod
        dataset: ccp
      - name: dev
        dataset: ccp_dev
        slack_channel_id: C-DEV
"#;

    #[test]
    fn test_resolve_overlays_environment() {
        let params = ParamsFile::from_yaml(PARAMS).unwrap();

        let prod = params.resolve("andhra_pradesh_ccp", Environment::Prod).unwrap();
        assert_eq!(prod.get_str("dataset"), Some("ccp"));
        assert_eq!(prod.get_str("slack_channel_id"), Some("C-GLOBAL"));
        assert_eq!(prod.get_str("project_raw"), Some("acme-raw"));
        assert_eq!(prod.get_str("name"), None);

        let dev = params.resolve("andhra_pradesh_ccp", Environment::Dev).unwrap();
        assert_eq!(dev.get_str("dataset"), Some("ccp_dev"));
        assert_eq!(dev.get_str("slack_channel_id"), Some("C-DEV"));
    }

    #[test]
    fn test_resolve_block_skips_globals() {
        let params = ParamsFile::from_yaml(PARAMS).unwrap();
        let dev = params.resolve_block("andhra_pradesh_ccp", Environment::Dev).unwrap();
        assert_eq!(dev.get_str("slack_channel_id"), Some("C-DEV"));
        assert_eq!(dev.get_str("project_raw"), None);
        assert_eq!(dev.get_str("name"), None);

        let prod = params.resolve_block("andhra_pradesh_ccp", Environment::Prod).unwrap();
        assert_eq!(prod.get_str("slack_channel_id"), None);
    }

    #[test]
    fn test_unknown_source_and_environment() {
        let params = ParamsFile::from_yaml(PARAMS).unwrap();
        assert!(matches!(
            params.resolve("nope", Environment::Prod),
            Err(ConfigError::UnknownSource(_))
        ));

        let single = ParamsFile::from_yaml(
            "sources:\n  - name: s\n    environments:\n      - name: dev\n",
        )
        .unwrap();
        assert!(matches!(
            single.resolve("s", Environment::Prod),
            Err(ConfigError::UnknownEnvironment { .. })
        ));
    }

    #[test]
    fn test_typed_get() {
        let params = ParamsFile::from_yaml("chunk_days: 45\nsources: []\n").unwrap();
        let globals = params.globals();
        assert_eq!(globals.get::<u32>("chunk_days").unwrap(), Some(45));
        assert_eq!(globals.get::<u32>("missing").unwrap(), None);
        assert!(matches!(globals.require_str("dataset"), Err(ConfigError::Missing(_))));
    }
}
