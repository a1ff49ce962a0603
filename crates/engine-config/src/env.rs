use crate::error::ConfigError;
use std::{collections::HashMap, fs, path::Path};

/// Snapshot of the process environment, optionally overlaid with a
/// `KEY=VALUE` file. Secrets are resolved from the snapshot so nothing reads
/// the live environment after startup.
#[derive(Debug, Clone, Default)]
pub struct EnvManager {
    vars: HashMap<String, String>,
}

impl EnvManager {
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Load variables from a .env file; file values win over the process.
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        self.parse_env_content(&content)
    }

    /// Value of `key`; empty values count as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn require(&self, key: &str) -> Result<&str, ConfigError> {
        self.get(key)
            .ok_or_else(|| ConfigError::missing(format!("environment variable {key}")))
    }

    fn parse_env_content(&mut self, content: &str) -> Result<(), ConfigError> {
        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let line = line.strip_prefix("export ").unwrap_or(line);
            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigError::Invalid(format!(
                    "env file line {} is not KEY=VALUE",
                    line_num + 1
                )));
            };
            let key = key.trim();
            if key.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "env file line {} has an empty key",
                    line_num + 1
                )));
            }

            self.vars.insert(key.to_string(), Self::unquote_value(value));
        }

        Ok(())
    }

    /// Strips matching quotes. Double-quoted values also expand `\n`, which
    /// is how multi-line secrets (PEM keys, YAML) fit on one line.
    fn unquote_value(value: &str) -> String {
        let value = value.trim();

        if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
            return value[1..value.len() - 1].replace("\\n", "\n");
        }

        if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
            return value[1..value.len() - 1].to_string();
        }

        value.to_string()
    }
}
