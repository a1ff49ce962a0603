use crate::{
    error::ConfigError,
    params::SourceParams,
    secrets::{SOURCE_PARAMS, Secrets},
    settings::{JobSettings, WarehouseSettings},
};
use connectors::source::rest::RestSourceConfig;
use model::window::lookback::{Lookback, LookbackHours};
use serde_yaml::{Mapping, Value};

#[derive(Debug, Clone)]
pub struct RestSettings {
    pub warehouse: WarehouseSettings,
    pub table: String,
    pub endpoint: RestSourceConfig,
    pub lookback: Lookback,
    /// Timestamp column of `table` the watermark is read from.
    pub watermark_column: Option<String>,
}

impl JobSettings for RestSettings {
    fn resolve(params: &SourceParams, secrets: &Secrets<'_>) -> Result<Self, ConfigError> {
        // Non-secret endpoint shape from params, URL and credentials from the
        // secret document; the secret wins on overlap.
        let mut endpoint = params.mapping("endpoint")?;
        let secret: Mapping = secrets.source_params()?;
        for (key, value) in secret {
            endpoint.insert(key, value);
        }
        let endpoint: RestSourceConfig = serde_yaml::from_value(Value::Mapping(endpoint))
            .map_err(|source| ConfigError::Yaml {
                what: format!("endpoint + {SOURCE_PARAMS}"),
                source,
            })?;

        let lookback = params.get::<Lookback>("lookback")?.unwrap_or(Lookback::Hours {
            hours: LookbackHours::default(),
        });
        let watermark_column = params.get_str("watermark_column").map(String::from);
        if matches!(lookback, Lookback::Watermark { .. }) && watermark_column.is_none() {
            return Err(ConfigError::missing(
                "parameter `watermark_column` for a watermark lookback",
            ));
        }

        Ok(RestSettings {
            warehouse: WarehouseSettings::resolve(params, secrets)?,
            table: params.require_str("table")?.to_string(),
            endpoint,
            lookback,
            watermark_column,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        env::EnvManager,
        environment::Environment,
        params::ParamsFile,
        settings::{ConfigLoader, fixtures},
    };
    use connectors::source::rest::RestAuth;

    #[test]
    fn test_endpoint_merges_secret_document() {
        let loader = ConfigLoader::new(
            ParamsFile::from_yaml(fixtures::PARAMS).unwrap(),
            EnvManager::from_vars([
                ("SERVICE_ACCOUNT_KEY", fixtures::KEY),
                (
                    "SOURCE_PARAMS",
                    "base_url: https://events.example\nauth:\n  type: bearer\n  token: t\n",
                ),
            ]),
            Some(Environment::Prod),
        );
        let settings = loader.load::<RestSettings>("events_api").unwrap().settings;
        assert_eq!(settings.endpoint.url(), "https://events.example/v1/events");
        assert_eq!(settings.endpoint.page_size, 50);
        assert!(matches!(settings.endpoint.auth, RestAuth::Bearer { .. }));
        assert_eq!(settings.lookback, Lookback::Watermark { overlap_days: 30 });
        assert_eq!(settings.watermark_column.as_deref(), Some("updated_at"));
        assert_eq!(settings.table, "events");
    }

    #[test]
    fn test_hour_lookback_rejects_other_spans() {
        let params = ParamsFile::from_yaml(
            "sources:\n  - name: s\n    environments:\n      - name: prod\n        lookback: {unit: hours, hours: 24}\n",
        )
        .unwrap();
        let resolved = params.resolve("s", Environment::Prod).unwrap();
        assert!(resolved.get::<Lookback>("lookback").is_err());
    }
}
