//! Secrets injected by the scheduler as environment variables.

use crate::{env::EnvManager, error::ConfigError};
use connectors::gcp::auth::ServiceAccountKey;
use serde::de::DeserializeOwned;

pub const SERVICE_ACCOUNT_KEY: &str = "SERVICE_ACCOUNT_KEY";
pub const SERVICE_ACCOUNT_KEY_ANALYTICS: &str = "SERVICE_ACCOUNT_KEY_ANALYTICS";
pub const SLACK_TOKEN: &str = "SLACK_TOKEN";
pub const SOURCE_PARAMS: &str = "SOURCE_PARAMS";
pub const RUN_URL: &str = "RUN_URL";
pub const GITHUB_REF_NAME: &str = "GITHUB_REF_NAME";

pub struct Secrets<'a> {
    env: &'a EnvManager,
}

impl<'a> Secrets<'a> {
    pub fn new(env: &'a EnvManager) -> Self {
        Secrets { env }
    }

    fn key_from(&self, var: &str) -> Result<ServiceAccountKey, ConfigError> {
        let raw = self.env.require(var)?;
        ServiceAccountKey::from_json(raw)
            .map_err(|e| ConfigError::Invalid(format!("{var} is not a service-account key: {e}")))
    }

    /// Key for the warehouse and bucket the jobs write to.
    pub fn service_account_key(&self) -> Result<ServiceAccountKey, ConfigError> {
        self.key_from(SERVICE_ACCOUNT_KEY)
    }

    pub fn has_service_account_key(&self) -> bool {
        self.env.get(SERVICE_ACCOUNT_KEY).is_some()
    }

    /// Key for the analytics project; the main key when no separate one is set.
    pub fn analytics_key(&self) -> Result<ServiceAccountKey, ConfigError> {
        if self.env.get(SERVICE_ACCOUNT_KEY_ANALYTICS).is_some() {
            self.key_from(SERVICE_ACCOUNT_KEY_ANALYTICS)
        } else {
            self.service_account_key()
        }
    }

    pub fn slack_token(&self) -> Option<String> {
        self.env.get(SLACK_TOKEN).map(String::from)
    }

    pub fn run_url(&self) -> Option<String> {
        self.env.get(RUN_URL).map(String::from)
    }

    pub fn ref_name(&self) -> Option<&str> {
        self.env.get(GITHUB_REF_NAME)
    }

    /// The source's own YAML document: API URL, credentials, proxy.
    pub fn source_params<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        let raw = self.env.require(SOURCE_PARAMS)?;
        serde_yaml::from_str(raw).map_err(|source| ConfigError::Yaml {
            what: SOURCE_PARAMS.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    const KEY: &str = r#"{"client_email": "svc@acme.iam.gserviceaccount.com", "private_key": "pem", "project_id": "acme-raw"}"#;

    #[test]
    fn test_analytics_key_falls_back() {
        let env = EnvManager::from_vars([(SERVICE_ACCOUNT_KEY, KEY)]);
        let secrets = Secrets::new(&env);
        assert_eq!(
            secrets.analytics_key().unwrap().client_email,
            "svc@acme.iam.gserviceaccount.com"
        );
    }

    #[test]
    fn test_missing_and_invalid_keys() {
        let env = EnvManager::from_vars([(SERVICE_ACCOUNT_KEY_ANALYTICS, "not json")]);
        let secrets = Secrets::new(&env);
        assert!(matches!(secrets.service_account_key(), Err(ConfigError::Missing(_))));
        assert!(matches!(secrets.analytics_key(), Err(ConfigError::Invalid(_))));
        assert!(secrets.slack_token().is_none());
    }

    #[test]
    fn test_source_params_yaml() {
        #[derive(Deserialize)]
        struct Api {
            url: String,
            key: String,
        }
        let env = EnvManager::from_vars([(SOURCE_PARAMS, "url: https://api.example\nkey: k\n")]);
        let api: Api = Secrets::new(&env).source_params().unwrap();
        assert_eq!(api.url, "https://api.example");
        assert_eq!(api.key, "k");
    }
}
