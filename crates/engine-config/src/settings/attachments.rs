use crate::{
    error::ConfigError,
    params::SourceParams,
    secrets::Secrets,
    settings::{GcpSettings, JobSettings},
};
use serde::Deserialize;
use std::collections::BTreeMap;

pub const SOURCE_NAME: &str = "turn_attachments";
const DEFAULT_LISTING_TABLE: &str = "prod.res_message_attachments";
const DEFAULT_MANIFEST_PREFIX: &str = "manifests";

/// Per-line request headers and optional proxy, from `SOURCE_PARAMS`.
#[derive(Deserialize)]
struct AttachmentSecrets {
    #[serde(default)]
    turn_headers: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    proxy: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AttachmentsSettings {
    /// Project holding the attachment listing; queries run there.
    pub analytics: GcpSettings,
    /// `dataset.table` of the listing inside the analytics project.
    pub listing_table: String,
    /// Project owning the bucket.
    pub storage: GcpSettings,
    pub bucket: String,
    pub manifest_prefix: String,
    /// Download headers keyed by messaging line (channel phone).
    pub line_headers: BTreeMap<String, BTreeMap<String, String>>,
    pub proxy: Option<String>,
}

impl JobSettings for AttachmentsSettings {
    fn resolve(params: &SourceParams, secrets: &Secrets<'_>) -> Result<Self, ConfigError> {
        let source: AttachmentSecrets = secrets.source_params()?;
        Ok(AttachmentsSettings {
            analytics: GcpSettings::resolve(params, secrets.analytics_key()?, "project_analytics")?,
            listing_table: params
                .get_str("attachments_table")
                .unwrap_or(DEFAULT_LISTING_TABLE)
                .to_string(),
            storage: GcpSettings::resolve(params, secrets.service_account_key()?, "project_raw")?,
            bucket: params.require_str("bucket_name")?.to_string(),
            manifest_prefix: params
                .get_str("manifest_prefix")
                .unwrap_or(DEFAULT_MANIFEST_PREFIX)
                .to_string(),
            line_headers: source.turn_headers,
            proxy: source.proxy,
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

    #[test]
    fn test_resolve_attachments() {
        let source_params = "turn_headers:\n  \"919000000001\":\n    Authorization: Bearer line-1\nproxy: http://proxy:3128\n";
        let loader = ConfigLoader::new(
            ParamsFile::from_yaml(fixtures::PARAMS).unwrap(),
            EnvManager::from_vars([
                ("SERVICE_ACCOUNT_KEY", fixtures::KEY),
                ("SOURCE_PARAMS", source_params),
            ]),
            Some(Environment::Prod),
        );

        let config = loader.load::<AttachmentsSettings>(SOURCE_NAME).unwrap();
        let settings = config.settings;
        assert_eq!(settings.analytics.project, "acme-analytics");
        assert_eq!(settings.storage.project, "acme-raw");
        assert_eq!(settings.bucket, "media-prod");
        assert_eq!(settings.listing_table, "prod.res_message_attachments");
        assert_eq!(settings.proxy.as_deref(), Some("http://proxy:3128"));
        assert_eq!(
            settings.line_headers["919000000001"]["Authorization"],
            "Bearer line-1"
        );
    }
}
