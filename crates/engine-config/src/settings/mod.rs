//! Immutable per-run job configuration, resolved once at startup from
//! `params.yaml` and the secret environment.

use crate::{
    env::EnvManager,
    environment::Environment,
    error::ConfigError,
    params::{ParamsFile, SourceParams},
    secrets::Secrets,
};
use connectors::gcp::auth::ServiceAccountKey;
use model::core::identifiers::SourceName;
use std::fmt;
use tracing::debug;

pub mod attachments;
pub mod ccp;
pub mod mlhp;
pub mod rest;

/// Identity of one run, used in logs and failure notifications.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub source: SourceName,
    pub environment: Environment,
    pub run_url: Option<String>,
}

/// Chat coordinates for failure notices. Either part may be absent, in
/// which case notices are skipped.
#[derive(Clone, Default)]
pub struct NotifierSettings {
    pub token: Option<String>,
    pub channel_id: Option<String>,
}

impl fmt::Debug for NotifierSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifierSettings")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("channel_id", &self.channel_id)
            .finish()
    }
}

/// A Google Cloud project and the key used to act in it.
#[derive(Debug, Clone)]
pub struct GcpSettings {
    pub project: String,
    pub key: ServiceAccountKey,
    pub location: Option<String>,
}

impl GcpSettings {
    /// `project_param` names the parameter holding the project id; the key's
    /// own project is used when the parameter is absent.
    pub fn resolve(
        params: &SourceParams,
        key: ServiceAccountKey,
        project_param: &str,
    ) -> Result<Self, ConfigError> {
        let project = params
            .get_str(project_param)
            .map(String::from)
            .or_else(|| key.project_id.clone())
            .ok_or_else(|| ConfigError::missing(format!("parameter `{project_param}`")))?;
        Ok(GcpSettings {
            project,
            key,
            location: params.get_str("location").map(String::from),
        })
    }
}

/// Warehouse dataset a job loads into.
#[derive(Debug, Clone)]
pub struct WarehouseSettings {
    pub gcp: GcpSettings,
    pub dataset: String,
}

impl WarehouseSettings {
    pub fn resolve(params: &SourceParams, secrets: &Secrets<'_>) -> Result<Self, ConfigError> {
        let key = secrets.service_account_key()?;
        Ok(WarehouseSettings {
            gcp: GcpSettings::resolve(params, key, "project_raw")?,
            dataset: params.require_str("dataset")?.to_string(),
        })
    }
}

/// Job-specific settings resolved from a source's parameters and secrets.
pub trait JobSettings: Sized {
    fn resolve(params: &SourceParams, secrets: &Secrets<'_>) -> Result<Self, ConfigError>;
}

#[derive(Debug, Clone)]
pub struct JobConfig<S> {
    pub run: RunSettings,
    pub notifier: NotifierSettings,
    pub settings: S,
}

pub struct ConfigLoader {
    params: ParamsFile,
    env: EnvManager,
    environment: Environment,
}

impl ConfigLoader {
    /// Without an explicit environment, `GITHUB_REF_NAME` decides.
    pub fn new(params: ParamsFile, env: EnvManager, environment: Option<Environment>) -> Self {
        let environment = environment
            .unwrap_or_else(|| Environment::from_ref_name(Secrets::new(&env).ref_name()));
        ConfigLoader {
            params,
            env,
            environment,
        }
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn run_settings(&self, source: &str) -> RunSettings {
        RunSettings {
            source: SourceName::new(source),
            environment: self.environment,
            run_url: Secrets::new(&self.env).run_url(),
        }
    }

    /// Notifier settings for `source`. Never fails, so a run whose own
    /// configuration is broken can still report that. Outside prod only a
    /// channel set in the source's own environment block is used, so dev
    /// runs never post to the shared alert channel.
    pub fn notifier(&self, source: &str) -> NotifierSettings {
        let channel_id = if self.environment.is_prod() {
            self.params
                .resolve(source, self.environment)
                .unwrap_or_else(|_| self.params.globals())
                .get_str("slack_channel_id")
                .map(String::from)
        } else {
            let channel = self
                .params
                .resolve_block(source, self.environment)
                .ok()
                .and_then(|block| block.get_str("slack_channel_id").map(String::from));
            if channel.is_none() {
                debug!(source, environment = %self.environment, "No alert channel for this environment");
            }
            channel
        };
        NotifierSettings {
            token: Secrets::new(&self.env).slack_token(),
            channel_id,
        }
    }

    pub fn load<S: JobSettings>(&self, source: &str) -> Result<JobConfig<S>, ConfigError> {
        let params = self.params.resolve(source, self.environment)?;
        let settings = S::resolve(&params, &Secrets::new(&self.env))?;
        debug!(source, environment = %self.environment, "Resolved job settings");
        Ok(JobConfig {
            run: self.run_settings(source),
            notifier: self.notifier(source),
            settings,
        })
    }
}
