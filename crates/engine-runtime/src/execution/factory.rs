//! Builds jobs and their clients from resolved settings.

use crate::{
    error::JobError,
    execution::request::{CcpDestination, JobRequest},
    jobs::{
        Job,
        attachments::AttachmentsJob,
        ccp::{CcpJob, CcpOutput},
        mlhp::MlhpJob,
        rest::RestJob,
        seed::SeedUsersJob,
    },
};
use connectors::{
    chat::{ChatClient, slack::SlackClient},
    gcp::auth::{ServiceAccountKey, ServiceAccountTokenProvider, TokenProvider},
    object_store::gcs::GcsClient,
    source::{ccp::CcpClient, media::MediaDownloader, mlhp::MlhpClient, rest::RestSource},
    warehouse::{
        Warehouse,
        bigquery::{BigQueryClient, BigQueryConfig},
    },
};
use engine_config::{
    error::ConfigError,
    settings::{
        ConfigLoader, GcpSettings, NotifierSettings, WarehouseSettings,
        attachments::AttachmentsSettings, ccp::CcpSettings, mlhp::MlhpSettings,
        mlhp::SeedSettings, rest::RestSettings,
    },
};
use engine_core::{
    connectors::{
        destination::Destination,
        sink::{
            object_store::ObjectStoreSink, report::ReportOutput, warehouse::WarehouseSink,
        },
    },
    metrics::Metrics,
    notify::Notifier,
};
use std::{path::PathBuf, sync::Arc};
use tracing::warn;

/// The failure notifier. A chat client that cannot be built disables it
/// rather than failing the run.
pub fn notifier(settings: &NotifierSettings) -> Notifier {
    let client = match settings.token.as_deref().map(SlackClient::new) {
        Some(Ok(client)) => Some(Arc::new(client) as Arc<dyn ChatClient>),
        Some(Err(e)) => {
            warn!(error = %e, "Failed to build chat client");
            None
        }
        None => None,
    };
    Notifier::new(client, settings.channel_id.clone())
}

pub fn token_provider(key: &ServiceAccountKey) -> Result<Arc<dyn TokenProvider>, JobError> {
    Ok(Arc::new(ServiceAccountTokenProvider::new(key.clone())?))
}

pub fn bigquery(gcp: &GcpSettings) -> Result<Arc<dyn Warehouse>, JobError> {
    let mut config = BigQueryConfig::new(gcp.project.clone());
    config.location = gcp.location.clone();
    Ok(Arc::new(BigQueryClient::new(config, token_provider(&gcp.key)?)?))
}

pub fn warehouse_sink(settings: &WarehouseSettings, metrics: &Metrics) -> Result<WarehouseSink, JobError> {
    Ok(WarehouseSink::new(
        bigquery(&settings.gcp)?,
        settings.dataset.clone(),
        metrics.clone(),
    ))
}

pub fn build(
    loader: &ConfigLoader,
    request: &JobRequest,
    metrics: &Metrics,
) -> Result<Box<dyn Job>, JobError> {
    let source = request.source_name();
    match request {
        JobRequest::Attachments { hours } => {
            let config = loader.load::<AttachmentsSettings>(source)?;
            let settings = config.settings;
            let store = GcsClient::new(settings.bucket.clone(), token_provider(&settings.storage.key)?)?;
            Ok(Box::new(AttachmentsJob {
                source: config.run.source,
                analytics: bigquery(&settings.analytics)?,
                listing_table: format!("{}.{}", settings.analytics.project, settings.listing_table),
                downloader: MediaDownloader::new(settings.proxy.as_deref())?,
                line_headers: settings.line_headers,
                destination: Destination::ObjectStore(ObjectStoreSink::new(
                    Arc::new(store),
                    metrics.clone(),
                )),
                manifest_prefix: settings.manifest_prefix,
                hours: *hours,
                metrics: metrics.clone(),
            }))
        }
        JobRequest::Ccp {
            destination,
            start_date,
            end_date,
            output,
        } => {
            let config = loader.load::<CcpSettings>(source)?;
            let settings = config.settings;
            if *destination != CcpDestination::Local && (start_date.is_some() || end_date.is_some()) {
                warn!(%destination, "--start-date and --end-date only apply to --dest local; ignoring");
            }
            let output = match destination {
                CcpDestination::Warehouse => {
                    let warehouse = settings.warehouse.as_ref().ok_or_else(|| {
                        ConfigError::missing("SERVICE_ACCOUNT_KEY and `dataset` for --dest bigquery")
                    })?;
                    CcpOutput::Warehouse(warehouse_sink(warehouse, metrics)?)
                }
                CcpDestination::Chat => {
                    let output = match (settings.chat_token.clone(), settings.report_target.clone()) {
                        (Some(token), Some(target)) => ReportOutput::Chat {
                            client: Arc::new(SlackClient::new(token)?),
                            target,
                        },
                        (token, target) => {
                            warn!(
                                has_token = token.is_some(),
                                has_target = target.is_some(),
                                "Report chat is not configured; the report will not be posted"
                            );
                            ReportOutput::Disabled {
                                reason: "SLACK_TOKEN or `report_channel_id`/`report_user_id` is not set"
                                    .into(),
                            }
                        }
                    };
                    CcpOutput::Report {
                        output,
                        start_date: None,
                        end_date: None,
                    }
                }
                CcpDestination::Local => CcpOutput::Report {
                    output: ReportOutput::Local {
                        path: output.clone().unwrap_or_else(|| PathBuf::from(".")),
                    },
                    start_date: *start_date,
                    end_date: *end_date,
                },
            };
            Ok(Box::new(CcpJob {
                source: config.run.source,
                client: CcpClient::new(settings.credentials)?,
                output,
                is_test: !config.run.environment.is_prod(),
                metrics: metrics.clone(),
            }))
        }
        JobRequest::Mlhp { chunk_days } => {
            let config = loader.load::<MlhpSettings>(source)?;
            let settings = config.settings;
            let chunk_days = chunk_days.unwrap_or(settings.chunk_days);
            if chunk_days == 0 {
                return Err(JobError::InvalidInput("--chunk-days must be positive".into()));
            }
            Ok(Box::new(MlhpJob {
                source: config.run.source,
                client: MlhpClient::new(settings.credentials)?,
                sink: warehouse_sink(&settings.warehouse, metrics)?,
                chunk_days,
                metrics: metrics.clone(),
            }))
        }
        JobRequest::SeedUsers { file } => {
            let config = loader.load::<SeedSettings>(source)?;
            Ok(Box::new(SeedUsersJob {
                source: config.run.source,
                file: file.clone(),
                sink: warehouse_sink(&config.settings.warehouse, metrics)?,
                metrics: metrics.clone(),
            }))
        }
        JobRequest::Rest { .. } => {
            let config = loader.load::<RestSettings>(source)?;
            let settings = config.settings;
            Ok(Box::new(RestJob {
                source: config.run.source,
                endpoint: RestSource::new(settings.endpoint)?,
                sink: warehouse_sink(&settings.warehouse, metrics)?,
                table: settings.table,
                lookback: settings.lookback,
                watermark_column: settings.watermark_column,
                metrics: metrics.clone(),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_config::{env::EnvManager, environment::Environment, params::ParamsFile};
    use tracing_test::traced_test;

    const PARAMS: &str = r#"
slack_channel_id: C-ALERTS
sources:
  - name: andhra_pradesh_ccp
    environments:
      - name: dev
        report_user_id: U-DEV
"#;

    fn loader(vars: Vec<(&'static str, &'static str)>) -> ConfigLoader {
        ConfigLoader::new(
            ParamsFile::from_yaml(PARAMS).unwrap(),
            EnvManager::from_vars(vars),
            Some(Environment::Dev),
        )
    }

    fn ccp(destination: CcpDestination) -> JobRequest {
        JobRequest::Ccp {
            destination,
            start_date: None,
            end_date: None,
            output: None,
        }
    }

    #[test]
    fn test_notifier_without_token_is_disabled() {
        let notifier = notifier(&NotifierSettings {
            token: None,
            channel_id: Some("C1".into()),
        });
        assert!(!notifier.is_enabled());
    }

    #[test]
    fn test_ccp_bigquery_needs_warehouse() {
        let loader = loader(vec![("SOURCE_PARAMS", "url: http://ccp\nusername: u\npassword: p\n")]);
        let err = build(&loader, &ccp(CcpDestination::Warehouse), &Metrics::new())
            .err()
            .unwrap();
        assert!(matches!(err, JobError::Config(ConfigError::Missing(_))));
    }

    #[test]
    #[traced_test]
    fn test_ccp_slack_without_chat_config_still_builds() {
        let loader = ConfigLoader::new(
            ParamsFile::from_yaml("sources:\n  - name: andhra_pradesh_ccp\n    environments:\n      - name: prod\n").unwrap(),
            EnvManager::from_vars([("SOURCE_PARAMS", "url: http://ccp\nusername: u\npassword: p\n")]),
            Some(Environment::Prod),
        );
        let job = build(&loader, &ccp(CcpDestination::Chat), &Metrics::new()).unwrap();
        assert_eq!(job.source().as_str(), "andhra_pradesh_ccp");
        assert!(logs_contain("Report chat is not configured"));
    }

    #[test]
    fn test_ccp_local_builds() {
        let loader = loader(vec![("SOURCE_PARAMS", "url: http://ccp\nusername: u\npassword: p\n")]);
        let job = build(&loader, &ccp(CcpDestination::Local), &Metrics::new()).unwrap();
        assert_eq!(job.source().as_str(), "andhra_pradesh_ccp");
    }
}
