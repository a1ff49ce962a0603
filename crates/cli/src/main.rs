use crate::{commands::Commands, error::CliError};
use clap::Parser;
use engine_config::{
    env::EnvManager, environment::Environment, params::ParamsFile, settings::ConfigLoader,
};
use std::{path::PathBuf, process::ExitCode};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod output;

#[derive(Parser)]
#[command(name = "sluice", version, about = "Scheduled data-sync jobs")]
struct Cli {
    #[arg(long, global = true, default_value = "params.yaml", help = "Non-secret parameters file")]
    params: PathBuf,

    #[arg(long, global = true, help = "KEY=VALUE file layered over the process environment")]
    env_file: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        help = "prod or dev (default: prod when GITHUB_REF_NAME is main)"
    )]
    environment: Option<Environment>,

    #[arg(long, global = true, help = "Write a JSON run summary to this file")]
    summary: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "sluice exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut env = EnvManager::from_process();
    if let Some(path) = &cli.env_file {
        env.load_from_file(path)?;
    }
    let params = ParamsFile::load(&cli.params)?;
    let loader = ConfigLoader::new(params, env, cli.environment);
    info!(environment = %loader.environment(), params = %cli.params.display(), "Loaded configuration");

    let report = engine_runtime::run(&loader, cli.command.into()).await?;
    if let Some(path) = &cli.summary {
        output::write_summary(&report, path).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use engine_runtime::execution::request::{CcpDestination, JobRequest};

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_ccp_local_dates() {
        let cli = Cli::try_parse_from([
            "sluice",
            "ccp",
            "--dest",
            "local",
            "--start-date",
            "2024-06-01",
            "--end-date",
            "2024-06-07",
        ])
        .unwrap();
        match JobRequest::from(cli.command) {
            JobRequest::Ccp {
                destination,
                start_date,
                end_date,
                ..
            } => {
                assert_eq!(destination, CcpDestination::Local);
                assert_eq!(start_date.unwrap().to_string(), "2024-06-01");
                assert_eq!(end_date.unwrap().to_string(), "2024-06-07");
            }
            _ => panic!("expected a ccp request"),
        }
    }

    #[test]
    fn test_past_hours_choices() {
        assert!(Cli::try_parse_from(["sluice", "attachments", "--past-hours", "75"]).is_ok());
        assert!(Cli::try_parse_from(["sluice", "attachments", "--past-hours", "24"]).is_err());
        let cli = Cli::try_parse_from(["sluice", "--environment", "dev", "mlhp"]).unwrap();
        assert_eq!(cli.params, PathBuf::from("params.yaml"));
        assert!(matches!(cli.environment, Some(Environment::Dev)));
    }
}
