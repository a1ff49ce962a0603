use chrono::NaiveDate;
use clap::{Subcommand, ValueEnum};
use engine_runtime::execution::request::{CcpDestination, JobRequest};
use model::window::lookback::LookbackHours;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Copy recent inbound message attachments into the raw bucket
    Attachments {
        #[arg(long, default_value = "25", help = "Lookback in hours: 25, 75 or 170")]
        past_hours: LookbackHours,
    },
    /// Extract the Andhra Pradesh CCP training data
    Ccp {
        #[arg(long, value_enum, default_value_t = CcpDest::Bigquery)]
        dest: CcpDest,

        #[arg(long, help = "First day to fetch (YYYY-MM-DD); --dest local only")]
        start_date: Option<NaiveDate>,

        #[arg(long, help = "Last day to fetch, inclusive (YYYY-MM-DD); --dest local only")]
        end_date: Option<NaiveDate>,

        #[arg(
            long,
            help = "Spreadsheet path or directory for --dest local (default: current directory)"
        )]
        output: Option<PathBuf>,
    },
    /// Sync MLHP sessions for every registered user
    Mlhp {
        #[arg(long, help = "Days per API request (overrides chunk_days in params)")]
        chunk_days: Option<u32>,
    },
    /// Load the registered MLHP users from a CSV export
    MlhpSeedUsers {
        #[arg(long, help = "CSV file path")]
        file: PathBuf,
    },
    /// Sync a generic REST source configured in params.yaml
    Rest {
        #[arg(long, help = "Source name in params.yaml")]
        source: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum CcpDest {
    Bigquery,
    Slack,
    Local,
}

impl From<Commands> for JobRequest {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Attachments { past_hours } => JobRequest::Attachments { hours: past_hours },
            Commands::Ccp {
                dest,
                start_date,
                end_date,
                output,
            } => JobRequest::Ccp {
                destination: match dest {
                    CcpDest::Bigquery => CcpDestination::Warehouse,
                    CcpDest::Slack => CcpDestination::Chat,
                    CcpDest::Local => CcpDestination::Local,
                },
                start_date,
                end_date,
                output,
            },
            Commands::Mlhp { chunk_days } => JobRequest::Mlhp { chunk_days },
            Commands::MlhpSeedUsers { file } => JobRequest::SeedUsers { file },
            Commands::Rest { source } => JobRequest::Rest { source },
        }
    }
}
