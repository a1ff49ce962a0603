use engine_config::settings::{attachments, ccp, mlhp};
use model::window::lookback::LookbackHours;
use std::{fmt, path::PathBuf};

/// Where the CCP extract goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CcpDestination {
    Warehouse,
    Chat,
    Local,
}

impl fmt::Display for CcpDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CcpDestination::Warehouse => "bigquery",
            CcpDestination::Chat => "slack",
            CcpDestination::Local => "local",
        })
    }
}

/// One job invocation as requested on the command line.
#[derive(Debug, Clone)]
pub enum JobRequest {
    Attachments {
        hours: LookbackHours,
    },
    Ccp {
        destination: CcpDestination,
        start_date: Option<chrono::NaiveDate>,
        end_date: Option<chrono::NaiveDate>,
        output: Option<PathBuf>,
    },
    Mlhp {
        chunk_days: Option<u32>,
    },
    SeedUsers {
        file: PathBuf,
    },
    Rest {
        source: String,
    },
}

impl JobRequest {
    /// Source name the request's settings live under in `params.yaml`.
    pub fn source_name(&self) -> &str {
        match self {
            JobRequest::Attachments { .. } => attachments::SOURCE_NAME,
            JobRequest::Ccp { .. } => ccp::SOURCE_NAME,
            JobRequest::Mlhp { .. } | JobRequest::SeedUsers { .. } => mlhp::SOURCE_NAME,
            JobRequest::Rest { source } => source,
        }
    }
}
