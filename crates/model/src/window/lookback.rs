use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Lookback for hour-based jobs. Only three spans are offered: a daily run,
/// a run after a weekend, and a run after a long holiday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(try_from = "u32", into = "u32")]
pub enum LookbackHours {
    #[default]
    Daily,
    Weekend,
    Holiday,
}

impl LookbackHours {
    pub const CHOICES: [u32; 3] = [25, 75, 170];

    pub fn hours(self) -> u32 {
        match self {
            LookbackHours::Daily => 25,
            LookbackHours::Weekend => 75,
            LookbackHours::Holiday => 170,
        }
    }
}

impl TryFrom<u32> for LookbackHours {
    type Error = String;

    fn try_from(hours: u32) -> Result<Self, Self::Error> {
        match hours {
            25 => Ok(LookbackHours::Daily),
            75 => Ok(LookbackHours::Weekend),
            170 => Ok(LookbackHours::Holiday),
            other => Err(format!(
                "unsupported lookback of {other} hours (expected one of 25, 75, 170)"
            )),
        }
    }
}

impl From<LookbackHours> for u32 {
    fn from(value: LookbackHours) -> Self {
        value.hours()
    }
}

impl FromStr for LookbackHours {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hours: u32 = s
            .trim()
            .parse()
            .map_err(|_| format!("invalid lookback hours: {s}"))?;
        LookbackHours::try_from(hours)
    }
}

impl fmt::Display for LookbackHours {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hours())
    }
}

/// Where the lower bound of a job's window comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "unit")]
pub enum Lookback {
    /// `now - hours`.
    Hours { hours: LookbackHours },
    /// `max(sink timestamp) - days`.
    Watermark { overlap_days: u32 },
}

impl Lookback {
    pub const DEFAULT_OVERLAP_DAYS: u32 = 30;

    pub fn watermark() -> Self {
        Lookback::Watermark {
            overlap_days: Self::DEFAULT_OVERLAP_DAYS,
        }
    }
}
