use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Deployment environment; selects a block of per-source parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Prod,
    Dev,
}

impl Environment {
    /// `prod` for runs of the `main` branch, `dev` for everything else,
    /// including local runs with no branch at all.
    pub fn from_ref_name(ref_name: Option<&str>) -> Self {
        match ref_name {
            Some("main") => Environment::Prod,
            _ => Environment::Dev,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Prod => "prod",
            Environment::Dev => "dev",
        }
    }

    pub fn is_prod(&self) -> bool {
        matches!(self, Environment::Prod)
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prod" => Ok(Environment::Prod),
            "dev" => Ok(Environment::Dev),
            other => Err(format!("unknown environment `{other}` (expected prod or dev)")),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_ref_name() {
        assert_eq!(Environment::from_ref_name(Some("main")), Environment::Prod);
        assert_eq!(Environment::from_ref_name(Some("feature/x")), Environment::Dev);
        assert_eq!(Environment::from_ref_name(None), Environment::Dev);
    }

    #[test]
    fn test_parse() {
        assert_eq!("PROD".parse::<Environment>(), Ok(Environment::Prod));
        assert!("staging".parse::<Environment>().is_err());
    }
}
