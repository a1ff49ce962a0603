use crate::{
    error::ConfigError,
    params::SourceParams,
    secrets::Secrets,
    settings::{JobSettings, WarehouseSettings},
};
use connectors::source::mlhp::{DEFAULT_CHUNK_DAYS, MlhpCredentials};

pub const SOURCE_NAME: &str = "andhra_pradesh_mlhp";

#[derive(Debug, Clone)]
pub struct MlhpSettings {
    pub warehouse: WarehouseSettings,
    pub credentials: MlhpCredentials,
    pub chunk_days: u32,
}

impl JobSettings for MlhpSettings {
    fn resolve(params: &SourceParams, secrets: &Secrets<'_>) -> Result<Self, ConfigError> {
        let chunk_days = params.get::<u32>("chunk_days")?.unwrap_or(DEFAULT_CHUNK_DAYS);
        if chunk_days == 0 {
            return Err(ConfigError::Invalid("chunk_days must be positive".into()));
        }
        Ok(MlhpSettings {
            warehouse: WarehouseSettings::resolve(params, secrets)?,
            credentials: secrets.source_params()?,
            chunk_days,
        })
    }
}

/// Seeding the users table needs only the warehouse.
#[derive(Debug, Clone)]
pub struct SeedSettings {
    pub warehouse: WarehouseSettings,
}

impl JobSettings for SeedSettings {
    fn resolve(params: &SourceParams, secrets: &Secrets<'_>) -> Result<Self, ConfigError> {
        Ok(SeedSettings {
            warehouse: WarehouseSettings::resolve(params, secrets)?,
        })
    }
}
