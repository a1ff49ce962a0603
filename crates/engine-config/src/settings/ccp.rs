use crate::{
    error::ConfigError,
    params::SourceParams,
    secrets::Secrets,
    settings::{JobSettings, WarehouseSettings},
};
use connectors::{chat::ChatTarget, source::ccp::CcpCredentials};

pub const SOURCE_NAME: &str = "andhra_pradesh_ccp";

#[derive(Debug, Clone)]
pub struct CcpSettings {
    pub credentials: CcpCredentials,
    /// Only needed when loading into the warehouse.
    pub warehouse: Option<WarehouseSettings>,
    /// Where the spreadsheet report goes when posting to chat.
    pub report_target: Option<ChatTarget>,
    pub chat_token: Option<String>,
}

impl JobSettings for CcpSettings {
    fn resolve(params: &SourceParams, secrets: &Secrets<'_>) -> Result<Self, ConfigError> {
        let warehouse = if secrets.has_service_account_key() && params.get_str("dataset").is_some() {
            Some(WarehouseSettings::resolve(params, secrets)?)
        } else {
            None
        };
        let report_target = match (
            params.get_str("report_channel_id"),
            params.get_str("report_user_id"),
        ) {
            (Some(channel), _) => Some(ChatTarget::Channel(channel.to_string())),
            (None, Some(user)) => Some(ChatTarget::User(user.to_string())),
            (None, None) => None,
        };

        Ok(CcpSettings {
            credentials: secrets.source_params()?,
            warehouse,
            report_target,
            chat_token: secrets.slack_token(),
        })
    }
}
