//! Failure notices posted to the operations chat channel.

use connectors::chat::{ChatClient, ChatTarget};
use model::core::identifiers::SourceName;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct Notification {
    pub source: SourceName,
    pub error: String,
    pub run_url: Option<String>,
}

impl Notification {
    pub fn failure(source: SourceName, error: impl ToString, run_url: Option<String>) -> Self {
        Notification {
            source,
            error: error.to_string(),
            run_url,
        }
    }

    pub fn text(&self) -> String {
        let mut text = format!(
            ":warning: Sync for *{}* failed with the following error:\n\n`{}`",
            self.source, self.error
        );
        if let Some(url) = &self.run_url {
            text.push_str(&format!(
                "\n\nPlease see the GitHub Actions <{url}|workflow run log>."
            ));
        }
        text
    }
}

/// Posts notices to one channel. Without a client or a channel the notifier
/// is disabled and every send is a logged no-op.
#[derive(Clone)]
pub struct Notifier {
    inner: Option<(Arc<dyn ChatClient>, ChatTarget)>,
}

impl Notifier {
    pub fn new(client: Option<Arc<dyn ChatClient>>, channel_id: Option<String>) -> Self {
        let inner = match (client, channel_id) {
            (Some(client), Some(channel)) => Some((client, ChatTarget::Channel(channel))),
            (client, channel) => {
                warn!(
                    has_token = client.is_some(),
                    has_channel = channel.is_some(),
                    "Chat notifications are disabled"
                );
                None
            }
        };
        Notifier { inner }
    }

    pub fn disabled() -> Self {
        Notifier { inner: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Returns whether the notice was delivered. Delivery failures are
    /// logged and never returned.
    pub async fn send(&self, notification: &Notification) -> bool {
        let Some((client, target)) = &self.inner else {
            warn!(source = %notification.source, "Skipping failure notice, notifier disabled");
            return false;
        };

        match client.post_message(target, &notification.text()).await {
            Ok(()) => {
                info!(source = %notification.source, %target, "Sent failure notice");
                true
            }
            Err(e) => {
                error!(source = %notification.source, error = %e, "Failed to send failure notice");
                false
            }
        }
    }
}
