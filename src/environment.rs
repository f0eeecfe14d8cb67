//! Host environment lookups used when resolving the connection URL.
//!
//! When the game runs embedded in a Discord activity, the lobby server is
//! only reachable through Discord's URL proxy. The client asks an
//! [`EnvironmentResolver`] for the activity's client id and, when one is
//! available, connects to
//! `wss://<client_id>.discordsays.com/.proxy/<discord_path>` instead of the
//! configured server URL.

use std::fmt::Debug;

/// Supplies facts about the host environment.
pub trait EnvironmentResolver: Send + Sync + Debug {
    /// The Discord activity client id, or `None` outside Discord.
    fn discord_client_id(&self) -> Option<String>;
}

/// Resolver for a plain (non-embedded) environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEnvironment;

impl EnvironmentResolver for NoEnvironment {
    fn discord_client_id(&self) -> Option<String> {
        None
    }
}

/// Resolver with fixed answers, set up by the embedding application.
#[derive(Debug, Clone, Default)]
pub struct StaticEnvironment {
    discord_client_id: Option<String>,
}

impl StaticEnvironment {
    /// An environment embedded in the Discord activity `client_id`.
    pub fn discord(client_id: impl Into<String>) -> Self {
        Self {
            discord_client_id: Some(client_id.into()),
        }
    }

    /// Derive the environment from the page host name the game was served
    /// from, e.g. `1234.discordsays.com`.
    pub fn from_hostname(hostname: &str) -> Self {
        Self {
            discord_client_id: client_id_from_hostname(hostname),
        }
    }
}

impl EnvironmentResolver for StaticEnvironment {
    fn discord_client_id(&self) -> Option<String> {
        self.discord_client_id.clone()
    }
}

/// Extract the Discord client id from an activity host name.
///
/// The id is the first DNS label, unless that label itself names Discord, in
/// which case it is the last path segment with any query string stripped.
pub fn client_id_from_hostname(hostname: &str) -> Option<String> {
    let first_label = hostname.split('.').next().unwrap_or_default();
    let candidate = if first_label.contains("discord") {
        let last_segment = hostname.rsplit('/').find(|s| !s.is_empty())?;
        last_segment.split('?').next().unwrap_or_default()
    } else {
        first_label
    };
    if candidate.is_empty() {
        None
    } else {
        Some(candidate.to_owned())
    }
}

/// Build the proxied lobby URL for a Discord activity.
pub fn discord_proxy_url(client_id: &str, path: &str) -> String {
    format!(
        "wss://{client_id}.discordsays.com/.proxy/{}",
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn client_id_is_first_label() {
        assert_eq!(
            client_id_from_hostname("1234567.discordsays.com").as_deref(),
            Some("1234567")
        );
    }

    #[test]
    fn discord_host_falls_back_to_last_segment() {
        assert_eq!(
            client_id_from_hostname("discord.com/activities/987?frame=1").as_deref(),
            Some("987")
        );
    }

    #[test]
    fn empty_host_has_no_id() {
        assert!(client_id_from_hostname("").is_none());
        assert!(StaticEnvironment::from_hostname("").discord_client_id().is_none());
        assert!(NoEnvironment.discord_client_id().is_none());
    }

    #[test]
    fn proxy_url_shape() {
        assert_eq!(
            discord_proxy_url("42", "/blazium/scriptedlobby/connect"),
            "wss://42.discordsays.com/.proxy/blazium/scriptedlobby/connect"
        );
    }
}
