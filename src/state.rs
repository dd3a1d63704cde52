//! Mutable per-machine facts learnt while provisioning.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Runtime state owned by a driver and persisted by its host between calls.
///
/// A fresh machine starts from [`RuntimeState::default`]; `create` fills it
/// in and `remove` clears the platform identifiers again.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct RuntimeState {
    /// Identifier of the provisioned instance.
    pub instance_id: Option<Uuid>,
    /// Public address of the instance.
    pub ip_address: Option<IpAddr>,
    /// Username to log in with, once known.
    pub ssh_user: Option<String>,
    /// Name of the temporary key pair registered with the platform.
    pub key_pair: Option<String>,
    /// Initial password revealed by the platform.
    pub password: Option<String>,
}

impl RuntimeState {
    /// Returns `true` when no platform resource is recorded.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.instance_id.is_none() && self.key_pair.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_empty() {
        assert!(RuntimeState::default().is_empty());
    }

    #[test]
    fn missing_fields_deserialize_as_none() {
        let state: RuntimeState =
            serde_json::from_str(r#"{"ssh_user":"ubuntu"}"#).expect("partial state parses");
        assert_eq!(state.ssh_user.as_deref(), Some("ubuntu"));
        assert!(state.is_empty());
    }

    #[test]
    fn recorded_key_pair_is_not_empty() {
        let state = RuntimeState {
            key_pair: Some(String::from("exomachine-node")),
            ..RuntimeState::default()
        };
        assert!(!state.is_empty());
    }
}
