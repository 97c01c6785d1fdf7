use std::fmt;

use serde::{Deserialize, Serialize};

/// The engine only listens on loopback; the address is never read from its log.
pub const LOOPBACK_ADDRESS: &str = "127.0.0.1";

/// Everything needed to address a running engine. Re-issued on every engine launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParameters {
    pub address: String,
    pub control_port: u16,
    pub event_port: u16,
    pub token: i64,
}

/// Partial resolver output. Callers must go through [`ResolvedParameters::complete`]
/// before a channel may be opened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedParameters {
    pub address: Option<String>,
    pub control_port: Option<u16>,
    pub event_port: Option<u16>,
    pub token: Option<i64>,
}

impl ResolvedParameters {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.address.is_none() {
            missing.push("address");
        }
        if self.control_port.is_none() {
            missing.push("control_port");
        }
        if self.event_port.is_none() {
            missing.push("event_port");
        }
        if self.token.is_none() {
            missing.push("token");
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    pub fn complete(&self) -> Result<ConnectionParameters, Vec<&'static str>> {
        match (
            self.address.as_ref(),
            self.control_port,
            self.event_port,
            self.token,
        ) {
            (Some(address), Some(control_port), Some(event_port), Some(token)) => {
                Ok(ConnectionParameters {
                    address: address.clone(),
                    control_port,
                    event_port,
                    token,
                })
            }
            _ => Err(self.missing_fields()),
        }
    }
}

impl fmt::Display for ResolvedParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn show<T: fmt::Display>(value: &Option<T>) -> String {
            value
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "None".to_string())
        }
        write!(
            f,
            "IP={}, control_port={}, event_port={}, token={}",
            show(&self.address),
            show(&self.control_port),
            show(&self.event_port),
            show(&self.token)
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Disconnected,
    Starting,
    Connected,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Starting => "starting",
            SessionState::Connected => "connected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_requires_all_four_fields() {
        let partial = ResolvedParameters {
            address: Some(LOOPBACK_ADDRESS.to_string()),
            control_port: Some(4560),
            event_port: None,
            token: Some(123456789),
        };
        assert_eq!(partial.complete().unwrap_err(), vec!["event_port"]);

        let full = ResolvedParameters {
            event_port: Some(4562),
            ..partial
        };
        let params = full.complete().expect("complete");
        assert_eq!(params.control_port, 4560);
        assert_eq!(params.event_port, 4562);
    }

    #[test]
    fn display_names_missing_fields_as_none() {
        let text = ResolvedParameters::empty().to_string();
        assert_eq!(
            text,
            "IP=None, control_port=None, event_port=None, token=None"
        );
    }
}
