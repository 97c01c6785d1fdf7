use anyhow::Context;
use musicbox_core::PatternTable;
use musicbox_types::{ResolvedParameters, LOOPBACK_ADDRESS};
use regex::Regex;

/// Turns scanned log text into connection parameters using a [`PatternTable`].
///
/// Never fails on input: a field whose pattern does not match is `None`.
#[derive(Debug, Clone)]
pub struct ConnectionResolver {
    version: u32,
    control_port: Regex,
    event_port: Regex,
    token: Regex,
    min_token_digits: usize,
}

impl ConnectionResolver {
    pub fn new(table: &PatternTable) -> anyhow::Result<Self> {
        Ok(Self {
            version: table.version,
            control_port: Regex::new(&table.control_port)
                .with_context(|| format!("invalid control_port pattern v{}", table.version))?,
            event_port: Regex::new(&table.event_port)
                .with_context(|| format!("invalid event_port pattern v{}", table.version))?,
            token: Regex::new(&table.token)
                .with_context(|| format!("invalid token pattern v{}", table.version))?,
            min_token_digits: table.min_token_digits,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn resolve(&self, text: &str) -> ResolvedParameters {
        ResolvedParameters {
            address: Some(LOOPBACK_ADDRESS.to_string()),
            control_port: first_port(&self.control_port, text),
            event_port: first_port(&self.event_port, text),
            token: self.first_token(text),
        }
    }

    /// First candidate, in file order, with more than six digits. Shorter
    /// numbers share the same log prefix and are not tokens.
    fn first_token(&self, text: &str) -> Option<i64> {
        for caps in self.token.captures_iter(text) {
            let Some(digits) = caps.get(1).or_else(|| caps.get(0)) else {
                continue;
            };
            let digits = digits.as_str();
            if digits.len() < self.min_token_digits {
                continue;
            }
            match digits.parse::<i64>() {
                Ok(token) => return Some(token),
                Err(_) => {
                    tracing::debug!(len = digits.len(), "token candidate does not fit i64");
                }
            }
        }
        None
    }
}

fn first_port(pattern: &Regex, text: &str) -> Option<u16> {
    let caps = pattern.captures(text)?;
    let digits = caps.get(1).or_else(|| caps.get(0))?;
    digits.as_str().parse::<u16>().ok()
}
