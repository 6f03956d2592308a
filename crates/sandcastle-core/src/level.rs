use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Logging entry points intercepted inside the sandbox.
///
/// The set is exhaustive: no other `console` member is routed to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Warn,
    Debug,
    Info,
    Error,
    Clear,
}

impl ConsoleLevel {
    pub const ALL: [ConsoleLevel; 6] = [
        ConsoleLevel::Log,
        ConsoleLevel::Warn,
        ConsoleLevel::Debug,
        ConsoleLevel::Info,
        ConsoleLevel::Error,
        ConsoleLevel::Clear,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConsoleLevel::Log => "log",
            ConsoleLevel::Warn => "warn",
            ConsoleLevel::Debug => "debug",
            ConsoleLevel::Info => "info",
            ConsoleLevel::Error => "error",
            ConsoleLevel::Clear => "clear",
        }
    }
}

impl fmt::Display for ConsoleLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsoleLevel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConsoleLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| CoreError::unknown_level(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_levels() {
        for level in ConsoleLevel::ALL {
            assert_eq!(level.as_str().parse::<ConsoleLevel>().unwrap(), level);
        }
    }

    #[test]
    fn test_unknown_level_rejected() {
        assert!("trace".parse::<ConsoleLevel>().is_err());
        assert!("Log".parse::<ConsoleLevel>().is_err());
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_value(ConsoleLevel::Clear).unwrap(),
            serde_json::json!("clear")
        );
    }
}
