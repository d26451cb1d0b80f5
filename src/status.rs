use std::{fmt, str::FromStr};

use thiserror::Error;

/// Outcome of a command or of a single file operation.
///
/// `Processing` is the only non-terminal value. The textual forms are exactly
/// `Processing`, `Success`, `Failed` and `InfoError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandStatus {
    Processing,
    Success,
    Failed,
    /// The caller supplied incomplete or invalid configuration.
    InfoError,
}

impl CommandStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, CommandStatus::Processing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CommandStatus::Processing => "Processing",
            CommandStatus::Success => "Success",
            CommandStatus::Failed => "Failed",
            CommandStatus::InfoError => "InfoError",
        }
    }
}

impl Default for CommandStatus {
    fn default() -> Self {
        CommandStatus::Processing
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown command status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for CommandStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Processing" => Ok(CommandStatus::Processing),
            "Success" => Ok(CommandStatus::Success),
            "Failed" => Ok(CommandStatus::Failed),
            "InfoError" => Ok(CommandStatus::InfoError),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CommandStatus;

    #[test]
    fn only_processing_is_not_terminal() {
        assert!(!CommandStatus::Processing.is_terminal());
        assert!(CommandStatus::Success.is_terminal());
        assert!(CommandStatus::Failed.is_terminal());
        assert!(CommandStatus::InfoError.is_terminal());
    }

    #[test]
    fn textual_form_parses_back() {
        for status in [
            CommandStatus::Processing,
            CommandStatus::Success,
            CommandStatus::Failed,
            CommandStatus::InfoError,
        ] {
            assert_eq!(status.to_string().parse::<CommandStatus>(), Ok(status));
        }
        assert!("SUCCESS".parse::<CommandStatus>().is_err());
    }
}
