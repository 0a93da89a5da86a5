//! The diagnostic command table.

use std::fmt::{Display, Formatter, Result as FmtResult};

/// Who may run a command once it is mounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Admin,
}

/// Environments in which a command exists at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Always,
    DevelopmentOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticCommand {
    /// Echo the caller's id and admin flag.
    WhoAmI,
    /// Redacted database connection string.
    DbInfo,
    /// Database and storage reachability.
    Health,
    EnvInfo,
    /// Store, read back and remove a small object.
    StorageProbe,
}

impl DiagnosticCommand {
    pub const ALL: [DiagnosticCommand; 5] = [
        DiagnosticCommand::WhoAmI,
        DiagnosticCommand::DbInfo,
        DiagnosticCommand::Health,
        DiagnosticCommand::EnvInfo,
        DiagnosticCommand::StorageProbe,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DiagnosticCommand::WhoAmI => "whoami",
            DiagnosticCommand::DbInfo => "dbinfo",
            DiagnosticCommand::Health => "health",
            DiagnosticCommand::EnvInfo => "envinfo",
            DiagnosticCommand::StorageProbe => "storageprobe",
        }
    }

    pub fn access(&self) -> Access {
        match self {
            DiagnosticCommand::WhoAmI | DiagnosticCommand::EnvInfo => Access::Public,
            DiagnosticCommand::DbInfo
            | DiagnosticCommand::Health
            | DiagnosticCommand::StorageProbe => Access::Admin,
        }
    }

    pub fn availability(&self) -> Availability {
        match self {
            DiagnosticCommand::EnvInfo | DiagnosticCommand::StorageProbe => {
                Availability::DevelopmentOnly
            }
            _ => Availability::Always,
        }
    }

    /// One-line description for help listings.
    pub fn description(&self) -> &'static str {
        match self {
            DiagnosticCommand::WhoAmI => "show your id and admin status",
            DiagnosticCommand::DbInfo => "database connection (password hidden)",
            DiagnosticCommand::Health => "database and storage status",
            DiagnosticCommand::EnvInfo => "environment and storage selection",
            DiagnosticCommand::StorageProbe => "store and read back a test object",
        }
    }

    /// Parse chat command text such as `/health@TeaDiaryBot now`.
    ///
    /// The leading `/` and the `@bot` suffix are optional, matching is
    /// case-insensitive and anything after the first word is ignored.
    pub fn parse(text: &str) -> Option<Self> {
        let word = text.split_whitespace().next()?;
        let word = word.strip_prefix('/').unwrap_or(word);
        let name = word.split('@').next().unwrap_or_default();
        if name.is_empty() {
            return None;
        }

        Self::ALL
            .into_iter()
            .find(|cmd| cmd.name().eq_ignore_ascii_case(name))
    }
}

impl Display for DiagnosticCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_chat_command_forms() {
        assert_eq!(DiagnosticCommand::parse("/whoami"), Some(DiagnosticCommand::WhoAmI));
        assert_eq!(DiagnosticCommand::parse("whoami"), Some(DiagnosticCommand::WhoAmI));
        assert_eq!(
            DiagnosticCommand::parse("/Health@TeaDiaryBot"),
            Some(DiagnosticCommand::Health)
        );
        assert_eq!(
            DiagnosticCommand::parse("  /dbinfo please now"),
            Some(DiagnosticCommand::DbInfo)
        );
        assert_eq!(
            DiagnosticCommand::parse("/STORAGEPROBE"),
            Some(DiagnosticCommand::StorageProbe)
        );
    }

    #[test]
    fn test_rejects_unknown_or_empty() {
        for text in ["", "   ", "/", "/@bot", "/start", "/healthz", "health-check"] {
            assert_eq!(DiagnosticCommand::parse(text), None, "{text:?}");
        }
    }

    #[test]
    fn test_names_round_trip() {
        for cmd in DiagnosticCommand::ALL {
            assert_eq!(DiagnosticCommand::parse(cmd.name()), Some(cmd));
            assert_eq!(cmd.to_string(), cmd.name());
        }
    }

    #[test]
    fn test_command_table() {
        assert_eq!(DiagnosticCommand::WhoAmI.access(), Access::Public);
        assert_eq!(DiagnosticCommand::DbInfo.access(), Access::Admin);
        assert_eq!(DiagnosticCommand::Health.access(), Access::Admin);
        assert_eq!(
            DiagnosticCommand::EnvInfo.availability(),
            Availability::DevelopmentOnly
        );
        assert_eq!(
            DiagnosticCommand::StorageProbe.availability(),
            Availability::DevelopmentOnly
        );
        assert_eq!(DiagnosticCommand::Health.availability(), Availability::Always);
    }
}
