//! Mounting and per-call authorization for diagnostic commands.
//!
//! | environment | admins    | surface   | public cmds | admin cmds      | dev-only cmds |
//! |-------------|-----------|-----------|-------------|-----------------|---------------|
//! | production  | empty     | unmounted | unknown     | unknown         | unknown       |
//! | production  | non-empty | mounted   | allowed     | admins only     | unknown       |
//! | development | any       | mounted   | allowed     | admins only     | mounted       |
//!
//! "Unknown" means the command behaves exactly like text the bot does not
//! understand. The mounting decision is taken once, the admin check per call.

use teadiary_core::{AdminSet, ConfigSnapshot, Environment};

use crate::command::{Access, Availability, DiagnosticCommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    NotAdmin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Allowed(DiagnosticCommand),
    Denied(DenyReason),
    /// Not a diagnostic command, or not mounted in this process.
    Unrecognized,
}

impl Authorization {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Authorization::Allowed(_))
    }
}

#[derive(Debug, Clone)]
pub struct DiagnosticsGate {
    environment: Environment,
    admins: AdminSet,
    mounted: bool,
}

impl DiagnosticsGate {
    pub fn new(environment: Environment, admins: AdminSet) -> Self {
        let mounted = !(environment.is_production() && admins.is_empty());
        DiagnosticsGate {
            environment,
            admins,
            mounted,
        }
    }

    pub fn from_config(config: &ConfigSnapshot) -> Self {
        let gate = Self::new(config.environment, config.admins.clone());
        if gate.mounted {
            tracing::info!(
                environment = %gate.environment,
                admins = gate.admins.len(),
                "Diagnostics enabled"
            );
        } else {
            tracing::warn!(
                environment = %gate.environment,
                "Diagnostics disabled: production without ADMINS"
            );
        }
        gate
    }

    /// Whether any diagnostic command exists in this process.
    pub fn surface_mounted(&self) -> bool {
        self.mounted
    }

    pub fn is_mounted(&self, command: DiagnosticCommand) -> bool {
        self.mounted
            && match command.availability() {
                Availability::Always => true,
                Availability::DevelopmentOnly => !self.environment.is_production(),
            }
    }

    pub fn is_admin(&self, caller_id: i64) -> bool {
        self.admins.contains(caller_id)
    }

    /// Parse `text` and return the command only if it is mounted.
    pub fn resolve(&self, text: &str) -> Option<DiagnosticCommand> {
        DiagnosticCommand::parse(text).filter(|cmd| self.is_mounted(*cmd))
    }

    pub fn authorize(&self, text: &str, caller_id: i64) -> Authorization {
        match self.resolve(text) {
            Some(command) => self.authorize_command(command, caller_id),
            None => Authorization::Unrecognized,
        }
    }

    pub fn authorize_command(&self, command: DiagnosticCommand, caller_id: i64) -> Authorization {
        if !self.is_mounted(command) {
            return Authorization::Unrecognized;
        }

        match command.access() {
            Access::Public => Authorization::Allowed(command),
            Access::Admin if self.is_admin(caller_id) => Authorization::Allowed(command),
            Access::Admin => {
                tracing::debug!(
                    command = %command,
                    caller_id,
                    "Diagnostic command denied: caller is not an admin"
                );
                Authorization::Denied(DenyReason::NotAdmin)
            }
        }
    }

    /// Mounted commands the caller may run, in table order.
    pub fn visible_commands(&self, caller_id: i64) -> Vec<DiagnosticCommand> {
        DiagnosticCommand::ALL
            .into_iter()
            .filter(|cmd| self.authorize_command(*cmd, caller_id).is_allowed())
            .collect()
    }
}
