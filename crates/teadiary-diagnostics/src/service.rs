//! Renders diagnostic command responses for authorized callers.

use std::sync::Arc;

use bytes::Bytes;
use teadiary_core::{mask_secrets, ConfigSnapshot};
use teadiary_storage::StorageRouter;

use crate::command::DiagnosticCommand;
use crate::gate::{Authorization, DiagnosticsGate};
use crate::probe::DatabaseProbe;

const PROBE_PREFIX: &str = "diagnostics";
const PROBE_PAYLOAD: &[u8] = b"teadiary storage probe";

pub struct DiagnosticsService {
    gate: DiagnosticsGate,
    config: Arc<ConfigSnapshot>,
    storage: StorageRouter,
    db: Arc<dyn DatabaseProbe>,
}

impl DiagnosticsService {
    pub fn new(
        config: Arc<ConfigSnapshot>,
        storage: StorageRouter,
        db: Arc<dyn DatabaseProbe>,
    ) -> Self {
        DiagnosticsService {
            gate: DiagnosticsGate::from_config(&config),
            config,
            storage,
            db,
        }
    }

    pub fn gate(&self) -> &DiagnosticsGate {
        &self.gate
    }

    /// Reply to `text` sent by `caller_id`.
    ///
    /// `None` means "not a command this service answers": unknown text,
    /// unmounted commands and denied callers all look the same to the sender.
    pub async fn handle(&self, text: &str, caller_id: i64) -> Option<String> {
        match self.gate.authorize(text, caller_id) {
            Authorization::Allowed(command) => Some(self.render(command, caller_id).await),
            Authorization::Denied(_) | Authorization::Unrecognized => None,
        }
    }

    async fn render(&self, command: DiagnosticCommand, caller_id: i64) -> String {
        let reply = match command {
            DiagnosticCommand::WhoAmI => format!(
                "your_id={}\nis_admin={}",
                caller_id,
                self.gate.is_admin(caller_id)
            ),
            DiagnosticCommand::DbInfo => format!(
                "DB URL: {}\nAPP_ENV={} | TZ={}",
                self.config.database.redacted(),
                self.config.environment,
                self.config.timezone
            ),
            DiagnosticCommand::Health => self.render_health().await,
            DiagnosticCommand::EnvInfo => format!(
                "APP_ENV={}\nTZ={}\nMEDIA_BACKEND={}\nprimary={}",
                self.config.environment,
                self.config.timezone,
                self.config.media_backend,
                self.storage.primary_backend()
            ),
            DiagnosticCommand::StorageProbe => self.render_storage_probe().await,
        };

        // Last line of defence for anything a backend echoed back.
        mask_secrets(&reply, &self.config.s3.secrets())
    }

    async fn render_health(&self) -> String {
        let (db, count) = match self.db.check().await {
            Ok(status) => (
                status.database,
                status
                    .tastings
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "?".to_string()),
            ),
            Err(e) => {
                tracing::warn!(error_kind = e.kind(), "Database health check failed");
                (format!("FAIL ({})", e.kind()), "?".to_string())
            }
        };
        let storage = self.storage.health().await;

        format!(
            "db={}\ncount(tastings)={}\ns3={}\nlocal={}\nprimary={}",
            db, count, storage.remote, storage.local, storage.primary
        )
    }

    async fn render_storage_probe(&self) -> String {
        let payload = Bytes::from_static(PROBE_PAYLOAD);
        let asset = match self
            .storage
            .store_under(PROBE_PREFIX, payload.clone(), "text/plain")
            .await
        {
            Ok(asset) => asset,
            Err(e) => return format!("storageprobe=error:{}", e.kind()),
        };

        let verdict = match self.storage.retrieve(&asset).await {
            Ok(bytes) if bytes == payload => "ok".to_string(),
            Ok(_) => "error:mismatch".to_string(),
            Err(e) => format!("error:{}", e.kind()),
        };

        if let Err(e) = self.storage.remove(&asset).await {
            tracing::warn!(
                key = %asset.key,
                error_kind = e.kind(),
                "Failed to remove storage check object"
            );
        }

        format!(
            "storageprobe={}\nbackend={}\nfell_back={}\nkey={}\nbytes={}",
            verdict, asset.backend, asset.fell_back, asset.key, asset.size_bytes
        )
    }
}
