// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Wiring of the backend crates from configuration.
//
// Every subcommand builds an `AppServices` first so that the queue database,
// the audit log, and the output device are resolved the same way whether the
// engine is running or the spool-port hook is adding a job.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use spoolgate_core::EngineConfig;
use spoolgate_core::config::{DeviceKind, default_data_dir};
use spoolgate_core::error::Result;
use spoolgate_print::{
    DecisionGateway, DeviceConnector, DirectoryConnector, DispatchForwarder, Engine,
    RawTcpConnector, SqliteQueue,
};
use spoolgate_security::AuditLog;
use tracing::{info, warn};

/// Default location of the configuration file.
pub fn default_config_path() -> PathBuf {
    default_data_dir().join("config.json")
}

/// Backend services built from one configuration.
pub struct AppServices {
    config: EngineConfig,
    queue: Arc<SqliteQueue>,
}

impl AppServices {
    /// Load the configuration at `config_path` and open the virtual queue.
    pub fn init(config_path: &Path) -> Result<Self> {
        let config = EngineConfig::load(config_path)?;
        info!(config = %config_path.display(), "configuration loaded");
        Self::from_config(config)
    }

    pub fn from_config(config: EngineConfig) -> Result<Self> {
        ensure_parent(&config.queue_db)?;
        let queue = Arc::new(SqliteQueue::open(&config.queue_db, &*config.virtual_printer)?);
        Ok(Self { config, queue })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<SqliteQueue> {
        &self.queue
    }

    /// The audit log, if auditing is enabled and a location is configured.
    pub fn audit_log(&self) -> Result<Option<AuditLog>> {
        match (&self.config.audit_db, self.config.audit_enabled) {
            (Some(path), true) => {
                ensure_parent(path)?;
                Ok(Some(AuditLog::open(path)?))
            }
            (None, true) => {
                warn!("auditing enabled but no audit_db configured");
                Ok(None)
            }
            (_, false) => Ok(None),
        }
    }

    /// Forwarder for the configured real device.
    pub fn forwarder(&self) -> DispatchForwarder {
        let connector: Arc<dyn DeviceConnector> = match self.config.device {
            DeviceKind::RawTcp => Arc::new(RawTcpConnector::default()),
            DeviceKind::Directory => Arc::new(DirectoryConnector::default()),
        };
        DispatchForwarder::new(connector, self.config.real_printer.clone())
    }

    /// An engine wired to this configuration and `gateway`.
    pub fn engine(&self, gateway: Arc<dyn DecisionGateway>) -> Result<Engine> {
        let engine = Engine::new(&self.config, self.queue.clone(), self.forwarder(), gateway);
        Ok(match self.audit_log()? {
            Some(audit) => engine.with_audit(audit),
            None => engine,
        })
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use spoolgate_print::{ChannelGateway, PrintQueue};

    use super::*;

    fn config(dir: &Path) -> EngineConfig {
        EngineConfig {
            watch_dir: dir.join("spool"),
            queue_db: dir.join("data").join("queue.db"),
            audit_db: Some(dir.join("data").join("audit.db")),
            ..EngineConfig::default()
        }
    }

    #[test]
    fn queue_is_created_under_missing_parent() {
        let dir = tempfile::tempdir().unwrap();
        let services = AppServices::from_config(config(dir.path())).unwrap();
        services.queue().submit("job_1.xps", 1, 0, 0).unwrap();
        assert_eq!(services.queue().enumerate_jobs().unwrap().len(), 1);
    }

    #[test]
    fn audit_follows_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let services = AppServices::from_config(config(dir.path())).unwrap();
        assert!(services.audit_log().unwrap().is_some());

        let disabled = AppServices::from_config(EngineConfig {
            audit_enabled: false,
            ..config(dir.path())
        })
        .unwrap();
        assert!(disabled.audit_log().unwrap().is_none());
    }

    #[test]
    fn engine_uses_configured_watch_dir() {
        let dir = tempfile::tempdir().unwrap();
        let services = AppServices::from_config(config(dir.path())).unwrap();
        let (gateway, _rx) = ChannelGateway::new();
        let engine = services.engine(Arc::new(gateway)).unwrap();
        assert_eq!(engine.watch_dir(), dir.path().join("spool"));
    }
}
