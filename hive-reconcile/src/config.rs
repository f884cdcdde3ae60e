//! Reconciler configuration: timeouts, poll cadence and settle delays.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::context::{OpContext, OperationClass};
use crate::reconciler::ObjectKind;

/// Timeout budget for one object kind, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KindTimeouts {
    pub create_secs: u64,
    pub read_secs: u64,
    pub update_secs: u64,
    pub delete_secs: u64,
}

impl KindTimeouts {
    const DEFAULT_SECS: u64 = 20 * 60;

    fn with(create_secs: u64, delete_secs: u64) -> Self {
        Self {
            create_secs,
            delete_secs,
            ..Self::default()
        }
    }

    pub fn for_class(&self, class: OperationClass) -> Duration {
        let secs = match class {
            OperationClass::Create => self.create_secs,
            OperationClass::Read => self.read_secs,
            OperationClass::Update => self.update_secs,
            OperationClass::Delete => self.delete_secs,
        };
        Duration::from_secs(secs)
    }
}

impl Default for KindTimeouts {
    fn default() -> Self {
        Self {
            create_secs: Self::DEFAULT_SECS,
            read_secs: Self::DEFAULT_SECS,
            update_secs: Self::DEFAULT_SECS,
            delete_secs: Self::DEFAULT_SECS,
        }
    }
}

/// Fixed waits after remote calls that return no task to poll, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettleDelays {
    /// After a join task completes, before the host is touched again.
    pub after_join_secs: u64,
    /// After toggling the gateway-only role.
    pub role_change_secs: u64,
    /// After an availability-state task completes.
    pub state_change_secs: u64,
    /// After the batched appliance update.
    pub appliance_secs: u64,
    /// After entering maintenance ahead of removal; services restart.
    pub maintenance_secs: u64,
}

impl SettleDelays {
    pub fn after_join(&self) -> Duration {
        Duration::from_secs(self.after_join_secs)
    }

    pub fn role_change(&self) -> Duration {
        Duration::from_secs(self.role_change_secs)
    }

    pub fn state_change(&self) -> Duration {
        Duration::from_secs(self.state_change_secs)
    }

    pub fn appliance(&self) -> Duration {
        Duration::from_secs(self.appliance_secs)
    }

    pub fn maintenance(&self) -> Duration {
        Duration::from_secs(self.maintenance_secs)
    }
}

impl Default for SettleDelays {
    fn default() -> Self {
        Self {
            after_join_secs: 5,
            role_change_secs: 5,
            state_change_secs: 10,
            appliance_secs: 5,
            maintenance_secs: 10,
        }
    }
}

/// Configuration shared by all reconcilers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Delay between task polls.
    pub poll_interval_secs: u64,
    /// Delay between attempts while an object is in a transient state.
    pub retry_interval_secs: u64,
    pub settle: SettleDelays,
    pub host: KindTimeouts,
    pub virtual_machine: KindTimeouts,
    pub disk: KindTimeouts,
    pub external_guest: KindTimeouts,
    pub iscsi_session: KindTimeouts,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 2,
            retry_interval_secs: 5,
            settle: SettleDelays::default(),
            host: KindTimeouts::default(),
            virtual_machine: KindTimeouts::with(10 * 60, 10 * 60),
            disk: KindTimeouts::with(20 * 60, KindTimeouts::DEFAULT_SECS),
            external_guest: KindTimeouts::with(KindTimeouts::DEFAULT_SECS, 5 * 60),
            iscsi_session: KindTimeouts::default(),
        }
    }
}

impl ReconcileConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("invalid reconciler config")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    pub fn timeouts(&self, kind: ObjectKind) -> &KindTimeouts {
        match kind {
            ObjectKind::Host => &self.host,
            ObjectKind::VirtualMachine => &self.virtual_machine,
            ObjectKind::Disk => &self.disk,
            ObjectKind::ExternalGuest => &self.external_guest,
            ObjectKind::IscsiSession => &self.iscsi_session,
        }
    }

    pub fn timeout(&self, kind: ObjectKind, class: OperationClass) -> Duration {
        self.timeouts(kind).for_class(class)
    }

    /// Fresh context carrying the configured budget for `kind`/`class`.
    pub fn context(&self, kind: ObjectKind, class: OperationClass) -> OpContext {
        OpContext::with_timeout(self.timeout(kind, class))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_follow_operation_budgets() {
        let config = ReconcileConfig::default();
        assert_eq!(
            config.timeout(ObjectKind::VirtualMachine, OperationClass::Create),
            Duration::from_secs(600)
        );
        assert_eq!(
            config.timeout(ObjectKind::Disk, OperationClass::Create),
            Duration::from_secs(1200)
        );
        assert_eq!(
            config.timeout(ObjectKind::ExternalGuest, OperationClass::Delete),
            Duration::from_secs(300)
        );
        assert_eq!(config.retry_interval(), Duration::from_secs(5));
        assert_eq!(config.settle.maintenance(), Duration::from_secs(10));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = ReconcileConfig::from_json(
            r#"{"poll_interval_secs": 1, "settle": {"role_change_secs": 2}, "disk": {"create_secs": 60}}"#,
        )
        .unwrap();
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.settle.role_change(), Duration::from_secs(2));
        assert_eq!(config.settle.state_change(), Duration::from_secs(10));
        assert_eq!(config.disk.create_secs, 60);
        assert_eq!(config.disk.delete_secs, 1200);
        assert_eq!(config.retry_interval_secs, 5);
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"retry_interval_secs": 3}}"#).unwrap();

        let config = ReconcileConfig::load(file.path()).unwrap();
        assert_eq!(config.retry_interval(), Duration::from_secs(3));
    }

    #[test]
    fn load_reports_path_on_error() {
        let err = ReconcileConfig::load("/nonexistent/hive.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/hive.json"));
    }
}
