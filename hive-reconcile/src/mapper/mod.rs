//! Desired/observed state mapping.
//!
//! Each kind maps its declared spec to the wire shape the Hive API takes
//! (`to_wire`) and folds an observed wire object back into a spec
//! (`from_wire`). Write-only inputs (credentials, upload paths, copy
//! sources) never come back from the remote side, so `from_wire` carries
//! them over from the prior spec.
//!
//! Ordered sequences (VM disks and interfaces, broker connections) have no
//! per-item identity on the wire. They are aligned by position: item `i` of
//! the observed list corresponds to item `i` of the declared one.

pub mod disk;
pub mod guest;
pub mod host;
pub mod iscsi;
pub mod vm;

use serde::{Deserialize, Serialize};

use crate::api::{BrokerConnection, BrokerGateway, BrokerOptions};

/// Gateway options for one broker connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySpec {
    pub disabled: bool,
    pub persistent: bool,
    pub protocols: Vec<String>,
}

/// A remote-access connection published through the broker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConnectionSpec {
    pub name: String,
    pub description: String,
    pub port: u16,
    pub protocol: String,
    pub disable_html5: bool,
    pub gateway: GatewaySpec,
}

/// Broker settings shared by VMs and external guests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSpec {
    pub default_connection: String,
    pub connections: Vec<BrokerConnectionSpec>,
}

impl BrokerSpec {
    pub fn is_empty(&self) -> bool {
        self.default_connection.is_empty() && self.connections.is_empty()
    }

    pub fn to_wire(&self) -> BrokerOptions {
        BrokerOptions {
            default_connection: self.default_connection.clone(),
            connections: self
                .connections
                .iter()
                .map(|c| BrokerConnection {
                    name: c.name.clone(),
                    description: c.description.clone(),
                    port: c.port,
                    protocol: c.protocol.clone(),
                    disable_html5: c.disable_html5,
                    gateway: BrokerGateway {
                        disabled: c.gateway.disabled,
                        persistent: c.gateway.persistent,
                        protocols: c.gateway.protocols.clone(),
                    },
                })
                .collect(),
        }
    }

    pub fn from_wire(options: &BrokerOptions) -> Self {
        Self {
            default_connection: options.default_connection.clone(),
            connections: options
                .connections
                .iter()
                .map(|c| BrokerConnectionSpec {
                    name: c.name.clone(),
                    description: c.description.clone(),
                    port: c.port,
                    protocol: c.protocol.clone(),
                    disable_html5: c.disable_html5,
                    gateway: GatewaySpec {
                        disabled: c.gateway.disabled,
                        persistent: c.gateway.persistent,
                        protocols: c.gateway.protocols.clone(),
                    },
                })
                .collect(),
        }
    }

    /// Record positional differences against `observed` under `prefix`.
    fn diff(&self, observed: &BrokerSpec, prefix: &str, changes: &mut ChangedFields) {
        changes.check(
            &format!("{prefix}default_connection"),
            &self.default_connection,
            &observed.default_connection,
        );
        changes.check_len(
            &format!("{prefix}connections"),
            self.connections.len(),
            observed.connections.len(),
        );
        for (i, (d, o)) in self
            .connections
            .iter()
            .zip(observed.connections.iter())
            .enumerate()
        {
            changes.check(&format!("{prefix}connections.{i}"), d, o);
        }
    }
}

/// Collects the names of fields whose declared value differs from the
/// observed one.
#[derive(Debug, Default)]
pub struct ChangedFields(Vec<String>);

impl ChangedFields {
    pub fn check<T: PartialEq + ?Sized>(&mut self, field: &str, desired: &T, observed: &T) {
        if desired != observed {
            self.0.push(field.to_string());
        }
    }

    pub fn check_len(&mut self, field: &str, desired: usize, observed: usize) {
        if desired != observed {
            self.0.push(format!("{field}.count"));
        }
    }

    /// Record `field` when the desired value is larger than the observed one.
    pub fn check_grown(&mut self, field: &str, desired: u64, observed: u64) {
        if desired > observed {
            self.0.push(field.to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_fields(self) -> Vec<String> {
        self.0
    }
}
