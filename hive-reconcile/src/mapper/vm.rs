//! Virtual machine spec and its pool definition.
//!
//! A standalone VM is a pool of density `[1, 1]`; the pool's guest profile
//! carries the machine shape. CPU and memory are `[min, max]` pairs on the
//! wire and are always pinned to the single declared value.

use serde::{Deserialize, Serialize};

use crate::api::{
    GuestProfile, Pool, PoolAffinity, PoolBackup, PoolCloudInit, PoolDisk, PoolInterface,
    ResourceRange,
};
use crate::mapper::{BrokerSpec, ChangedFields};

pub const STANDALONE_POOL: &str = "standalone";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmDiskSpec {
    pub disk_type: String,
    pub storage_id: String,
    pub filename: String,
    pub disk_driver: String,
    /// Not reported back by the remote side.
    pub format: String,
}

impl Default for VmDiskSpec {
    fn default() -> Self {
        Self {
            disk_type: "Disk".to_string(),
            storage_id: String::new(),
            filename: String::new(),
            disk_driver: "virtio".to_string(),
            format: "qcow2".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmInterfaceSpec {
    pub network: String,
    pub vlan: u16,
    pub emulation: String,
}

impl Default for VmInterfaceSpec {
    fn default() -> Self {
        Self {
            network: String::new(),
            vlan: 0,
            emulation: "virtio".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupSpec {
    pub enabled: bool,
    pub frequency: String,
    /// Target storage pool id.
    pub target: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudInitSpec {
    pub user_data: String,
    pub network_config: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmSpec {
    pub name: String,
    pub cpu: u32,
    /// MiB.
    pub memory: u32,
    pub firmware: String,
    pub os: String,
    pub gpu: bool,
    pub display_driver: String,
    pub inject_agent: bool,
    pub disks: Vec<VmDiskSpec>,
    pub interfaces: Vec<VmInterfaceSpec>,
    pub backup: Option<BackupSpec>,
    pub cloud_init: Option<CloudInitSpec>,
    pub allowed_hosts: Vec<String>,
    pub broker: BrokerSpec,
}

impl Default for VmSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            cpu: 0,
            memory: 0,
            firmware: "uefi".to_string(),
            os: String::new(),
            gpu: false,
            display_driver: "cirrus".to_string(),
            inject_agent: true,
            disks: Vec::new(),
            interfaces: Vec::new(),
            backup: None,
            cloud_init: None,
            allowed_hosts: Vec::new(),
            broker: BrokerSpec::default(),
        }
    }
}

impl VmSpec {
    /// Name of the guest the pool materialises: upper case, spaces as `_`.
    pub fn guest_name(&self) -> String {
        self.name.to_uppercase().replace(' ', "_")
    }

    pub fn to_wire(&self, id: Option<&str>) -> Pool {
        let guest_profile = GuestProfile {
            os: self.os.clone(),
            firmware: self.firmware.clone(),
            vga: self.display_driver.clone(),
            gpu: self.gpu,
            persistent: true,
            cpu: ResourceRange::fixed(self.cpu),
            mem: ResourceRange::fixed(self.memory),
            cloud_init: self.cloud_init.as_ref().map(|c| PoolCloudInit {
                enabled: true,
                user_data: c.user_data.clone(),
                network_config: c.network_config.clone(),
            }),
            disks: self
                .disks
                .iter()
                .map(|d| PoolDisk {
                    disk_driver: d.disk_driver.clone(),
                    disk_type: d.disk_type.clone(),
                    storage_id: d.storage_id.clone(),
                    filename: d.filename.clone(),
                })
                .collect(),
            interfaces: self
                .interfaces
                .iter()
                .map(|i| PoolInterface {
                    network: i.network.clone(),
                    vlan: i.vlan,
                    emulation: i.emulation.clone(),
                })
                .collect(),
            broker_options: (!self.broker.is_empty()).then(|| self.broker.to_wire()),
        };

        Pool {
            id: id.map(str::to_string),
            name: self.name.clone(),
            pool_type: STANDALONE_POOL.to_string(),
            inject_agent: self.inject_agent,
            density: [1, 1],
            state: String::new(),
            guest_profile,
            backup: self.backup.as_ref().map(|b| PoolBackup {
                enabled: b.enabled,
                frequency: b.frequency.clone(),
                target_storage_id: b.target.clone(),
            }),
            pool_affinity: Some(PoolAffinity {
                allowed_host_ids: self.allowed_hosts.clone(),
            }),
        }
    }

    /// Fold an observed pool into a spec. Disk formats are not reported and
    /// are carried over from `prior` by position.
    pub fn from_wire(pool: &Pool, prior: &VmSpec) -> VmSpec {
        let profile = &pool.guest_profile;
        let disks = profile
            .disks
            .iter()
            .enumerate()
            .map(|(i, d)| VmDiskSpec {
                disk_type: d.disk_type.clone(),
                storage_id: d.storage_id.clone(),
                filename: d.filename.clone(),
                disk_driver: d.disk_driver.clone(),
                format: prior
                    .disks
                    .get(i)
                    .map(|p| p.format.clone())
                    .unwrap_or_else(|| VmDiskSpec::default().format),
            })
            .collect();

        VmSpec {
            name: pool.name.clone(),
            cpu: profile.cpu.min(),
            memory: profile.mem.min(),
            firmware: profile.firmware.clone(),
            os: profile.os.clone(),
            gpu: profile.gpu,
            display_driver: profile.vga.clone(),
            inject_agent: pool.inject_agent,
            disks,
            interfaces: profile
                .interfaces
                .iter()
                .map(|i| VmInterfaceSpec {
                    network: i.network.clone(),
                    vlan: i.vlan,
                    emulation: i.emulation.clone(),
                })
                .collect(),
            backup: pool.backup.as_ref().map(|b| BackupSpec {
                enabled: b.enabled,
                frequency: b.frequency.clone(),
                target: b.target_storage_id.clone(),
            }),
            cloud_init: profile
                .cloud_init
                .as_ref()
                .filter(|c| c.enabled)
                .map(|c| CloudInitSpec {
                    user_data: c.user_data.clone(),
                    network_config: c.network_config.clone(),
                }),
            allowed_hosts: pool
                .pool_affinity
                .as_ref()
                .map(|a| a.allowed_host_ids.clone())
                .unwrap_or_default(),
            broker: profile
                .broker_options
                .as_ref()
                .map(BrokerSpec::from_wire)
                .unwrap_or_default(),
        }
    }

    /// Disk layout changes that cannot be applied to an existing pool.
    pub fn force_replace_changes(&self, observed: &VmSpec) -> Vec<String> {
        let mut changes = ChangedFields::default();
        changes.check_len("disk", self.disks.len(), observed.disks.len());
        for (i, (d, o)) in self.disks.iter().zip(observed.disks.iter()).enumerate() {
            changes.check(&format!("disk.{i}.type"), &d.disk_type, &o.disk_type);
            changes.check(&format!("disk.{i}.storage_id"), &d.storage_id, &o.storage_id);
            changes.check(&format!("disk.{i}.filename"), &d.filename, &o.filename);
            changes.check(&format!("disk.{i}.format"), &d.format, &o.format);
        }
        changes.into_fields()
    }
}
