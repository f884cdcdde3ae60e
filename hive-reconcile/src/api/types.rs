//! Wire types exchanged with the Hive management API.
//!
//! These mirror the remote JSON shapes; a transport implementation of
//! [`HiveApi`](super::HiveApi) can (de)serialize them directly.

use serde::{Deserialize, Serialize};

// =============================================================================
// Tasks
// =============================================================================

/// Opaque handle to a remote asynchronous operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskHandle(pub String);

impl TaskHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Remote task state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Init,
    Running,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

/// Objects a task refers to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskRef {
    pub host: Option<String>,
    pub pool: Option<String>,
    pub storage: Option<String>,
}

/// Snapshot of a remote task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub state: TaskState,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub progress: f32,
    #[serde(rename = "ref", default)]
    pub reference: TaskRef,
}

// =============================================================================
// Hosts
// =============================================================================

/// Appliance role reported for a gateway-only host.
pub const GATEWAY_ROLE: &str = "gateway";

/// Per-host appliance configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Appliance {
    pub role: String,
    pub cluster_id: String,
    pub loglevel: String,
    pub max_clone_density: u32,
    pub ntp: String,
    pub timezone: String,
}

/// A cluster member as reported by the remote system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Host {
    pub hostid: String,
    pub hostname: String,
    pub ip: String,
    pub state: String,
    pub appliance: Appliance,
}

impl Host {
    pub fn is_gateway(&self) -> bool {
        self.appliance.role == GATEWAY_ROLE
    }
}

// =============================================================================
// Pools and guests
// =============================================================================

/// Gateway options of a broker connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BrokerGateway {
    pub disabled: bool,
    pub persistent: bool,
    pub protocols: Vec<String>,
}

/// One remote-access connection published through the broker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BrokerConnection {
    pub name: String,
    pub description: String,
    pub port: u16,
    pub protocol: String,
    pub disable_html5: bool,
    pub gateway: BrokerGateway,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BrokerOptions {
    pub default_connection: String,
    pub connections: Vec<BrokerConnection>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PoolDisk {
    pub disk_driver: String,
    #[serde(rename = "type")]
    pub disk_type: String,
    pub storage_id: String,
    pub filename: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PoolInterface {
    pub network: String,
    pub vlan: u16,
    pub emulation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PoolCloudInit {
    pub enabled: bool,
    pub user_data: String,
    pub network_config: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PoolBackup {
    pub enabled: bool,
    pub frequency: String,
    pub target_storage_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PoolAffinity {
    pub allowed_host_ids: Vec<String>,
}

/// `[min, max]` resource tuple used for CPU and memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRange(pub [u32; 2]);

impl ResourceRange {
    /// A range pinned to a single value (`min == max`).
    pub fn fixed(value: u32) -> Self {
        Self([value, value])
    }

    pub fn min(&self) -> u32 {
        self.0[0]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GuestProfile {
    pub os: String,
    pub firmware: String,
    pub vga: String,
    pub gpu: bool,
    pub persistent: bool,
    pub cpu: ResourceRange,
    pub mem: ResourceRange,
    pub cloud_init: Option<PoolCloudInit>,
    pub disks: Vec<PoolDisk>,
    pub interfaces: Vec<PoolInterface>,
    pub broker_options: Option<BrokerOptions>,
}

/// Pool definition backing a standalone virtual machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Pool {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub pool_type: String,
    pub inject_agent: bool,
    pub density: [u32; 2],
    pub state: String,
    pub guest_profile: GuestProfile,
    pub backup: Option<PoolBackup>,
    pub pool_affinity: Option<PoolAffinity>,
}

/// A running (or materialising) guest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Guest {
    pub name: String,
    pub address: String,
    pub username: String,
    pub realm: String,
    pub os: String,
    pub disable_port_check: bool,
    pub guest_state: String,
    pub target_state: Vec<String>,
    pub external: bool,
    pub broker_options: BrokerOptions,
}

impl Guest {
    /// Whether the guest has reached one of its own acceptable target states.
    pub fn at_target_state(&self) -> bool {
        self.target_state.iter().any(|s| *s == self.guest_state)
    }
}

/// Registration request for a guest not managed by a pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExternalGuest {
    pub guest_name: String,
    pub address: String,
    pub username: String,
    pub realm: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    pub disable_port_check: bool,
    pub broker_options: BrokerOptions,
}

// =============================================================================
// Storage
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoragePool {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub pool_type: String,
}

/// Image metadata for a file in a storage pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DiskInfo {
    pub filename: String,
    pub format: String,
    /// Bytes.
    pub virtual_size: u64,
    /// Bytes.
    pub actual_size: u64,
}

pub const GIB: u64 = 1024 * 1024 * 1024;

impl DiskInfo {
    /// Virtual size in whole GiB, rounded down.
    pub fn virtual_size_gb(&self) -> u64 {
        self.virtual_size / GIB
    }
}

// =============================================================================
// iSCSI
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IscsiTarget {
    pub portal: String,
    pub target: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockDevice {
    pub name: String,
    pub path: String,
    pub fstype: String,
    pub model: String,
    pub vendor: String,
    pub serial: String,
    pub size: String,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IscsiSession {
    pub portal: String,
    pub target: String,
    pub block_devices: Vec<BlockDevice>,
}

/// Authentication method for an iSCSI login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IscsiAuth {
    None,
    #[serde(rename = "CHAP")]
    Chap,
}

impl IscsiAuth {
    pub fn as_str(&self) -> &'static str {
        match self {
            IscsiAuth::None => "None",
            IscsiAuth::Chap => "CHAP",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IscsiLogin {
    pub portal: String,
    pub target: String,
    pub auth_method: IscsiAuth,
    pub username: String,
    pub password: String,
}
