//! Capability interface to the Hive management API.
//!
//! The reconcilers never talk HTTP themselves: they are handed an
//! `Arc<dyn HiveApi>` and drive it. Transport, authentication and JSON
//! encoding live in whatever implements this trait.

pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use types::*;

/// Failure of a single remote call.
///
/// `status` carries the HTTP status when the transport knows it. Older
/// endpoints only embed the code in the message body (`"error": 404`), so the
/// message is kept verbatim for the absence classifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ApiError {
    pub status: Option<u16>,
    pub message: String,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Shorthand for a 404 response.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_status(404, message)
    }
}

/// Result type for remote calls.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Remote operations the reconcilers depend on.
///
/// Calls that start asynchronous work return a [`TaskHandle`]; calls the
/// remote API acknowledges without a task return `()` and are followed by a
/// settle delay on the caller's side.
#[async_trait]
pub trait HiveApi: Send + Sync {
    // === Tasks ===

    /// Current snapshot of a task. Never blocks on completion.
    async fn get_task(&self, handle: &TaskHandle) -> ApiResult<Task>;

    // === Hosts ===

    async fn list_hosts(&self) -> ApiResult<Vec<Host>>;

    async fn get_host(&self, host_id: &str) -> ApiResult<Host>;

    /// Join the host at `address` to the cluster.
    async fn join_host(&self, username: &str, password: &str, address: &str)
    -> ApiResult<TaskHandle>;

    /// Switch the gateway-only role on or off. No task is returned.
    async fn set_gateway_mode(&self, host_id: &str, gateway: bool) -> ApiResult<()>;

    /// Move the host to `available` or `maintenance`.
    async fn set_host_state(&self, host_id: &str, state: &str) -> ApiResult<TaskHandle>;

    /// Replace the appliance settings. No task is returned.
    async fn update_appliance(&self, host_id: &str, appliance: &Appliance) -> ApiResult<()>;

    /// Drop the cluster's record of a host without contacting it.
    async fn delete_host(&self, host_id: &str) -> ApiResult<()>;

    /// Remove a reachable host from the cluster.
    async fn unjoin_host(&self, host_id: &str) -> ApiResult<TaskHandle>;

    // === Pools ===

    async fn create_pool(&self, pool: &Pool) -> ApiResult<()>;

    async fn get_pool(&self, pool_id: &str) -> ApiResult<Pool>;

    async fn get_pool_by_name(&self, name: &str) -> ApiResult<Pool>;

    async fn update_pool(&self, pool: &Pool) -> ApiResult<()>;

    async fn delete_pool(&self, pool_id: &str) -> ApiResult<()>;

    // === Guests ===

    async fn get_guest(&self, name: &str) -> ApiResult<Guest>;

    /// Block until the guest reaches one of its target states or `timeout` elapses.
    async fn await_guest_state(&self, name: &str, timeout: Duration) -> ApiResult<Guest>;

    async fn create_external_guest(&self, guest: &ExternalGuest) -> ApiResult<()>;

    async fn delete_guest(&self, name: &str) -> ApiResult<()>;

    // === Storage ===

    async fn get_storage_pool(&self, pool_id: &str) -> ApiResult<StoragePool>;

    /// Upload a local file into `pool_id` as `filename`.
    async fn upload_file(&self, pool_id: &str, local_path: &str, filename: &str) -> ApiResult<()>;

    /// Copy an image from an HTTP(S) URL into the pool.
    async fn copy_url(&self, pool_id: &str, url: &str, filename: &str) -> ApiResult<TaskHandle>;

    /// Convert (clone) `src_filename` from `src_pool_id` into `dst_pool_id`.
    async fn clone_disk(
        &self,
        src_pool_id: &str,
        src_filename: &str,
        dst_pool_id: &str,
        dst_filename: &str,
        format: &str,
    ) -> ApiResult<TaskHandle>;

    /// Create an empty image of `size_gb` GiB.
    async fn create_disk(
        &self,
        pool_id: &str,
        filename: &str,
        format: &str,
        size_gb: u64,
    ) -> ApiResult<TaskHandle>;

    /// Grow an image by `increment_gb` GiB.
    async fn grow_disk(&self, pool_id: &str, filename: &str, increment_gb: u64)
    -> ApiResult<TaskHandle>;

    async fn disk_info(&self, pool_id: &str, filename: &str) -> ApiResult<DiskInfo>;

    async fn delete_file(&self, pool_id: &str, filename: &str) -> ApiResult<()>;

    // === iSCSI ===

    async fn iscsi_discover(&self, host_id: &str, portal: &str) -> ApiResult<Vec<IscsiTarget>>;

    async fn iscsi_sessions(
        &self,
        host_id: &str,
        portal: &str,
        target: &str,
    ) -> ApiResult<Vec<IscsiSession>>;

    async fn iscsi_login(&self, host_id: &str, login: &IscsiLogin) -> ApiResult<Vec<IscsiSession>>;

    async fn iscsi_logout(&self, host_id: &str, portal: &str, target: &str) -> ApiResult<()>;
}
