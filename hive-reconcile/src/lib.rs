//! Reconciliation core for Hive virtualization clusters.
//!
//! Operators declare hosts, virtual machines, disks, external guests and
//! iSCSI sessions; the reconcilers here drive the Hive management API until
//! the live cluster matches. Transport is not part of this crate: callers
//! hand each reconciler an `Arc<dyn HiveApi>`.
//!
//! ```ignore
//! let config = ReconcileConfig::load("/etc/hive/reconcile.json")?;
//! let disks = DiskReconciler::new(api.clone(), config.clone());
//! let ctx = config.context(ObjectKind::Disk, OperationClass::Create);
//! let record = disks.create(&ctx, &spec).await?;
//! ```

pub mod absence;
pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod lifecycle;
pub mod mapper;
pub mod poller;
pub mod reconciler;
pub mod retry;

pub use api::{ApiError, ApiResult, HiveApi};
pub use config::ReconcileConfig;
pub use context::{OpContext, OperationClass};
pub use error::{ReconcileError, Result};
pub use mapper::disk::DiskSpec;
pub use mapper::guest::ExternalGuestSpec;
pub use mapper::host::HostSpec;
pub use mapper::iscsi::IscsiSessionSpec;
pub use mapper::vm::VmSpec;
pub use reconciler::{
    DiskReconciler, ExternalGuestReconciler, HostReconciler, IscsiSessionReconciler, ObjectKind,
    Reconciler, Record, VmReconciler,
};
