//! Reconcilers for each object kind.
//!
//! Each reconciler compares the declared state with what the Hive API
//! reports and issues the calls needed to converge. Observed state is never
//! cached: every verb re-reads the remote side first.

pub mod disk;
pub mod guest;
pub mod host;
pub mod iscsi;
pub mod vm;

use std::fmt;

use async_trait::async_trait;

use crate::context::OpContext;
use crate::error::{ReconcileError, Result};

pub use disk::DiskReconciler;
pub use guest::ExternalGuestReconciler;
pub use host::HostReconciler;
pub use iscsi::IscsiSessionReconciler;
pub use vm::VmReconciler;

/// The object kinds this crate reconciles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Host,
    VirtualMachine,
    Disk,
    ExternalGuest,
    IscsiSession,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectKind::Host => "host",
            ObjectKind::VirtualMachine => "virtual machine",
            ObjectKind::Disk => "disk",
            ObjectKind::ExternalGuest => "external guest",
            ObjectKind::IscsiSession => "iscsi session",
        };
        f.write_str(name)
    }
}

/// A declared object plus its remote identity.
///
/// `id == None` means the object does not exist remotely: it was never
/// created, or a read found it gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record<S> {
    pub id: Option<String>,
    pub spec: S,
}

impl<S> Record<S> {
    pub fn new(id: impl Into<String>, spec: S) -> Self {
        Self {
            id: Some(id.into()),
            spec,
        }
    }

    pub fn absent(spec: S) -> Self {
        Self { id: None, spec }
    }

    pub fn exists(&self) -> bool {
        self.id.is_some()
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Identity, or `NotFound` when the record is absent.
    pub fn require_id(&self, kind: ObjectKind) -> Result<&str> {
        self.id().ok_or_else(|| ReconcileError::NotFound {
            kind,
            id: String::new(),
        })
    }
}

/// Create/Read/Update/Delete for one object kind.
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Declared (and observed) state of the object.
    type Spec: Clone + Send + Sync;

    const KIND: ObjectKind;

    /// Bring the object into existence and return it as observed.
    async fn create(&self, ctx: &OpContext, spec: &Self::Spec) -> Result<Record<Self::Spec>>;

    /// Re-read the object. Absence clears the identity rather than failing.
    async fn read(&self, ctx: &OpContext, record: &Record<Self::Spec>)
    -> Result<Record<Self::Spec>>;

    /// Converge an existing object towards `desired`.
    async fn update(
        &self,
        ctx: &OpContext,
        record: &Record<Self::Spec>,
        desired: &Self::Spec,
    ) -> Result<Record<Self::Spec>>;

    /// Remove the object. Already gone counts as success.
    async fn delete(&self, ctx: &OpContext, record: &Record<Self::Spec>) -> Result<()>;
}
