//! External guest reconciler.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{ObjectKind, Reconciler, Record};
use crate::absence::AbsentAsNone;
use crate::api::HiveApi;
use crate::config::ReconcileConfig;
use crate::context::OpContext;
use crate::error::{ReconcileError, Result};
use crate::mapper::guest::ExternalGuestSpec;

pub struct ExternalGuestReconciler {
    api: Arc<dyn HiveApi>,
}

impl ExternalGuestReconciler {
    /// Registration is synchronous; nothing in `config` applies beyond the
    /// timeouts the caller puts into each context.
    pub fn new(api: Arc<dyn HiveApi>, _config: ReconcileConfig) -> Self {
        Self { api }
    }

    async fn observe(&self, name: &str) -> Result<Option<ExternalGuestSpec>> {
        let guest = self.api.get_guest(name).await.absent_as_none()?;
        Ok(guest.as_ref().map(ExternalGuestSpec::from_wire))
    }
}

#[async_trait]
impl Reconciler for ExternalGuestReconciler {
    type Spec = ExternalGuestSpec;
    const KIND: ObjectKind = ObjectKind::ExternalGuest;

    async fn create(
        &self,
        _ctx: &OpContext,
        spec: &ExternalGuestSpec,
    ) -> Result<Record<ExternalGuestSpec>> {
        if spec.name.is_empty() {
            return Err(ReconcileError::InvalidSpec(
                "external guest name must not be empty".to_string(),
            ));
        }

        if self.observe(&spec.name).await?.is_some() {
            info!(guest = %spec.name, "Guest already registered");
        } else {
            info!(guest = %spec.name, address = %spec.address, "Registering external guest");
            self.api.create_external_guest(&spec.to_wire()).await?;
        }

        let observed = self
            .observe(&spec.name)
            .await?
            .ok_or_else(|| ReconcileError::NotFound {
                kind: Self::KIND,
                id: spec.name.clone(),
            })?;
        Ok(Record::new(&spec.name, observed))
    }

    async fn read(
        &self,
        _ctx: &OpContext,
        record: &Record<ExternalGuestSpec>,
    ) -> Result<Record<ExternalGuestSpec>> {
        let Some(name) = record.id() else {
            return Ok(record.clone());
        };
        match self.observe(name).await? {
            Some(observed) => Ok(Record::new(name, observed)),
            None => {
                info!(guest = name, "Guest no longer exists");
                Ok(Record::absent(record.spec.clone()))
            }
        }
    }

    async fn update(
        &self,
        _ctx: &OpContext,
        record: &Record<ExternalGuestSpec>,
        desired: &ExternalGuestSpec,
    ) -> Result<Record<ExternalGuestSpec>> {
        let name = record.require_id(Self::KIND)?;
        let observed = self
            .observe(name)
            .await?
            .ok_or_else(|| ReconcileError::NotFound {
                kind: Self::KIND,
                id: name.to_string(),
            })?;

        let fields = desired.force_replace_changes(&observed);
        if !fields.is_empty() {
            return Err(ReconcileError::ForceReplace {
                kind: Self::KIND,
                id: name.to_string(),
                fields,
            });
        }
        Ok(Record::new(name, observed))
    }

    async fn delete(&self, _ctx: &OpContext, record: &Record<ExternalGuestSpec>) -> Result<()> {
        let Some(name) = record.id() else {
            return Ok(());
        };
        if self.observe(name).await?.is_none() {
            info!(guest = name, "Guest already removed");
            return Ok(());
        }
        info!(guest = name, "Deleting external guest");
        self.api.delete_guest(name).await.absent_as_none()?;
        Ok(())
    }
}
