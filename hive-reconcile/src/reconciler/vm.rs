//! VM reconciler - a standalone VM is a single-guest pool.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{ObjectKind, Reconciler, Record};
use crate::absence::AbsentAsNone;
use crate::api::{Guest, HiveApi, Pool};
use crate::config::ReconcileConfig;
use crate::context::OpContext;
use crate::error::{ReconcileError, Result};
use crate::lifecycle::{Lifecycle, VmPhase};
use crate::mapper::vm::VmSpec;
use crate::retry::{Attempt, Retrier, RetryGoal};

/// Pool state reported while a delete is in progress.
const POOL_DELETING: &str = "deleting";

pub struct VmReconciler {
    api: Arc<dyn HiveApi>,
    retrier: Retrier,
}

impl VmReconciler {
    pub fn new(api: Arc<dyn HiveApi>, config: ReconcileConfig) -> Self {
        Self {
            api,
            retrier: Retrier::new(config.retry_interval()),
        }
    }

    async fn fetch(&self, pool_id: &str) -> Result<Option<Pool>> {
        Ok(self.api.get_pool(pool_id).await.absent_as_none()?)
    }

    /// One look at the guest: absent while the pool is still building,
    /// otherwise wait (up to the remaining budget) for a target state.
    async fn guest_ready(&self, ctx: &OpContext, name: &str) -> Result<Attempt<Guest>> {
        let Some(guest) = self.api.get_guest(name).await.absent_as_none()? else {
            return Ok(Attempt::Absent);
        };
        if guest.at_target_state() {
            return Ok(Attempt::Ready(guest));
        }
        debug!(guest = name, state = %guest.guest_state, "Waiting for guest target state");
        let guest = self.api.await_guest_state(name, ctx.remaining()).await?;
        if guest.at_target_state() {
            return Ok(Attempt::Ready(guest));
        }
        Ok(Attempt::Transient(format!(
            "guest {name} in state {:?}",
            guest.guest_state
        )))
    }

    async fn pool_gone(&self, pool_id: &str) -> Result<Attempt<()>> {
        let pool = self.api.get_pool(pool_id).await?;
        if pool.state == POOL_DELETING {
            return Ok(Attempt::Transient(format!("deleting pool {pool_id}")));
        }
        Ok(Attempt::Transient(format!(
            "pool {pool_id} still present in state {:?}",
            pool.state
        )))
    }

    fn observed(pool_id: &str, pool: &Pool, prior: &VmSpec) -> Record<VmSpec> {
        Record::new(pool_id, VmSpec::from_wire(pool, prior))
    }
}

#[async_trait]
impl Reconciler for VmReconciler {
    type Spec = VmSpec;
    const KIND: ObjectKind = ObjectKind::VirtualMachine;

    async fn create(&self, ctx: &OpContext, spec: &VmSpec) -> Result<Record<VmSpec>> {
        let mut lifecycle = Lifecycle::new(VmPhase::Absent);

        let pool = match self.api.get_pool_by_name(&spec.name).await.absent_as_none()? {
            Some(existing) => {
                info!(name = %spec.name, "Pool already exists, reusing it");
                existing
            }
            None => {
                info!("Creating VM {}", spec.name);
                self.api.create_pool(&spec.to_wire(None)).await?;
                self.api.get_pool_by_name(&spec.name).await?
            }
        };
        let pool_id = pool.id.clone().filter(|id| !id.is_empty()).ok_or_else(|| {
            ReconcileError::PreconditionUnmet(format!("pool {} has no id", spec.name))
        })?;
        lifecycle.advance(VmPhase::Building)?;

        let guest_name = spec.guest_name();
        let guest = self
            .retrier
            .retry_until(ctx, RetryGoal::Exists, "guest build", || {
                self.guest_ready(ctx, &guest_name)
            })
            .await?
            .ok_or_else(|| ctx.timeout_error("guest build"))?;
        lifecycle.advance(VmPhase::Running)?;

        info!(
            pool_id = %pool_id,
            guest = %guest.name,
            state = %guest.guest_state,
            "VM is up"
        );
        debug!(pool_id = %pool_id, phases = ?lifecycle.history(), "VM created");

        let pool = self
            .fetch(&pool_id)
            .await?
            .ok_or_else(|| ReconcileError::NotFound {
                kind: Self::KIND,
                id: pool_id.clone(),
            })?;
        Ok(Self::observed(&pool_id, &pool, spec))
    }

    async fn read(&self, _ctx: &OpContext, record: &Record<VmSpec>) -> Result<Record<VmSpec>> {
        let Some(pool_id) = record.id() else {
            return Ok(record.clone());
        };
        match self.fetch(pool_id).await? {
            Some(pool) => Ok(Self::observed(pool_id, &pool, &record.spec)),
            None => {
                info!(pool_id, "Pool no longer exists");
                Ok(Record::absent(record.spec.clone()))
            }
        }
    }

    async fn update(
        &self,
        _ctx: &OpContext,
        record: &Record<VmSpec>,
        desired: &VmSpec,
    ) -> Result<Record<VmSpec>> {
        let pool_id = record.require_id(Self::KIND)?;
        let pool = self
            .fetch(pool_id)
            .await?
            .ok_or_else(|| ReconcileError::NotFound {
                kind: Self::KIND,
                id: pool_id.to_string(),
            })?;

        let observed = VmSpec::from_wire(&pool, &record.spec);
        let fields = desired.force_replace_changes(&observed);
        if !fields.is_empty() {
            return Err(ReconcileError::ForceReplace {
                kind: Self::KIND,
                id: pool_id.to_string(),
                fields,
            });
        }

        let mut lifecycle = Lifecycle::new(VmPhase::Running);
        if observed != *desired {
            info!(pool_id, "Updating VM {}", desired.name);
            self.api.update_pool(&desired.to_wire(Some(pool_id))).await?;
            lifecycle.advance(VmPhase::Updated)?;
        }

        let pool = self.api.get_pool(pool_id).await?;
        Ok(Self::observed(pool_id, &pool, desired))
    }

    async fn delete(&self, ctx: &OpContext, record: &Record<VmSpec>) -> Result<()> {
        let Some(pool_id) = record.id() else {
            return Ok(());
        };
        if self.fetch(pool_id).await?.is_none() {
            info!(pool_id, "Pool already removed");
            return Ok(());
        }
        let mut lifecycle = Lifecycle::new(VmPhase::Running);

        info!(pool_id, "Deleting VM {}", record.spec.name);
        self.api.delete_pool(pool_id).await.absent_as_none()?;
        lifecycle.advance(VmPhase::Deleting)?;

        self.retrier
            .retry_until(ctx, RetryGoal::Gone, "pool removal", || self.pool_gone(pool_id))
            .await?;
        lifecycle.advance(VmPhase::Absent)?;
        debug!(pool_id, phases = ?lifecycle.history(), "VM deleted");
        Ok(())
    }
}
