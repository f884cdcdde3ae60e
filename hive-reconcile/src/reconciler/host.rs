//! Host reconciler: join, role, availability state and appliance settings.
//!
//! Convergence order is fixed: role first, then availability state (skipped
//! for gateway-only hosts), appliance settings last. Each step re-checks the
//! observed host before acting, so a failed call can simply be retried.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{ObjectKind, Reconciler, Record};
use crate::absence::AbsentAsNone;
use crate::api::{HiveApi, Host};
use crate::config::ReconcileConfig;
use crate::context::OpContext;
use crate::error::{ReconcileError, Result};
use crate::lifecycle::{HostPhase, Lifecycle};
use crate::mapper::host::{ApplianceDelta, HostSpec, HostState};
use crate::poller::TaskPoller;

const UNREACHABLE: &str = "unreachable";

pub struct HostReconciler {
    api: Arc<dyn HiveApi>,
    config: ReconcileConfig,
    poller: TaskPoller,
}

impl HostReconciler {
    pub fn new(api: Arc<dyn HiveApi>, config: ReconcileConfig) -> Self {
        let poller = TaskPoller::new(config.poll_interval());
        Self {
            api,
            config,
            poller,
        }
    }

    async fn fetch(&self, host_id: &str) -> Result<Option<Host>> {
        Ok(self.api.get_host(host_id).await.absent_as_none()?)
    }

    async fn reread(&self, host_id: &str) -> Result<Host> {
        Ok(self.api.get_host(host_id).await?)
    }

    async fn converge(
        &self,
        ctx: &OpContext,
        mut host: Host,
        desired: &HostSpec,
        lifecycle: &mut Lifecycle<HostPhase>,
    ) -> Result<Host> {
        let host_id = host.hostid.clone();
        let settle = self.config.settle;

        if desired.gateway_only != host.is_gateway() {
            info!(host_id = %host_id, gateway_only = desired.gateway_only, "Changing host role");
            self.api
                .set_gateway_mode(&host_id, desired.gateway_only)
                .await?;
            host = self
                .poller
                .settle(ctx, "host role change", settle.role_change(), || {
                    self.reread(&host_id)
                })
                .await?;
            lifecycle.advance(HostPhase::observe(&host))?;
        }

        if !desired.gateway_only && host.state != desired.state.as_str() {
            info!(
                host_id = %host_id,
                from = %host.state,
                to = %desired.state,
                "Changing host state"
            );
            let handle = self
                .api
                .set_host_state(&host_id, desired.state.as_str())
                .await?;
            self.poller
                .complete_task(ctx, &self.api, handle, "set host state")
                .await?;
            host = self
                .poller
                .settle(ctx, "host state change", settle.state_change(), || {
                    self.reread(&host_id)
                })
                .await?;
            lifecycle.advance(HostPhase::observe(&host))?;
        }

        let delta = ApplianceDelta::between(&desired.appliance, &host.appliance);
        if !delta.is_empty() {
            info!(host_id = %host_id, fields = ?delta.fields(), "Updating appliance settings");
            let appliance = delta.apply(&host.appliance);
            self.api.update_appliance(&host_id, &appliance).await?;
            host = self
                .poller
                .settle(ctx, "appliance update", settle.appliance(), || {
                    self.reread(&host_id)
                })
                .await?;
        }

        debug!(host_id = %host_id, phases = ?lifecycle.history(), "Host converged");
        Ok(host)
    }
}

#[async_trait]
impl Reconciler for HostReconciler {
    type Spec = HostSpec;
    const KIND: ObjectKind = ObjectKind::Host;

    async fn create(&self, ctx: &OpContext, spec: &HostSpec) -> Result<Record<HostSpec>> {
        let address = spec.address().ok_or_else(|| {
            ReconcileError::InvalidSpec("ip_address or hostname must be provided".to_string())
        })?;

        let hosts = self.api.list_hosts().await?;
        let (host, mut lifecycle) = match hosts.into_iter().find(|h| spec.matches(h)) {
            Some(existing) => {
                info!(host_id = %existing.hostid, address, "Host is already a cluster member");
                let lifecycle = Lifecycle::new(HostPhase::observe(&existing));
                (existing, lifecycle)
            }
            None => {
                let mut lifecycle = Lifecycle::new(HostPhase::Unjoined);
                info!("Joining host {}", address);
                let handle = self
                    .api
                    .join_host(&spec.username, &spec.password, address)
                    .await?;
                lifecycle.advance(HostPhase::Joining)?;

                let task = self
                    .poller
                    .complete_task(ctx, &self.api, handle, "add host")
                    .await?;
                let task_id = task.id.clone();
                let host_id = task
                    .reference
                    .host
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| {
                        ReconcileError::PreconditionUnmet(format!(
                            "join task {task_id} did not report a host id"
                        ))
                    })?;

                let host = self
                    .poller
                    .settle(ctx, "host join", self.config.settle.after_join(), || {
                        self.reread(&host_id)
                    })
                    .await?;
                lifecycle.advance(HostPhase::observe(&host))?;
                (host, lifecycle)
            }
        };

        let host_id = host.hostid.clone();
        let host = self.converge(ctx, host, spec, &mut lifecycle).await?;
        Ok(Record::new(host_id, HostSpec::from_wire(&host, spec)))
    }

    async fn read(&self, _ctx: &OpContext, record: &Record<HostSpec>) -> Result<Record<HostSpec>> {
        let Some(host_id) = record.id() else {
            return Ok(record.clone());
        };
        match self.fetch(host_id).await? {
            Some(host) => Ok(Record::new(host_id, HostSpec::from_wire(&host, &record.spec))),
            None => {
                info!(host_id, "Host no longer exists");
                Ok(Record::absent(record.spec.clone()))
            }
        }
    }

    async fn update(
        &self,
        ctx: &OpContext,
        record: &Record<HostSpec>,
        desired: &HostSpec,
    ) -> Result<Record<HostSpec>> {
        let host_id = record.require_id(Self::KIND)?;
        let host = self
            .fetch(host_id)
            .await?
            .ok_or_else(|| ReconcileError::NotFound {
                kind: Self::KIND,
                id: host_id.to_string(),
            })?;

        let fields = desired.force_replace_changes(&host);
        if !fields.is_empty() {
            return Err(ReconcileError::ForceReplace {
                kind: Self::KIND,
                id: host_id.to_string(),
                fields,
            });
        }

        let mut lifecycle = Lifecycle::new(HostPhase::observe(&host));
        let host = self.converge(ctx, host, desired, &mut lifecycle).await?;
        Ok(Record::new(host_id, HostSpec::from_wire(&host, desired)))
    }

    async fn delete(&self, ctx: &OpContext, record: &Record<HostSpec>) -> Result<()> {
        let Some(host_id) = record.id() else {
            return Ok(());
        };
        let Some(mut host) = self.fetch(host_id).await? else {
            info!(host_id, "Host already removed");
            return Ok(());
        };
        let mut lifecycle = Lifecycle::new(HostPhase::observe(&host));

        if host.state == UNREACHABLE {
            info!(host_id, "Host is unreachable, dropping its cluster record");
            self.api.delete_host(host_id).await.absent_as_none()?;
            lifecycle.advance(HostPhase::Removed)?;
            return Ok(());
        }

        if host.state == HostState::Available.as_str() {
            info!(host_id, "Entering maintenance before removal");
            let handle = self
                .api
                .set_host_state(host_id, HostState::Maintenance.as_str())
                .await?;
            self.poller
                .complete_task(ctx, &self.api, handle, "enter maintenance mode")
                .await?;
            // Services restart after entering maintenance.
            host = self
                .poller
                .settle(ctx, "maintenance", self.config.settle.maintenance(), || {
                    self.reread(host_id)
                })
                .await?;
            lifecycle.advance(HostPhase::observe(&host))?;
        }

        info!(host_id, "Removing host from cluster");
        let handle = self.api.unjoin_host(host_id).await?;
        self.poller
            .complete_task(ctx, &self.api, handle, "remove host")
            .await?;
        lifecycle.advance(HostPhase::Removed)?;
        debug!(host_id, phases = ?lifecycle.history(), "Host removed");
        Ok(())
    }
}
