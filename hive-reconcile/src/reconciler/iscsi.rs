//! iSCSI session reconciler - discovery, login and logout on a host.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::{ObjectKind, Reconciler, Record};
use crate::absence::AbsentAsNone;
use crate::api::HiveApi;
use crate::config::ReconcileConfig;
use crate::context::OpContext;
use crate::error::{ReconcileError, Result};
use crate::mapper::iscsi::{IscsiSessionSpec, session_identity};

pub struct IscsiSessionReconciler {
    api: Arc<dyn HiveApi>,
}

impl IscsiSessionReconciler {
    pub fn new(api: Arc<dyn HiveApi>, _config: ReconcileConfig) -> Self {
        Self { api }
    }

    /// Look the session up on its host, under the discovered portal when
    /// known and the declared one otherwise.
    async fn observe(&self, spec: &IscsiSessionSpec) -> Result<Record<IscsiSessionSpec>> {
        if self
            .api
            .get_host(&spec.host_id)
            .await
            .absent_as_none()?
            .is_none()
        {
            info!(host_id = %spec.host_id, "Host no longer exists");
            return Ok(Record::absent(spec.clone()));
        }

        let sessions = self
            .api
            .iscsi_sessions(&spec.host_id, spec.effective_portal(), &spec.target)
            .await?;
        match spec.match_session(&sessions) {
            Some(session) => Ok(Record::new(
                session_identity(&session.portal, &session.target),
                IscsiSessionSpec::from_wire(session, spec),
            )),
            None => Ok(Record::absent(spec.clone())),
        }
    }

    /// Observe after create; a session that cannot be seen is a failure.
    async fn observe_created(&self, spec: &IscsiSessionSpec) -> Result<Record<IscsiSessionSpec>> {
        let record = self.observe(spec).await?;
        if !record.exists() {
            return Err(ReconcileError::PreconditionUnmet(format!(
                "no iscsi session for {} on {}",
                spec.target,
                spec.effective_portal()
            )));
        }
        Ok(record)
    }
}

#[async_trait]
impl Reconciler for IscsiSessionReconciler {
    type Spec = IscsiSessionSpec;
    const KIND: ObjectKind = ObjectKind::IscsiSession;

    async fn create(
        &self,
        _ctx: &OpContext,
        spec: &IscsiSessionSpec,
    ) -> Result<Record<IscsiSessionSpec>> {
        let host = self.api.get_host(&spec.host_id).await?;

        let entries = self.api.iscsi_discover(&host.hostid, &spec.portal).await?;
        if entries.is_empty() {
            return Err(ReconcileError::PreconditionUnmet(
                "no iscsi targets found".to_string(),
            ));
        }
        let entry = spec.find_discovered(&entries).ok_or_else(|| {
            ReconcileError::PreconditionUnmet(format!(
                "target {} not offered by portal {}",
                spec.target, spec.portal
            ))
        })?;

        let mut spec = spec.clone();
        spec.discovered_portal = Some(entry.portal.clone());
        let portal = entry.portal.as_str();

        match self
            .api
            .iscsi_sessions(&host.hostid, portal, &spec.target)
            .await
        {
            Ok(sessions) if !sessions.is_empty() => {
                info!(host_id = %host.hostid, portal, target = %spec.target, "Session already logged in");
                return self.observe_created(&spec).await;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(host_id = %host.hostid, portal, error = %e, "Listing sessions failed, logging in anyway");
            }
        }

        let auth = spec.auth_method();
        info!(
            host_id = %host.hostid,
            portal,
            target = %spec.target,
            auth = auth.as_str(),
            "Logging in to iSCSI target"
        );
        let sessions = self
            .api
            .iscsi_login(&host.hostid, &spec.login_request(portal))
            .await?;
        if sessions.is_empty() {
            return Err(ReconcileError::PreconditionUnmet(format!(
                "no iscsi sessions found after login to {}",
                spec.target
            )));
        }

        self.observe_created(&spec).await
    }

    async fn read(
        &self,
        _ctx: &OpContext,
        record: &Record<IscsiSessionSpec>,
    ) -> Result<Record<IscsiSessionSpec>> {
        if !record.exists() {
            return Ok(record.clone());
        }
        self.observe(&record.spec).await
    }

    async fn update(
        &self,
        _ctx: &OpContext,
        record: &Record<IscsiSessionSpec>,
        desired: &IscsiSessionSpec,
    ) -> Result<Record<IscsiSessionSpec>> {
        let id = record.require_id(Self::KIND)?.to_string();
        let current = self.observe(&record.spec).await?;
        if !current.exists() {
            return Err(ReconcileError::NotFound {
                kind: Self::KIND,
                id,
            });
        }

        let fields = desired.force_replace_changes(&current.spec);
        if !fields.is_empty() {
            return Err(ReconcileError::ForceReplace {
                kind: Self::KIND,
                id,
                fields,
            });
        }
        Ok(current)
    }

    /// Logout errors propagate as they are; there is no absence handling.
    async fn delete(&self, _ctx: &OpContext, record: &Record<IscsiSessionSpec>) -> Result<()> {
        if !record.exists() {
            return Ok(());
        }
        let spec = &record.spec;
        let portal = spec.effective_portal();
        info!(host_id = %spec.host_id, portal, target = %spec.target, "Logging out of iSCSI target");
        self.api
            .iscsi_logout(&spec.host_id, portal, &spec.target)
            .await?;
        Ok(())
    }
}
