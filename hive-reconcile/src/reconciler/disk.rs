//! Disk reconciler - image files in a storage pool.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{ObjectKind, Reconciler, Record};
use crate::absence::AbsentAsNone;
use crate::api::{DiskInfo, HiveApi};
use crate::config::ReconcileConfig;
use crate::context::OpContext;
use crate::error::{ReconcileError, Result};
use crate::mapper::disk::{DiskSource, DiskSpec};
use crate::poller::TaskPoller;

pub struct DiskReconciler {
    api: Arc<dyn HiveApi>,
    poller: TaskPoller,
}

impl DiskReconciler {
    pub fn new(api: Arc<dyn HiveApi>, config: ReconcileConfig) -> Self {
        Self {
            api,
            poller: TaskPoller::new(config.poll_interval()),
        }
    }

    /// Current image info, `None` when the pool or the file is missing.
    async fn fetch(&self, spec: &DiskSpec) -> Result<Option<DiskInfo>> {
        if self
            .api
            .get_storage_pool(&spec.storage_pool)
            .await
            .absent_as_none()?
            .is_none()
        {
            return Ok(None);
        }
        Ok(self
            .api
            .disk_info(&spec.storage_pool, &spec.filename)
            .await
            .absent_as_none()?)
    }

    async fn materialise(&self, ctx: &OpContext, spec: &DiskSpec) -> Result<DiskInfo> {
        let pool = &spec.storage_pool;
        let filename = &spec.filename;

        if let Some(local) = &spec.local_file {
            info!(pool = %pool, filename = %filename, local, "Uploading local file");
            self.api.upload_file(pool, local, filename).await?;
        }

        let (handle, operation) = match spec.source() {
            DiskSource::Clone {
                pool: src_pool,
                filename: src_filename,
            } => {
                // The source pool must exist before a clone is attempted.
                self.api.get_storage_pool(src_pool).await?;
                info!(
                    pool = %pool,
                    filename = %filename,
                    src_pool,
                    src_filename,
                    "Cloning disk"
                );
                let handle = self
                    .api
                    .clone_disk(src_pool, src_filename, pool, filename, &spec.format)
                    .await?;
                (handle, "clone disk")
            }
            DiskSource::Url(url) => {
                info!(pool = %pool, filename = %filename, url, "Copying disk from URL");
                (self.api.copy_url(pool, url, filename).await?, "copy disk")
            }
            DiskSource::Empty => {
                info!(pool = %pool, filename = %filename, size_gb = spec.size, "Creating disk");
                let handle = self
                    .api
                    .create_disk(pool, filename, &spec.format, spec.size)
                    .await?;
                (handle, "create disk")
            }
        };
        self.poller
            .complete_task(ctx, &self.api, handle, operation)
            .await?;

        Ok(self.api.disk_info(pool, filename).await?)
    }

    fn observed(spec: &DiskSpec, info: &DiskInfo) -> Record<DiskSpec> {
        Record::new(spec.identity(), DiskSpec::from_wire(info, spec))
    }
}

#[async_trait]
impl Reconciler for DiskReconciler {
    type Spec = DiskSpec;
    const KIND: ObjectKind = ObjectKind::Disk;

    async fn create(&self, ctx: &OpContext, spec: &DiskSpec) -> Result<Record<DiskSpec>> {
        // Missing target pool is an error here, not absence.
        self.api.get_storage_pool(&spec.storage_pool).await?;

        let info = match self
            .api
            .disk_info(&spec.storage_pool, &spec.filename)
            .await
            .absent_as_none()?
        {
            Some(info) => {
                info!(disk = %spec.identity(), "Disk already exists, skipping creation");
                info
            }
            None => self.materialise(ctx, spec).await?,
        };

        let info = match spec.grow_increment(&info) {
            Some(increment) => {
                info!(
                    disk = %spec.identity(),
                    from_gb = info.virtual_size_gb(),
                    increment_gb = increment,
                    "Growing disk"
                );
                let handle = self
                    .api
                    .grow_disk(&spec.storage_pool, &spec.filename, increment)
                    .await?;
                self.poller
                    .complete_task(ctx, &self.api, handle, "grow disk")
                    .await?;
                self.api
                    .disk_info(&spec.storage_pool, &spec.filename)
                    .await?
            }
            None => info,
        };

        Ok(Self::observed(spec, &info))
    }

    async fn read(&self, _ctx: &OpContext, record: &Record<DiskSpec>) -> Result<Record<DiskSpec>> {
        if !record.exists() {
            return Ok(record.clone());
        }
        match self.fetch(&record.spec).await? {
            Some(info) => Ok(Self::observed(&record.spec, &info)),
            None => {
                info!(disk = %record.spec.identity(), "Disk no longer exists");
                Ok(Record::absent(record.spec.clone()))
            }
        }
    }

    async fn update(
        &self,
        ctx: &OpContext,
        record: &Record<DiskSpec>,
        desired: &DiskSpec,
    ) -> Result<Record<DiskSpec>> {
        let id = record.require_id(Self::KIND)?.to_string();
        let current = self.read(ctx, record).await?;
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

    async fn delete(&self, _ctx: &OpContext, record: &Record<DiskSpec>) -> Result<()> {
        if !record.exists() {
            return Ok(());
        }
        let spec = &record.spec;
        if self
            .api
            .get_storage_pool(&spec.storage_pool)
            .await
            .absent_as_none()?
            .is_none()
        {
            info!(disk = %spec.identity(), "Storage pool already gone");
            return Ok(());
        }

        info!(disk = %spec.identity(), "Deleting disk");
        if self
            .api
            .delete_file(&spec.storage_pool, &spec.filename)
            .await
            .absent_as_none()?
            .is_none()
        {
            info!(disk = %spec.identity(), "Disk already removed");
        }
        Ok(())
    }
}
