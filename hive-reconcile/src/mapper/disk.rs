use serde::{Deserialize, Serialize};

use crate::api::DiskInfo;
use crate::mapper::ChangedFields;

pub const DEFAULT_SIZE_GB: u64 = 30;
pub const DEFAULT_FORMAT: &str = "qcow2";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskSpec {
    /// Storage pool id the disk lives in.
    pub storage_pool: String,
    pub filename: String,
    /// GiB.
    pub size: u64,
    pub format: String,
    /// Clone source pool; only honoured together with `src_filename`.
    pub src_storage: Option<String>,
    pub src_filename: Option<String>,
    pub src_url: Option<String>,
    /// Local file uploaded to the pool under `filename` before creation.
    pub local_file: Option<String>,
}

impl Default for DiskSpec {
    fn default() -> Self {
        Self {
            storage_pool: String::new(),
            filename: String::new(),
            size: DEFAULT_SIZE_GB,
            format: DEFAULT_FORMAT.to_string(),
            src_storage: None,
            src_filename: None,
            src_url: None,
            local_file: None,
        }
    }
}

/// How a disk comes into existence, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskSource<'a> {
    Clone { pool: &'a str, filename: &'a str },
    Url(&'a str),
    Empty,
}

impl DiskSpec {
    pub fn identity(&self) -> String {
        format!("{}-{}", self.storage_pool, self.filename)
    }

    /// Clone wins over URL copy, which wins over an empty create. A clone
    /// source missing either half is ignored.
    pub fn source(&self) -> DiskSource<'_> {
        if let (Some(pool), Some(filename)) = (&self.src_storage, &self.src_filename) {
            return DiskSource::Clone { pool, filename };
        }
        if let Some(url) = &self.src_url {
            return DiskSource::Url(url);
        }
        DiskSource::Empty
    }

    /// GiB to add so the image reaches the declared size. Never shrinks.
    pub fn grow_increment(&self, info: &DiskInfo) -> Option<u64> {
        let actual = info.virtual_size_gb();
        (self.size > actual).then(|| self.size - actual)
    }

    /// Size and format come from the image; everything else from `prior`.
    pub fn from_wire(info: &DiskInfo, prior: &DiskSpec) -> DiskSpec {
        DiskSpec {
            size: info.virtual_size_gb(),
            format: info.format.clone(),
            ..prior.clone()
        }
    }

    /// Every declared field is fixed at creation. Size only counts when the
    /// disk would have to grow, since images may come out larger than declared.
    pub fn force_replace_changes(&self, observed: &DiskSpec) -> Vec<String> {
        let mut changes = ChangedFields::default();
        changes.check("storage_pool", &self.storage_pool, &observed.storage_pool);
        changes.check("filename", &self.filename, &observed.filename);
        changes.check_grown("size", self.size, observed.size);
        changes.check("format", &self.format, &observed.format);
        changes.check("src_storage", &self.src_storage, &observed.src_storage);
        changes.check("src_filename", &self.src_filename, &observed.src_filename);
        changes.check("src_url", &self.src_url, &observed.src_url);
        changes.check("local_file", &self.local_file, &observed.local_file);
        changes.into_fields()
    }
}
