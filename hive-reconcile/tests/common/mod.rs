//! Shared test utilities for hive-reconcile integration tests.
//!
//! `FakeHive` is an in-memory stand-in for the management API. Remote tasks
//! apply their effect immediately but report `running` for a configurable
//! number of polls, so the poller's cadence is exercised. Every call is
//! logged for assertions.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use hive_reconcile::api::{
    ApiError, ApiResult, Appliance, BlockDevice, DiskInfo, ExternalGuest, GIB, Guest, HiveApi,
    Host, IscsiLogin, IscsiSession, IscsiTarget, Pool, StoragePool, Task, TaskHandle, TaskRef,
    TaskState,
};
use hive_reconcile::{OpContext, ReconcileConfig};

/// Pool/guest lookups answer the way older endpoints do: 404 embedded in the
/// message body, no status.
fn embedded_not_found(what: &str) -> ApiError {
    ApiError::new(format!(r#"{{"error": 404, "message": "{what} not found"}}"#))
}

fn not_found(what: &str) -> ApiError {
    ApiError::not_found(format!("{what} not found"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub name: &'static str,
    pub args: Vec<String>,
}

struct FakeTask {
    task: Task,
    running_polls: u32,
    outcome: TaskState,
}

#[derive(Default)]
pub struct FakeState {
    pub hosts: BTreeMap<String, Host>,
    pub pools: BTreeMap<String, Pool>,
    pub guests: BTreeMap<String, Guest>,
    pub storage_pools: BTreeMap<String, StoragePool>,
    /// Keyed by (pool id, filename).
    pub files: BTreeMap<(String, String), DiskInfo>,
    /// Discovery answers per host.
    pub iscsi_targets: BTreeMap<String, Vec<IscsiTarget>>,
    pub iscsi_sessions: BTreeMap<String, Vec<IscsiSession>>,
    pub logins: Vec<IscsiLogin>,
    pub calls: Vec<Call>,

    /// Polls a task reports `running` before its terminal state.
    pub task_running_polls: u32,
    /// Operations whose task finishes `failed` with this message.
    pub failing_tasks: HashMap<&'static str, String>,
    /// Calls that fail outright.
    pub failing_calls: HashMap<&'static str, ApiError>,
    /// State a freshly joined host reports.
    pub joined_host_state: String,
    /// Size (GiB) of images copied from a URL.
    pub url_image_gb: u64,
    /// Guest reads that answer 404 after a pool is created.
    pub guest_build_reads: u32,
    /// Whether a new guest needs `await_guest_state` to reach its target.
    pub guest_boots_slowly: bool,
    /// Whether `await_guest_state` returns without the guest settling.
    pub guest_never_settles: bool,
    /// Pool reads answering `deleting` after a delete call.
    pub pool_deleting_reads: u32,
    /// Portal the host reports for new sessions instead of the login portal.
    pub session_portal: Option<String>,

    tasks: HashMap<String, FakeTask>,
    next_host: u32,
}

pub struct FakeHive {
    state: Mutex<FakeState>,
}

impl FakeHive {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeState {
                task_running_polls: 1,
                joined_host_state: "available".to_string(),
                url_image_gb: 20,
                ..Default::default()
            }),
        })
    }

    /// Mutate the fake's state.
    pub fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut *state)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.with(|s| s.calls.clone())
    }

    pub fn calls_named(&self, name: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.name == name).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls_named(name).len()
    }

    /// Names of the mutating calls, in order.
    pub fn mutations(&self) -> Vec<&'static str> {
        self.calls()
            .into_iter()
            .map(|c| c.name)
            .filter(|n| !n.starts_with("get_") && !n.starts_with("list_") && *n != "disk_info")
            .collect()
    }

    pub fn add_host(&self, host_id: &str, ip: &str, state: &str, role: &str) {
        self.with(|s| {
            s.hosts.insert(
                host_id.to_string(),
                Host {
                    hostid: host_id.to_string(),
                    hostname: format!("hive-{host_id}"),
                    ip: ip.to_string(),
                    state: state.to_string(),
                    appliance: Appliance {
                        role: role.to_string(),
                        cluster_id: "cluster-1".to_string(),
                        loglevel: "info".to_string(),
                        max_clone_density: 20,
                        ntp: "pool.ntp.org".to_string(),
                        timezone: "UTC".to_string(),
                    },
                },
            );
        });
    }

    pub fn add_storage_pool(&self, id: &str) {
        self.with(|s| {
            s.storage_pools.insert(
                id.to_string(),
                StoragePool {
                    id: id.to_string(),
                    name: id.to_string(),
                    pool_type: "nfs".to_string(),
                },
            );
        });
    }

    pub fn add_file(&self, pool: &str, filename: &str, format: &str, size_gb: u64) {
        self.with(|s| {
            s.files.insert(
                (pool.to_string(), filename.to_string()),
                DiskInfo {
                    filename: filename.to_string(),
                    format: format.to_string(),
                    virtual_size: size_gb * GIB,
                    actual_size: GIB,
                },
            );
        });
    }

    fn enter(&self, name: &'static str, args: &[&str]) -> ApiResult<MutexGuard<'_, FakeState>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call {
            name,
            args: args.iter().map(|a| a.to_string()).collect(),
        });
        if let Some(err) = state.failing_calls.get(name) {
            return Err(err.clone());
        }
        Ok(state)
    }
}

impl FakeState {
    /// Start a task for `name`; `effect` runs now unless the task is set to fail.
    fn start_task(
        &mut self,
        name: &'static str,
        reference: TaskRef,
        effect: impl FnOnce(&mut FakeState),
    ) -> TaskHandle {
        let id = uuid::Uuid::new_v4().to_string();
        let (outcome, message) = match self.failing_tasks.get(name) {
            Some(message) => (TaskState::Failed, message.clone()),
            None => {
                effect(self);
                (TaskState::Completed, String::new())
            }
        };
        self.tasks.insert(
            id.clone(),
            FakeTask {
                task: Task {
                    id: id.clone(),
                    name: name.to_string(),
                    state: TaskState::Running,
                    message,
                    progress: 0.0,
                    reference,
                },
                running_polls: self.task_running_polls,
                outcome,
            },
        );
        TaskHandle::new(id)
    }

    fn host(&self, host_id: &str) -> ApiResult<&Host> {
        self.hosts.get(host_id).ok_or_else(|| not_found(host_id))
    }

    fn storage_pool(&self, pool_id: &str) -> ApiResult<&StoragePool> {
        self.storage_pools
            .get(pool_id)
            .ok_or_else(|| not_found(pool_id))
    }

    fn put_file(&mut self, pool: &str, filename: &str, format: &str, size_gb: u64) {
        self.files.insert(
            (pool.to_string(), filename.to_string()),
            DiskInfo {
                filename: filename.to_string(),
                format: format.to_string(),
                virtual_size: size_gb * GIB,
                actual_size: GIB,
            },
        );
    }
}

#[async_trait]
impl HiveApi for FakeHive {
    async fn get_task(&self, handle: &TaskHandle) -> ApiResult<Task> {
        let mut s = self.enter("get_task", &[handle.as_str()])?;
        let entry = s
            .tasks
            .get_mut(handle.as_str())
            .ok_or_else(|| not_found(handle.as_str()))?;
        if entry.running_polls > 0 {
            entry.running_polls -= 1;
            entry.task.progress = 50.0;
        } else {
            entry.task.state = entry.outcome;
            entry.task.progress = 100.0;
        }
        Ok(entry.task.clone())
    }

    async fn list_hosts(&self) -> ApiResult<Vec<Host>> {
        let s = self.enter("list_hosts", &[])?;
        Ok(s.hosts.values().cloned().collect())
    }

    async fn get_host(&self, host_id: &str) -> ApiResult<Host> {
        let s = self.enter("get_host", &[host_id])?;
        s.host(host_id).cloned()
    }

    async fn join_host(
        &self,
        username: &str,
        password: &str,
        address: &str,
    ) -> ApiResult<TaskHandle> {
        let mut s = self.enter("join_host", &[username, password, address])?;
        s.next_host += 1;
        let host_id = format!("joined-{}", s.next_host);
        let host = Host {
            hostid: host_id.clone(),
            hostname: format!("hive{}", s.next_host),
            ip: address.to_string(),
            state: s.joined_host_state.clone(),
            appliance: Appliance {
                role: "hive".to_string(),
                cluster_id: "cluster-1".to_string(),
                loglevel: "info".to_string(),
                max_clone_density: 20,
                ntp: "pool.ntp.org".to_string(),
                timezone: "UTC".to_string(),
            },
        };
        let reference = TaskRef {
            host: Some(host_id.clone()),
            ..Default::default()
        };
        Ok(s.start_task("join_host", reference, move |s| {
            s.hosts.insert(host_id, host);
        }))
    }

    async fn set_gateway_mode(&self, host_id: &str, gateway: bool) -> ApiResult<()> {
        let mut s = self.enter("set_gateway_mode", &[host_id, &gateway.to_string()])?;
        let host = s.hosts.get_mut(host_id).ok_or_else(|| not_found(host_id))?;
        host.appliance.role = if gateway { "gateway" } else { "hive" }.to_string();
        Ok(())
    }

    async fn set_host_state(&self, host_id: &str, state: &str) -> ApiResult<TaskHandle> {
        let mut s = self.enter("set_host_state", &[host_id, state])?;
        s.host(host_id)?;
        let (id, state) = (host_id.to_string(), state.to_string());
        let reference = TaskRef {
            host: Some(id.clone()),
            ..Default::default()
        };
        Ok(s.start_task("set_host_state", reference, move |s| {
            if let Some(host) = s.hosts.get_mut(&id) {
                host.state = state;
            }
        }))
    }

    async fn update_appliance(&self, host_id: &str, appliance: &Appliance) -> ApiResult<()> {
        let mut s = self.enter("update_appliance", &[host_id])?;
        let host = s.hosts.get_mut(host_id).ok_or_else(|| not_found(host_id))?;
        host.appliance = appliance.clone();
        Ok(())
    }

    async fn delete_host(&self, host_id: &str) -> ApiResult<()> {
        let mut s = self.enter("delete_host", &[host_id])?;
        s.hosts
            .remove(host_id)
            .map(|_| ())
            .ok_or_else(|| not_found(host_id))
    }

    async fn unjoin_host(&self, host_id: &str) -> ApiResult<TaskHandle> {
        let mut s = self.enter("unjoin_host", &[host_id])?;
        s.host(host_id)?;
        let id = host_id.to_string();
        let reference = TaskRef {
            host: Some(id.clone()),
            ..Default::default()
        };
        Ok(s.start_task("unjoin_host", reference, move |s| {
            s.hosts.remove(&id);
        }))
    }

    async fn create_pool(&self, pool: &Pool) -> ApiResult<()> {
        let mut s = self.enter("create_pool", &[&pool.name])?;
        let id = format!("pool-{}", uuid::Uuid::new_v4());
        let mut stored = pool.clone();
        stored.id = Some(id.clone());
        stored.state = "running".to_string();
        s.pools.insert(id, stored);

        let guest_name = pool.name.to_uppercase().replace(' ', "_");
        let guest_state = if s.guest_boots_slowly {
            "PROVISIONING"
        } else {
            "READY"
        };
        s.guests.insert(
            guest_name.clone(),
            Guest {
                name: guest_name,
                guest_state: guest_state.to_string(),
                target_state: vec!["READY".to_string()],
                ..Default::default()
            },
        );
        Ok(())
    }

    async fn get_pool(&self, pool_id: &str) -> ApiResult<Pool> {
        let mut s = self.enter("get_pool", &[pool_id])?;
        let deleting = s.pools.get(pool_id).is_some_and(|p| p.state == "deleting");
        if deleting {
            if s.pool_deleting_reads == 0 {
                s.pools.remove(pool_id);
            } else {
                s.pool_deleting_reads -= 1;
            }
        }
        s.pools
            .get(pool_id)
            .cloned()
            .ok_or_else(|| embedded_not_found(pool_id))
    }

    async fn get_pool_by_name(&self, name: &str) -> ApiResult<Pool> {
        let s = self.enter("get_pool_by_name", &[name])?;
        s.pools
            .values()
            .find(|p| p.name == name)
            .cloned()
            .ok_or_else(|| embedded_not_found(name))
    }

    async fn update_pool(&self, pool: &Pool) -> ApiResult<()> {
        let id = pool.id.clone().unwrap_or_default();
        let mut s = self.enter("update_pool", &[&id])?;
        let stored = s.pools.get_mut(&id).ok_or_else(|| embedded_not_found(&id))?;
        let state = stored.state.clone();
        *stored = pool.clone();
        stored.state = state;
        Ok(())
    }

    async fn delete_pool(&self, pool_id: &str) -> ApiResult<()> {
        let mut s = self.enter("delete_pool", &[pool_id])?;
        let deleting_reads = s.pool_deleting_reads;
        let pool = s
            .pools
            .get_mut(pool_id)
            .ok_or_else(|| embedded_not_found(pool_id))?;
        if deleting_reads == 0 {
            let name = pool.name.to_uppercase().replace(' ', "_");
            s.pools.remove(pool_id);
            s.guests.remove(&name);
        } else {
            pool.state = "deleting".to_string();
        }
        Ok(())
    }

    async fn get_guest(&self, name: &str) -> ApiResult<Guest> {
        let mut s = self.enter("get_guest", &[name])?;
        if s.guest_build_reads > 0 {
            s.guest_build_reads -= 1;
            return Err(embedded_not_found(name));
        }
        s.guests
            .get(name)
            .cloned()
            .ok_or_else(|| embedded_not_found(name))
    }

    async fn await_guest_state(&self, name: &str, timeout: Duration) -> ApiResult<Guest> {
        let mut s = self.enter("await_guest_state", &[name, &timeout.as_secs().to_string()])?;
        let settles = !s.guest_never_settles;
        let guest = s
            .guests
            .get_mut(name)
            .ok_or_else(|| embedded_not_found(name))?;
        if settles && let Some(target) = guest.target_state.first() {
            guest.guest_state = target.clone();
        }
        Ok(guest.clone())
    }

    async fn create_external_guest(&self, guest: &ExternalGuest) -> ApiResult<()> {
        let mut s = self.enter("create_external_guest", &[&guest.guest_name])?;
        s.guests.insert(
            guest.guest_name.clone(),
            Guest {
                name: guest.guest_name.clone(),
                address: guest.address.clone(),
                username: guest.username.clone(),
                realm: guest.realm.clone(),
                os: guest.os.clone().unwrap_or_default(),
                disable_port_check: guest.disable_port_check,
                guest_state: "READY".to_string(),
                target_state: vec!["READY".to_string()],
                external: true,
                broker_options: guest.broker_options.clone(),
            },
        );
        Ok(())
    }

    async fn delete_guest(&self, name: &str) -> ApiResult<()> {
        let mut s = self.enter("delete_guest", &[name])?;
        s.guests
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| embedded_not_found(name))
    }

    async fn get_storage_pool(&self, pool_id: &str) -> ApiResult<StoragePool> {
        let s = self.enter("get_storage_pool", &[pool_id])?;
        s.storage_pool(pool_id).cloned()
    }

    async fn upload_file(&self, pool_id: &str, local_path: &str, filename: &str) -> ApiResult<()> {
        let mut s = self.enter("upload_file", &[pool_id, local_path, filename])?;
        s.storage_pool(pool_id)?;
        s.put_file(pool_id, filename, "raw", 1);
        Ok(())
    }

    async fn copy_url(&self, pool_id: &str, url: &str, filename: &str) -> ApiResult<TaskHandle> {
        let mut s = self.enter("copy_url", &[pool_id, url, filename])?;
        s.storage_pool(pool_id)?;
        let (pool, file, size) = (pool_id.to_string(), filename.to_string(), s.url_image_gb);
        Ok(s.start_task("copy_url", TaskRef::default(), move |s| {
            s.put_file(&pool, &file, "qcow2", size);
        }))
    }

    async fn clone_disk(
        &self,
        src_pool_id: &str,
        src_filename: &str,
        dst_pool_id: &str,
        dst_filename: &str,
        format: &str,
    ) -> ApiResult<TaskHandle> {
        let mut s = self.enter(
            "clone_disk",
            &[src_pool_id, src_filename, dst_pool_id, dst_filename, format],
        )?;
        let size = s
            .files
            .get(&(src_pool_id.to_string(), src_filename.to_string()))
            .map(|f| f.virtual_size / GIB)
            .ok_or_else(|| not_found(src_filename))?;
        let (pool, file, format) = (
            dst_pool_id.to_string(),
            dst_filename.to_string(),
            format.to_string(),
        );
        Ok(s.start_task("clone_disk", TaskRef::default(), move |s| {
            s.put_file(&pool, &file, &format, size);
        }))
    }

    async fn create_disk(
        &self,
        pool_id: &str,
        filename: &str,
        format: &str,
        size_gb: u64,
    ) -> ApiResult<TaskHandle> {
        let mut s = self.enter(
            "create_disk",
            &[pool_id, filename, format, &size_gb.to_string()],
        )?;
        s.storage_pool(pool_id)?;
        let (pool, file, format) = (pool_id.to_string(), filename.to_string(), format.to_string());
        Ok(s.start_task("create_disk", TaskRef::default(), move |s| {
            s.put_file(&pool, &file, &format, size_gb);
        }))
    }

    async fn grow_disk(
        &self,
        pool_id: &str,
        filename: &str,
        increment_gb: u64,
    ) -> ApiResult<TaskHandle> {
        let mut s = self.enter("grow_disk", &[pool_id, filename, &increment_gb.to_string()])?;
        let key = (pool_id.to_string(), filename.to_string());
        if !s.files.contains_key(&key) {
            return Err(not_found(filename));
        }
        Ok(s.start_task("grow_disk", TaskRef::default(), move |s| {
            if let Some(info) = s.files.get_mut(&key) {
                info.virtual_size += increment_gb * GIB;
            }
        }))
    }

    async fn disk_info(&self, pool_id: &str, filename: &str) -> ApiResult<DiskInfo> {
        let s = self.enter("disk_info", &[pool_id, filename])?;
        s.files
            .get(&(pool_id.to_string(), filename.to_string()))
            .cloned()
            .ok_or_else(|| not_found(filename))
    }

    async fn delete_file(&self, pool_id: &str, filename: &str) -> ApiResult<()> {
        let mut s = self.enter("delete_file", &[pool_id, filename])?;
        s.files
            .remove(&(pool_id.to_string(), filename.to_string()))
            .map(|_| ())
            .ok_or_else(|| not_found(filename))
    }

    async fn iscsi_discover(&self, host_id: &str, portal: &str) -> ApiResult<Vec<IscsiTarget>> {
        let s = self.enter("iscsi_discover", &[host_id, portal])?;
        s.host(host_id)?;
        Ok(s.iscsi_targets.get(host_id).cloned().unwrap_or_default())
    }

    async fn iscsi_sessions(
        &self,
        host_id: &str,
        portal: &str,
        target: &str,
    ) -> ApiResult<Vec<IscsiSession>> {
        let s = self.enter("iscsi_sessions", &[host_id, portal, target])?;
        s.host(host_id)?;
        Ok(s.iscsi_sessions
            .get(host_id)
            .map(|sessions| {
                sessions
                    .iter()
                    .filter(|sess| sess.portal == portal && sess.target == target)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn iscsi_login(&self, host_id: &str, login: &IscsiLogin) -> ApiResult<Vec<IscsiSession>> {
        let mut s = self.enter("iscsi_login", &[host_id, &login.portal, &login.target])?;
        s.host(host_id)?;
        s.logins.push(login.clone());
        let offered = s
            .iscsi_targets
            .get(host_id)
            .is_some_and(|targets| targets.iter().any(|t| t.target == login.target));
        if !offered {
            return Ok(Vec::new());
        }
        let portal = s
            .session_portal
            .clone()
            .unwrap_or_else(|| login.portal.clone());
        let sessions = s.iscsi_sessions.entry(host_id.to_string()).or_default();
        let device = format!("sd{}", (b'b' + sessions.len() as u8) as char);
        sessions.push(IscsiSession {
            portal,
            target: login.target.clone(),
            block_devices: vec![BlockDevice {
                name: device.clone(),
                path: format!("/dev/{device}"),
                size: "100G".to_string(),
                ..Default::default()
            }],
        });
        Ok(sessions
            .iter()
            .filter(|sess| sess.target == login.target)
            .cloned()
            .collect())
    }

    async fn iscsi_logout(&self, host_id: &str, portal: &str, target: &str) -> ApiResult<()> {
        let mut s = self.enter("iscsi_logout", &[host_id, portal, target])?;
        s.host(host_id)?;
        if let Some(sessions) = s.iscsi_sessions.get_mut(host_id) {
            sessions.retain(|sess| !(sess.portal == portal && sess.target == target));
        }
        Ok(())
    }
}

pub fn api(fake: &Arc<FakeHive>) -> Arc<dyn HiveApi> {
    fake.clone()
}

pub fn config() -> ReconcileConfig {
    ReconcileConfig::default()
}

pub fn ctx(secs: u64) -> OpContext {
    OpContext::with_timeout(Duration::from_secs(secs))
}
