//! Host spec and appliance delta.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::api::{Appliance, Host};
use crate::mapper::ChangedFields;

pub const DEFAULT_USERNAME: &str = "admin";

/// Availability state a host can be asked for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostState {
    #[default]
    Available,
    Maintenance,
}

impl HostState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostState::Available => "available",
            HostState::Maintenance => "maintenance",
        }
    }

    pub fn parse(state: &str) -> Option<Self> {
        match state {
            "available" => Some(HostState::Available),
            "maintenance" => Some(HostState::Maintenance),
            _ => None,
        }
    }
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Appliance settings.
///
/// An empty `log_level` and a zero `max_clone_density` mean "leave as is";
/// there is no way to ask for a literal zero density. `ntp_servers` and
/// `timezone` are left alone when `None`; `Some("")` clears them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplianceSettings {
    pub log_level: String,
    pub max_clone_density: u32,
    pub ntp_servers: Option<String>,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSpec {
    pub ip_address: Option<String>,
    pub hostname: Option<String>,
    pub username: String,
    /// Write-only.
    #[serde(skip_serializing)]
    pub password: String,
    pub gateway_only: bool,
    pub state: HostState,
    pub appliance: ApplianceSettings,
    /// Computed.
    pub cluster_id: String,
}

impl Default for HostSpec {
    fn default() -> Self {
        Self {
            ip_address: None,
            hostname: None,
            username: DEFAULT_USERNAME.to_string(),
            password: String::new(),
            gateway_only: false,
            state: HostState::Available,
            appliance: ApplianceSettings::default(),
            cluster_id: String::new(),
        }
    }
}

impl HostSpec {
    /// Address used to join: the IP if set, otherwise the hostname.
    pub fn address(&self) -> Option<&str> {
        self.ip_address
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.hostname.as_deref().filter(|s| !s.is_empty()))
    }

    /// Whether `host` is the machine this spec points at.
    pub fn matches(&self, host: &Host) -> bool {
        self.address()
            .is_some_and(|addr| host.ip == addr || host.hostname == addr)
    }

    /// Fold an observed host into a spec. Credentials come from `prior`; the
    /// target state is kept from `prior` while the host reports a state that
    /// cannot be asked for (gateway, unreachable).
    pub fn from_wire(host: &Host, prior: &HostSpec) -> HostSpec {
        let appliance = &host.appliance;
        HostSpec {
            ip_address: Some(host.ip.clone()),
            hostname: Some(host.hostname.clone()),
            username: prior.username.clone(),
            password: prior.password.clone(),
            gateway_only: host.is_gateway(),
            state: HostState::parse(&host.state).unwrap_or(prior.state),
            appliance: ApplianceSettings {
                log_level: appliance.loglevel.clone(),
                max_clone_density: appliance.max_clone_density,
                ntp_servers: Some(appliance.ntp.clone()),
                timezone: Some(appliance.timezone.clone()),
            },
            cluster_id: appliance.cluster_id.clone(),
        }
    }

    /// Fields that cannot change in place. A host is pinned to its address:
    /// pointing the spec at another machine means removing this one.
    pub fn force_replace_changes(&self, observed: &Host) -> Vec<String> {
        let mut changes = ChangedFields::default();
        if self.address().is_some() && !self.matches(observed) {
            changes.check("address", &self.address(), &Some(observed.ip.as_str()));
        }
        changes.into_fields()
    }
}

/// Appliance fields that need to change, `None` where nothing is to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplianceDelta {
    pub log_level: Option<String>,
    pub max_clone_density: Option<u32>,
    pub ntp_servers: Option<String>,
    pub timezone: Option<String>,
}

impl ApplianceDelta {
    pub fn between(desired: &ApplianceSettings, observed: &Appliance) -> Self {
        let log_level = (!desired.log_level.is_empty() && desired.log_level != observed.loglevel)
            .then(|| desired.log_level.clone());
        let max_clone_density = (desired.max_clone_density != 0
            && desired.max_clone_density != observed.max_clone_density)
            .then_some(desired.max_clone_density);
        let ntp_servers = desired
            .ntp_servers
            .as_ref()
            .filter(|ntp| **ntp != observed.ntp)
            .cloned();
        let timezone = desired
            .timezone
            .as_ref()
            .filter(|tz| **tz != observed.timezone)
            .cloned();

        Self {
            log_level,
            max_clone_density,
            ntp_servers,
            timezone,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    /// Names of the fields that change, for logging.
    pub fn fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.log_level.is_some() {
            fields.push("log_level");
        }
        if self.max_clone_density.is_some() {
            fields.push("max_clone_density");
        }
        if self.ntp_servers.is_some() {
            fields.push("ntp_servers");
        }
        if self.timezone.is_some() {
            fields.push("timezone");
        }
        fields
    }

    /// The full appliance record to send: `base` with the delta applied.
    pub fn apply(&self, base: &Appliance) -> Appliance {
        let mut appliance = base.clone();
        if let Some(level) = &self.log_level {
            appliance.loglevel = level.clone();
        }
        if let Some(density) = self.max_clone_density {
            appliance.max_clone_density = density;
        }
        if let Some(ntp) = &self.ntp_servers {
            appliance.ntp = ntp.clone();
        }
        if let Some(tz) = &self.timezone {
            appliance.timezone = tz.clone();
        }
        appliance
    }
}
