use serde::{Deserialize, Serialize};

use crate::api::{BlockDevice, IscsiAuth, IscsiLogin, IscsiSession, IscsiTarget};
use crate::mapper::ChangedFields;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IscsiSessionSpec {
    pub host_id: String,
    pub portal: String,
    pub target: String,
    pub username: String,
    /// Write-only.
    #[serde(skip_serializing)]
    pub password: String,
    /// Computed: the portal discovery reported for `target`.
    pub discovered_portal: Option<String>,
    /// Computed.
    pub block_devices: Vec<BlockDevice>,
}

/// Identity of a logged-in session.
pub fn session_identity(portal: &str, target: &str) -> String {
    format!("{portal}/{target}")
}

impl IscsiSessionSpec {
    /// CHAP only when both credentials are given.
    pub fn auth_method(&self) -> IscsiAuth {
        if !self.username.is_empty() && !self.password.is_empty() {
            IscsiAuth::Chap
        } else {
            IscsiAuth::None
        }
    }

    pub fn login_request(&self, portal: &str) -> IscsiLogin {
        IscsiLogin {
            portal: portal.to_string(),
            target: self.target.clone(),
            auth_method: self.auth_method(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }

    /// Discovered portal when known, otherwise the declared one.
    pub fn effective_portal(&self) -> &str {
        self.discovered_portal
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(self.portal.as_str())
    }

    /// The discovery entry for the declared target. When discovery lists the
    /// target more than once the last entry wins.
    pub fn find_discovered<'a>(&self, entries: &'a [IscsiTarget]) -> Option<&'a IscsiTarget> {
        entries.iter().rev().find(|e| e.target == self.target)
    }

    pub fn match_session<'a>(&self, sessions: &'a [IscsiSession]) -> Option<&'a IscsiSession> {
        let portal = self.effective_portal();
        sessions
            .iter()
            .find(|s| s.portal == portal && s.target == self.target)
    }

    pub fn from_wire(session: &IscsiSession, prior: &IscsiSessionSpec) -> IscsiSessionSpec {
        IscsiSessionSpec {
            target: session.target.clone(),
            discovered_portal: Some(session.portal.clone()),
            block_devices: session.block_devices.clone(),
            ..prior.clone()
        }
    }

    /// Every declared field is fixed for the session's lifetime.
    pub fn force_replace_changes(&self, observed: &IscsiSessionSpec) -> Vec<String> {
        let mut changes = ChangedFields::default();
        changes.check("host_id", &self.host_id, &observed.host_id);
        changes.check("portal", &self.portal, &observed.portal);
        changes.check("target", &self.target, &observed.target);
        changes.check("username", &self.username, &observed.username);
        changes.check("password", &self.password, &observed.password);
        changes.into_fields()
    }
}
