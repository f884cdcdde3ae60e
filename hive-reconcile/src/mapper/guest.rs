use serde::{Deserialize, Serialize};

use crate::api::{ExternalGuest, Guest};
use crate::mapper::{BrokerSpec, ChangedFields};

/// A guest that runs outside any pool and is only registered with the broker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalGuestSpec {
    pub name: String,
    pub address: String,
    pub username: String,
    pub realm: String,
    pub os: Option<String>,
    pub disable_port_check: bool,
    pub broker: BrokerSpec,
}

impl ExternalGuestSpec {
    pub fn to_wire(&self) -> ExternalGuest {
        ExternalGuest {
            guest_name: self.name.clone(),
            address: self.address.clone(),
            username: self.username.clone(),
            realm: self.realm.clone(),
            os: self.os.clone().filter(|os| !os.is_empty()),
            disable_port_check: self.disable_port_check,
            broker_options: self.broker.to_wire(),
        }
    }

    /// The remote side reports an empty OS when none was given.
    pub fn from_wire(guest: &Guest) -> ExternalGuestSpec {
        ExternalGuestSpec {
            name: guest.name.clone(),
            address: guest.address.clone(),
            username: guest.username.clone(),
            realm: guest.realm.clone(),
            os: (!guest.os.is_empty()).then(|| guest.os.clone()),
            disable_port_check: guest.disable_port_check,
            broker: BrokerSpec::from_wire(&guest.broker_options),
        }
    }

    /// Every declared field is fixed at registration.
    pub fn force_replace_changes(&self, observed: &ExternalGuestSpec) -> Vec<String> {
        let mut changes = ChangedFields::default();
        changes.check("name", &self.name, &observed.name);
        changes.check("address", &self.address, &observed.address);
        changes.check("username", &self.username, &observed.username);
        changes.check("realm", &self.realm, &observed.realm);
        changes.check("os", &self.os, &observed.os);
        changes.check(
            "disable_port_check",
            &self.disable_port_check,
            &observed.disable_port_check,
        );
        self.broker.diff(&observed.broker, "broker.", &mut changes);
        changes.into_fields()
    }
}
