//! Lifecycle phases with explicit transition tables.

use std::fmt;

use crate::api::Host;
use crate::error::{ReconcileError, Result};
use crate::reconciler::ObjectKind;

/// A lifecycle phase of one object kind.
pub trait Phase: Copy + Eq + fmt::Debug + fmt::Display {
    const KIND: ObjectKind;

    /// Whether `next` may follow `self`. Staying in the same phase is always
    /// allowed and is not asked here.
    fn can_transition_to(self, next: Self) -> bool;
}

/// Tracks one object's phase through a reconciliation call.
#[derive(Debug, Clone)]
pub struct Lifecycle<P: Phase> {
    current: P,
    history: Vec<P>,
}

impl<P: Phase> Lifecycle<P> {
    pub fn new(initial: P) -> Self {
        Self {
            current: initial,
            history: vec![initial],
        }
    }

    pub fn current(&self) -> P {
        self.current
    }

    /// Every distinct phase visited, in order.
    pub fn history(&self) -> &[P] {
        &self.history
    }

    /// Move to `next`, rejecting transitions outside the table.
    pub fn advance(&mut self, next: P) -> Result<()> {
        if next == self.current {
            return Ok(());
        }
        if !self.current.can_transition_to(next) {
            return Err(ReconcileError::InvalidTransition {
                kind: P::KIND,
                from: self.current.to_string(),
                to: next.to_string(),
            });
        }
        self.current = next;
        self.history.push(next);
        Ok(())
    }
}

// =============================================================================
// Host
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostPhase {
    Unjoined,
    Joining,
    Available,
    Maintenance,
    GatewayOnly,
    Unreachable,
    Removed,
}

impl HostPhase {
    /// Phase of a host as reported by the cluster. The gateway role wins
    /// over the availability state; states the cluster reports while a host
    /// is still being set up count as joining.
    pub fn observe(host: &Host) -> Self {
        if host.is_gateway() {
            return HostPhase::GatewayOnly;
        }
        match host.state.as_str() {
            "available" => HostPhase::Available,
            "maintenance" => HostPhase::Maintenance,
            "unreachable" => HostPhase::Unreachable,
            _ => HostPhase::Joining,
        }
    }
}

impl Phase for HostPhase {
    const KIND: ObjectKind = ObjectKind::Host;

    fn can_transition_to(self, next: Self) -> bool {
        use HostPhase::*;
        match self {
            Unjoined => matches!(next, Joining),
            Joining => matches!(
                next,
                Available | Maintenance | GatewayOnly | Unreachable | Removed
            ),
            Available => matches!(next, Maintenance | GatewayOnly | Unreachable),
            Maintenance | GatewayOnly | Unreachable => {
                matches!(next, Available | Maintenance | GatewayOnly | Unreachable | Removed)
            }
            Removed => false,
        }
    }
}

impl fmt::Display for HostPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HostPhase::Unjoined => "unjoined",
            HostPhase::Joining => "joining",
            HostPhase::Available => "available",
            HostPhase::Maintenance => "maintenance",
            HostPhase::GatewayOnly => "gateway-only",
            HostPhase::Unreachable => "unreachable",
            HostPhase::Removed => "removed",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Virtual machine
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VmPhase {
    Absent,
    Building,
    Running,
    Updated,
    Deleting,
}

impl Phase for VmPhase {
    const KIND: ObjectKind = ObjectKind::VirtualMachine;

    fn can_transition_to(self, next: Self) -> bool {
        use VmPhase::*;
        match self {
            Absent => matches!(next, Building),
            Building => matches!(next, Running | Deleting),
            Running => matches!(next, Updated | Deleting),
            Updated => matches!(next, Deleting),
            Deleting => matches!(next, Absent),
        }
    }
}

impl fmt::Display for VmPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VmPhase::Absent => "absent",
            VmPhase::Building => "building",
            VmPhase::Running => "running",
            VmPhase::Updated => "updated",
            VmPhase::Deleting => "deleting",
        };
        f.write_str(name)
    }
}
