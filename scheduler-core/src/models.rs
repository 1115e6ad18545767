//! Pure data types for the scheduling decision core.
//!
//! Nothing in this module performs I/O. Every derivation (eligibility, group
//! aggregation, effective priority) is a cheap, total function of the data
//! already sitting in a [`Snapshot`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The two gang annotations recognized on a pod, bit-exact per the wire contract.
pub const GROUP_NAME_ANNOTATION: &str = "custom-scheduling.k8s.io/group-name";
pub const MIN_AVAILABLE_ANNOTATION: &str = "custom-scheduling.k8s.io/min-available";

/// A worker machine the scheduler may bind pods onto.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub ready: bool,
    pub unschedulable: bool,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ready: true,
            unschedulable: false,
        }
    }

    /// A node is eligible iff it is ready and not marked unschedulable.
    pub fn eligible(&self) -> bool {
        self.ready && !self.unschedulable
    }
}

/// Lifecycle phase of a pod, as reported by the cluster API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

/// A unique pod identity: namespace + name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PodId {
    pub namespace: String,
    pub name: String,
}

impl PodId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for PodId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A pending or bound workload unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    pub id: PodId,
    /// The scheduler-name claim; pods whose claim doesn't match the engine's
    /// own scheduler name are invisible to it (§4.2.1).
    pub scheduler_name: String,
    pub assigned_node: Option<String>,
    pub phase: PodPhase,
    /// Absent priority defaults to 0 (§3); represented here already defaulted
    /// since `Pod` is the engine's own data model, not the wire format.
    pub priority: i64,
    pub annotations: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl Pod {
    /// Lenient parse of `custom-scheduling.k8s.io/group-name`. Absence or any
    /// value is accepted as-is (group names are arbitrary strings; there is
    /// nothing to malform).
    pub fn group_name(&self) -> Option<&str> {
        self.annotations
            .get(GROUP_NAME_ANNOTATION)
            .map(String::as_str)
    }

    /// Lenient parse of `custom-scheduling.k8s.io/min-available`. Absent or
    /// unparseable (non-numeric, zero, negative) values mean "no gang
    /// constraint from this pod" (§4.1), not an error.
    pub fn min_available(&self) -> Option<u32> {
        self.annotations
            .get(MIN_AVAILABLE_ANNOTATION)
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|n| *n > 0)
    }

    /// *Pending-unbound*: phase=Pending and no assigned-node (§3).
    pub fn is_pending_unbound(&self) -> bool {
        self.phase == PodPhase::Pending && self.assigned_node.is_none()
    }

    /// *Bound-active*: assigned-node set and phase occupies a node. Unknown
    /// phase with an assigned node is conservatively treated as bound-active
    /// (§9 open question, resolved towards never under-reporting occupancy).
    pub fn is_bound_active(&self) -> bool {
        self.assigned_node.is_some()
            && matches!(
                self.phase,
                PodPhase::Pending | PodPhase::Running | PodPhase::Unknown
            )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, PodPhase::Succeeded | PodPhase::Failed)
    }
}

/// A derived view over every pod sharing a `group-name` annotation.
#[derive(Debug, Clone)]
pub struct Group<'a> {
    pub name: &'a str,
    pub members: Vec<&'a Pod>,
}

impl<'a> Group<'a> {
    /// Group priority = max priority across all members, pending or running
    /// (§3). Adding a high-priority pod to a gang raises the whole gang's
    /// entitlement; documented in DESIGN.md rather than changed.
    pub fn priority(&self) -> i64 {
        self.members.iter().map(|p| p.priority).max().unwrap_or(0)
    }

    /// Group min-available = max min-available declared by any
    /// *pending-unbound* member; absent any such declaration the group is
    /// non-blocking and each pending member schedules individually (§3).
    pub fn min_available(&self) -> u32 {
        self.declared_min_available().unwrap_or(1)
    }

    /// `None` iff no pending-unbound member declares a min-available, i.e.
    /// the group is non-blocking and every pending member is individually
    /// bindable regardless of how many members it has (§3, §4.2.3).
    pub fn declared_min_available(&self) -> Option<u32> {
        self.members
            .iter()
            .filter(|p| p.is_pending_unbound())
            .filter_map(|p| p.min_available())
            .max()
    }

    pub fn pending_members(&self) -> impl Iterator<Item = &&'a Pod> {
        self.members.iter().filter(|p| p.is_pending_unbound())
    }

    pub fn running_count(&self) -> usize {
        self.members.iter().filter(|p| p.is_bound_active()).count()
    }
}

/// Groups every pod in `pods` carrying a `group-name` annotation by that
/// name. A group's members are exactly the pods that are pending-unbound or
/// bound-active (§3); terminal pods never join a group, and pods with no
/// group annotation are not represented here — callers schedule them
/// individually.
pub fn group_pods(pods: &[Pod]) -> HashMap<&str, Group<'_>> {
    let mut groups: HashMap<&str, Vec<&Pod>> = HashMap::new();
    for pod in pods {
        if pod.is_terminal() {
            continue;
        }
        if let Some(name) = pod.group_name() {
            groups.entry(name).or_default().push(pod);
        }
    }
    groups
        .into_iter()
        .map(|(name, members)| (name, Group { name, members }))
        .collect()
}

/// The immutable per-tick input to the decision engine (§3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub scheduler_name: String,
    pub nodes: Vec<Node>,
    pub pods: Vec<Pod>,
}

/// One action in an emitted [`Plan`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Bind { pod: PodId, node: String },
    Evict { pod: PodId },
}

/// The engine's output: an ordered, internally consistent set of actions.
/// Evicts are always emitted before Binds (§4.2.4).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub actions: Vec<Action>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn binds(&self) -> impl Iterator<Item = (&PodId, &str)> {
        self.actions.iter().filter_map(|a| match a {
            Action::Bind { pod, node } => Some((pod, node.as_str())),
            Action::Evict { .. } => None,
        })
    }

    pub fn evicts(&self) -> impl Iterator<Item = &PodId> {
        self.actions.iter().filter_map(|a| match a {
            Action::Evict { pod } => Some(pod),
            Action::Bind { .. } => None,
        })
    }
}
