//! The decision engine: `schedule` turns a [`Snapshot`] into a [`Plan`].
//!
//! The whole module is one deterministic, side-effect-free pass (§4.2). It
//! never panics on malformed input and never performs I/O; every working set
//! below is local to a single [`schedule`] call and dropped at its end.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::models::{Action, Group, Node, Plan, Pod, PodId, Snapshot, group_pods};

/// Computes the plan for one scheduling tick. Pure function, infallible by
/// construction: there is no `Result` in this signature because there is
/// nothing the engine itself can fail to do (§4.2.6).
pub fn schedule(snapshot: &Snapshot) -> Plan {
    let matched: Vec<&Pod> = snapshot
        .pods
        .iter()
        .filter(|p| p.scheduler_name == snapshot.scheduler_name)
        .collect();

    let pending_unbound: Vec<&Pod> = matched
        .iter()
        .copied()
        .filter(|p| p.is_pending_unbound())
        .collect();
    let bound_active: Vec<&Pod> = matched
        .iter()
        .copied()
        .filter(|p| p.is_bound_active())
        .collect();

    let matched_owned: Vec<Pod> = matched.iter().map(|p| (*p).clone()).collect();
    let groups = group_pods(&matched_owned);

    let eligible_nodes: HashSet<&str> = snapshot
        .nodes
        .iter()
        .filter(|n| n.eligible())
        .map(|n| n.name.as_str())
        .collect();

    // The first occupant (by (namespace, name)) of each node wins; a second
    // pod claiming the same node is bound-active for group accounting but
    // cannot be discovered as a preemption victim (§4.2.6).
    let occupants = first_occupant_per_node(&bound_active);

    let free_nodes: BTreeSet<String> = eligible_nodes
        .iter()
        .filter(|name| !occupants.contains_key(**name))
        .map(|name| name.to_string())
        .collect();

    let mut state = State {
        free_nodes,
        planned_binds: HashMap::new(),
        planned_evictions: HashSet::new(),
    };

    let mut order: Vec<&Pod> = pending_unbound.clone();
    order.sort_by(|a, b| sort_key(a, &groups).cmp(&sort_key(b, &groups)));

    let mut handled_groups: HashSet<&str> = HashSet::new();
    let mut evict_actions: Vec<Action> = Vec::new();
    let mut bind_actions: Vec<Action> = Vec::new();

    for pod in order {
        if let Some(group_name) = pod.group_name() {
            if !handled_groups.insert(group_name) {
                continue;
            }
            schedule_group(
                groups.get(group_name).expect("pod's own group must be present"),
                &groups,
                &eligible_nodes,
                &occupants,
                &mut state,
                &mut evict_actions,
                &mut bind_actions,
            );
        } else {
            let priority = pod.priority;
            if let Some(placement) = try_place(
                pod,
                priority,
                &eligible_nodes,
                &occupants,
                |occupant: &Pod| occupant.priority,
                &mut state,
            ) {
                commit_placement(placement, &mut evict_actions, &mut bind_actions);
            }
        }
    }

    let mut actions = evict_actions;
    actions.extend(bind_actions);
    Plan { actions }
}

/// Mutable working sets threaded through a single `schedule` call.
#[derive(Clone)]
struct State {
    free_nodes: BTreeSet<String>,
    planned_binds: HashMap<String, PodId>,
    planned_evictions: HashSet<PodId>,
}

/// The outcome of successfully placing one pending pod.
struct Placement {
    pod: PodId,
    node: String,
    evicted: Option<PodId>,
}

fn commit_placement(placement: Placement, evict_actions: &mut Vec<Action>, bind_actions: &mut Vec<Action>) {
    if let Some(victim) = placement.evicted {
        evict_actions.push(Action::Evict { pod: victim });
    }
    bind_actions.push(Action::Bind {
        pod: placement.pod,
        node: placement.node,
    });
}

/// First occupant (deterministic tie-break by pod id) claiming each node
/// among bound-active pods (§4.2.6).
fn first_occupant_per_node<'a>(bound_active: &[&'a Pod]) -> HashMap<&'a str, &'a Pod> {
    let mut sorted: Vec<&&Pod> = bound_active.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));
    let mut occupants: HashMap<&str, &Pod> = HashMap::new();
    for pod in sorted {
        if let Some(node) = pod.assigned_node.as_deref() {
            occupants.entry(node).or_insert(pod);
        }
    }
    occupants
}

/// Effective priority: a pod's own priority, or its group's max-of-members
/// priority when it carries a group-name (§3, §9).
fn effective_priority(pod: &Pod, groups: &HashMap<&str, Group<'_>>) -> i64 {
    pod.group_name()
        .and_then(|name| groups.get(name))
        .map(|g| g.priority())
        .unwrap_or(pod.priority)
}

/// Total order for pending pods (§4.2.2): higher effective priority first,
/// then earlier creation, then lexicographic (namespace, name).
fn sort_key(pod: &Pod, groups: &HashMap<&str, Group<'_>>) -> (std::cmp::Reverse<i64>, chrono::DateTime<chrono::Utc>, PodId) {
    (
        std::cmp::Reverse(effective_priority(pod, groups)),
        pod.created_at,
        pod.id.clone(),
    )
}

/// Total order for preemption victims: lowest priority first, then *later*
/// creation first (evict the newer, cheaper pod among equals), then
/// lexicographic id (§4.2.3).
fn victim_key(priority: i64, pod: &Pod) -> (i64, std::cmp::Reverse<chrono::DateTime<chrono::Utc>>, PodId) {
    (priority, std::cmp::Reverse(pod.created_at), pod.id.clone())
}

/// Attempts to place a single pending pod, by direct bind if a node is free,
/// else by preempting the cheapest eligible occupant whose `victim_priority`
/// is strictly lower than `priority` (§4.2.3). `victim_priority` is the
/// metric an occupant is judged by: a bare pod priority for an ungrouped
/// attacker, or an occupant's own group's effective priority for a gang
/// attacker — which is how a gang's own members (whose effective priority
/// equals the gang's, never strictly less than it) and members of an
/// equal-or-higher-priority gang are excluded without a separate exclusion
/// set (§4.2.3). Mutates `state` only on success.
fn try_place(
    pod: &Pod,
    priority: i64,
    eligible_nodes: &HashSet<&str>,
    occupants: &HashMap<&str, &Pod>,
    victim_priority: impl Fn(&Pod) -> i64,
    state: &mut State,
) -> Option<Placement> {
    if let Some(node) = state.free_nodes.iter().next().cloned() {
        state.free_nodes.remove(&node);
        state.planned_binds.insert(node.clone(), pod.id.clone());
        return Some(Placement {
            pod: pod.id.clone(),
            node,
            evicted: None,
        });
    }

    let victim = occupants
        .iter()
        .filter(|(node, occupant)| {
            eligible_nodes.contains(**node)
                && !state.planned_binds.contains_key(**node)
                && !state.planned_evictions.contains(&occupant.id)
                && victim_priority(occupant) < priority
        })
        .min_by(|(_, a), (_, b)| {
            victim_key(victim_priority(a), a).cmp(&victim_key(victim_priority(b), b))
        })
        .map(|(node, occupant)| (node.to_string(), (*occupant).clone()));

    let (node, victim_pod) = victim?;
    state.planned_binds.insert(node.clone(), pod.id.clone());
    state.planned_evictions.insert(victim_pod.id.clone());
    Some(Placement {
        pod: pod.id.clone(),
        node,
        evicted: Some(victim_pod.id.clone()),
    })
}

/// Handles every pending member of one gang together (§4.2.3). Already
/// bound-active members count toward `min_available`; if no pending member
/// declared a `min-available` the gang is non-blocking and every pending
/// member schedules individually regardless of member count (§3, §4.1). A
/// declared-but-already-closed gap also schedules individually. Otherwise a
/// tentative placement of exactly `need` members is attempted on a scratch
/// copy of `state`; it is committed only if all `need` succeed. Every path
/// judges candidate victims by their own group's effective priority, so a
/// gang never preempts a member of itself or of another gang whose priority
/// is not strictly lower (§4.2.3).
fn schedule_group(
    group: &Group<'_>,
    groups: &HashMap<&str, Group<'_>>,
    eligible_nodes: &HashSet<&str>,
    occupants: &HashMap<&str, &Pod>,
    state: &mut State,
    evict_actions: &mut Vec<Action>,
    bind_actions: &mut Vec<Action>,
) {
    let priority = group.priority();
    let victim_priority = |occupant: &Pod| effective_priority(occupant, groups);
    let mut pending: Vec<&Pod> = group.pending_members().map(|p| *p).collect();
    pending.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));

    let need = group.min_available() as i64 - group.running_count() as i64;

    if group.declared_min_available().is_none() || need <= 0 {
        for pod in pending {
            if let Some(placement) =
                try_place(pod, priority, eligible_nodes, occupants, victim_priority, state)
            {
                commit_placement(placement, evict_actions, bind_actions);
            }
        }
        return;
    }

    let need = need as usize;
    let mut scratch = state.clone();
    let mut placements = Vec::new();
    for pod in pending {
        if placements.len() >= need {
            break;
        }
        if let Some(placement) = try_place(
            pod,
            priority,
            eligible_nodes,
            occupants,
            victim_priority,
            &mut scratch,
        ) {
            placements.push(placement);
        }
    }

    if placements.len() >= need {
        *state = scratch;
        for placement in placements {
            commit_placement(placement, evict_actions, bind_actions);
        }
    }
    // Fewer than `need` placements succeeded: discard the scratch state
    // entirely. No member of the gang is scheduled and no preemption is
    // performed on its behalf (§4.2.3c).
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GROUP_NAME_ANNOTATION, MIN_AVAILABLE_ANNOTATION, PodPhase};
    use chrono::{Duration, Utc};
    use std::collections::HashMap as Map;

    fn node(name: &str) -> Node {
        Node::new(name)
    }

    fn base_pod(namespace: &str, name: &str, priority: i64, seq: i64) -> Pod {
        Pod {
            id: PodId::new(namespace, name),
            scheduler_name: "custom-scheduler".to_string(),
            assigned_node: None,
            phase: PodPhase::Pending,
            priority,
            annotations: Map::new(),
            created_at: Utc::now() + Duration::seconds(seq),
        }
    }

    fn bound(mut pod: Pod, node: &str) -> Pod {
        pod.assigned_node = Some(node.to_string());
        pod.phase = PodPhase::Running;
        pod
    }

    fn grouped(mut pod: Pod, group: &str, min_available: Option<u32>) -> Pod {
        pod.annotations
            .insert(GROUP_NAME_ANNOTATION.to_string(), group.to_string());
        if let Some(m) = min_available {
            pod.annotations
                .insert(MIN_AVAILABLE_ANNOTATION.to_string(), m.to_string());
        }
        pod
    }

    fn snapshot(nodes: Vec<Node>, pods: Vec<Pod>) -> Snapshot {
        Snapshot {
            scheduler_name: "custom-scheduler".to_string(),
            nodes,
            pods,
        }
    }

    #[test]
    fn scenario_a_trivial_bind() {
        let snap = snapshot(
            vec![node("n1"), node("n2")],
            vec![base_pod("default", "p", 0, 0)],
        );
        let plan = schedule(&snap);
        assert_eq!(
            plan.actions,
            vec![Action::Bind {
                pod: PodId::new("default", "p"),
                node: "n1".to_string(),
            }]
        );
    }

    #[test]
    fn scenario_b_no_preemption_on_equal_priority() {
        let a = bound(base_pod("default", "a", 5, 0), "n1");
        let b = base_pod("default", "b", 5, 1);
        let plan = schedule(&snapshot(vec![node("n1")], vec![a, b]));
        assert!(plan.is_empty());
    }

    #[test]
    fn scenario_c_preemption_on_higher_priority() {
        let a = bound(base_pod("default", "a", 1, 0), "n1");
        let b = base_pod("default", "b", 10, 1);
        let plan = schedule(&snapshot(vec![node("n1")], vec![a, b]));
        assert_eq!(
            plan.actions,
            vec![
                Action::Evict {
                    pod: PodId::new("default", "a")
                },
                Action::Bind {
                    pod: PodId::new("default", "b"),
                    node: "n1".to_string(),
                },
            ]
        );
    }

    #[test]
    fn scenario_d_gang_meets_threshold_via_free_node_and_preemption() {
        let a = bound(base_pod("default", "a", 1, 0), "n1");
        let p1 = grouped(base_pod("default", "p1", 10, 1), "g", Some(2));
        let p2 = grouped(base_pod("default", "p2", 10, 2), "g", Some(2));
        let plan = schedule(&snapshot(vec![node("n1"), node("n2")], vec![a, p1, p2]));

        let evicts: Vec<_> = plan.evicts().cloned().collect();
        let mut binds: Vec<_> = plan
            .binds()
            .map(|(id, node)| (id.clone(), node.to_string()))
            .collect();
        binds.sort();

        assert_eq!(evicts, vec![PodId::new("default", "a")]);
        assert_eq!(
            binds,
            vec![
                (PodId::new("default", "p1"), "n2".to_string()),
                (PodId::new("default", "p2"), "n1".to_string()),
            ]
        );
        // Evicts precede binds regardless of internal ordering.
        assert!(matches!(plan.actions[0], Action::Evict { .. }));
    }

    #[test]
    fn scenario_e_gang_blocked_leaves_occupant_untouched() {
        let a = bound(base_pod("default", "a", 100, 0), "n1");
        let p1 = grouped(base_pod("default", "p1", 10, 1), "g", Some(2));
        let p2 = grouped(base_pod("default", "p2", 10, 2), "g", Some(2));
        let plan = schedule(&snapshot(vec![node("n1")], vec![a, p1, p2]));
        assert!(plan.is_empty());
    }

    #[test]
    fn scenario_f_scheduler_name_filter() {
        let mut p = base_pod("default", "p", 0, 0);
        p.scheduler_name = "other".to_string();
        let plan = schedule(&snapshot(vec![node("n1")], vec![p]));
        assert!(plan.is_empty());
    }

    #[test]
    fn unschedulable_node_is_never_a_bind_target() {
        let mut n1 = node("n1");
        n1.unschedulable = true;
        let p = base_pod("default", "p", 0, 0);
        let plan = schedule(&snapshot(vec![n1], vec![p]));
        assert!(plan.is_empty());
    }

    #[test]
    fn not_ready_node_is_never_a_bind_target() {
        let mut n1 = node("n1");
        n1.ready = false;
        let p = base_pod("default", "p", 0, 0);
        let plan = schedule(&snapshot(vec![n1], vec![p]));
        assert!(plan.is_empty());
    }

    #[test]
    fn determinism_across_repeated_runs() {
        let a = bound(base_pod("default", "a", 1, 0), "n1");
        let b = base_pod("default", "b", 10, 1);
        let snap = snapshot(vec![node("n1")], vec![a, b]);
        let first = schedule(&snap);
        let second = schedule(&snap);
        assert_eq!(first, second);
    }

    #[test]
    fn creation_order_breaks_priority_ties_among_pending_pods() {
        let older = base_pod("default", "older", 5, 0);
        let newer = base_pod("default", "newer", 5, 1);
        let plan = schedule(&snapshot(vec![node("n1")], vec![newer, older]));
        assert_eq!(
            plan.actions,
            vec![Action::Bind {
                pod: PodId::new("default", "older"),
                node: "n1".to_string(),
            }]
        );
    }

    #[test]
    fn duplicate_node_occupancy_keeps_first_occupant_by_id() {
        let a = bound(base_pod("default", "a", 5, 0), "n1");
        let z = bound(base_pod("default", "z", 5, 1), "n1");
        let pending = base_pod("default", "pending", 100, 2);
        let plan = schedule(&snapshot(vec![node("n1")], vec![a, z, pending]));
        // "a" sorts before "z"; preempting to bind "pending" must target the
        // pod the engine actually recognizes as the occupant.
        assert_eq!(
            plan.actions,
            vec![
                Action::Evict {
                    pod: PodId::new("default", "a")
                },
                Action::Bind {
                    pod: PodId::new("default", "pending"),
                    node: "n1".to_string(),
                },
            ]
        );
    }

    #[test]
    fn unknown_phase_with_node_occupies_it() {
        let mut a = bound(base_pod("default", "a", 5, 0), "n1");
        a.phase = PodPhase::Unknown;
        let b = base_pod("default", "b", 5, 1);
        let plan = schedule(&snapshot(vec![node("n1")], vec![a, b]));
        assert!(plan.is_empty(), "equal priority must not preempt, even through Unknown phase");
    }

    #[test]
    fn terminal_pods_are_ignored() {
        let mut a = base_pod("default", "a", 100, 0);
        a.phase = PodPhase::Succeeded;
        let p = base_pod("default", "p", 0, 1);
        let plan = schedule(&snapshot(vec![node("n1")], vec![a, p]));
        assert_eq!(
            plan.actions,
            vec![Action::Bind {
                pod: PodId::new("default", "p"),
                node: "n1".to_string(),
            }]
        );
    }

    #[test]
    fn gang_running_members_reduce_need() {
        let already = grouped(bound(base_pod("default", "r", 10, 0), "n1"), "g", None);
        let p1 = grouped(base_pod("default", "p1", 10, 1), "g", Some(2));
        let plan = schedule(&snapshot(vec![node("n1"), node("n2")], vec![already, p1]));
        assert_eq!(
            plan.actions,
            vec![Action::Bind {
                pod: PodId::new("default", "p1"),
                node: "n2".to_string(),
            }]
        );
    }

    #[test]
    fn gang_without_min_available_schedules_individually() {
        let p1 = grouped(base_pod("default", "p1", 10, 0), "g", None);
        let p2 = grouped(base_pod("default", "p2", 10, 1), "g", None);
        let mut plan = schedule(&snapshot(vec![node("n1"), node("n2")], vec![p1, p2]));
        plan.actions.sort_by_key(|a| match a {
            Action::Bind { pod, .. } => pod.name.clone(),
            Action::Evict { pod } => pod.name.clone(),
        });
        assert_eq!(
            plan.actions,
            vec![
                Action::Bind {
                    pod: PodId::new("default", "p1"),
                    node: "n1".to_string(),
                },
                Action::Bind {
                    pod: PodId::new("default", "p2"),
                    node: "n2".to_string(),
                },
            ]
        );
    }

    #[test]
    fn gang_never_preempts_a_member_even_when_that_members_priority_is_lower_than_the_groups() {
        // Group priority is the max across members (10, from "hungry"), which
        // would make "cheap" (priority 1, same group) look like a tempting
        // victim by priority alone. It must still never be preempted because
        // it is a member of the same gang.
        let cheap = grouped(bound(base_pod("default", "cheap", 1, 0), "n1"), "g", None);
        let hungry = grouped(base_pod("default", "hungry", 10, 1), "g", Some(2));
        let plan = schedule(&snapshot(vec![node("n1")], vec![cheap, hungry]));
        assert!(plan.is_empty());
    }

    #[test]
    fn gang_never_preempts_its_own_member() {
        // A same-priority running member of the same gang must not be
        // counted as a valid eviction target for the rest of the gang.
        let running = grouped(bound(base_pod("default", "r", 10, 0), "n1"), "g", None);
        let pending = grouped(base_pod("default", "p", 10, 1), "g", Some(2));
        let plan = schedule(&snapshot(vec![node("n1")], vec![running, pending]));
        assert!(plan.is_empty());
    }

    #[test]
    fn gang_never_preempts_a_member_of_a_higher_priority_gang() {
        // "weak" is individually priority 1, but it belongs to gang "strong"
        // whose other member makes the gang's effective priority 100. Gang
        // "raider" (effective priority 10) must not be able to preempt it
        // just because "weak"'s own priority field is low.
        let weak = grouped(bound(base_pod("default", "weak", 1, 0), "n1"), "strong", None);
        let anchor = grouped(base_pod("default", "anchor", 100, 1), "strong", None);
        let raider = grouped(base_pod("default", "raider", 10, 2), "raider", Some(1));
        let plan = schedule(&snapshot(vec![node("n1")], vec![weak, anchor, raider]));
        assert!(plan.is_empty());
    }
}
