//! Possible-world bookkeeping: situation assessment and deduplication.

use crate::core::agents::Agents;
use crate::core::domain::Domain;
use crate::core::types::AgentId;

/// Drop the possible worlds H can tell apart from `designated` by looking.
pub fn assess_situation(domain: &Domain, designated: &Agents, worlds: &mut Vec<Agents>) {
    worlds.retain(|world| domain.keeps_world(&designated.state, &world.state));
}

/// True when `left` and `right` are logically different worlds.
///
/// Worlds differ when their dynamic fluents differ, when the robot agendas
/// differ, or, if H and R are copresent, when the human agendas differ.
pub fn worlds_differ(copresent: bool, left: &Agents, right: &Agents) -> bool {
    if !left.same_agenda(right, AgentId::Robot) {
        return true;
    }
    if copresent && !left.same_agenda(right, AgentId::Human) {
        return true;
    }
    !left.state.compare(&right.state, false)
}

/// Collapse `worlds` to pairwise different worlds that also differ from the
/// designated one. Keeps first occurrences in order.
pub fn dedup_worlds(copresent: bool, designated: &Agents, worlds: Vec<Agents>) -> Vec<Agents> {
    let mut unique: Vec<Agents> = Vec::with_capacity(worlds.len());
    for world in worlds {
        if !worlds_differ(copresent, &world, designated) {
            continue;
        }
        if unique
            .iter()
            .all(|kept| worlds_differ(copresent, &world, kept))
        {
            unique.push(world);
        }
    }
    unique
}

/// Pairs of indices of equivalent worlds; empty for a minimal set.
pub fn duplicate_worlds(copresent: bool, worlds: &[Agents]) -> Vec<(usize, usize)> {
    let mut duplicates = Vec::new();
    for (i, left) in worlds.iter().enumerate() {
        for (j, right) in worlds.iter().enumerate().skip(i + 1) {
            if !worlds_differ(copresent, left, right) {
                duplicates.push((i, j));
            }
        }
    }
    duplicates
}
