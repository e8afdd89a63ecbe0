use dashmap::DashMap;

use crate::state::race::{GroupId, RaceId};

/// Pointer from each configured group to its currently active race.
///
/// Only the group serializer mutates an entry, so reads taken inside a
/// serialized task are stable for the lifetime of that task.
pub struct ActiveRaceRegistry {
    active: DashMap<GroupId, Option<RaceId>>,
}

impl ActiveRaceRegistry {
    /// Registry with one empty slot per known group.
    pub fn new<I>(groups: I) -> Self
    where
        I: IntoIterator<Item = GroupId>,
    {
        Self {
            active: groups.into_iter().map(|group| (group, None)).collect(),
        }
    }

    /// Whether `group` is one of the configured groups.
    pub fn knows(&self, group: &GroupId) -> bool {
        self.active.contains_key(group)
    }

    /// Active race of `group`, if any.
    pub fn active(&self, group: &GroupId) -> Option<RaceId> {
        self.active.get(group).and_then(|entry| *entry.value())
    }

    /// Point `group` at `race_id`, returning the previously active race.
    pub fn activate(&self, group: &GroupId, race_id: RaceId) -> Option<RaceId> {
        self.active
            .insert(group.clone(), Some(race_id))
            .flatten()
    }

    /// Clear the pointer of `group` only while it still targets `race_id`.
    pub fn clear_if(&self, group: &GroupId, race_id: RaceId) -> bool {
        match self.active.get_mut(group) {
            Some(mut entry) if *entry == Some(race_id) => {
                *entry = None;
                true
            }
            _ => false,
        }
    }

    /// Drop every pointer; used once at process start.
    pub fn reset(&self) {
        for mut entry in self.active.iter_mut() {
            *entry.value_mut() = None;
        }
    }

    /// Every group with its active race, sorted by group id.
    pub fn entries(&self) -> Vec<(GroupId, Option<RaceId>)> {
        let mut entries: Vec<_> = self
            .active
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}
