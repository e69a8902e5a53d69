use std::collections::HashMap;

/// Where one identifier stands in the optimistic toggle cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleState {
    Idle,
    /// Optimistic value applied; `previous` is what a revert restores.
    Pending { previous: bool },
}

/// How a pending toggle resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Committed(bool),
    RevertedTo(bool),
}

impl Transition {
    pub fn value(self) -> bool {
        match self {
            Transition::Committed(value) | Transition::RevertedTo(value) => value,
        }
    }
}

/// Result handed back to callers of `toggle_favorite`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// The remote accepted the change; carries the new membership.
    Applied(bool),
    /// Another toggle for the same id is still in flight; nothing was sent.
    AlreadyPending,
}

/// The loading-state map: ids absent from it are `Idle`.
#[derive(Debug, Default, Clone)]
pub struct PendingToggles {
    pending: HashMap<String, bool>,
}

impl PendingToggles {
    pub fn state(&self, id: &str) -> ToggleState {
        match self.pending.get(id) {
            Some(&previous) => ToggleState::Pending { previous },
            None => ToggleState::Idle,
        }
    }

    /// `Idle -> Pending`. Returns the optimistic value, or `None` when the id
    /// is already pending.
    pub fn begin(&mut self, id: &str, current: bool) -> Option<bool> {
        if self.pending.contains_key(id) {
            return None;
        }
        self.pending.insert(id.to_string(), current);
        Some(!current)
    }

    /// `Pending -> Idle`, yielding the transition that should be applied.
    /// `None` if the id was not pending (e.g. the map was cleared meanwhile).
    pub fn finish(&mut self, id: &str, succeeded: bool) -> Option<Transition> {
        let previous = self.pending.remove(id)?;
        Some(if succeeded {
            Transition::Committed(!previous)
        } else {
            Transition::RevertedTo(previous)
        })
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.pending.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_flips_and_blocks_second_attempt() {
        let mut toggles = PendingToggles::default();
        assert_eq!(toggles.begin("p1", false), Some(true));
        assert_eq!(toggles.state("p1"), ToggleState::Pending { previous: false });
        assert_eq!(toggles.begin("p1", true), None);
        assert_eq!(toggles.state("p2"), ToggleState::Idle);
    }

    #[test]
    fn failure_reverts_to_previous() {
        let mut toggles = PendingToggles::default();
        toggles.begin("p1", true);
        assert_eq!(toggles.finish("p1", false), Some(Transition::RevertedTo(true)));
        assert_eq!(toggles.state("p1"), ToggleState::Idle);
    }

    #[test]
    fn success_commits_new_value() {
        let mut toggles = PendingToggles::default();
        toggles.begin("p1", false);
        let transition = toggles.finish("p1", true);
        assert_eq!(transition, Some(Transition::Committed(true)));
        assert_eq!(transition.map(Transition::value), Some(true));
        assert!(toggles.is_empty());
    }

    #[test]
    fn finish_after_clear_is_ignored() {
        let mut toggles = PendingToggles::default();
        toggles.begin("p1", false);
        toggles.clear();
        assert_eq!(toggles.finish("p1", true), None);
    }
}
