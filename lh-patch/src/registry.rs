use std::collections::HashMap;

use serde::Serialize;

use crate::error::{PatchError, PatchResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum BreakpointState {
    Inactive,
    Active,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Breakpoint {
    pub id: u32,
    pub line: u32,
    pub injected_size: u32,
    pub stack_growth: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BreakpointStatus {
    pub id: u32,
    pub state: BreakpointState,
    pub line: Option<u32>,
    pub injected_size: u32,
}

#[derive(Debug, Default)]
pub struct BreakpointRegistry {
    active: HashMap<u32, Breakpoint>,
}

impl BreakpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, id: u32) -> BreakpointState {
        if self.active.contains_key(&id) {
            BreakpointState::Active
        } else {
            BreakpointState::Inactive
        }
    }

    pub fn get(&self, id: u32) -> Option<&Breakpoint> {
        self.active.get(&id)
    }

    pub fn ensure_inactive(&self, id: u32) -> PatchResult<()> {
        match self.state(id) {
            BreakpointState::Inactive => Ok(()),
            BreakpointState::Active => Err(PatchError::AlreadyActive { id }),
        }
    }

    pub fn ensure_active(&self, id: u32) -> PatchResult<&Breakpoint> {
        self.active.get(&id).ok_or(PatchError::NotActive { id })
    }

    pub fn activate(&mut self, breakpoint: Breakpoint) -> PatchResult<()> {
        let id = breakpoint.id;
        self.ensure_inactive(id)?;
        self.active.insert(id, breakpoint);
        Ok(())
    }

    pub fn deactivate(&mut self, id: u32) -> PatchResult<Breakpoint> {
        self.active.remove(&id).ok_or(PatchError::NotActive { id })
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn active(&self) -> Vec<&Breakpoint> {
        let mut active = self.active.values().collect::<Vec<_>>();
        active.sort_by_key(|breakpoint| breakpoint.id);
        active
    }

    pub fn status(&self, id: u32) -> BreakpointStatus {
        match self.active.get(&id) {
            Some(breakpoint) => BreakpointStatus {
                id,
                state: BreakpointState::Active,
                line: Some(breakpoint.line),
                injected_size: breakpoint.injected_size,
            },
            None => BreakpointStatus {
                id,
                state: BreakpointState::Inactive,
                line: None,
                injected_size: 0,
            },
        }
    }

    pub fn statuses(&self) -> Vec<BreakpointStatus> {
        self.active()
            .into_iter()
            .map(|breakpoint| self.status(breakpoint.id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u32, injected_size: u32) -> Breakpoint {
        Breakpoint {
            id,
            line: 3,
            injected_size,
            stack_growth: 3,
        }
    }

    #[test]
    fn reused_id_starts_without_stale_size() {
        let mut registry = BreakpointRegistry::new();
        registry.activate(record(7, 10)).expect("activate");
        let removed = registry.deactivate(7).expect("deactivate");
        assert_eq!(removed.injected_size, 10);
        assert_eq!(registry.status(7).injected_size, 0);
        assert_eq!(registry.state(7), BreakpointState::Inactive);
    }

    #[test]
    fn transitions_reject_repeated_moves() {
        let mut registry = BreakpointRegistry::new();
        assert_eq!(
            registry.deactivate(1),
            Err(PatchError::NotActive { id: 1 })
        );
        registry.activate(record(1, 10)).expect("activate");
        assert_eq!(
            registry.activate(record(1, 12)),
            Err(PatchError::AlreadyActive { id: 1 })
        );
        assert_eq!(registry.get(1).map(|bp| bp.injected_size), Some(10));
    }
}
