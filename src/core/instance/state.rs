// src/core/instance/state.rs

//! Runtime state of a managed instance: a disjoint base state plus a set of
//! extended flags observed on demand from the instance's Redis INFO output.
//!
//! Per the design notes, base and flags are kept as separate fields rather
//! than packed into one bitmask — conflating them would be an optimization,
//! not a requirement.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// The three mutually exclusive base states of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BaseState {
    #[default]
    Stopped,
    Works,
    /// PID file present but no live process with that PID.
    Dead,
}

bitflags! {
    /// Extended flags, only meaningful while `base == Works`. Computed on
    /// demand by querying the instance's Redis INFO; never persisted as a
    /// source of truth (runtime-derived).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct ExtendedFlags: u32 {
        const IDLE         = 1 << 0;
        const SYNCING      = 1 << 1;
        const LOADING      = 1 << 2;
        const SAVING       = 1 << 3;
        const HANG         = 1 << 4;
        const ABANDONED    = 1 << 5;
        const MASTER_UP    = 1 << 6;
        const MASTER_DOWN  = 1 << 7;
        const NO_REPLICA   = 1 << 8;
        const WITH_REPLICA = 1 << 9;
        const WITH_ERRORS  = 1 << 10;
    }
}

/// Combined runtime state of an instance: its disjoint base state plus any
/// extended flags (only applicable when `base == Works`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct State {
    pub base: BaseState,
    #[serde(default)]
    pub flags: ExtendedFlags,
}

impl State {
    pub const fn stopped() -> Self {
        State {
            base: BaseState::Stopped,
            flags: ExtendedFlags::empty(),
        }
    }

    pub const fn dead() -> Self {
        State {
            base: BaseState::Dead,
            flags: ExtendedFlags::empty(),
        }
    }

    pub const fn works(flags: ExtendedFlags) -> Self {
        State {
            base: BaseState::Works,
            flags,
        }
    }

    pub fn is_works(&self) -> bool {
        self.base == BaseState::Works
    }

    pub fn is_stopped(&self) -> bool {
        self.base == BaseState::Stopped
    }

    pub fn is_dead(&self) -> bool {
        self.base == BaseState::Dead
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn works_and_stopped_are_mutually_exclusive() {
        let s = State::works(ExtendedFlags::SYNCING);
        assert!(s.is_works());
        assert!(!s.is_stopped());
        assert!(!s.is_dead());
    }

    #[test]
    fn dead_carries_no_extended_flags_by_construction() {
        assert_eq!(State::dead().flags, ExtendedFlags::empty());
    }
}
