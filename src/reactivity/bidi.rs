// ============================================================================
// spark-bindings - Bidirectional Guard
// Reentrancy and echo tracking for two-way bindings
// ============================================================================

use std::cell::Cell;

use tracing::error;

// =============================================================================
// STATE
// =============================================================================

/// Observable state of a [`BidiGuard`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BidiState {
    /// Both sides accept changes.
    Idle,

    /// This side is pushing a value into the other side.
    PropagatingToOther,

    /// The other side is pushing a value into this side.
    PropagatingFromOther,

    /// This side's writes opened this many windows on the other side that
    /// have not closed yet. Values arriving meanwhile are echoes (or stale)
    /// and are not re-applied.
    AwaitingOtherEcho(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    None,
    ToOther,
    FromOther,
}

// =============================================================================
// BIDI GUARD
// =============================================================================

/// Cycle prevention for a two-way binding between "self" and "other".
///
/// Only one direction may propagate at a time. For an asynchronous other
/// side, windows opened while this side is pushing are counted as echoes;
/// while any echo is outstanding the other side's values are ignored. Windows
/// the other side opens on its own are reported so the caller can bracket its
/// ChangeHandler.
#[derive(Debug)]
pub struct BidiGuard {
    direction: Cell<Direction>,
    pending_echoes: Cell<usize>,
    foreign_windows: Cell<usize>,
}

impl BidiGuard {
    pub fn new() -> Self {
        Self {
            direction: Cell::new(Direction::None),
            pending_echoes: Cell::new(0),
            foreign_windows: Cell::new(0),
        }
    }

    pub fn state(&self) -> BidiState {
        match self.direction.get() {
            Direction::ToOther => BidiState::PropagatingToOther,
            Direction::FromOther => BidiState::PropagatingFromOther,
            Direction::None => match self.pending_echoes.get() {
                0 => BidiState::Idle,
                n => BidiState::AwaitingOtherEcho(n),
            },
        }
    }

    /// Runs `push` as a self-initiated change unless a propagation is already
    /// underway in either direction. Returns whether `push` ran.
    ///
    /// Pending echoes do not block this side: a user may keep editing while
    /// earlier writes are still in flight.
    pub fn push_to_other(&self, push: impl FnOnce()) -> bool {
        if self.direction.get() != Direction::None {
            return false;
        }
        self.direction.set(Direction::ToOther);
        push();
        self.direction.set(Direction::None);
        true
    }

    /// Runs `apply` as an other-initiated change if the guard is idle.
    /// Returns whether `apply` ran.
    pub fn accept_from_other(&self, apply: impl FnOnce()) -> bool {
        if self.state() != BidiState::Idle {
            return false;
        }
        self.direction.set(Direction::FromOther);
        apply();
        self.direction.set(Direction::None);
        true
    }

    /// The other side opened a window. Returns `true` when it is a foreign
    /// window that the caller should mirror on its ChangeHandler.
    pub fn other_will_change(&self) -> bool {
        if self.direction.get() == Direction::ToOther || self.pending_echoes.get() > 0 {
            self.pending_echoes.set(self.pending_echoes.get() + 1);
            false
        } else {
            self.foreign_windows.set(self.foreign_windows.get() + 1);
            true
        }
    }

    /// The other side closed a window. Returns `true` when a mirrored foreign
    /// window closed and the caller should close its ChangeHandler window.
    pub fn other_did_change(&self) -> bool {
        let echoes = self.pending_echoes.get();
        if echoes > 0 {
            self.pending_echoes.set(echoes - 1);
            return false;
        }
        let foreign = self.foreign_windows.get();
        if foreign > 0 {
            self.foreign_windows.set(foreign - 1);
            return true;
        }
        error!("bidirectional binding saw did_change without a matching will_change");
        false
    }

    /// Clears every counter. Returns how many mirrored windows were still
    /// open so the caller can release them from its ChangeHandler.
    pub fn reset(&self) -> usize {
        self.direction.set(Direction::None);
        self.pending_echoes.set(0);
        self.foreign_windows.replace(0)
    }
}

impl Default for BidiGuard {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TESTS
// =============================================================================
