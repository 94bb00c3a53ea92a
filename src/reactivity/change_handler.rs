// ============================================================================
// spark-bindings - Change Handler
// Reference-counted lock/unlock bracketing of overlapping change windows
// ============================================================================

use std::cell::Cell;
use std::fmt;

/// Callback fired on a lock or unlock transition.
pub type TransitionFn = Box<dyn Fn()>;

// =============================================================================
// CHANGE HANDLER
// =============================================================================

/// Counts open `will_change`/`did_change` windows.
///
/// `on_lock` fires on the 0→1 transition and `on_unlock` on 1→0, no matter
/// how deeply windows nest in between. The count never goes negative;
/// closing more windows than were opened is a programmer error and panics.
///
/// # Example
///
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use spark_bindings::ChangeHandler;
///
/// let locks = Rc::new(Cell::new(0));
/// let l = locks.clone();
/// let handler = ChangeHandler::new(move || l.set(l.get() + 1), || {});
///
/// handler.will_change();
/// handler.will_change();
/// handler.did_change();
/// handler.did_change();
/// assert_eq!(locks.get(), 1);
/// ```
pub struct ChangeHandler {
    count: Cell<usize>,
    on_lock: TransitionFn,
    on_unlock: TransitionFn,
}

impl ChangeHandler {
    pub fn new(on_lock: impl Fn() + 'static, on_unlock: impl Fn() + 'static) -> Self {
        Self {
            count: Cell::new(0),
            on_lock: Box::new(on_lock),
            on_unlock: Box::new(on_unlock),
        }
    }

    /// A handler that only counts.
    pub fn silent() -> Self {
        Self::new(|| {}, || {})
    }

    pub fn will_change(&self) {
        self.increment_count(1);
    }

    pub fn did_change(&self) {
        self.decrement_count(1);
    }

    /// Pre-account for `n` upcoming windows. `n == 0` is a no-op.
    pub fn increment_count(&self, n: usize) {
        if n == 0 {
            return;
        }
        let before = self.count.get();
        let after = before
            .checked_add(n)
            .unwrap_or_else(|| panic!("ChangeHandler count overflow: {before} + {n}"));
        self.count.set(after);
        if before == 0 {
            (self.on_lock)();
        }
    }

    /// Close `n` windows at once. `n == 0` is a no-op.
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds the number of open windows.
    pub fn decrement_count(&self, n: usize) {
        if n == 0 {
            return;
        }
        let before = self.count.get();
        assert!(
            n <= before,
            "ChangeHandler underflow: closing {n} windows with only {before} open"
        );
        let after = before - n;
        self.count.set(after);
        if after == 0 {
            (self.on_unlock)();
        }
    }

    /// Close every open window. Fires `on_unlock` if any were open.
    pub fn reset_count(&self) {
        let before = self.count.get();
        if before > 0 {
            self.decrement_count(before);
        }
    }

    pub fn count(&self) -> usize {
        self.count.get()
    }

    pub fn is_locked(&self) -> bool {
        self.count.get() > 0
    }
}

impl fmt::Debug for ChangeHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeHandler")
            .field("count", &self.count.get())
            .finish_non_exhaustive()
    }
}

impl Default for ChangeHandler {
    fn default() -> Self {
        Self::silent()
    }
}

// =============================================================================
// TESTS
// =============================================================================
