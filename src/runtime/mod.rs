//! # CHR Runtime
//!
//! Everything a compiled solver links against: the value model, the
//! built-in store (logic variables, union-find, trail, delayed wake-ups),
//! the constraint store (alive-set, propagation history), and the solver
//! base that owns both.
//!
//! ## Runtime shape
//!
//! ```text
//! public entry  ──▶ activation dispatcher ──▶ occurrence procedures
//!                        │                          │
//!                        ▼                          ▼
//!                  BuiltinStore  ◀──────────▶  ConstraintStore
//!                  (bindings, trail,           (alive-set, history,
//!                   suspensions)                snapshot iteration)
//! ```
//!
//! Rule firing is synchronous and runs to completion; the only wake-up
//! point for delayed constraints is [`BuiltinStore::commit_recent_bindings`].

pub mod builtin;
pub mod error;
pub mod ops;
pub mod solver;
pub mod store;
pub mod value;

pub use builtin::{BuiltinStore, Suspension, Wakeup};
pub use error::{RuntimeError, RuntimeResult};
pub use solver::ChrSolver;
pub use store::{ConstraintId, ConstraintStore, StoredConstraint};
pub use value::{LogicVariable, Value};

use crate::ast::Signature;

/// The seam between the runtime and a solver's generated (or interpreted)
/// activation dispatchers. [`Activate::commit_and_wake`] is the one place
/// delayed suspensions re-enter the dispatchers.
pub trait Activate {
    fn solver_mut(&mut self) -> &mut ChrSolver;

    /// Drive constraint `id` through the occurrence procedures of its
    /// signature. Returns true when the active constraint was consumed.
    fn activate(
        &mut self,
        signature: &Signature,
        id: ConstraintId,
        args: &[Value],
        delayed: bool,
    ) -> RuntimeResult<bool>;

    /// Commit all trailed bindings and run every suspension they woke.
    fn commit_and_wake(&mut self) -> RuntimeResult<()> {
        let wakeups = self.solver_mut().builtin.commit_recent_bindings();
        for wakeup in wakeups {
            let Suspension {
                signature,
                id,
                args,
            } = wakeup.suspension;
            if self.activate(&signature, id, &args, true)? {
                self.solver_mut().builtin.mark_called(wakeup.delay_id);
            }
        }
        Ok(())
    }
}

/// True iff all IDs are pairwise distinct. Partner loops use this to rule
/// out matching the same store entry in two head positions.
pub fn all_different(ids: &[ConstraintId]) -> bool {
    for (i, a) in ids.iter().enumerate() {
        if ids[i + 1..].contains(a) {
            return false;
        }
    }
    true
}

/// Resolve a value against the store: bound variables are replaced by their
/// values, unbound ones by a canonical handle.
pub fn get_value(store: &BuiltinStore, value: &Value) -> Value {
    store.resolve(value)
}

/// A non-variable value is always bound; a variable is bound iff its
/// representative holds a value.
pub fn is_bound(store: &BuiltinStore, value: &Value) -> bool {
    match value {
        Value::Var(v) => store.is_bound(v.index),
        _ => true,
    }
}

/// Structural unification; see [`BuiltinStore::unify`].
pub fn unify(store: &mut BuiltinStore, left: &Value, right: &Value) -> RuntimeResult<bool> {
    store.unify(left, right)
}
