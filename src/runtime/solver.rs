//! # Solver Base
//!
//! Couples one built-in store and one constraint store. Generated solver
//! classes and the IR interpreter both sit on top of this type; the
//! [`Activate`](super::Activate) trait is the seam through which the runtime
//! re-enters their activation dispatchers.

use super::builtin::BuiltinStore;
use super::store::{ConstraintStore, StoredConstraint};
use super::value::Value;

/// One CHR solver instance: a built-in store plus a constraint store, owned
/// together and used without any locking.
#[derive(Debug, Default)]
pub struct ChrSolver {
    pub builtin: BuiltinStore,
    pub chr: ConstraintStore,
}

impl ChrSolver {
    pub fn new() -> Self {
        ChrSolver::default()
    }

    /// Allocate a fresh logic variable, optionally named and pre-bound.
    pub fn fresh_var(&mut self, name: Option<&str>, value: Option<Value>) -> Value {
        Value::Var(self.builtin.fresh(name, value))
    }

    /// Lift entry arguments: non-variable values are wrapped into freshly
    /// allocated, immediately bound variables; variables pass through.
    pub fn lift_args(&mut self, args: &[Value]) -> Vec<Value> {
        args.iter()
            .map(|arg| match arg {
                Value::Var(_) => arg.clone(),
                other => Value::Var(self.builtin.fresh(None, Some(other.clone()))),
            })
            .collect()
    }

    /// The current store contents with all variable bindings resolved.
    pub fn dump_chr_store(&self) -> Vec<StoredConstraint> {
        self.chr
            .dump()
            .into_iter()
            .map(|c| StoredConstraint {
                signature: c.signature,
                args: c.args.iter().map(|a| self.builtin.resolve(a)).collect(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Signature;

    #[test]
    fn test_lift_args() {
        let mut solver = ChrSolver::new();
        let x = solver.fresh_var(Some("X"), None);
        let lifted = solver.lift_args(&[Value::Int(3), x.clone()]);
        assert_eq!(lifted.len(), 2);
        assert!(matches!(&lifted[0], Value::Var(v) if solver.builtin.is_bound(v.index)));
        assert_eq!(lifted[1], x);
    }

    #[test]
    fn test_dump_resolves_bindings() {
        let mut solver = ChrSolver::new();
        let x = solver.fresh_var(Some("X"), None);
        let id = solver.chr.new_id();
        solver
            .chr
            .insert(
                StoredConstraint::new(Signature::new("gcd", 1), vec![x.clone()]),
                id,
            )
            .unwrap();
        if let Value::Var(v) = &x {
            solver.builtin.set_value(v.index, Value::Int(9)).unwrap();
        }
        let dump = solver.dump_chr_store();
        assert_eq!(dump[0].args, vec![Value::Int(9)]);
    }
}
