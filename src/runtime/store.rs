//! # Constraint Store
//!
//! Holds the live multiset of user constraints: monotonic IDs, the
//! alive-set, the symbol-indexed contents, and the propagation history that
//! stops a rule from firing twice on the same partner tuple.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use tracing::debug;

use crate::ast::Signature;

use super::error::{RuntimeError, RuntimeResult};
use super::value::Value;

/// Identifier of a stored constraint. IDs are monotonic and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConstraintId(pub u64);

impl fmt::Display for ConstraintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A constraint as it lives in the store: its signature plus the argument
/// values (usually logic-variable handles).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredConstraint {
    pub signature: Signature,
    pub args: Vec<Value>,
}

impl StoredConstraint {
    pub fn new(signature: Signature, args: Vec<Value>) -> Self {
        StoredConstraint { signature, args }
    }
}

impl fmt::Display for StoredConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.signature)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ")")
    }
}

/// The CHR constraint store.
#[derive(Debug, Default)]
pub struct ConstraintStore {
    next_id: u64,
    alive: HashMap<ConstraintId, bool>,
    constraints: BTreeMap<ConstraintId, StoredConstraint>,
    history: HashMap<String, Vec<Vec<ConstraintId>>>,
    recently_killed: HashSet<ConstraintId>,
}

impl ConstraintStore {
    pub fn new() -> Self {
        ConstraintStore::default()
    }

    /// Allocate a fresh constraint ID, alive until deleted.
    pub fn new_id(&mut self) -> ConstraintId {
        let id = ConstraintId(self.next_id);
        self.next_id += 1;
        self.alive.insert(id, true);
        id
    }

    /// Insert a constraint under a previously allocated ID.
    pub fn insert(&mut self, constraint: StoredConstraint, id: ConstraintId) -> RuntimeResult<()> {
        if self.constraints.contains_key(&id) {
            return Err(RuntimeError::DuplicateConstraint(id));
        }
        self.constraints.insert(id, constraint);
        Ok(())
    }

    /// Remove a constraint: it leaves the store, dies, and is remembered for
    /// lazy history collection.
    pub fn delete(&mut self, id: ConstraintId) -> RuntimeResult<()> {
        if self.constraints.remove(&id).is_none() {
            return Err(RuntimeError::UnknownConstraint(id));
        }
        self.alive.insert(id, false);
        self.recently_killed.insert(id);
        Ok(())
    }

    pub fn alive(&self, id: ConstraintId) -> RuntimeResult<bool> {
        self.alive
            .get(&id)
            .copied()
            .ok_or(RuntimeError::UnknownConstraint(id))
    }

    /// Snapshot of the live constraints with the given signature, in
    /// insertion order. Taking a materialised copy makes it safe to mutate
    /// the store while iterating (the `fix = true` iterator).
    pub fn snapshot(&self, signature: &Signature) -> Vec<(ConstraintId, StoredConstraint)> {
        self.constraints
            .iter()
            .filter(|(_, c)| &c.signature == signature)
            .map(|(id, c)| (*id, c.clone()))
            .collect()
    }

    /// Lazy iterator over all live constraints in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (ConstraintId, &StoredConstraint)> {
        self.constraints.iter().map(|(id, c)| (*id, c))
    }

    /// All live constraints, in insertion order.
    pub fn dump(&self) -> Vec<StoredConstraint> {
        self.constraints.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn history_len(&self, rule: &str) -> usize {
        self.history.get(rule).map_or(0, Vec::len)
    }

    /// Record that `rule` fired on the given partner tuple.
    pub fn add_to_history(&mut self, rule: &str, ids: &[ConstraintId]) {
        debug!(rule, ?ids, "rule fired");
        self.history
            .entry(rule.to_string())
            .or_default()
            .push(ids.to_vec());
    }

    /// True iff `rule` already fired on exactly this ID tuple.
    ///
    /// Entries that mention a recently killed ID can never match again (IDs
    /// are not reused), so they are garbage-collected as the scan passes
    /// over them.
    pub fn in_history(&mut self, rule: &str, ids: &[ConstraintId]) -> bool {
        let recently_killed = &mut self.recently_killed;
        let Some(entries) = self.history.get_mut(rule) else {
            return false;
        };

        let mut found = false;
        let mut collected: HashSet<ConstraintId> = HashSet::new();
        entries.retain(|entry| {
            if found {
                return true;
            }
            let killed: Vec<ConstraintId> = entry
                .iter()
                .filter(|id| recently_killed.contains(id))
                .copied()
                .collect();
            if !killed.is_empty() {
                collected.extend(killed);
                return false;
            }
            if entry.as_slice() == ids {
                found = true;
            }
            true
        });

        for id in collected {
            recently_killed.remove(&id);
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(symbol: &str, arity: usize) -> Signature {
        Signature::new(symbol, arity)
    }

    fn constraint(symbol: &str, args: Vec<Value>) -> StoredConstraint {
        StoredConstraint::new(sig(symbol, args.len()), args)
    }

    #[test]
    fn test_insert_and_iterate() {
        let mut store = ConstraintStore::new();
        let a = store.new_id();
        let b = store.new_id();
        store.insert(constraint("a", vec![]), a).unwrap();
        store.insert(constraint("b", vec![]), b).unwrap();

        assert!(store.alive(a).unwrap());
        assert!(store.alive(b).unwrap());
        let ids: Vec<ConstraintId> = store.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![a, b]);
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut store = ConstraintStore::new();
        let id = store.new_id();
        store.insert(constraint("a", vec![]), id).unwrap();
        assert_eq!(
            store.insert(constraint("a", vec![]), id),
            Err(RuntimeError::DuplicateConstraint(id))
        );
    }

    #[test]
    fn test_delete_kills_id_for_good() {
        let mut store = ConstraintStore::new();
        let a = store.new_id();
        let b = store.new_id();
        store.insert(constraint("a", vec![]), a).unwrap();
        store.insert(constraint("b", vec![]), b).unwrap();

        store.delete(a).unwrap();
        assert!(!store.alive(a).unwrap());
        assert!(store.iter().all(|(id, _)| id != a));
        assert_eq!(store.delete(a), Err(RuntimeError::UnknownConstraint(a)));

        store.delete(b).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_snapshot_filters_by_signature() {
        let mut store = ConstraintStore::new();
        let a = store.new_id();
        let b = store.new_id();
        let c = store.new_id();
        store
            .insert(constraint("gcd", vec![Value::Int(1)]), a)
            .unwrap();
        store.insert(constraint("leq", vec![Value::Int(1), Value::Int(2)]), b).unwrap();
        store
            .insert(constraint("gcd", vec![Value::Int(2)]), c)
            .unwrap();

        let snap = store.snapshot(&sig("gcd", 1));
        let ids: Vec<ConstraintId> = snap.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![a, c]);
    }

    #[test]
    fn test_snapshot_survives_mutation() {
        let mut store = ConstraintStore::new();
        let a = store.new_id();
        store
            .insert(constraint("gcd", vec![Value::Int(1)]), a)
            .unwrap();
        let snap = store.snapshot(&sig("gcd", 1));
        store.delete(a).unwrap();
        assert_eq!(snap.len(), 1);
    }

    #[test]
    fn test_history_exact_tuple() {
        let mut store = ConstraintStore::new();
        let a = store.new_id();
        let b = store.new_id();

        assert!(!store.in_history("r", &[a, b]));
        store.add_to_history("r", &[a, b]);
        assert!(store.in_history("r", &[a, b]));
        assert!(!store.in_history("r", &[b, a]));
        assert!(!store.in_history("other", &[a, b]));
    }

    #[test]
    fn test_history_collects_killed_entries() {
        let mut store = ConstraintStore::new();
        let a = store.new_id();
        let b = store.new_id();
        store.insert(constraint("a", vec![]), a).unwrap();
        store.insert(constraint("b", vec![]), b).unwrap();
        store.add_to_history("r", &[a, b]);

        store.delete(a).unwrap();
        assert!(!store.in_history("r", &[a, b]));
        assert_eq!(store.history_len("r"), 0);
    }
}
