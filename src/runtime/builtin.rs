//! # Built-in Store
//!
//! Logic variables backed by a union-find with value bindings, a trail of
//! reversible operations, and delayed re-activation suspensions.
//!
//! The trail records every `union` and value binding since the last commit.
//! Guard evaluation in generated code binds speculatively through
//! [`BuiltinStore::unify`]; a failed guard calls
//! [`BuiltinStore::reset_recent_bindings`] to unwind, a fired rule calls
//! [`BuiltinStore::commit_recent_bindings`], which is also the only place
//! delayed suspensions wake up.

use std::collections::{HashMap, HashSet};

use crate::ast::Signature;

use super::error::{RuntimeError, RuntimeResult};
use super::store::ConstraintId;
use super::value::{LogicVariable, Value};

/// A delayed re-activation, stored as data rather than a closure: enough to
/// re-enter the activation dispatcher for `signature` with `delayed = true`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suspension {
    pub signature: Signature,
    pub id: ConstraintId,
    pub args: Vec<Value>,
}

/// A suspension due to run, paired with the delay ID that retires it once it
/// fires successfully.
#[derive(Debug, Clone)]
pub struct Wakeup {
    pub delay_id: u64,
    pub suspension: Suspension,
}

/// One reversible operation on the store.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TrailEntry {
    /// `parent[child]` was redirected away from itself.
    Union { child: usize },
    /// A value binding was added for `index`.
    Value { index: usize },
}

/// The built-in constraint store: union-find, value bindings, trail, and
/// wait-lists of delayed suspensions.
#[derive(Debug, Default)]
pub struct BuiltinStore {
    parent: Vec<usize>,
    names: Vec<String>,
    values: HashMap<usize, Value>,
    trail: Vec<TrailEntry>,
    delayed: HashMap<usize, Vec<(u64, Suspension)>>,
    called_delayed: HashSet<u64>,
    next_delay_id: u64,
}

impl BuiltinStore {
    pub fn new() -> Self {
        BuiltinStore::default()
    }

    /// Allocate a fresh variable. An initial value binds immediately and is
    /// not trailed.
    pub fn fresh(&mut self, name: Option<&str>, value: Option<Value>) -> LogicVariable {
        let index = self.parent.len();
        let name = match name {
            Some(n) => n.to_string(),
            None => format!("_V{index}"),
        };
        self.parent.push(index);
        self.names.push(name.clone());
        if let Some(value) = value {
            self.values.insert(index, value);
        }
        LogicVariable::new(index, name)
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Number of uncommitted trail entries.
    pub fn trail_depth(&self) -> usize {
        self.trail.len()
    }

    fn check(&self, index: usize) -> RuntimeResult<()> {
        if index < self.parent.len() {
            Ok(())
        } else {
            Err(RuntimeError::UnknownVariable { index })
        }
    }

    /// Representative of `index`: path traversal to the union-find root.
    pub fn find(&self, index: usize) -> usize {
        let mut r = index;
        while self.parent[r] != r {
            r = self.parent[r];
        }
        r
    }

    pub fn is_bound(&self, index: usize) -> bool {
        self.values.contains_key(&self.find(index))
    }

    /// The value bound to the representative of `index`, if any.
    pub fn get_value(&self, index: usize) -> Option<&Value> {
        self.values.get(&self.find(index))
    }

    /// Merge the equivalence classes of `a` and `b`.
    ///
    /// Returns false (leaving any partial bindings on the trail for the
    /// caller to reset) when both sides are bound to non-unifiable values.
    pub fn union(&mut self, a: usize, b: usize) -> RuntimeResult<bool> {
        self.check(a)?;
        self.check(b)?;
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return Ok(true);
        }
        match (self.values.get(&ra).cloned(), self.values.get(&rb).cloned()) {
            (Some(va), Some(vb)) => {
                if !self.unify(&va, &vb)? {
                    return Ok(false);
                }
                self.parent[ra] = rb;
                self.trail.push(TrailEntry::Union { child: ra });
                Ok(true)
            }
            (Some(va), None) => {
                self.parent[rb] = ra;
                self.values.insert(rb, va);
                self.trail.push(TrailEntry::Union { child: rb });
                self.trail.push(TrailEntry::Value { index: rb });
                Ok(true)
            }
            (None, Some(vb)) => {
                self.parent[ra] = rb;
                self.values.insert(ra, vb);
                self.trail.push(TrailEntry::Union { child: ra });
                self.trail.push(TrailEntry::Value { index: ra });
                Ok(true)
            }
            (None, None) => {
                self.parent[ra] = rb;
                self.trail.push(TrailEntry::Union { child: ra });
                Ok(true)
            }
        }
    }

    /// Bind the representative of `index` to `value`.
    pub fn set_value(&mut self, index: usize, value: Value) -> RuntimeResult<()> {
        self.check(index)?;
        let rep = self.find(index);
        if let Some(existing) = self.values.get(&rep).cloned() {
            if self.ask_eq(&existing, &value) {
                return Ok(());
            }
            return Err(RuntimeError::BoundVariable { index: rep });
        }
        self.values.insert(rep, value);
        self.trail.push(TrailEntry::Value { index: rep });
        Ok(())
    }

    /// Structural unification over arbitrary values, binding through the
    /// union-find as needed. All bindings are trailed.
    pub fn unify(&mut self, left: &Value, right: &Value) -> RuntimeResult<bool> {
        match (left, right) {
            (Value::Var(l), Value::Var(r)) => {
                let rl = self.find(l.index);
                let rr = self.find(r.index);
                match (self.values.get(&rl).cloned(), self.values.get(&rr).cloned()) {
                    (Some(vl), Some(vr)) => {
                        if rl == rr {
                            return Ok(true);
                        }
                        self.unify(&vl, &vr)
                    }
                    _ => self.union(l.index, r.index),
                }
            }
            (Value::Var(l), other) => {
                let rep = self.find(l.index);
                match self.values.get(&rep).cloned() {
                    Some(bound) => self.unify(&bound, other),
                    None => {
                        self.set_value(rep, other.clone())?;
                        Ok(true)
                    }
                }
            }
            (other, Value::Var(r)) => {
                let rep = self.find(r.index);
                match self.values.get(&rep).cloned() {
                    Some(bound) => self.unify(other, &bound),
                    None => {
                        self.set_value(rep, other.clone())?;
                        Ok(true)
                    }
                }
            }
            (Value::List(ls), Value::List(rs)) | (Value::Tuple(ls), Value::Tuple(rs)) => {
                if ls.len() != rs.len() {
                    return Ok(false);
                }
                for (l, r) in ls.iter().zip(rs.iter()) {
                    if !self.unify(l, r)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            (Value::Dict(ls), Value::Dict(rs)) => {
                if ls.len() != rs.len() || !ls.keys().eq(rs.keys()) {
                    return Ok(false);
                }
                for (l, r) in ls.values().zip(rs.values()) {
                    if !self.unify(l, r)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            (l, r) => Ok(self.ask_eq(l, r)),
        }
    }

    /// The variable equality relation: two values are equal iff they resolve
    /// to the same representative or to structurally equal bound values.
    /// Never binds anything.
    pub fn ask_eq(&self, left: &Value, right: &Value) -> bool {
        self.resolve(left) == self.resolve(right)
    }

    /// Deep-resolve `value`: bound variables are replaced by their values,
    /// unbound variables by a canonical handle for their representative.
    pub fn resolve(&self, value: &Value) -> Value {
        let mut in_progress = HashSet::new();
        self.resolve_inner(value, &mut in_progress)
    }

    fn resolve_inner(&self, value: &Value, in_progress: &mut HashSet<usize>) -> Value {
        match value {
            Value::Var(v) => {
                let rep = self.find(v.index);
                if !in_progress.insert(rep) {
                    // Cyclic binding; cut at the representative.
                    return Value::Var(self.canonical(rep));
                }
                let resolved = match self.values.get(&rep) {
                    Some(bound) => self.resolve_inner(bound, in_progress),
                    None => Value::Var(self.canonical(rep)),
                };
                in_progress.remove(&rep);
                resolved
            }
            Value::List(items) => Value::List(
                items
                    .iter()
                    .map(|item| self.resolve_inner(item, in_progress))
                    .collect(),
            ),
            Value::Tuple(items) => Value::Tuple(
                items
                    .iter()
                    .map(|item| self.resolve_inner(item, in_progress))
                    .collect(),
            ),
            Value::Dict(entries) => Value::Dict(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), self.resolve_inner(v, in_progress)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn canonical(&self, rep: usize) -> LogicVariable {
        LogicVariable::new(rep, self.names[rep].clone())
    }

    /// Attach a suspension to every unbound variable among `args`.
    ///
    /// The suspension is keyed by the representative index, which is the
    /// index trail entries will carry when the variable is later touched.
    pub fn delay(&mut self, suspension: Suspension, args: &[Value]) {
        let delay_id = self.next_delay_id;
        self.next_delay_id += 1;
        let mut attached = HashSet::new();
        for arg in args {
            let mut indices = Vec::new();
            arg.variable_indices(&mut indices);
            for index in indices {
                let rep = self.find(index);
                if !self.values.contains_key(&rep) && attached.insert(rep) {
                    self.delayed
                        .entry(rep)
                        .or_default()
                        .push((delay_id, suspension.clone()));
                }
            }
        }
    }

    /// Commit all trailed bindings and collect the suspensions they wake.
    ///
    /// The caller runs each wakeup through the activation dispatcher and
    /// retires it with [`BuiltinStore::mark_called`] when it fired.
    pub fn commit_recent_bindings(&mut self) -> Vec<Wakeup> {
        let snapshot = std::mem::take(&mut self.trail);
        let mut woken = HashSet::new();
        let mut wakeups = Vec::new();
        for entry in &snapshot {
            let index = match entry {
                TrailEntry::Union { child } => *child,
                TrailEntry::Value { index } => *index,
            };
            if let Some(suspensions) = self.delayed.get(&index) {
                for (delay_id, suspension) in suspensions {
                    if self.called_delayed.contains(delay_id) || !woken.insert(*delay_id) {
                        continue;
                    }
                    wakeups.push(Wakeup {
                        delay_id: *delay_id,
                        suspension: suspension.clone(),
                    });
                }
            }
        }
        wakeups
    }

    /// Retire a delay ID so the suspension never fires again.
    pub fn mark_called(&mut self, delay_id: u64) {
        self.called_delayed.insert(delay_id);
    }

    /// Unwind the trail in LIFO order: remove value bindings, split unions.
    pub fn reset_recent_bindings(&mut self) {
        while let Some(entry) = self.trail.pop() {
            match entry {
                TrailEntry::Union { child } => {
                    self.parent[child] = child;
                }
                TrailEntry::Value { index } => {
                    self.values.remove(&index);
                }
            }
        }
    }
}
