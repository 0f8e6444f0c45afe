//! # ω_r Occurrence Expansion
//!
//! Assigns every head constraint a globally unique occurrence index per
//! symbol, in rule textual order with removed heads numbered before kept
//! heads. The resulting `ProcessedProgram` drives the emitter: one
//! occurrence scheme per head constraint, pairing the active head with its
//! partner heads, matchings, guard, and body.
//!
//! The removed-before-kept ordering is load-bearing for the refined
//! operational semantics: a removed active head must be consumed before a
//! kept occurrence of the same rule gets a chance to revive a partner.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::ast::{Signature, Term};
use crate::normalize::{Matching, NormalizedProgram, NormalizedRule};

/// A head constraint with its occurrence index and kept/removed flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadConstraint {
    pub symbol: String,
    pub occurrence_idx: usize,
    pub params: Vec<String>,
    pub kept: bool,
}

impl HeadConstraint {
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn signature(&self) -> Signature {
        Signature::new(self.symbol.clone(), self.params.len())
    }
}

/// A rule after occurrence expansion: one flat head list, removed heads
/// first, each head carrying its occurrence index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedRule {
    pub name: String,
    pub head: Vec<HeadConstraint>,
    pub matching: Vec<Matching>,
    pub guard: Vec<Term>,
    pub body: Vec<Term>,
}

impl ProcessedRule {
    /// The occurrence scheme with head slot `idx` active.
    pub fn occurrence_scheme(&self, idx: usize) -> OccurrenceScheme<'_> {
        let partners = self
            .head
            .iter()
            .enumerate()
            .filter(|(slot, _)| *slot != idx)
            .collect();
        OccurrenceScheme {
            rule_name: &self.name,
            active: (idx, &self.head[idx]),
            partners,
            matching: &self.matching,
            guard: &self.guard,
            body: &self.body,
        }
    }

    /// All occurrence schemes of the rule, in head-slot order.
    pub fn occurrence_schemes(&self) -> impl Iterator<Item = OccurrenceScheme<'_>> {
        (0..self.head.len()).map(|idx| self.occurrence_scheme(idx))
    }
}

/// One slot of a rule made active: the remaining heads become partner
/// slots searched by nested store iteration.
#[derive(Debug, Clone)]
pub struct OccurrenceScheme<'a> {
    pub rule_name: &'a str,
    pub active: (usize, &'a HeadConstraint),
    pub partners: Vec<(usize, &'a HeadConstraint)>,
    pub matching: &'a [Matching],
    pub guard: &'a [Term],
    pub body: &'a [Term],
}

impl OccurrenceScheme<'_> {
    /// Head slots in rule order, active included.
    pub fn slots(&self) -> Vec<usize> {
        let mut slots: Vec<usize> = std::iter::once(self.active.0)
            .chain(self.partners.iter().map(|(slot, _)| *slot))
            .collect();
        slots.sort_unstable();
        slots
    }

    /// All head parameter names of the scheme.
    pub fn head_params(&self) -> BTreeSet<String> {
        let mut params: BTreeSet<String> = self.active.1.params.iter().cloned().collect();
        for (_, partner) in &self.partners {
            params.extend(partner.params.iter().cloned());
        }
        params
    }

    /// Variables of matchings, guard, and body that are not bound by any
    /// head parameter. These become locally allocated fresh variables.
    pub fn free_vars(&self) -> BTreeSet<String> {
        let head_params = self.head_params();
        let mut vars = BTreeSet::new();
        for m in self.matching {
            m.pattern.collect_vars(&mut vars);
        }
        for term in self.guard.iter().chain(self.body.iter()) {
            term.collect_vars(&mut vars);
        }
        vars.retain(|v| !head_params.contains(v));
        vars
    }
}

/// A program after ω_r expansion, plus the per-symbol occurrence totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedProgram {
    pub class_name: String,
    pub constraints: Vec<Signature>,
    pub rules: Vec<ProcessedRule>,
    pub occurrence_counts: HashMap<String, usize>,
}

/// Expand a normalized program: number occurrences per symbol in textual
/// order, removed heads before kept heads within each rule.
pub fn omega_r(program: &NormalizedProgram) -> ProcessedProgram {
    let mut counters: HashMap<String, usize> = HashMap::new();
    let mut next_occurrence = |symbol: &str| {
        let counter = counters.entry(symbol.to_string()).or_insert(0);
        let occ = *counter;
        *counter += 1;
        occ
    };

    let rules = program
        .rules
        .iter()
        .map(|rule: &NormalizedRule| {
            let mut head = Vec::with_capacity(rule.removed.len() + rule.kept.len());
            for constr in &rule.removed {
                head.push(HeadConstraint {
                    symbol: constr.symbol.clone(),
                    occurrence_idx: next_occurrence(&constr.symbol),
                    params: constr.params.clone(),
                    kept: false,
                });
            }
            for constr in &rule.kept {
                head.push(HeadConstraint {
                    symbol: constr.symbol.clone(),
                    occurrence_idx: next_occurrence(&constr.symbol),
                    params: constr.params.clone(),
                    kept: true,
                });
            }
            ProcessedRule {
                name: rule.name.clone(),
                head,
                matching: rule.matching.clone(),
                guard: rule.guard.clone(),
                body: rule.body.clone(),
            }
        })
        .collect();

    ProcessedProgram {
        class_name: program.class_name.clone(),
        constraints: program.constraints.clone(),
        rules,
        occurrence_counts: counters,
    }
}
