//! # IR Interpreter
//!
//! Executes a [`SolverDef`] directly against a [`ChrSolver`], statement by
//! statement. This is the semantic twin of the printed Rust back-end: both
//! run the same IR against the same runtime API, which keeps the compiler
//! testable without building generated host code, and doubles as a way to
//! load and run `.chr` programs in-process.

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::Signature;
use crate::ir::{BinOp, Const, Expr, Pattern, Procedure, SolverDef, Stmt, UnaryOp};
use crate::runtime::ops::{self, CmpOp, MatchPattern, NumOp};
use crate::runtime::{
    all_different, Activate, ChrSolver, ConstraintId, RuntimeError, RuntimeResult,
    StoredConstraint, Suspension, Value,
};

/// A solver instance driving an emitted program through the interpreter.
pub struct DynSolver {
    def: Rc<SolverDef>,
    solver: ChrSolver,
}

/// A local binding inside an occurrence procedure.
#[derive(Debug, Clone)]
enum Slot {
    Val(Value),
    Id(ConstraintId),
    Partner(StoredConstraint),
}

enum Flow {
    Continue,
    Return(bool),
}

impl DynSolver {
    pub fn new(def: SolverDef) -> Self {
        DynSolver {
            def: Rc::new(def),
            solver: ChrSolver::new(),
        }
    }

    /// Compile CHR source text and load it straight into an interpreter.
    pub fn from_source(source: &str) -> Result<Self, crate::compile::CompileError> {
        Ok(DynSolver::new(crate::compile::chr_compile_def(source)?))
    }

    pub fn class_name(&self) -> &str {
        &self.def.class_name
    }

    pub fn solver(&self) -> &ChrSolver {
        &self.solver
    }

    /// Allocate a fresh, unbound logic variable.
    pub fn fresh(&mut self, name: Option<&str>) -> Value {
        self.solver.fresh_var(name, None)
    }

    /// Tell an equality from outside a rule: unify, then commit, waking any
    /// delayed activations.
    pub fn tell(&mut self, left: &Value, right: &Value) -> RuntimeResult<bool> {
        let result = self.solver.builtin.unify(left, right)?;
        self.commit_and_wake()?;
        Ok(result)
    }

    /// The store contents with bindings resolved.
    pub fn dump(&self) -> Vec<StoredConstraint> {
        self.solver.dump_chr_store()
    }

    /// Public entry: post a user constraint and drive it to quiescence.
    pub fn post(&mut self, symbol: &str, args: &[Value]) -> RuntimeResult<()> {
        let def = Rc::clone(&self.def);
        let entry = def.entry(symbol).ok_or_else(|| {
            RuntimeError::UndefinedConstraint {
                symbol: symbol.to_string(),
                arity: args.len(),
            }
        })?;
        if !entry.arities.contains(&args.len()) {
            return Err(RuntimeError::UndefinedConstraint {
                symbol: symbol.to_string(),
                arity: args.len(),
            });
        }
        let signature = Signature::new(symbol, args.len());
        let vars = self.solver.lift_args(args);
        let new_id = self.solver.chr.new_id();
        self.solver
            .chr
            .insert(StoredConstraint::new(signature.clone(), vars.clone()), new_id)?;
        self.activate(&signature, new_id, &vars, false)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Procedure execution
    // ------------------------------------------------------------------

    fn run_procedure(
        &mut self,
        procedure: &Procedure,
        id: ConstraintId,
        args: &[Value],
    ) -> RuntimeResult<bool> {
        let mut env: HashMap<String, Slot> = HashMap::new();
        env.insert(procedure.id_param.clone(), Slot::Id(id));
        for (param, arg) in procedure.params.iter().zip(args.iter()) {
            env.insert(param.clone(), Slot::Val(arg.clone()));
        }
        match self.exec_block(&procedure.body, &mut env)? {
            Flow::Return(fired) => Ok(fired),
            Flow::Continue => Ok(false),
        }
    }

    fn exec_block(
        &mut self,
        stmts: &[Stmt],
        env: &mut HashMap<String, Slot>,
    ) -> RuntimeResult<Flow> {
        for stmt in stmts {
            if let Flow::Return(fired) = self.exec_stmt(stmt, env)? {
                return Ok(Flow::Return(fired));
            }
        }
        Ok(Flow::Continue)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, env: &mut HashMap<String, Slot>) -> RuntimeResult<Flow> {
        match stmt {
            Stmt::Let { name, value } => {
                let truth = self.eval_ask(value, env)?;
                env.insert(name.clone(), Slot::Val(Value::Bool(truth)));
            }
            Stmt::Fresh { name, value } => {
                let initial = match value {
                    None => None,
                    Some(expr) => {
                        let evaluated = self.eval_value(expr, env)?;
                        Some(ops::require(evaluated, name)?)
                    }
                };
                let var = self.solver.builtin.fresh(Some(name), initial);
                env.insert(name.clone(), Slot::Val(Value::Var(var)));
            }
            Stmt::BindParam {
                name,
                constraint,
                index,
            } => {
                let Some(Slot::Partner(c)) = env.get(constraint) else {
                    return Err(RuntimeError::Internal(format!(
                        "no partner constraint bound to '{constraint}'"
                    )));
                };
                let value = c.args.get(*index).cloned().unwrap_or(Value::Bool(false));
                env.insert(name.clone(), Slot::Val(value));
            }
            Stmt::NewId { name } => {
                let id = self.solver.chr.new_id();
                env.insert(name.clone(), Slot::Id(id));
            }
            Stmt::Insert {
                id,
                signature,
                args,
            } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    let evaluated = self.eval_value(arg, env)?;
                    values.push(ops::require(evaluated, &signature.to_string())?);
                }
                let id = self.lookup_id(id, env)?;
                self.solver
                    .chr
                    .insert(StoredConstraint::new(signature.clone(), values), id)?;
            }
            Stmt::Activate {
                signature,
                id,
                args,
            } => {
                let id = self.lookup_id(id, env)?;
                let mut values = Vec::with_capacity(args.len());
                for name in args {
                    values.push(self.lookup_value(name, env)?);
                }
                self.activate(signature, id, &values, false)?;
            }
            Stmt::Delete { id } => {
                let id = self.lookup_id(id, env)?;
                self.solver.chr.delete(id)?;
            }
            Stmt::AddToHistory { rule, ids } => {
                let ids = self.lookup_ids(ids, env)?;
                self.solver.chr.add_to_history(rule, &ids);
            }
            Stmt::Commit => {
                self.commit_and_wake()?;
            }
            Stmt::Backtrack => {
                self.solver.builtin.reset_recent_bindings();
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                let branch = if self.eval_ask(cond, env)? {
                    then
                } else {
                    otherwise
                };
                return self.exec_block(branch, env);
            }
            Stmt::PartnerLoop {
                id,
                constraint,
                signature,
                body,
            } => {
                for (partner_id, partner) in self.solver.chr.snapshot(signature) {
                    env.insert(id.clone(), Slot::Id(partner_id));
                    env.insert(constraint.clone(), Slot::Partner(partner));
                    if let Flow::Return(fired) = self.exec_block(body, env)? {
                        return Ok(Flow::Return(fired));
                    }
                }
            }
            Stmt::Tell {
                ask,
                context,
                culprits,
            } => {
                if !self.eval_ask(ask, env)? {
                    let mut messages = vec![context.clone()];
                    for culprit in culprits {
                        if let Some(value) = self.eval_value(culprit, env)? {
                            messages.push(ops::display(&self.solver.builtin, &value));
                        }
                    }
                    return Err(RuntimeError::False { messages });
                }
            }
            Stmt::Fail { messages } => {
                let mut rendered = Vec::with_capacity(messages.len());
                for message in messages {
                    match self.eval_value(message, env)? {
                        Some(value) => rendered.push(ops::display(&self.solver.builtin, &value)),
                        None => rendered.push(String::new()),
                    }
                }
                return Err(RuntimeError::False { messages: rendered });
            }
            Stmt::Undefined { symbol, arity } => {
                return Err(RuntimeError::UndefinedConstraint {
                    symbol: symbol.clone(),
                    arity: *arity,
                });
            }
            Stmt::Return { fired } => {
                return Ok(Flow::Return(*fired));
            }
        }
        Ok(Flow::Continue)
    }

    fn lookup_id(&self, name: &str, env: &HashMap<String, Slot>) -> RuntimeResult<ConstraintId> {
        match env.get(name) {
            Some(Slot::Id(id)) => Ok(*id),
            _ => Err(RuntimeError::Internal(format!(
                "no constraint id bound to '{name}'"
            ))),
        }
    }

    fn lookup_ids(
        &self,
        names: &[String],
        env: &HashMap<String, Slot>,
    ) -> RuntimeResult<Vec<ConstraintId>> {
        names.iter().map(|name| self.lookup_id(name, env)).collect()
    }

    fn lookup_value(&self, name: &str, env: &HashMap<String, Slot>) -> RuntimeResult<Value> {
        match env.get(name) {
            Some(Slot::Val(value)) => Ok(value.clone()),
            _ => Err(RuntimeError::Internal(format!(
                "no value bound to '{name}'"
            ))),
        }
    }

    // ------------------------------------------------------------------
    // Expression evaluation
    // ------------------------------------------------------------------

    fn eval_ask(&mut self, expr: &Expr, env: &mut HashMap<String, Slot>) -> RuntimeResult<bool> {
        match expr {
            Expr::Const(Const::Bool(b)) => Ok(*b),
            Expr::Var(name) => Ok(matches!(
                env.get(name),
                Some(Slot::Val(Value::Bool(true)))
            )),
            Expr::Unary {
                op: UnaryOp::Not,
                operand,
            } => Ok(!self.eval_ask(operand, env)?),
            Expr::Binary {
                op: BinOp::And,
                left,
                right,
            } => Ok(self.eval_ask(left, env)? && self.eval_ask(right, env)?),
            Expr::Binary {
                op: BinOp::Or,
                left,
                right,
            } => Ok(self.eval_ask(left, env)? || self.eval_ask(right, env)?),
            Expr::Binary { op, left, right } if cmp_of(*op).is_some() => {
                let l = self.eval_value(left, env)?;
                let r = self.eval_value(right, env)?;
                Ok(ops::compare(
                    &self.solver.builtin,
                    cmp_of(*op).unwrap_or(CmpOp::Eq),
                    l,
                    r,
                ))
            }
            Expr::IsBound(operand) => {
                let value = self.eval_value(operand, env)?;
                Ok(ops::is_bound_opt(&self.solver.builtin, value.as_ref()))
            }
            Expr::Unify { left, right } => {
                let l = self.eval_value(left, env)?;
                let r = self.eval_value(right, env)?;
                ops::unify_opt(&mut self.solver.builtin, l, r)
            }
            Expr::Match { subject, pattern } => {
                let subject = self.eval_value(subject, env)?;
                let pattern = self.build_pattern(pattern, env)?;
                ops::matches_opt(&mut self.solver.builtin, subject, &pattern)
            }
            Expr::Alive(id) => {
                let id = self.lookup_id(id, env)?;
                self.solver.chr.alive(id)
            }
            Expr::AllDifferent(ids) => {
                let ids = self.lookup_ids(ids, env)?;
                Ok(all_different(&ids))
            }
            Expr::InHistory { rule, ids } => {
                let ids = self.lookup_ids(ids, env)?;
                Ok(self.solver.chr.in_history(rule, &ids))
            }
            other => {
                let value = self.eval_value(other, env)?;
                Ok(matches!(value, Some(Value::Bool(true))))
            }
        }
    }

    fn pattern_leaf(
        &mut self,
        expr: &Expr,
        env: &mut HashMap<String, Slot>,
    ) -> RuntimeResult<Value> {
        self.eval_value(expr, env)?.ok_or_else(|| {
            RuntimeError::Internal("undefined value in head pattern".to_string())
        })
    }

    fn build_pattern(
        &mut self,
        pattern: &Pattern,
        env: &mut HashMap<String, Slot>,
    ) -> RuntimeResult<MatchPattern> {
        Ok(match pattern {
            Pattern::Bind(name) => MatchPattern::Bind(self.lookup_value(name, env)?),
            Pattern::Equal(expr) => MatchPattern::Equal(self.pattern_leaf(expr, env)?),
            Pattern::List(items) => {
                let mut built = Vec::with_capacity(items.len());
                for item in items {
                    built.push(self.build_pattern(item, env)?);
                }
                MatchPattern::List(built)
            }
            Pattern::Tuple(items) => {
                let mut built = Vec::with_capacity(items.len());
                for item in items {
                    built.push(self.build_pattern(item, env)?);
                }
                MatchPattern::Tuple(built)
            }
            Pattern::Dict(entries) => {
                let mut built = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = self.pattern_leaf(key, env)?;
                    built.push((key, self.build_pattern(value, env)?));
                }
                MatchPattern::Dict(built)
            }
        })
    }

    fn eval_value(
        &mut self,
        expr: &Expr,
        env: &mut HashMap<String, Slot>,
    ) -> RuntimeResult<Option<Value>> {
        match expr {
            Expr::Const(Const::Int(n)) => Ok(Some(Value::Int(*n))),
            Expr::Const(Const::Str(s)) => Ok(Some(Value::Str(s.clone()))),
            Expr::Const(Const::Bool(b)) => Ok(Some(Value::Bool(*b))),
            Expr::Var(name) => Ok(match env.get(name) {
                Some(Slot::Val(value)) => Some(value.clone()),
                _ => None,
            }),
            Expr::List(items) => {
                let mut evaluated = Vec::with_capacity(items.len());
                for item in items {
                    evaluated.push(self.eval_value(item, env)?);
                }
                Ok(ops::list(evaluated))
            }
            Expr::Tuple(items) => {
                let mut evaluated = Vec::with_capacity(items.len());
                for item in items {
                    evaluated.push(self.eval_value(item, env)?);
                }
                Ok(ops::tuple(evaluated))
            }
            Expr::Dict(entries) => {
                let mut evaluated = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    evaluated.push((self.eval_value(key, env)?, self.eval_value(value, env)?));
                }
                Ok(ops::dict(evaluated))
            }
            Expr::Unary {
                op: UnaryOp::Neg,
                operand,
            } => {
                let value = self.eval_value(operand, env)?;
                Ok(ops::neg(&self.solver.builtin, value))
            }
            Expr::Unary {
                op: UnaryOp::Not,
                operand,
            } => {
                let value = self.eval_value(operand, env)?;
                Ok(ops::bool_not(&self.solver.builtin, value))
            }
            Expr::Binary { op, left, right } => {
                let l = self.eval_value(left, env)?;
                let r = self.eval_value(right, env)?;
                if let Some(num) = num_of(*op) {
                    Ok(ops::arith(&self.solver.builtin, num, l, r))
                } else if let Some(cmp) = cmp_of(*op) {
                    Ok(Some(Value::Bool(ops::compare(
                        &self.solver.builtin,
                        cmp,
                        l,
                        r,
                    ))))
                } else if *op == BinOp::And {
                    Ok(ops::bool_and(&self.solver.builtin, l, r))
                } else {
                    Ok(ops::bool_or(&self.solver.builtin, l, r))
                }
            }
            other => {
                let truth = self.eval_ask(other, env)?;
                Ok(Some(Value::Bool(truth)))
            }
        }
    }
}

impl Activate for DynSolver {
    fn solver_mut(&mut self) -> &mut ChrSolver {
        &mut self.solver
    }

    fn activate(
        &mut self,
        signature: &Signature,
        id: ConstraintId,
        args: &[Value],
        delayed: bool,
    ) -> RuntimeResult<bool> {
        let def = Rc::clone(&self.def);
        let Some(dispatcher) = def.dispatcher(signature) else {
            return Ok(false);
        };
        for name in &dispatcher.procedures {
            let Some(procedure) = def.procedure(name) else {
                continue;
            };
            if self.run_procedure(procedure, id, args)? {
                return Ok(true);
            }
        }
        if !delayed
            && args
                .iter()
                .any(|arg| !ops::is_bound_opt(&self.solver.builtin, Some(arg)))
        {
            self.solver.builtin.delay(
                Suspension {
                    signature: signature.clone(),
                    id,
                    args: args.to_vec(),
                },
                args,
            );
        }
        Ok(false)
    }
}

fn num_of(op: BinOp) -> Option<NumOp> {
    Some(match op {
        BinOp::Add => NumOp::Add,
        BinOp::Sub => NumOp::Sub,
        BinOp::Mul => NumOp::Mul,
        BinOp::Div => NumOp::Div,
        BinOp::Rem => NumOp::Rem,
        _ => return None,
    })
}

fn cmp_of(op: BinOp) -> Option<CmpOp> {
    Some(match op {
        BinOp::Eq => CmpOp::Eq,
        BinOp::Ne => CmpOp::Ne,
        BinOp::Lt => CmpOp::Lt,
        BinOp::Le => CmpOp::Le,
        BinOp::Gt => CmpOp::Gt,
        BinOp::Ge => CmpOp::Ge,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::emit_program;
    use crate::parser::parse_program;

    fn solver_for(source: &str) -> DynSolver {
        let program = parse_program(source).unwrap();
        DynSolver::new(emit_program(&program).unwrap())
    }

    #[test]
    fn test_simplification_consumes() {
        let mut s = solver_for(
            "class P. constraints a/0, b/0. r @ a <=> b.",
        );
        s.post("a", &[]).unwrap();
        let dump = s.dump();
        assert_eq!(dump.len(), 1);
        assert_eq!(dump[0].signature, Signature::new("b", 0));
    }

    #[test]
    fn test_guard_blocks_firing() {
        let mut s = solver_for(
            "class P. constraints gcd/1. r @ gcd($N) <=> $N == 0 | true.",
        );
        s.post("gcd", &[Value::Int(3)]).unwrap();
        assert_eq!(s.dump().len(), 1);
        s.post("gcd", &[Value::Int(0)]).unwrap();
        assert_eq!(s.dump().len(), 1);
    }

    #[test]
    fn test_undefined_symbol_at_entry() {
        let mut s = solver_for("class P. constraints a/0.");
        assert!(matches!(
            s.post("missing", &[]),
            Err(RuntimeError::UndefinedConstraint { .. })
        ));
        assert!(matches!(
            s.post("a", &[Value::Int(1)]),
            Err(RuntimeError::UndefinedConstraint { arity: 1, .. })
        ));
    }

    #[test]
    fn test_body_false_propagates() {
        let mut s = solver_for(
            "class P. constraints boom/0. r @ boom <=> false(\"kaboom\").",
        );
        let err = s.post("boom", &[]).unwrap_err();
        assert_eq!(
            err,
            RuntimeError::False {
                messages: vec!["kaboom".to_string()],
            }
        );
    }
}
