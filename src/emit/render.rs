//! # Rust Back-End
//!
//! Prints a [`SolverDef`] as a standalone Rust source file that links
//! against the runtime crate: a solver struct with one public entry per
//! declared symbol, the activation dispatchers, and the occurrence
//! procedures, plus an [`Activate`](crate::runtime::Activate) impl so
//! delayed wake-ups re-enter the dispatchers.
//!
//! The printer is deliberately thin: all decisions live in the IR. Guard
//! conjunctions render as short-circuit `&&` chains, so a failing conjunct
//! skips the rest and the `else` branch resets the trail.

use crate::ast::Signature;
use crate::ir::{
    BinOp, Const, Dispatcher, Entry, Expr, Pattern, Procedure, SolverDef, Stmt, UnaryOp,
};

/// Render a complete generated solver source file.
pub fn render_solver(def: &SolverDef) -> String {
    let mut r = Renderer::new();
    r.header(def);
    r.solver_struct(def);
    r.line(&format!("impl {} {{", def.class_name));
    r.indent += 1;
    r.constructor(def);
    for entry in &def.entries {
        r.entry(def, entry);
    }
    for dispatcher in &def.dispatchers {
        r.dispatcher(def, dispatcher);
    }
    for procedure in &def.procedures {
        r.procedure(procedure);
    }
    r.commit_helper();
    r.indent -= 1;
    r.line("}");
    r.blank();
    r.activate_impl(def);
    r.out
}

const RUST_KEYWORDS: &[&str] = &[
    "as", "break", "const", "continue", "crate", "dyn", "else", "enum", "extern", "false", "fn",
    "for", "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub", "ref",
    "return", "self", "static", "struct", "super", "trait", "true", "type", "unsafe", "use",
    "where", "while",
];

fn entry_name(symbol: &str) -> String {
    if RUST_KEYWORDS.contains(&symbol) {
        format!("r#{symbol}")
    } else {
        symbol.to_string()
    }
}

/// Value locals carry a `v_` prefix so head parameters like `_0` stay legal
/// and collision-free; constraint IDs keep their IR names.
fn value_name(name: &str) -> String {
    format!("v_{name}")
}

fn str_literal(text: &str) -> String {
    format!("\"{}\"", text.escape_default())
}

fn signature_expr(signature: &Signature) -> String {
    format!(
        "Signature::new({}, {})",
        str_literal(&signature.symbol),
        signature.arity
    )
}

struct Renderer {
    out: String,
    indent: usize,
}

impl Renderer {
    fn new() -> Self {
        Renderer {
            out: String::new(),
            indent: 0,
        }
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn blank(&mut self) {
        self.out.push('\n');
    }

    // ------------------------------------------------------------------
    // File structure
    // ------------------------------------------------------------------

    fn header(&mut self, def: &SolverDef) {
        self.line(&format!(
            "// {}: generated CHR solver. Do not edit.",
            def.class_name
        ));
        self.line("#![allow(non_snake_case, unused_variables, clippy::all, clippy::pedantic)]");
        self.blank();
        self.line("use chr_engine::ast::Signature;");
        self.line("use chr_engine::runtime::ops::{self, CmpOp, MatchPattern, NumOp};");
        self.line("use chr_engine::runtime::{");
        self.line("    all_different, Activate, ChrSolver, ConstraintId, RuntimeError,");
        self.line("    RuntimeResult, StoredConstraint, Suspension, Value,");
        self.line("};");
        self.blank();
    }

    fn solver_struct(&mut self, def: &SolverDef) {
        self.line(&format!("pub struct {} {{", def.class_name));
        self.line("    solver: ChrSolver,");
        self.line("}");
        self.blank();
        self.line(&format!("impl Default for {} {{", def.class_name));
        self.line("    fn default() -> Self {");
        self.line("        Self::new()");
        self.line("    }");
        self.line("}");
        self.blank();
    }

    fn constructor(&mut self, _def: &SolverDef) {
        self.line("pub fn new() -> Self {");
        self.line("    Self { solver: ChrSolver::new() }");
        self.line("}");
        self.blank();
        self.line("pub fn solver(&self) -> &ChrSolver {");
        self.line("    &self.solver");
        self.line("}");
        self.blank();
        self.line("pub fn fresh_var(&mut self, name: Option<&str>) -> Value {");
        self.line("    self.solver.fresh_var(name, None)");
        self.line("}");
        self.blank();
        self.line("pub fn dump_chr_store(&self) -> Vec<StoredConstraint> {");
        self.line("    self.solver.dump_chr_store()");
        self.line("}");
        self.blank();
        self.line("pub fn unify(&mut self, left: &Value, right: &Value) -> RuntimeResult<bool> {");
        self.line("    let result = self.solver.builtin.unify(left, right)?;");
        self.line("    self.__commit()?;");
        self.line("    Ok(result)");
        self.line("}");
        self.blank();
    }

    fn entry(&mut self, def: &SolverDef, entry: &Entry) {
        self.line(&format!("/// Post a `{}` constraint.", entry.symbol));
        self.line(&format!(
            "pub fn {}(&mut self, args: &[Value]) -> RuntimeResult<()> {{",
            entry_name(&entry.symbol)
        ));
        self.indent += 1;
        for arity in &entry.arities {
            let signature = Signature::new(entry.symbol.clone(), *arity);
            self.line(&format!("if args.len() == {arity} {{"));
            self.indent += 1;
            self.line("let vars = self.solver.lift_args(args);");
            self.line("let new_id = self.solver.chr.new_id();");
            self.line(&format!(
                "self.solver.chr.insert(StoredConstraint::new({}, vars.clone()), new_id)?;",
                signature_expr(&signature)
            ));
            if def.dispatcher(&signature).is_some() {
                self.line(&format!(
                    "self.__activate_{}_{}(new_id, &vars, false)?;",
                    entry.symbol, arity
                ));
            }
            self.line("return Ok(());");
            self.indent -= 1;
            self.line("}");
        }
        self.line(&format!(
            "Err(RuntimeError::UndefinedConstraint {{ symbol: {}.to_string(), arity: args.len() }})",
            str_literal(&entry.symbol)
        ));
        self.indent -= 1;
        self.line("}");
        self.blank();
    }

    fn dispatcher(&mut self, _def: &SolverDef, dispatcher: &Dispatcher) {
        let Signature { symbol, arity } = &dispatcher.signature;
        self.line(&format!(
            "fn __activate_{symbol}_{arity}(&mut self, id: ConstraintId, args: &[Value], delayed: bool) -> RuntimeResult<bool> {{"
        ));
        self.indent += 1;
        for procedure in &dispatcher.procedures {
            let call_args: Vec<String> = (0..*arity).map(|i| format!("args[{i}].clone()")).collect();
            let mut call = format!("self.{procedure}(id");
            for arg in call_args {
                call.push_str(", ");
                call.push_str(&arg);
            }
            call.push_str(")?");
            self.line(&format!("if {call} {{"));
            self.line("    return Ok(true);");
            self.line("}");
        }
        if *arity > 0 {
            self.line("if !delayed && args.iter().any(|arg| !ops::is_bound_opt(&self.solver.builtin, Some(arg))) {");
            self.indent += 1;
            self.line("self.solver.builtin.delay(");
            self.line(&format!(
                "    Suspension {{ signature: {}, id, args: args.to_vec() }},",
                signature_expr(&dispatcher.signature)
            ));
            self.line("    args,");
            self.line(");");
            self.indent -= 1;
            self.line("}");
        }
        self.line("Ok(false)");
        self.indent -= 1;
        self.line("}");
        self.blank();
    }

    fn procedure(&mut self, procedure: &Procedure) {
        let mut params = format!("{}: ConstraintId", procedure.id_param);
        for param in &procedure.params {
            params.push_str(&format!(", {}: Value", value_name(param)));
        }
        self.line(&format!(
            "fn {}(&mut self, {params}) -> RuntimeResult<bool> {{",
            procedure.name
        ));
        self.indent += 1;
        self.stmts(&procedure.body);
        self.indent -= 1;
        self.line("}");
        self.blank();
    }

    fn commit_helper(&mut self) {
        self.line("fn __commit(&mut self) -> RuntimeResult<()> {");
        self.line("    Activate::commit_and_wake(self)");
        self.line("}");
    }

    fn activate_impl(&mut self, def: &SolverDef) {
        self.line(&format!("impl Activate for {} {{", def.class_name));
        self.indent += 1;
        self.line("fn solver_mut(&mut self) -> &mut ChrSolver {");
        self.line("    &mut self.solver");
        self.line("}");
        self.blank();
        self.line("fn activate(&mut self, signature: &Signature, id: ConstraintId, args: &[Value], delayed: bool) -> RuntimeResult<bool> {");
        self.indent += 1;
        self.line("match (signature.symbol.as_str(), signature.arity) {");
        self.indent += 1;
        for dispatcher in &def.dispatchers {
            let Signature { symbol, arity } = &dispatcher.signature;
            self.line(&format!(
                "({}, {arity}) => self.__activate_{symbol}_{arity}(id, args, delayed),",
                str_literal(symbol)
            ));
        }
        self.line("_ => Ok(false),");
        self.indent -= 1;
        self.line("}");
        self.indent -= 1;
        self.line("}");
        self.indent -= 1;
        self.line("}");
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Let { name, value } => {
                let cond = self.ask(value);
                self.line(&format!("let {} = {cond};", value_name(name)));
            }
            Stmt::Fresh { name, value } => match value {
                None => self.line(&format!(
                    "let {} = Value::Var(self.solver.builtin.fresh(Some({}), None));",
                    value_name(name),
                    str_literal(name)
                )),
                Some(expr) => {
                    let value = self.value(expr);
                    self.line(&format!(
                        "let {} = Value::Var(self.solver.builtin.fresh(None, Some(ops::require({value}, {})?)));",
                        value_name(name),
                        str_literal(name)
                    ));
                }
            },
            Stmt::BindParam {
                name,
                constraint,
                index,
            } => {
                self.line(&format!(
                    "let {} = {constraint}.args[{index}].clone();",
                    value_name(name)
                ));
            }
            Stmt::NewId { name } => {
                self.line(&format!("let {name} = self.solver.chr.new_id();"));
            }
            Stmt::Insert {
                id,
                signature,
                args,
            } => {
                let rendered: Vec<String> = args
                    .iter()
                    .map(|arg| match arg {
                        Expr::Var(name) => format!("{}.clone()", value_name(name)),
                        other => {
                            let value = self.value(other);
                            format!("ops::require({value}, \"insert\")?")
                        }
                    })
                    .collect();
                self.line(&format!(
                    "self.solver.chr.insert(StoredConstraint::new({}, vec![{}]), {id})?;",
                    signature_expr(signature),
                    rendered.join(", ")
                ));
            }
            Stmt::Activate {
                signature,
                id,
                args,
            } => {
                let rendered: Vec<String> = args
                    .iter()
                    .map(|name| format!("{}.clone()", value_name(name)))
                    .collect();
                self.line(&format!(
                    "self.__activate_{}_{}({id}, &[{}], false)?;",
                    signature.symbol,
                    signature.arity,
                    rendered.join(", ")
                ));
            }
            Stmt::Delete { id } => {
                self.line(&format!("self.solver.chr.delete({id})?;"));
            }
            Stmt::AddToHistory { rule, ids } => {
                self.line(&format!(
                    "self.solver.chr.add_to_history({}, &[{}]);",
                    str_literal(rule),
                    ids.join(", ")
                ));
            }
            Stmt::Commit => {
                self.line("self.__commit()?;");
            }
            Stmt::Backtrack => {
                self.line("self.solver.builtin.reset_recent_bindings();");
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                let cond = self.ask(cond);
                self.line(&format!("if {cond} {{"));
                self.indent += 1;
                self.stmts(then);
                self.indent -= 1;
                if otherwise.is_empty() {
                    self.line("}");
                } else {
                    self.line("} else {");
                    self.indent += 1;
                    self.stmts(otherwise);
                    self.indent -= 1;
                    self.line("}");
                }
            }
            Stmt::PartnerLoop {
                id,
                constraint,
                signature,
                body,
            } => {
                self.line(&format!(
                    "for ({id}, {constraint}) in self.solver.chr.snapshot(&{}) {{",
                    signature_expr(signature)
                ));
                self.indent += 1;
                self.stmts(body);
                self.indent -= 1;
                self.line("}");
            }
            Stmt::Tell {
                ask,
                context,
                culprits,
            } => {
                let cond = self.ask(ask);
                self.line(&format!("if !({cond}) {{"));
                self.indent += 1;
                let mut messages = vec![format!("{}.to_string()", str_literal(context))];
                for culprit in culprits {
                    let value = self.value(culprit);
                    messages.push(format!(
                        "{value}.map(|v| ops::display(&self.solver.builtin, &v)).unwrap_or_default()"
                    ));
                }
                self.line(&format!(
                    "return Err(RuntimeError::False {{ messages: vec![{}] }});",
                    messages.join(", ")
                ));
                self.indent -= 1;
                self.line("}");
            }
            Stmt::Fail { messages } => {
                let rendered: Vec<String> = messages
                    .iter()
                    .map(|message| {
                        let value = self.value(message);
                        format!(
                            "{value}.map(|v| ops::display(&self.solver.builtin, &v)).unwrap_or_default()"
                        )
                    })
                    .collect();
                self.line(&format!(
                    "return Err(RuntimeError::False {{ messages: vec![{}] }});",
                    rendered.join(", ")
                ));
            }
            Stmt::Undefined { symbol, arity } => {
                self.line(&format!(
                    "return Err(RuntimeError::UndefinedConstraint {{ symbol: {}.to_string(), arity: {arity} }});",
                    str_literal(symbol)
                ));
            }
            Stmt::Return { fired } => {
                self.line(&format!("return Ok({fired});"));
            }
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Render an expression in ask (boolean) position.
    fn ask(&mut self, expr: &Expr) -> String {
        match expr {
            Expr::Const(Const::Bool(b)) => b.to_string(),
            Expr::Var(name) => value_name(name),
            Expr::Unary {
                op: UnaryOp::Not,
                operand,
            } => format!("!({})", self.ask(operand)),
            Expr::Binary {
                op: BinOp::And,
                left,
                right,
            } => format!("({} && {})", self.ask(left), self.ask(right)),
            Expr::Binary {
                op: BinOp::Or,
                left,
                right,
            } => format!("({} || {})", self.ask(left), self.ask(right)),
            Expr::Binary { op, left, right } if cmp_op(*op).is_some() => {
                let lv = self.value(left);
                let rv = self.value(right);
                format!(
                    "ops::compare(&self.solver.builtin, CmpOp::{}, {lv}, {rv})",
                    cmp_op(*op).unwrap_or("Eq")
                )
            }
            Expr::IsBound(operand) => {
                let value = self.value(operand);
                format!("ops::is_bound_opt(&self.solver.builtin, {value}.as_ref())")
            }
            Expr::Unify { left, right } => {
                let lv = self.value(left);
                let rv = self.value(right);
                format!("ops::unify_opt(&mut self.solver.builtin, {lv}, {rv})?")
            }
            Expr::Match { subject, pattern } => {
                let subject = self.value(subject);
                let pattern = self.pattern(pattern);
                format!("ops::matches_opt(&mut self.solver.builtin, {subject}, &{pattern})?")
            }
            Expr::Alive(id) => format!("self.solver.chr.alive({id})?"),
            Expr::AllDifferent(ids) => format!("all_different(&[{}])", ids.join(", ")),
            Expr::InHistory { rule, ids } => format!(
                "self.solver.chr.in_history({}, &[{}])",
                str_literal(rule),
                ids.join(", ")
            ),
            other => {
                let value = self.value(other);
                format!("matches!({value}, Some(Value::Bool(true)))")
            }
        }
    }

    /// Render an expression in value position; the result has type
    /// `Option<Value>` in the generated code.
    fn value(&mut self, expr: &Expr) -> String {
        match expr {
            Expr::Const(Const::Int(n)) => format!("Some(Value::Int({n}))"),
            Expr::Const(Const::Str(s)) => {
                format!("Some(Value::Str({}.to_string()))", str_literal(s))
            }
            Expr::Const(Const::Bool(b)) => format!("Some(Value::Bool({b}))"),
            Expr::Var(name) => format!("Some({}.clone())", value_name(name)),
            Expr::List(items) => {
                let rendered: Vec<String> = items.iter().map(|item| self.value(item)).collect();
                format!("ops::list(vec![{}])", rendered.join(", "))
            }
            Expr::Tuple(items) => {
                let rendered: Vec<String> = items.iter().map(|item| self.value(item)).collect();
                format!("ops::tuple(vec![{}])", rendered.join(", "))
            }
            Expr::Dict(entries) => {
                let rendered: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("({}, {})", self.value(k), self.value(v)))
                    .collect();
                format!("ops::dict(vec![{}])", rendered.join(", "))
            }
            Expr::Unary {
                op: UnaryOp::Neg,
                operand,
            } => format!("ops::neg(&self.solver.builtin, {})", self.value(operand)),
            Expr::Unary {
                op: UnaryOp::Not,
                operand,
            } => format!(
                "ops::bool_not(&self.solver.builtin, {})",
                self.value(operand)
            ),
            Expr::Binary { op, left, right } => {
                let lv = self.value(left);
                let rv = self.value(right);
                if let Some(num) = num_op(*op) {
                    format!("ops::arith(&self.solver.builtin, NumOp::{num}, {lv}, {rv})")
                } else if let Some(cmp) = cmp_op(*op) {
                    format!(
                        "Some(Value::Bool(ops::compare(&self.solver.builtin, CmpOp::{cmp}, {lv}, {rv})))"
                    )
                } else if *op == BinOp::And {
                    format!("ops::bool_and(&self.solver.builtin, {lv}, {rv})")
                } else {
                    format!("ops::bool_or(&self.solver.builtin, {lv}, {rv})")
                }
            }
            other => {
                // Ask-only nodes surface as boolean values.
                let cond = self.ask(other);
                format!("Some(Value::Bool({cond}))")
            }
        }
    }

    /// Render an expression as a plain `Value` (pattern leaves are always
    /// in-scope variables or constants).
    fn plain_value(&mut self, expr: &Expr) -> String {
        match expr {
            Expr::Const(Const::Int(n)) => format!("Value::Int({n})"),
            Expr::Const(Const::Str(s)) => format!("Value::Str({}.to_string())", str_literal(s)),
            Expr::Const(Const::Bool(b)) => format!("Value::Bool({b})"),
            Expr::Var(name) => format!("{}.clone()", value_name(name)),
            other => {
                let value = self.value(other);
                format!("ops::require({value}, \"pattern\")?")
            }
        }
    }

    fn pattern(&mut self, pattern: &Pattern) -> String {
        match pattern {
            Pattern::Bind(name) => {
                format!("MatchPattern::Bind({}.clone())", value_name(name))
            }
            Pattern::Equal(expr) => format!("MatchPattern::Equal({})", self.plain_value(expr)),
            Pattern::List(items) => {
                let rendered: Vec<String> = items.iter().map(|item| self.pattern(item)).collect();
                format!("MatchPattern::List(vec![{}])", rendered.join(", "))
            }
            Pattern::Tuple(items) => {
                let rendered: Vec<String> = items.iter().map(|item| self.pattern(item)).collect();
                format!("MatchPattern::Tuple(vec![{}])", rendered.join(", "))
            }
            Pattern::Dict(entries) => {
                let rendered: Vec<String> = entries
                    .iter()
                    .map(|(key, value)| {
                        let key = self.plain_value(key);
                        let value = self.pattern(value);
                        format!("({key}, {value})")
                    })
                    .collect();
                format!("MatchPattern::Dict(vec![{}])", rendered.join(", "))
            }
        }
    }
}

fn num_op(op: BinOp) -> Option<&'static str> {
    Some(match op {
        BinOp::Add => "Add",
        BinOp::Sub => "Sub",
        BinOp::Mul => "Mul",
        BinOp::Div => "Div",
        BinOp::Rem => "Rem",
        _ => return None,
    })
}

fn cmp_op(op: BinOp) -> Option<&'static str> {
    Some(match op {
        BinOp::Eq => "Eq",
        BinOp::Ne => "Ne",
        BinOp::Lt => "Lt",
        BinOp::Le => "Le",
        BinOp::Gt => "Gt",
        BinOp::Ge => "Ge",
        _ => return None,
    })
}
