//! End-to-end solver scenarios: compile CHR programs through the full
//! pipeline and drive them through the IR interpreter.

use chr_engine::interp::DynSolver;
use chr_engine::runtime::{RuntimeError, Value};

fn solver(source: &str) -> DynSolver {
    DynSolver::from_source(source).expect("program compiles")
}

/// Store contents as (signature, resolved args) pairs.
fn dump(solver: &DynSolver) -> Vec<(String, Vec<Value>)> {
    solver
        .dump()
        .into_iter()
        .map(|c| (c.signature.to_string(), c.args))
        .collect()
}

const GCD: &str = r"
    class GCDSolver.
    constraints gcd/1.
    r1 @ gcd($N) <=> $N == 0 | true.
    r2 @ gcd($M) \ gcd($N) <=> $M <= $N | gcd($N - $M).
";

#[test]
fn test_gcd_quiescence() {
    let mut s = solver(GCD);
    s.post("gcd", &[Value::Int(100)]).unwrap();
    s.post("gcd", &[Value::Int(66)]).unwrap();
    assert_eq!(dump(&s), vec![("gcd/1".to_string(), vec![Value::Int(2)])]);
}

#[test]
fn test_gcd_zero_is_consumed() {
    let mut s = solver(GCD);
    s.post("gcd", &[Value::Int(0)]).unwrap();
    assert!(dump(&s).is_empty());
}

#[test]
fn test_propagation_fires_once_per_tuple() {
    let source = "
        class P.
        constraints a/0, b/0.
        t @ a ==> b.
    ";
    let mut s = solver(source);
    s.post("a", &[]).unwrap();
    assert_eq!(
        dump(&s),
        vec![("a/0".to_string(), vec![]), ("b/0".to_string(), vec![])]
    );

    // Posting b twice does not re-trigger the propagation on `a`.
    let mut s = solver(source);
    s.post("b", &[]).unwrap();
    s.post("b", &[]).unwrap();
    assert_eq!(
        dump(&s),
        vec![("b/0".to_string(), vec![]), ("b/0".to_string(), vec![])]
    );
}

const LEQ: &str = r"
    class Leq.
    constraints leq/2.
    refl @ leq($X, $X) <=> true.
    anti @ leq($X, $Y), leq($Y, $X) <=> $X = $Y.
    trans @ leq($X, $Y), leq($Y, $Z) ==> leq($X, $Z).
";

#[test]
fn test_leq_antisymmetry_binds_variables() {
    let mut s = solver(LEQ);
    let x = s.fresh(Some("X"));
    let y = s.fresh(Some("Y"));
    s.post("leq", &[x.clone(), y.clone()]).unwrap();
    s.post("leq", &[y.clone(), x.clone()]).unwrap();

    assert!(dump(&s).is_empty());
    assert!(s.solver().builtin.ask_eq(&x, &y));
}

#[test]
fn test_leq_transitivity_closes() {
    let mut s = solver(LEQ);
    let x = s.fresh(Some("X"));
    let y = s.fresh(Some("Y"));
    let z = s.fresh(Some("Z"));
    s.post("leq", &[x.clone(), y.clone()]).unwrap();
    s.post("leq", &[y.clone(), z.clone()]).unwrap();

    // x <= y, y <= z, and the derived x <= z.
    assert_eq!(dump(&s).len(), 3);

    // Closing the cycle collapses everything to x = y = z.
    s.post("leq", &[z.clone(), x.clone()]).unwrap();
    assert!(dump(&s).is_empty());
    assert!(s.solver().builtin.ask_eq(&x, &z));
}

#[test]
fn test_delayed_wakeup_on_commit() {
    let source = "
        class G.
        constraints gcd/1.
        r @ gcd($N) <=> $N == 0 | true.
    ";
    let mut s = solver(source);
    let v = s.fresh(Some("V"));
    s.post("gcd", &[v.clone()]).unwrap();
    assert_eq!(dump(&s).len(), 1);

    // Binding the variable wakes the delayed activation and fires r.
    s.tell(&v, &Value::Int(0)).unwrap();
    assert!(dump(&s).is_empty());
}

#[test]
fn test_delayed_activation_does_not_refire() {
    let source = "
        class G.
        constraints c/1, hit/0.
        r @ c($N) ==> $N == 1 | hit.
    ";
    let mut s = solver(source);
    let v = s.fresh(None);
    s.post("c", &[v.clone()]).unwrap();
    s.tell(&v, &Value::Int(1)).unwrap();
    assert_eq!(dump(&s).len(), 2);

    // A second commit with no new bindings must not rerun the suspension.
    s.tell(&v, &Value::Int(1)).unwrap();
    assert_eq!(dump(&s).len(), 2);
}

#[test]
fn test_minimum_of_permutation() {
    use rand::seq::SliceRandom;

    let source = r"
        class Min.
        constraints min/1.
        r @ min($X) \ min($Y) <=> $X <= $Y | true.
    ";
    let mut s = solver(source);

    let mut values: Vec<i64> = (0..1000).collect();
    values.shuffle(&mut rand::thread_rng());
    values.truncate(200);
    let expected = *values.iter().min().expect("non-empty sample");

    for &v in &values {
        s.post("min", &[Value::Int(v)]).unwrap();
        // The store never holds more than the current minimum.
        assert_eq!(dump(&s).len(), 1);
    }
    assert_eq!(
        dump(&s),
        vec![("min/1".to_string(), vec![Value::Int(expected)])]
    );
}

#[test]
fn test_guard_failure_is_local() {
    // The guard binds $X speculatively, then fails; the binding must be
    // unwound and the store left untouched.
    let source = "
        class P.
        constraints p/1.
        r @ p($X) <=> $X = 1, false | true.
    ";
    let mut s = solver(source);
    let v = s.fresh(Some("V"));
    s.post("p", &[v.clone()]).unwrap();

    assert_eq!(dump(&s).len(), 1);
    assert!(matches!(dump(&s)[0].1[0], Value::Var(_)));
    assert_eq!(s.solver().builtin.trail_depth(), 0);
}

#[test]
fn test_inapplicable_rules_are_a_noop() {
    let source = "
        class P.
        constraints a/0, c/0.
        r @ a <=> c.
    ";
    let mut s = solver(source);
    s.post("c", &[]).unwrap();
    assert_eq!(dump(&s), vec![("c/0".to_string(), vec![])]);
    assert_eq!(s.solver().chr.history_len("r"), 0);
    assert_eq!(s.solver().builtin.trail_depth(), 0);
}

#[test]
fn test_undeclared_body_arity_raises_at_runtime() {
    let source = "
        class P.
        constraints a/0, b/0.
        r @ a <=> b(1).
    ";
    let mut s = solver(source);
    let err = s.post("a", &[]).unwrap_err();
    assert_eq!(
        err,
        RuntimeError::UndefinedConstraint {
            symbol: "b".to_string(),
            arity: 1,
        }
    );
}

#[test]
fn test_body_false_aborts_query() {
    let source = r#"
        class E.
        constraints error/1.
        r @ error($M) <=> false($M).
    "#;
    let mut s = solver(source);
    let err = s
        .post("error", &[Value::Str("this is an error message!".into())])
        .unwrap_err();
    let RuntimeError::False { messages } = err else {
        panic!("expected CHRFalse, got {err:?}");
    };
    assert_eq!(messages, vec!["this is an error message!".to_string()]);
}

#[test]
fn test_sum_accumulator() {
    let source = "
        class SumSolver.
        constraints sum/1, read/1.
        zero @ sum($X) <=> $X == 0 | true.
        merge @ sum($X), sum($Y) <=> sum($X + $Y).
        read @ sum($S) \\ read($X) <=> $X = $S.
    ";
    let mut s = solver(source);
    s.post("sum", &[Value::Int(0)]).unwrap();
    assert!(dump(&s).is_empty());

    s.post("sum", &[Value::Int(1)]).unwrap();
    s.post("sum", &[Value::Int(1)]).unwrap();
    assert_eq!(dump(&s), vec![("sum/1".to_string(), vec![Value::Int(2)])]);

    let v = s.fresh(None);
    s.post("read", &[v.clone()]).unwrap();
    assert_eq!(dump(&s).len(), 1);
    assert!(s.solver().builtin.ask_eq(&v, &Value::Int(2)));
}

#[test]
fn test_repeated_head_variables_require_equality() {
    let source = "
        class M.
        constraints m/1.
        r @ m($X), m($X) <=> true.
    ";
    let mut s = solver(source);
    let x = s.fresh(Some("X"));
    let y = s.fresh(Some("Y"));
    s.post("m", &[x.clone()]).unwrap();
    s.post("m", &[y.clone()]).unwrap();

    // Two distinct unbound variables do not match a repeated-variable head.
    assert_eq!(dump(&s).len(), 2);

    // Once the variables are aliased, the rule fires through the wake-up.
    s.tell(&x, &y).unwrap();
    assert!(dump(&s).is_empty());
}

#[test]
fn test_container_patterns_destructure() {
    let source = "
        class TripleSolver.
        constraints triple/1, single/1.
        t @ triple(($A, $B, $C)) <=> single($A), single($B), single($C).
        l @ triple([$A, $B]) <=> single($A), single($B), single(5).
    ";
    let mut s = solver(source);
    s.post(
        "triple",
        &[Value::Tuple(vec![
            Value::Int(1),
            Value::Int(2),
            Value::Int(3),
        ])],
    )
    .unwrap();
    assert_eq!(
        dump(&s),
        vec![
            ("single/1".to_string(), vec![Value::Int(1)]),
            ("single/1".to_string(), vec![Value::Int(2)]),
            ("single/1".to_string(), vec![Value::Int(3)]),
        ]
    );

    let mut s = solver(source);
    s.post("triple", &[Value::List(vec![Value::Int(7), Value::Int(8)])])
        .unwrap();
    assert_eq!(
        dump(&s),
        vec![
            ("single/1".to_string(), vec![Value::Int(7)]),
            ("single/1".to_string(), vec![Value::Int(8)]),
            ("single/1".to_string(), vec![Value::Int(5)]),
        ]
    );

    // A shape that matches no pattern stays in the store.
    let mut s = solver(source);
    s.post("triple", &[Value::Int(9)]).unwrap();
    assert_eq!(dump(&s).len(), 1);
}

#[test]
fn test_fibonacci_accumulates() {
    // fib(n) computed by peano-style stepping on a pair accumulator.
    let source = "
        class Fib.
        constraints fib/1, acc/3, read/1.
        start @ fib($N) <=> acc($N, 0, 1).
        done @ acc(0, $A, $B) <=> read($A).
        step @ acc($N, $A, $B) <=> $N > 0 | acc($N - 1, $B, $A + $B).
    ";
    let expected = [0, 1, 1, 2, 3, 5, 8, 13, 21, 34, 55];
    for (n, fib_n) in expected.into_iter().enumerate() {
        let mut s = solver(source);
        s.post("fib", &[Value::Int(n as i64)]).unwrap();
        assert_eq!(
            dump(&s),
            vec![("read/1".to_string(), vec![Value::Int(fib_n)])],
            "fib({n})"
        );
    }
}
