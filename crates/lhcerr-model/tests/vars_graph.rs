use lhcerr_core::errors::Fault;
use lhcerr_model::{Expr, VarDef, VarGraph};
use proptest::prelude::*;

#[test]
fn parses_and_evaluates_circuit_expressions() {
    let mut graph = VarGraph::new();
    graph.set("kqtf", 1.5);
    graph.set("on_x1", 2.0);
    graph
        .set_expr("kqtf.b1", Expr::parse("kqtf + 0.3 * on_x1 / 2").unwrap())
        .unwrap();
    assert_eq!(graph.value("kqtf.b1").unwrap(), 1.8);
}

#[test]
fn forward_references_evaluate_to_zero_until_defined() {
    let mut graph = VarGraph::new();
    graph
        .set_expr("total", Expr::parse("base + 1").unwrap())
        .unwrap();
    assert_eq!(graph.value("total").unwrap(), 1.0);
    graph.set("base", 2.0);
    assert_eq!(graph.value("total").unwrap(), 3.0);
}

#[test]
fn unknown_variable_is_a_model_fault() {
    let graph = VarGraph::new();
    let err = graph.value("nope").unwrap_err();
    assert!(matches!(err, Fault::Model(info) if info.code == "unknown-variable"));
    assert_eq!(graph.value_or("nope", 7.0), 7.0);
}

#[test]
fn rejects_direct_and_transitive_cycles() {
    let mut graph = VarGraph::new();
    let err = graph
        .set_expr("x", Expr::parse("x + 1").unwrap())
        .unwrap_err();
    assert!(matches!(err, Fault::Model(info) if info.code == "variable-cycle"));

    graph.set_expr("a", Expr::parse("b + 1").unwrap()).unwrap();
    let err = graph
        .set_expr("b", Expr::parse("a * 2").unwrap())
        .unwrap_err();
    assert!(matches!(err, Fault::Model(info) if info.code == "variable-cycle"));
}

#[test]
fn add_to_folds_literals_and_negated_terms() {
    let mut graph = VarGraph::new();
    graph.set("acbh.2r1.b1", 0.25);
    graph.add_to("acbh.2r1.b1", Expr::number(0.25)).unwrap();
    assert_eq!(graph.get("acbh.2r1.b1"), Some(&VarDef::Literal(0.5)));

    graph
        .add_to("acbh.2r1.b1", Expr::parse("-on_x1").unwrap())
        .unwrap();
    match graph.get("acbh.2r1.b1").unwrap() {
        VarDef::Expression(expr) => assert_eq!(expr.to_string(), "0.5 - on_x1"),
        other => panic!("expected expression, got {other:?}"),
    }

    graph.set("on_x1", 0.1);
    assert!((graph.value("acbh.2r1.b1").unwrap() - 0.4).abs() < 1e-15);

    // Adding to an undefined variable defines it as the term itself.
    graph.add_to("fresh", Expr::var("on_x1")).unwrap();
    assert_eq!(graph.value("fresh").unwrap(), 0.1);

    // Adding a term that closes a loop is still rejected.
    let err = graph.add_to("on_x1", Expr::var("on_x1")).unwrap_err();
    assert!(matches!(err, Fault::Model(info) if info.code == "variable-cycle"));
}

#[test]
fn define_default_never_overwrites() {
    let mut graph = VarGraph::new();
    graph.set("on_errors", 0.0);
    graph.define_default("on_errors", 1.0);
    graph.define_default("on_b3s", 1.0);
    assert_eq!(graph.value("on_errors").unwrap(), 0.0);
    assert_eq!(graph.value("on_b3s").unwrap(), 1.0);
}

#[test]
fn set_evaluated_stores_a_literal() {
    let mut graph = VarGraph::new();
    graph.set("kqtf", 0.25);
    graph
        .set_evaluated("kqtf.a81b2", &Expr::parse("kqtf * 2").unwrap());
    assert_eq!(graph.get("kqtf.a81b2"), Some(&VarDef::Literal(0.5)));
    // Later trims of the source no longer propagate.
    graph.set("kqtf", 1.0);
    assert_eq!(graph.value("kqtf.a81b2").unwrap(), 0.5);
}

#[test]
fn dependency_queries_walk_transitively() {
    let mut graph = VarGraph::new();
    graph.set("on_x1", 0.0);
    graph
        .set_expr("acbh.2r1.b1", Expr::parse("on_x1 * 1e-6").unwrap())
        .unwrap();
    graph
        .set_expr("bump", Expr::parse("acbh.2r1.b1 * 2").unwrap())
        .unwrap();

    let deps = graph.dependencies_of("bump");
    assert!(deps.contains("acbh.2r1.b1"));
    assert!(deps.contains("on_x1"));

    let users = graph.dependents_of("on_x1");
    assert!(users.contains("acbh.2r1.b1"));
    assert!(users.contains("bump"));
    assert!(!users.contains("on_x1"));

    assert_eq!(graph.direct_dependencies("bump").len(), 1);
}

#[test]
fn vardef_serde_uses_numbers_and_expression_strings() {
    let literal: VarDef = serde_json::from_str("3.5").unwrap();
    assert_eq!(literal, VarDef::Literal(3.5));

    let parsed: VarDef = serde_json::from_str("\"kqtf + 1\"").unwrap();
    match &parsed {
        VarDef::Expression(expr) => assert_eq!(expr.to_string(), "kqtf + 1"),
        other => panic!("expected expression, got {other:?}"),
    }
    assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"kqtf + 1\"");

    // A numeric string normalizes to a literal.
    let normalized: VarDef = serde_json::from_str("\"42\"").unwrap();
    assert_eq!(normalized, VarDef::Literal(42.0));
}

#[test]
fn from_defs_revalidates_acyclicity() {
    let defs = vec![
        ("a".to_string(), VarDef::Expression(Expr::parse("b").unwrap())),
        ("b".to_string(), VarDef::Expression(Expr::parse("a").unwrap())),
    ];
    let err = VarGraph::from_defs(defs).unwrap_err();
    assert!(matches!(err, Fault::Model(info) if info.code == "variable-cycle"));
}

fn name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,5}(\\.[a-z0-9]{1,4})?"
}

fn expr_strategy() -> impl Strategy<Value = Expr> {
    let leaf = prop_oneof![
        (-1.0e6..1.0e6f64).prop_map(Expr::number),
        name_strategy().prop_map(Expr::var),
    ];
    leaf.prop_recursive(4, 32, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| a.add(b)),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| a.sub(b)),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| a.mul(b)),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| a.div(b)),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| a.pow(b)),
            inner.prop_map(|a| a.neg()),
        ]
    })
}

proptest! {
    #[test]
    fn display_and_parse_round_trip(expr in expr_strategy()) {
        let rendered = expr.to_string();
        let reparsed = Expr::parse(&rendered).unwrap();
        prop_assert_eq!(reparsed, expr);
    }
}
