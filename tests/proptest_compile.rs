//! Property-based tests for the single-pass compiler and the VM.
//!
//! Tests the following properties:
//! - Every arithmetic expression compiles, with the line map exactly
//!   parallel to the byte stream
//! - Compiled arithmetic runs to completion on the VM
//! - Scopes balance: any nesting of blocks and locals runs cleanly
//! - Equality is total: comparing any two literals never errors

use proptest::prelude::*;

use atto::compiler::compile;
use atto::strings::ActiveStrings;
use atto::vm::VM;

// =============================================================================
// Strategies for generating source text
// =============================================================================

/// An arithmetic expression tree, rendered to source below.
#[derive(Debug, Clone)]
enum Expr {
    Number(u32),
    Negate(Box<Expr>),
    Binary(char, Box<Expr>, Box<Expr>),
    Group(Box<Expr>),
}

fn render(expr: &Expr, out: &mut String) {
    match expr {
        Expr::Number(n) => out.push_str(&n.to_string()),
        Expr::Negate(inner) => {
            out.push_str("-(");
            render(inner, out);
            out.push(')');
        }
        Expr::Binary(op, lhs, rhs) => {
            render(lhs, out);
            out.push(' ');
            out.push(*op);
            out.push(' ');
            render(rhs, out);
        }
        Expr::Group(inner) => {
            out.push('(');
            render(inner, out);
            out.push(')');
        }
    }
}

fn rendered(expr: &Expr) -> String {
    let mut out = String::new();
    render(expr, &mut out);
    out
}

fn arb_expr() -> impl Strategy<Value = Expr> {
    let leaf = (0u32..1000).prop_map(Expr::Number);
    leaf.prop_recursive(6, 48, 3, |inner| {
        prop_oneof![
            inner.clone().prop_map(|e| Expr::Negate(Box::new(e))),
            (
                prop_oneof![Just('+'), Just('-'), Just('*'), Just('/')],
                inner.clone(),
                inner.clone()
            )
                .prop_map(|(op, lhs, rhs)| Expr::Binary(op, Box::new(lhs), Box::new(rhs))),
            inner.prop_map(|e| Expr::Group(Box::new(e))),
        ]
    })
}

/// Source text for a single literal of any type.
fn arb_literal() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("none".to_owned()),
        Just("true".to_owned()),
        Just("false".to_owned()),
        (0u32..1000).prop_map(|n| n.to_string()),
        "[a-z]{0,8}".prop_map(|s| format!("\"{s}\"")),
    ]
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn arithmetic_compiles_with_a_parallel_line_map(expr in arb_expr()) {
        let source = format!("{};", rendered(&expr));

        let strings = ActiveStrings::install();
        let chunk = compile(&source, &strings).expect("arithmetic must compile");

        prop_assert_eq!(chunk.len(), chunk.lines.len());
        // At minimum: one constant push, the statement's pop, and the return.
        prop_assert!(chunk.len() >= 4);
        prop_assert!(chunk.constants.len() <= 256);
    }

    #[test]
    fn arithmetic_runs_to_completion(expr in arb_expr()) {
        let source = format!("print({});", rendered(&expr));
        prop_assert!(VM::default().interpret(&source).is_ok());
    }

    #[test]
    fn nested_scopes_always_balance(depth in 1usize..24) {
        // { var v0 = 0; { var v1 = v0 + 1; { ... } } }
        let mut source = String::new();
        for i in 0..depth {
            if i == 0 {
                source.push_str(&format!("{{ var v{i} = {i}; "));
            } else {
                source.push_str(&format!("{{ var v{i} = v{} + 1; ", i - 1));
            }
        }
        source.push_str(&format!("print(v{});", depth - 1));
        for _ in 0..depth {
            source.push('}');
        }

        prop_assert!(VM::default().interpret(&source).is_ok());
    }

    #[test]
    fn equality_never_errors(lhs in arb_literal(), rhs in arb_literal()) {
        let source = format!("print({lhs} == {rhs}); print({lhs} != {rhs});");
        prop_assert!(VM::default().interpret(&source).is_ok());
    }

    #[test]
    fn a_literal_equals_itself(literal in arb_literal()) {
        let source = format!("if ({literal} == {literal}) 1; else boom;");
        // `boom` is undefined; reaching it would be a runtime error.
        prop_assert!(VM::default().interpret(&source).is_ok());
    }
}
