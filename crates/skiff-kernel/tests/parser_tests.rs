//! Parser tests using rstest for parameterization.
//!
//! Programs are rendered as compact s-expressions so expected shapes read
//! on one line.

use rstest::rstest;
use skiff_kernel::ast::{Expr, Literal, Program, Stmt};
use skiff_kernel::parser::parse;

fn sexpr_expr(expr: &Expr) -> String {
    match expr {
        Expr::Literal(Literal::Null) => "null".to_string(),
        Expr::Literal(Literal::Bool(b)) => b.to_string(),
        Expr::Literal(Literal::Int(i)) => i.to_string(),
        Expr::Literal(Literal::Float(x)) => format!("{x:?}"),
        Expr::Literal(Literal::String(s)) => format!("{s:?}"),
        Expr::Ident(name) => name.clone(),
        Expr::List(items) => {
            let items: Vec<String> = items.iter().map(sexpr_expr).collect();
            format!("(list {})", items.join(" ")).replace("(list )", "(list)")
        }
        Expr::Member { target, field } => format!("(. {} {})", sexpr_expr(target), field),
        Expr::Call { name, args, .. } => {
            let args: Vec<String> = args.iter().map(sexpr_expr).collect();
            if args.is_empty() {
                format!("(call {name})")
            } else {
                format!("(call {name} {})", args.join(" "))
            }
        }
        Expr::Neg(inner) => format!("(neg {})", sexpr_expr(inner)),
        Expr::Binary { op, lhs, rhs } => format!("({op} {} {})", sexpr_expr(lhs), sexpr_expr(rhs)),
    }
}

fn sexpr(program: &Program) -> String {
    program
        .stmts
        .iter()
        .map(|stmt| match stmt {
            Stmt::Let { name, value } => format!("(let {name} {})", sexpr_expr(value)),
            Stmt::Expr(expr) => sexpr_expr(expr),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_ok(input: &str) -> String {
    let program = parse(input).unwrap_or_else(|e| panic!("parse error for {input:?}: {e}"));
    sexpr(&program)
}

// =============================================================================
// Literals and bindings
// =============================================================================

#[rstest]
#[case::int("42", "42")]
#[case::float("2.5", "2.5")]
#[case::string_double(r#""hi""#, r#""hi""#)]
#[case::string_single("'hi'", r#""hi""#)]
#[case::bools("true; false", "true false")]
#[case::null("null", "null")]
#[case::empty_list("[]", "(list)")]
#[case::list("[1, 'a', null]", r#"(list 1 "a" null)"#)]
#[case::trailing_comma("[1, 2,]", "(list 1 2)")]
#[case::multiline_list("[\n  1,\n  2\n]", "(list 1 2)")]
#[case::let_binding("let x = 5", "(let x 5)")]
#[case::let_then_use("let x = 5\nx", "(let x 5) x")]
fn parser_literals(#[case] input: &str, #[case] expected: &str) {
    assert_eq!(parse_ok(input), expected);
}

// =============================================================================
// Operators
// =============================================================================

#[rstest]
#[case::precedence("1 + 2 * 3", "(+ 1 (* 2 3))")]
#[case::left_assoc("1 - 2 - 3", "(- (- 1 2) 3)")]
#[case::parens("(1 + 2) * 3", "(* (+ 1 2) 3)")]
#[case::equality_lowest("1 + 1 == 2", "(== (+ 1 1) 2)")]
#[case::not_equal("a != b", "(!= a b)")]
#[case::negation("-x * 2", "(* (neg x) 2)")]
#[case::double_negation("--1", "(neg (neg 1))")]
#[case::remainder("7 % 3", "(% 7 3)")]
fn parser_operators(#[case] input: &str, #[case] expected: &str) {
    assert_eq!(parse_ok(input), expected);
}

// =============================================================================
// Calls and member access
// =============================================================================

#[rstest]
#[case::call_no_args("pending()", "(call pending)")]
#[case::call_args("after(10, 42)", "(call after 10 42)")]
#[case::member("project.name", "(. project name)")]
#[case::member_chain("a.b.c", "(. (. a b) c)")]
#[case::member_of_call("require('util').answer", r#"(. (call require "util") answer)"#)]
#[case::nested_calls("len(keys(framework))", "(call len (call keys framework))")]
fn parser_calls(#[case] input: &str, #[case] expected: &str) {
    assert_eq!(parse_ok(input), expected);
}

// =============================================================================
// Separators
// =============================================================================

#[rstest]
#[case::semicolons("1; 2; 3", "1 2 3")]
#[case::blank_lines("\n\n1\n\n2\n", "1 2")]
#[case::comments("# header\n1 # trailing\n", "1")]
#[case::empty("", "")]
fn parser_separators(#[case] input: &str, #[case] expected: &str) {
    assert_eq!(parse_ok(input), expected);
}

// =============================================================================
// Errors
// =============================================================================

#[rstest]
#[case::dangling_operator("1 +")]
#[case::missing_close_paren("(1 + 2")]
#[case::missing_close_bracket("[1, 2")]
#[case::two_exprs_one_line("1 2")]
#[case::let_without_name("let = 1")]
#[case::let_without_value("let x =")]
#[case::member_without_field("a.")]
#[case::lexer_error("1 @ 2")]
#[case::bare_operator("*")]
fn parser_errors(#[case] input: &str) {
    assert!(parse(input).is_err(), "expected error for input: {input:?}");
}

#[test]
fn parser_error_carries_span() {
    let err = parse("1 + )").expect_err("should fail");
    assert_eq!(err.span, 4..5);
    assert!(err.message.contains("expected an expression"), "{}", err.message);
}

#[test]
fn parser_error_at_end_of_input() {
    let err = parse("let x =").expect_err("should fail");
    assert_eq!(err.span, 7..7);
    assert!(err.message.contains("end of input"), "{}", err.message);
}

#[test]
fn parser_rejects_deep_nesting() {
    let input = format!("{}1{}", "(".repeat(300), ")".repeat(300));
    let err = parse(&input).expect_err("too deep");
    assert!(err.message.contains("nested too deeply"));
}

#[rstest]
#[case::sum(format!("1{}", " + 1".repeat(10_000)))]
#[case::product(format!("2{}", " * 2".repeat(10_000)))]
#[case::equality(format!("1{}", " == 1".repeat(10_000)))]
#[case::members(format!("project{}", ".name".repeat(10_000)))]
fn parser_rejects_long_chains(#[case] input: String) {
    let err = parse(&input).expect_err("chain too long");
    assert!(err.message.contains("nested too deeply"), "{}", err.message);
}

#[test]
fn parser_accepts_chains_within_the_limit() {
    let program = parse(&format!("1{}", " + 1".repeat(100))).expect("parse");
    assert_eq!(program.stmts.len(), 1);
    // Sibling chains don't add up: each statement starts from the top.
    let input = format!("let a = 1{0}\nlet b = 1{0}", " + 1".repeat(200));
    assert_eq!(parse(&input).expect("parse").stmts.len(), 2);
}

#[test]
fn parser_call_span_covers_arguments() {
    let program = parse("after(10, 42)").expect("parse");
    let Some(Stmt::Expr(Expr::Call { span, .. })) = program.stmts.first() else {
        panic!("expected a call");
    };
    assert_eq!(*span, 0..13);
}
