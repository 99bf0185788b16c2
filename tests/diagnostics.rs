//! Compile error messages and positions

use rstest::rstest;
use stencil::{compile, CompileError, CompileOptions};

fn compile_err(source: &str) -> CompileError {
    compile(source, &CompileOptions::default()).unwrap_err()
}

#[rstest]
#[case("{if x}", "expected one of `{endif}`, `{elif}`, `{else}`", 1, 7)]
#[case("{if x}a{else}b{elif y}", "expected `{endif}`", 1, 15)]
#[case("a\nb {for xs v}", "expected `{endfor}`", 2, 13)]
#[case("{echo x y}", "expected directive close", 1, 9)]
#[case("text {endif}", "expected end of template", 1, 6)]
#[case("{set 1 2}", "expected assignable expression", 1, 6)]
#[case("{rem}never", "expected closing `{endrem}`", 1, 6)]
#[case("{raw}never", "expected closing `{endraw}`", 1, 6)]
#[case("{for items}{endfor}", "expected identifier", 1, 11)]
#[case("héllo\n  wörld {echo (1}", "expected `)`", 2, 17)]
fn test_error_positions(
    #[case] source: &str,
    #[case] message: &str,
    #[case] line: usize,
    #[case] column: usize,
) {
    let err = compile_err(source);
    assert_eq!(err.message, message);
    assert_eq!((err.line, err.column), (line, column), "{}", err);
}

#[test]
fn test_unclosed_if_is_never_truncated() {
    let err = compile_err("before {if ready}after");
    assert_eq!(err.line, 1);
    assert!(err.column > "before {if".len());
}

#[test]
fn test_snippet_points_at_failure() {
    let err = compile_err("{if x}");
    assert_eq!(err.snippet, "{if x}\n      ^");
    assert_eq!(
        err.to_string(),
        "line 1, column 7: expected one of `{endif}`, `{elif}`, `{else}`\n{if x}\n      ^"
    );
}

#[test]
fn test_nesting_depth_is_limited() {
    let nested = |depth: usize| format!("{}x{}", "{if a}".repeat(depth), "{endif}".repeat(depth));

    assert!(compile(&nested(5), &CompileOptions::default()).is_ok());

    let err = compile_err(&nested(40));
    assert!(
        err.message.starts_with("nesting exceeds the maximum depth of 32"),
        "{}",
        err.message
    );

    let shallow = CompileOptions::default().with_max_depth(64);
    assert!(compile(&nested(40), &shallow).is_ok());
}

#[rstest]
#[case("if", "`if` is a built-in directive")]
#[case("endfor", "`endfor` is a built-in directive")]
#[case("9lives", "`9lives` is not a valid directive name")]
fn test_invalid_registrations(#[case] name: &str, #[case] message: &str) {
    let options = CompileOptions::default().with_output_function(name);
    let err = compile("anything", &options).unwrap_err();
    assert_eq!(err.message, message);
}

#[test]
fn test_reserved_format_needs_a_handler() {
    let err = compile_err("{format x}");
    assert_eq!(err.message, "directive `format` has no registered handler");

    let options = CompileOptions::default().with_directive("format", |out, _| {
        out.print_literal("formatted");
    });
    let template = compile("{format x}", &options).unwrap();
    assert_eq!(
        template.render(&stencil::Bindings::new()).unwrap(),
        "formatted"
    );
}
