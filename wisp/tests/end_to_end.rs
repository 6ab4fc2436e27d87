//! End-to-end scenarios from spec.md §8: whole programs run through
//! a fresh `Context`, checked against their documented result.

use wisp::Context;
use wisp_common::Source;

#[test]
fn addition_of_three_integers() {
    let mut ctx = Context::new();
    wisp::kernel::install(&mut ctx);
    let result = ctx.exec(Source::source("(+ 1 2 3)")).unwrap();
    assert_eq!(ctx.heap().read_integer(result), 6);
}

#[test]
fn recursive_factorial() {
    let mut ctx = Context::new();
    wisp::kernel::install(&mut ctx);
    let source = "(def fact (lambda (n) (if (< n 2) 1 (* n (fact (- n 1)))))) (fact 6)";
    let result = ctx.exec(Source::source(source)).unwrap();
    assert_eq!(ctx.heap().read_integer(result), 720);
}

#[test]
fn let_binding_sums_its_locals() {
    let mut ctx = Context::new();
    wisp::kernel::install(&mut ctx);
    let result = ctx.exec(Source::source("(let ((x 10) (y 20)) (+ x y))")).unwrap();
    assert_eq!(ctx.heap().read_integer(result), 30);
}

#[test]
fn closures_capture_their_defining_environment() {
    let mut ctx = Context::new();
    wisp::kernel::install(&mut ctx);
    let source = "(def make-adder (lambda (n) (lambda (x) (+ x n)))) ((make-adder 3) 4)";
    let result = ctx.exec(Source::source(source)).unwrap();
    assert_eq!(ctx.heap().read_integer(result), 7);
}

#[test]
fn list_length_counts_a_proper_list() {
    let mut ctx = Context::new();
    wisp::kernel::install(&mut ctx);
    let result = ctx.exec(Source::source("(length (cons 1 (cons 2 (cons 3 null))))")).unwrap();
    assert_eq!(ctx.heap().read_integer(result), 3);
}

#[test]
fn recur_runs_in_constant_call_stack_depth() {
    let mut ctx = Context::new();
    wisp::kernel::install(&mut ctx);
    let source = "(def count (lambda (n acc) (if (< n 1) acc (recur (- n 1) (+ acc 1))))) (count 1000 0)";
    let result = ctx.exec(Source::source(source)).unwrap();
    assert_eq!(ctx.heap().read_integer(result), 1000);
}

#[test]
fn call_with_255_arguments_succeeds() {
    let args: Vec<String> = (0..255).map(|i| i.to_string()).collect();
    let params: Vec<String> = (0..255).map(|i| format!("a{}", i)).collect();
    let source = format!(
        "(def sum255 (lambda ({}) (+ {}))) (sum255 {})",
        params.join(" "),
        params.join(" "),
        args.join(" "),
    );

    let mut ctx = Context::new();
    wisp::kernel::install(&mut ctx);
    let result = ctx.exec(Source::source(&source)).unwrap();
    let expected: i32 = (0..255).sum();
    assert_eq!(ctx.heap().read_integer(result), expected);
}

#[test]
fn call_with_256_arguments_is_a_compile_error() {
    let params: Vec<String> = (0..256).map(|i| format!("a{}", i)).collect();
    let args: Vec<String> = (0..256).map(|i| i.to_string()).collect();
    let source = format!("(def f (lambda ({}) 0)) (f {})", params.join(" "), args.join(" "));

    let mut ctx = Context::new();
    wisp::kernel::install(&mut ctx);
    assert!(ctx.exec(Source::source(&source)).is_err());
}

#[test]
fn lambda_with_a_lone_string_body_and_no_further_statements_returns_it() {
    let mut ctx = Context::new();
    wisp::kernel::install(&mut ctx);
    let result = ctx.exec(Source::source(r#"((lambda () "hello"))"#)).unwrap();
    assert_eq!(ctx.heap().read_string(result), "hello");
}
