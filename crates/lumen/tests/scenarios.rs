//! End-to-end scenarios run through the public `Interpreter` surface,
//! independent of the unit tests living alongside the VM/compiler.

use lumen::{CollectingDiagnostics, CollectingOut, Interpreter, Value};
use pretty_assertions::assert_eq;

fn run(source: &str) -> (Value, Interpreter, CollectingOut, CollectingDiagnostics) {
    let mut interp = Interpreter::new();
    let mut out = CollectingOut::default();
    let mut diag = CollectingDiagnostics::default();
    let value = interp.run(source, &mut out, &mut diag).expect("program should run");
    (value, interp, out, diag)
}

#[test]
fn arithmetic_and_precedence() {
    let (value, interp, _, _) = run("1 + 2 * 3;");
    assert_eq!(interp.display(&value), "7");
}

#[test]
fn closure_captures_parameter() {
    let (_, _, out, _) = run(
        "function make(n) { function inc(x) { return x + n; } return inc; } \
         var f = make(10); print(f(5));",
    );
    assert_eq!(out.0, "15\n");
}

#[test]
fn while_loop_and_mutation() {
    let (_, _, out, _) = run(
        "var i = 0; var s = 0; \
         while (i < 5) { s = s + i; i = i + 1; } print(s);",
    );
    assert_eq!(out.0, "10\n");
}

#[test]
fn class_and_inheritance() {
    let (_, _, out, _) = run(
        r#"class A { greet() { return "A"; } }
           class B extends A { greet() { return super.greet() + "B"; } }
           print(B().greet());"#,
    );
    assert_eq!(out.0, "AB\n");
}

#[test]
fn table_and_iteration() {
    let (_, _, out, _) = run(
        r#"var t = table(); t["a"] = 1; t["b"] = 2;
           var s = 0;
           for (k in t) { s = s + t[k]; } print(s);"#,
    );
    assert_eq!(out.0, "3\n");
}

#[test]
fn eval_in_scope() {
    let (_, _, out, _) = run(r#"var x = 2; print(eval("x + 40"));"#);
    assert_eq!(out.0, "42\n");
}

#[test]
fn format_int_round_trips_through_int() {
    let (_, _, out, _) = run(r#"var v = 1234; print(int(format(v, "d")));"#);
    assert_eq!(out.0, "1234\n");
}

#[test]
fn list_of_range_iter_equals_the_list_built_directly() {
    let (_, _, out, _) = run(
        "var a = list(0..5); var b = list(); \
         for (x in 0..5) { b.append(x); } \
         print(len(a) == len(b));",
    );
    assert_eq!(out.0, "true\n");
}

#[test]
fn tuple_of_tuple_contents_round_trips() {
    let (_, _, out, _) = run(
        "var t = tuple(1, 2, 3); \
         var items = list(iter(t)); \
         var u = tuple(items[0], items[1], items[2]); \
         print(u[0] == t[0] && u[1] == t[1] && u[2] == t[2]);",
    );
    assert_eq!(out.0, "true\n");
}

#[test]
fn mixed_int_float_arithmetic_promotes_to_float() {
    let (_, _, out, _) = run("print(type(1 + 2.0)); print(type(2.0 + 1));");
    assert_eq!(out.0, "float\nfloat\n");
}

#[test]
fn unset_global_is_a_diagnostic_not_a_fault() {
    let (value, interp, _, diag) = run("missing_name;");
    assert_eq!(interp.display(&value), "undefined");
    assert_eq!(diag.0.len(), 1);
    assert!(diag.0[0].contains("missing_name"));
}
