//! End-to-end scenarios for the bytecode engine: compile a snippet to a
//! chunk, run it on a fresh VM, and inspect the resulting globals.

use lox::bytecode::value::Value;
use lox::bytecode::vm::Vm;
use lox::bytecode::{run_with, BytecodeError};
use lox::common::source::Source;

fn run_ok(src: &str) -> Vm {
    let mut vm = Vm::new();
    match run_with(&mut vm, Source::source(src)) {
        Ok(()) => vm,
        Err(BytecodeError::Static(errors)) => panic!("unexpected compile errors: {:?}", errors.len()),
        Err(BytecodeError::Runtime(err)) => panic!("unexpected runtime error: {}", err),
    }
}

#[test]
fn arithmetic_precedence() {
    let mut vm = run_ok("var result = 1 + 2 * 3 - 4 / 2;");
    assert_eq!(vm.get_global("result"), Some(Value::Number(5.0)));
}

#[test]
fn globals_persist_across_statements_in_one_program() {
    let mut vm = run_ok("var a = 1; var b = a + 1; var c = a + b;");
    assert_eq!(vm.get_global("a"), Some(Value::Number(1.0)));
    assert_eq!(vm.get_global("b"), Some(Value::Number(2.0)));
    assert_eq!(vm.get_global("c"), Some(Value::Number(3.0)));
}

#[test]
fn globals_persist_across_separate_run_with_calls() {
    let mut vm = Vm::new();
    run_with(&mut vm, Source::source("var x = 1;")).expect("first line");
    run_with(&mut vm, Source::source("x = x + 1;")).expect("second line");
    assert_eq!(vm.get_global("x"), Some(Value::Number(2.0)));
}

#[test]
fn locals_shadow_globals_within_their_block() {
    let mut vm = run_ok(r#"
        var x = "outer";
        {
            var x = "inner";
        }
        var after = x;
    "#);
    assert_eq!(vm.get_global("after"), Some(Value::string(vm_intern(&mut vm, "outer"))));
}

fn vm_intern(vm: &mut Vm, s: &str) -> std::rc::Rc<lox::bytecode::value::StrObj> {
    vm.interner().intern(s)
}

#[test]
fn for_loop_counts_up() {
    let mut vm = run_ok(r#"
        var total = 0;
        for (var i = 0; i < 5; i = i + 1) {
            total = total + i;
        }
    "#);
    assert_eq!(vm.get_global("total"), Some(Value::Number(10.0)));
}

#[test]
fn logical_and_or_short_circuit_to_the_operand_value() {
    let mut vm = run_ok(r#"
        var a = false and 1;
        var b = true or 2;
        var c = nil or "fallback";
    "#);
    assert_eq!(vm.get_global("a"), Some(Value::Bool(false)));
    assert_eq!(vm.get_global("b"), Some(Value::Bool(true)));
    match vm.get_global("c") {
        Some(Value::Obj(s)) => assert_eq!(s.chars, "fallback"),
        other => panic!("expected interned string, got {:?}", other.is_some()),
    }
}

#[test]
fn string_concatenation_produces_a_fresh_interned_value() {
    let mut vm = run_ok(r#"var greeting = "hello, " + "world";"#);
    match vm.get_global("greeting") {
        Some(Value::Obj(s)) => assert_eq!(s.chars, "hello, world"),
        other => panic!("expected interned string, got {:?}", other.is_some()),
    }
}

#[test]
fn function_and_class_syntax_is_a_compile_error() {
    let mut vm = Vm::new();
    let err = run_with(&mut vm, Source::source("fun f() {}")).err().expect("should fail to compile");
    assert!(matches!(err, BytecodeError::Static(_)));
}

#[test]
fn runtime_type_error_on_adding_string_and_number() {
    let mut vm = Vm::new();
    let err = run_with(&mut vm, Source::source(r#"print "a" + 1;"#)).err().expect("should be a runtime error");
    match err {
        BytecodeError::Runtime(err) => assert!(err.message.contains("Operands must be two numbers or two strings")),
        BytecodeError::Static(_) => panic!("expected a runtime error, not a compile error"),
    }
}
