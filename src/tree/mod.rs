//! The tree-walking engine: `Scanner → Parser → Resolver → Interpreter`
//! (§2, §4.2–§4.4). This is the engine that implements functions,
//! closures, classes, inheritance, and `init` semantics — the bytecode
//! engine in `crate::bytecode` does not (see SPEC_FULL.md §1).

pub mod ast;
pub mod environment;
pub mod interpreter;
pub mod parser;
pub mod resolver;
pub mod value;

use std::rc::Rc;

use crate::common::scanner::Scanner;
use crate::common::source::Source;
use crate::error::{RuntimeError, Syntax};
use interpreter::Interpreter;

pub enum TreeError {
    Static(Vec<Syntax>),
    Runtime(RuntimeError),
}

/// Runs one program from source to completion against a fresh
/// interpreter. Used by the CLI's script mode and by tests; the REPL
/// instead keeps one `Interpreter` alive across lines (see `cli.rs`).
pub fn run(source: Rc<Source>) -> Result<(), TreeError> {
    let mut interpreter = Interpreter::new(Default::default());
    run_with(&mut interpreter, source)
}

/// Runs one program against an existing interpreter, so global bindings
/// persist across calls (REPL semantics, §7: "The REPL resets the
/// static-error flag between lines but not the runtime state").
pub fn run_with(interpreter: &mut Interpreter, source: Rc<Source>) -> Result<(), TreeError> {
    let tokens = Scanner::scan_all(source);
    let (statements, parse_errors) = parser::Parser::parse(tokens);
    if !parse_errors.is_empty() {
        return Err(TreeError::Static(parse_errors));
    }

    let (depths, resolve_errors) = resolver::Resolver::resolve(&statements);
    if !resolve_errors.is_empty() {
        return Err(TreeError::Static(resolve_errors));
    }

    interpreter.set_depths(depths);
    interpreter.run(&statements).map_err(TreeError::Runtime)
}
