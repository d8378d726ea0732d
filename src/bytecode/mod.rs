//! The bytecode engine: a single-pass Pratt compiler targeting a stack VM
//! (§2, §4.5–§4.8). Per SPEC_FULL.md §1 this engine's grammar has no
//! function, closure, or class syntax at all — `compiler.rs` rejects
//! `fun`/`class`/`return` as compile errors rather than compiling them,
//! and the VM has no `Call` opcode to drive them with.

pub mod chunk;
pub mod compiler;
pub mod opcode;
pub mod table;
pub mod value;
pub mod vm;

use std::rc::Rc;

use crate::common::source::Source;
use crate::error::{RuntimeError, Syntax};
use compiler::Compiler;
use vm::Vm;

pub enum BytecodeError {
    Static(Vec<Syntax>),
    Runtime(RuntimeError),
}

/// Compiles and runs one program against a fresh VM. Used by the CLI's
/// script mode and by tests; the REPL instead keeps one `Vm` alive across
/// lines so that `var` bindings persist (see `cli.rs`).
pub fn run(source: Rc<Source>) -> Result<(), BytecodeError> {
    let mut vm = Vm::new();
    run_with(&mut vm, source)
}

/// Compiles and runs one program against an existing VM, so its globals
/// table and string interner persist across calls.
pub fn run_with(vm: &mut Vm, source: Rc<Source>) -> Result<(), BytecodeError> {
    let chunk = Compiler::compile(source, vm.interner()).map_err(BytecodeError::Static)?;
    vm.run(&chunk).map_err(BytecodeError::Runtime)
}
