//! Lox, implemented twice over a shared scanner: a tree-walking
//! interpreter (`tree`) with a static resolver, and a single-pass
//! bytecode compiler and stack VM (`bytecode`). `cli` wires either engine
//! up to a REPL and a script runner with the exit-code contract described
//! in SPEC_FULL.md §6.

pub mod bytecode;
pub mod cli;
pub mod common;
pub mod error;
pub mod tree;
