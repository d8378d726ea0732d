//! REPL and script runner (§6). Exit codes follow `sysexits.h`, exactly as
//! named below; this is the only place in the crate that calls
//! `std::process::exit`.
//!
//! Two engines live in this crate (`tree` and `bytecode`); the CLI's
//! argument contract in §6 is `lox [script]` with no room for a second
//! positional flag, so engine selection is a secondary knob read from
//! `LOX_ENGINE` (`tree`, the default, or `bytecode`) rather than an argv
//! flag. See DESIGN.md for why this was chosen over adding a flag.

use std::io::{self, Write};
use std::process::ExitCode;
use std::rc::Rc;

use crate::bytecode::{self, BytecodeError};
use crate::common::source::Source;
use crate::tree::{self, TreeError};

pub const EX_OK: u8 = 0;
pub const EX_USAGE: u8 = 64;
pub const EX_DATAERR: u8 = 65;
pub const EX_SOFTWARE: u8 = 70;
pub const EX_IOERR: u8 = 74;

enum Engine {
    Tree,
    Bytecode,
}

impl Engine {
    fn from_env() -> Engine {
        match std::env::var("LOX_ENGINE").as_deref() {
            Ok("bytecode") => Engine::Bytecode,
            _ => Engine::Tree,
        }
    }
}

/// One running session, holding whichever engine's persistent state
/// (global bindings) across REPL lines.
enum Session {
    Tree(tree::interpreter::Interpreter),
    Bytecode(bytecode::vm::Vm),
}

impl Session {
    fn new(engine: Engine) -> Session {
        match engine {
            Engine::Tree => Session::Tree(tree::interpreter::Interpreter::new(Default::default())),
            Engine::Bytecode => Session::Bytecode(bytecode::vm::Vm::new()),
        }
    }

    /// Runs one unit of source (a script's full contents, or one REPL
    /// line) against this session, reporting any error to stderr and
    /// returning the exit code that error implies (or `EX_OK`).
    fn run(&mut self, source: Rc<Source>) -> u8 {
        match self {
            Session::Tree(interpreter) => match tree::run_with(interpreter, source) {
                Ok(()) => EX_OK,
                Err(TreeError::Static(errors)) => { report_static(&errors); EX_DATAERR },
                Err(TreeError::Runtime(err)) => { eprintln!("{}", err); EX_SOFTWARE },
            },
            Session::Bytecode(vm) => match bytecode::run_with(vm, source) {
                Ok(()) => EX_OK,
                Err(BytecodeError::Static(errors)) => { report_static(&errors); EX_DATAERR },
                Err(BytecodeError::Runtime(err)) => { eprintln!("{}", err); EX_SOFTWARE },
            },
        }
    }
}

fn report_static(errors: &[crate::error::Syntax]) {
    for error in errors {
        eprintln!("{}", error);
    }
}

/// Entry point called by `main.rs`. Dispatches to script mode (one
/// argument) or the REPL (no arguments); two or more arguments is a usage
/// error (§6).
pub fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.as_slice() {
        [] => run_repl(),
        [path] => run_script(path),
        _ => {
            eprintln!("Usage: lox [script]");
            ExitCode::from(EX_USAGE)
        },
    }
}

fn run_script(path: &str) -> ExitCode {
    let source = match Source::path(path.as_ref()) {
        Ok(source) => source,
        Err(_) => {
            eprintln!("Error: could not read file '{}'.", path);
            return ExitCode::from(EX_IOERR);
        },
    };

    let mut session = Session::new(Engine::from_env());
    ExitCode::from(session.run(source))
}

fn run_repl() -> ExitCode {
    let mut session = Session::new(Engine::from_env());
    let stdin = io::stdin();

    loop {
        print!("> ");
        if io::stdout().flush().is_err() { return ExitCode::from(EX_IOERR); }

        let mut line = String::new();
        match stdin.read_line(&mut line) {
            Ok(0) => return ExitCode::from(EX_OK), // EOF
            Ok(_) => {},
            Err(_) => return ExitCode::from(EX_IOERR),
        }

        // A bad line reports its error and resets for the next one; the
        // REPL never exits on a static or runtime error, only on EOF.
        session.run(Source::source(&line));
    }
}
