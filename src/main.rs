use std::process::ExitCode;

fn main() -> ExitCode {
    lox::cli::main()
}
