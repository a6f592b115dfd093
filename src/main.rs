//! The `mica` command: run a source file, or start the REPL.
//!
//! The REPL keeps its compiler state (symbol table and constant pool) and
//! its globals table alive across lines, so `let` bindings from one line
//! are visible on the next.

use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use mica::compiler::Compiler;
use mica::value::Value;
use mica::vm::{Vm, GLOBALS_SIZE};
use mica::{parser, run_source};

const PROMPT: &str = ">> ";

fn main() -> ExitCode {
    let mut args = std::env::args().skip(1);
    match args.next() {
        Some(path) => run_file(&path),
        None => repl(),
    }
}

/// Run a source file to completion, printing its result.
fn run_file(path: &str) -> ExitCode {
    let src = match std::fs::read_to_string(path) {
        Ok(src) => src,
        Err(e) => {
            eprintln!("mica: cannot read {path}: {e}");
            return ExitCode::FAILURE;
        }
    };
    match run_source(&src) {
        Ok(value) => {
            if value != Value::Null {
                println!("{value}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("mica: {e}");
            ExitCode::FAILURE
        }
    }
}

/// The interactive prompt.  Each line goes through the full pipeline; the
/// symbol table, constant pool and globals survive between lines.
fn repl() -> ExitCode {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut compiler = Compiler::new();
    let mut globals = vec![Value::Null; GLOBALS_SIZE];

    loop {
        print!("{PROMPT}");
        if stdout.flush().is_err() {
            return ExitCode::FAILURE;
        }

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => return ExitCode::SUCCESS, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("mica: {e}");
                return ExitCode::FAILURE;
            }
        }
        if line.trim().is_empty() {
            continue;
        }

        let (program, errors) = parser::parse_source(&line);
        if !errors.is_empty() {
            for error in errors {
                eprintln!("  parse error at {}: {}", error.span, error.message);
            }
            continue;
        }

        let bytecode = match compiler.compile(&program) {
            Ok(bytecode) => bytecode,
            Err(e) => {
                eprintln!("  compile error: {e}");
                continue;
            }
        };

        let mut machine = Vm::with_globals(bytecode, globals);
        match machine.run() {
            Ok(()) => println!("{}", machine.last_popped()),
            Err(e) => eprintln!("  runtime error: {e}"),
        }
        globals = machine.into_globals();
    }
}
