use std::io::{self, Write};
use std::{env, fs, process};

use atto::vm::VM;
use atto::InterpretationError;

fn main() {
    let args: Vec<String> = env::args().collect();

    match args.len() {
        1 => repl(),
        2 => run_file(&args[1]),
        _ => {
            eprintln!("Usage: atto [script]");
            process::exit(64);
        }
    }
}

/// Runs a script from a file, exiting with a sysexits-style code on failure.
fn run_file(path: &str) {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(error) => {
            eprintln!("Could not read '{path}': {error}");
            process::exit(74);
        }
    };

    let mut vm = VM::default();
    match vm.interpret(&source) {
        Ok(()) => {}
        Err(InterpretationError::CompileError) => process::exit(65),
        Err(InterpretationError::RuntimeError) => process::exit(70),
    }
}

/// Runs the interactive prompt, one statement per line. Diagnostics have
/// already been printed by the time `interpret` returns, so errors just fall
/// through to the next prompt.
fn repl() {
    let mut vm = VM::default();

    loop {
        print!("atto> ");
        io::stdout().flush().expect("could not flush stdout");

        let mut line = String::new();
        match io::stdin().read_line(&mut line) {
            Ok(0) => {
                // End-of-input: be polite about the missing newline.
                println!();
                break;
            }
            Ok(_) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = vm.interpret(line);
            }
            Err(error) => {
                eprintln!("Read error: {error}");
                break;
            }
        }
    }
}
