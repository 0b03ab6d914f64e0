//! Command-line front end for Lumen.
//!
//! ```text
//! lumen               interactive REPL
//! lumen -c "source"   execute inline source, print the result
//! lumen path          execute the file at path, print the result
//! ```
//!
//! Exit code 0 on success, 1 on a bad option (or `-c` missing its
//! argument), non-zero on a fatal error during evaluation.

use std::{
    env, fs,
    io::{self, Write},
    process::ExitCode,
};

use lumen::{Interpreter, StdOut, StderrDiagnostics, Value};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        None => run_repl(),
        Some("-c") => match args.get(1) {
            Some(source) => run_source(source),
            None => {
                eprintln!("error: -c requires an argument");
                ExitCode::from(1)
            }
        },
        Some(path) => run_file(path),
    }
}

/// Executes one source string and prints its result, the way `-c` and file
/// execution both do.
fn run_source(source: &str) -> ExitCode {
    let mut interpreter = Interpreter::new();
    let mut stdout = StdOut;
    let mut diagnostics = StderrDiagnostics;
    match interpreter.run(source, &mut stdout, &mut diagnostics) {
        Ok(value) => {
            print_result(&mut interpreter, value);
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(1)
        }
    }
}

fn run_file(path: &str) -> ExitCode {
    let source = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(err) => {
            eprintln!("error reading {path}: {err}");
            return ExitCode::from(1);
        }
    };
    run_source(&source)
}

fn print_result(interpreter: &mut Interpreter, value: Value) {
    if !matches!(value, Value::Nil) {
        println!("{}", interpreter.display(&value));
    }
    interpreter.release(value);
}

fn run_repl() -> ExitCode {
    let mut interpreter = Interpreter::new();
    let mut stdout = StdOut;
    let mut diagnostics = StderrDiagnostics;
    let mut source = String::new();

    loop {
        let prompt = if source.is_empty() { ">>> " } else { "... " };
        let Some(line) = read_line(prompt) else {
            println!();
            break;
        };

        if source.is_empty() && line.trim().is_empty() {
            continue;
        }

        if !source.is_empty() {
            source.push('\n');
        }
        source.push_str(&line);

        if needs_more_input(&source) {
            continue;
        }

        match interpreter.run(&source, &mut stdout, &mut diagnostics) {
            Ok(value) => print_result(&mut interpreter, value),
            Err(err) => eprintln!("error: {err}"),
        }
        source.clear();
    }

    ExitCode::SUCCESS
}

/// Heuristic multiline detector: keep reading while brackets/braces/parens
/// are unbalanced, since a block or a literal can span several lines.
fn needs_more_input(source: &str) -> bool {
    let mut balance = 0i32;
    for ch in source.chars() {
        match ch {
            '(' | '[' | '{' => balance += 1,
            ')' | ']' | '}' => balance -= 1,
            _ => {}
        }
    }
    balance > 0
}

/// Reads one line from stdin after printing a prompt. Returns `None` on
/// EOF (Ctrl+D).
fn read_line(prompt: &str) -> Option<String> {
    print!("{prompt}");
    if io::stdout().flush().is_err() {
        return None;
    }
    let mut input = String::new();
    let read = io::stdin().read_line(&mut input).ok()?;
    if read == 0 {
        return None;
    }
    Some(input.trim_end_matches(['\r', '\n']).to_owned())
}
