// ABOUTME: CLI entry point: script execution and the interactive REPL

use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::{Config, Editor};
use sprig::engine::Engine;
use sprig::highlighter::SprigHelper;
use std::path::PathBuf;
use std::process::ExitCode;

/// A small Lisp with a NaN-boxed bytecode VM
#[derive(Parser, Debug)]
#[command(name = "sprig")]
#[command(version)]
#[command(about = "A small Lisp with a NaN-boxed bytecode VM and compile-time macros")]
struct CliArgs {
    /// Script file to execute (optional - if not provided, starts REPL)
    #[arg(value_name = "FILE")]
    script: Option<PathBuf>,

    /// Print the compiled bytecode of each top-level form to stderr
    #[arg(long = "dump-bytecode")]
    dump_bytecode: bool,
}

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let mut engine = Engine::new();
    engine.set_dump_bytecode(args.dump_bytecode);

    match args.script {
        Some(path) => run_script(&path, &mut engine),
        None => run_repl(&mut engine),
    }
}

/// Execute a script file; any error goes to stderr and exits with 1.
fn run_script(path: &PathBuf, engine: &mut Engine) -> ExitCode {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("cannot read script file {}: {}", path.display(), err);
            return ExitCode::FAILURE;
        }
    };

    match engine.eval(&source, &path.to_string_lossy()) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", err);
            ExitCode::FAILURE
        }
    }
}

fn run_repl(engine: &mut Engine) -> ExitCode {
    let config = Config::builder().auto_add_history(true).build();
    let mut rl = match Editor::with_config(config) {
        Ok(rl) => rl,
        Err(err) => {
            eprintln!("failed to initialize the prompt: {}", err);
            return ExitCode::FAILURE;
        }
    };
    rl.set_helper(Some(SprigHelper::new()));

    let history_file = ".sprig_history";
    let _ = rl.load_history(history_file);

    println!("sprig {}", env!("CARGO_PKG_VERSION"));
    println!("Type (quit) or Ctrl-D to leave.");

    loop {
        match rl.readline("sprig> ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }

                match line.trim() {
                    "(quit)" | "(exit)" => break,
                    _ => {}
                }

                // Errors abort the current form; the session continues.
                match engine.eval(&line, "<repl>") {
                    Ok(Some(value)) => {
                        println!("=> {}", engine.render(value));
                        engine.pop_result();
                    }
                    Ok(None) => {}
                    Err(err) => eprintln!("{}", err),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("{}", err);
                break;
            }
        }
    }

    let _ = rl.save_history(history_file);
    ExitCode::SUCCESS
}
