use std::io::{self, Write};

use patch::{CodeObject, Function, Injector, disassemble};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::{info, warn};

use crate::logging;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ReplAction {
    Continue,
    Break,
}

pub fn run(
    function: &mut Function,
    injector: &mut Injector,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("lh-run REPL ({})", function.name());
    println!("commands: b LINE ID, clear LINE ID, dis, info, help, q");
    let mut editor = DefaultEditor::new()?;
    let mut stdout = io::stdout();
    loop {
        match editor.readline("linehook> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);
                if handle_command(line, function, injector, &mut stdout) == ReplAction::Break {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => return Err(Box::new(io::Error::other(err.to_string()))),
        }
    }
    println!("bye");
    Ok(())
}

fn handle_command(
    line: &str,
    function: &mut Function,
    injector: &mut Injector,
    out: &mut dyn Write,
) -> ReplAction {
    let mut parts = line.split_whitespace();
    let Some(cmd) = parts.next() else {
        return ReplAction::Continue;
    };
    match cmd {
        "q" | "quit" | "exit" => return ReplAction::Break,
        "h" | "help" => {
            let _ = writeln!(out, "b LINE ID      insert breakpoint ID before LINE");
            let _ = writeln!(out, "clear LINE ID  remove breakpoint ID from LINE");
            let _ = writeln!(out, "dis            disassemble the function");
            let _ = writeln!(out, "info           function and breakpoint state as JSON");
            let _ = writeln!(out, "q              quit");
        }
        "b" | "break" => match parse_line_id(&mut parts) {
            Some((line, id)) => match injector.insert_breakpoint(function, line, id) {
                Ok(()) => {
                    info!("breakpoint {}", logging::breakpoint(&injector.registry().status(id)));
                    let _ = writeln!(out, "breakpoint {id} set at line {line}");
                }
                Err(err) => {
                    warn!("{cmd} {line} {id}: {err}");
                    let _ = writeln!(out, "error: {err}");
                }
            },
            None => {
                let _ = writeln!(out, "usage: b <line> <id>");
            }
        },
        "clear" => match parse_line_id(&mut parts) {
            Some((line, id)) => match injector.remove_breakpoint(function, line, id) {
                Ok(()) => {
                    info!(
                        "breakpoint {} after clearing line {line}",
                        logging::breakpoint(&injector.registry().status(id))
                    );
                    let _ = writeln!(out, "breakpoint {id} cleared at line {line}");
                }
                Err(err) => {
                    warn!("{cmd} {line} {id}: {err}");
                    let _ = writeln!(out, "error: {err}");
                }
            },
            None => {
                let _ = writeln!(out, "usage: clear <line> <id>");
            }
        },
        "dis" => match disassemble(function) {
            Ok(listing) => {
                let _ = write!(out, "{listing}");
            }
            Err(err) => {
                let _ = writeln!(out, "error: {err}");
            }
        },
        "info" => match crate::report_json(function, injector) {
            Ok(json) => {
                let _ = writeln!(out, "{json}");
            }
            Err(err) => {
                let _ = writeln!(out, "error: {err}");
            }
        },
        other => {
            let _ = writeln!(out, "unknown command '{other}' (try help)");
        }
    }
    ReplAction::Continue
}

fn parse_line_id<'a>(parts: &mut impl Iterator<Item = &'a str>) -> Option<(u32, u32)> {
    let line = parts.next()?.parse().ok()?;
    let id = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((line, id))
}
