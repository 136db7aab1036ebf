mod logging;
mod repl;

use std::io;

use patch::{
    BreakpointStatus, CodeObject, Function, Injector, InjectorConfig, LineEntry, assemble,
    disassemble,
};
use serde::Serialize;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LineId {
    line: u32,
    id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct CliConfig {
    source: Option<String>,
    breaks: Vec<LineId>,
    clears: Vec<LineId>,
    module: Option<String>,
    callback: Option<String>,
    json: bool,
    repl: bool,
    help: bool,
}

#[derive(Serialize)]
struct Report<'a> {
    function: &'a str,
    code_len: usize,
    stack_depth: u32,
    constants: usize,
    names: usize,
    lines: Vec<LineEntry>,
    breakpoints: Vec<BreakpointStatus>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_cli_args(&args).map_err(io::Error::other)?;
    if cli.help {
        print_usage();
        return Ok(());
    }
    logging::init()?;

    let source_path = cli
        .source
        .as_deref()
        .ok_or_else(|| io::Error::other("missing source path"))?;
    let source = std::fs::read_to_string(source_path)?;
    let mut function = assemble(&source).map_err(|err| {
        io::Error::other(format!("{source_path}: {err}"))
    })?;
    info!(
        "loaded {} from {source_path} ({} bytes, stack {})",
        function.name(),
        function.code().len(),
        function.stack_depth()
    );

    let mut injector = Injector::new(injector_config(&cli));
    for LineId { line, id } in &cli.breaks {
        injector.insert_breakpoint(&mut function, *line, *id)?;
        info!("breakpoint {}", logging::breakpoint(&injector.registry().status(*id)));
    }
    for LineId { line, id } in &cli.clears {
        injector.remove_breakpoint(&mut function, *line, *id)?;
        info!(
            "breakpoint {} after clearing line {line}",
            logging::breakpoint(&injector.registry().status(*id))
        );
    }

    if cli.repl {
        return repl::run(&mut function, &mut injector);
    }
    if cli.json {
        println!("{}", report_json(&function, &injector)?);
    } else {
        match disassemble(&function) {
            Ok(listing) => print!("{listing}"),
            Err(err) => {
                error!("cannot list {}: {err}", function.name());
                return Err(Box::new(err));
            }
        }
    }
    Ok(())
}

fn injector_config(cli: &CliConfig) -> InjectorConfig {
    let mut config = InjectorConfig::from_env();
    if let Some(module) = &cli.module {
        config.module = module.clone();
    }
    if let Some(callback) = &cli.callback {
        config.callback = callback.clone();
    }
    config
}

pub(crate) fn report_json(
    function: &Function,
    injector: &Injector,
) -> Result<String, serde_json::Error> {
    let report = Report {
        function: function.name(),
        code_len: function.code().len(),
        stack_depth: function.stack_depth(),
        constants: function.constants().len(),
        names: function.names().len(),
        lines: function.line_table().entries().collect(),
        breakpoints: injector.registry().statuses(),
    };
    serde_json::to_string_pretty(&report)
}

fn parse_cli_args(args: &[String]) -> Result<CliConfig, String> {
    let mut cfg = CliConfig::default();
    let mut index = 0usize;

    while index < args.len() {
        match args[index].as_str() {
            "-h" | "--help" => {
                cfg.help = true;
                index += 1;
            }
            "--break" => {
                let raw = args
                    .get(index + 1)
                    .ok_or_else(|| "missing value for --break".to_string())?;
                cfg.breaks.push(parse_line_id(raw, "--break")?);
                index += 2;
            }
            "--clear" => {
                let raw = args
                    .get(index + 1)
                    .ok_or_else(|| "missing value for --clear".to_string())?;
                cfg.clears.push(parse_line_id(raw, "--clear")?);
                index += 2;
            }
            "--module" => {
                let name = args
                    .get(index + 1)
                    .ok_or_else(|| "missing value for --module".to_string())?;
                cfg.module = Some(name.clone());
                index += 2;
            }
            "--callback" => {
                let name = args
                    .get(index + 1)
                    .ok_or_else(|| "missing value for --callback".to_string())?;
                cfg.callback = Some(name.clone());
                index += 2;
            }
            "--json" => {
                cfg.json = true;
                index += 1;
            }
            "--repl" => {
                cfg.repl = true;
                index += 1;
            }
            value if value.starts_with('-') => {
                return Err(format!("unknown flag '{value}'"));
            }
            path => {
                if cfg.source.is_some() {
                    return Err("multiple source paths provided".to_string());
                }
                cfg.source = Some(path.to_string());
                index += 1;
            }
        }
    }

    if cfg.help {
        return Ok(cfg);
    }
    if cfg.source.is_none() {
        return Err("missing source path (see --help)".to_string());
    }
    if cfg.repl && cfg.json {
        return Err("--json cannot be combined with --repl".to_string());
    }
    Ok(cfg)
}

fn parse_line_id(raw: &str, flag: &str) -> Result<LineId, String> {
    let invalid = || format!("invalid {flag} value '{raw}', expected LINE:ID");
    let (line, id) = raw.split_once(':').ok_or_else(invalid)?;
    Ok(LineId {
        line: line.parse().map_err(|_| invalid())?,
        id: id.parse().map_err(|_| invalid())?,
    })
}

fn print_usage() {
    println!("Usage:");
    println!("  lh-run <source.lha>                       (print the disassembly)");
    println!("  lh-run <source.lha> --break <line:id> [--break <line:id> ...]");
    println!("  lh-run <source.lha> --break <line:id> --clear <line:id>");
    println!("  lh-run <source.lha> [--module <name>] [--callback <name>] [--json]");
    println!("  lh-run <source.lha> --repl");
    println!();
    println!("Environment:");
    println!("  LINEHOOK_MODULE / LINEHOOK_CALLBACK  default injected call target");
    println!("  RUST_LOG                             log filter (default: info)");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    #[test]
    fn parses_repeated_breakpoints_in_order() {
        let cfg = parse_cli_args(&args(&[
            "demo.lha", "--break", "3:7", "--break", "5:8", "--clear", "3:7", "--json",
        ]))
        .expect("args should parse");
        assert_eq!(cfg.source.as_deref(), Some("demo.lha"));
        assert_eq!(
            cfg.breaks,
            vec![LineId { line: 3, id: 7 }, LineId { line: 5, id: 8 }]
        );
        assert_eq!(cfg.clears, vec![LineId { line: 3, id: 7 }]);
        assert!(cfg.json);
    }

    #[test]
    fn call_target_flags_override_defaults() {
        let cfg = parse_cli_args(&args(&["demo.lha", "--module", "dbg", "--callback", "hit"]))
            .expect("args should parse");
        let config = injector_config(&cfg);
        assert_eq!(config.module, "dbg");
        assert_eq!(config.callback, "hit");
    }

    #[test]
    fn rejects_malformed_arguments() {
        assert!(parse_cli_args(&args(&[])).is_err());
        assert!(parse_cli_args(&args(&["demo.lha", "--break"])).is_err());
        assert!(parse_cli_args(&args(&["demo.lha", "--break", "3"])).is_err());
        assert!(parse_cli_args(&args(&["demo.lha", "--break", "x:1"])).is_err());
        assert!(parse_cli_args(&args(&["a.lha", "b.lha"])).is_err());
        assert!(parse_cli_args(&args(&["demo.lha", "--frob"])).is_err());
        assert!(parse_cli_args(&args(&["demo.lha", "--repl", "--json"])).is_err());
    }

    #[test]
    fn help_needs_no_source() {
        let cfg = parse_cli_args(&args(&["--help"])).expect("args should parse");
        assert!(cfg.help);
    }
}
