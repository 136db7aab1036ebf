use std::sync::OnceLock;

use owo_colors::OwoColorize;
use patch::{BreakpointState, BreakpointStatus};
use supports_color::Stream;
use tracing_subscriber::EnvFilter;

static ANSI_ENABLED: OnceLock<bool> = OnceLock::new();

pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    let ansi = *ANSI_ENABLED.get_or_init(detect_ansi);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(ansi)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .map_err(|err| std::io::Error::other(err.to_string()))?;
    Ok(())
}

pub fn breakpoint(status: &BreakpointStatus) -> String {
    render_breakpoint(status, *ANSI_ENABLED.get_or_init(detect_ansi))
}

fn render_breakpoint(status: &BreakpointStatus, ansi: bool) -> String {
    let text = match (status.state, status.line) {
        (BreakpointState::Active, Some(line)) => format!(
            "#{} active at line {line} (+{} bytes)",
            status.id, status.injected_size
        ),
        (BreakpointState::Active, None) => format!("#{} active", status.id),
        (BreakpointState::Inactive, _) => format!("#{} inactive", status.id),
    };
    if !ansi {
        return text;
    }
    match status.state {
        BreakpointState::Active => text.bright_green().bold().to_string(),
        BreakpointState::Inactive => text.dimmed().to_string(),
    }
}

fn detect_ansi() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if std::env::var_os("FORCE_COLOR").is_some() {
        return true;
    }
    supports_color::on_cached(Stream::Stderr).is_some()
}
