use colored::{ColoredString, Colorize};
use sandcastle_runtime::core::{ConsoleLevel, CorrelationMeta, DecodedValue};
use serde_json::json;

use crate::cli::OutputFormat;

pub fn render_event(
    meta: &CorrelationMeta,
    level: ConsoleLevel,
    args: &[DecodedValue],
    format: OutputFormat,
) -> String {
    match format {
        OutputFormat::Pretty => {
            let line = args
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" ");
            format!("{} {line}", level_tag(level))
        }
        OutputFormat::Json => json!({
            "meta": meta,
            "level": level,
            "args": args.iter().map(DecodedValue::to_json).collect::<Vec<_>>(),
        })
        .to_string(),
    }
}

fn level_tag(level: ConsoleLevel) -> ColoredString {
    let tag = format!("[{level}]");
    match level {
        ConsoleLevel::Error => tag.red(),
        ConsoleLevel::Warn => tag.yellow(),
        ConsoleLevel::Info => tag.cyan(),
        ConsoleLevel::Debug => tag.dimmed(),
        ConsoleLevel::Log | ConsoleLevel::Clear => tag.normal(),
    }
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}
