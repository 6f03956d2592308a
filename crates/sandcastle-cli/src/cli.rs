use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "sandcastle")]
#[command(about = "Run scripts in a sandbox and print their console output")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to ./sandcastle.toml when present)
    #[arg(short, long, global = true, env = "SANDCASTLE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Cursor reference echoed on every console event
    #[arg(long, global = true)]
    pub cursor: Option<String>,

    /// Log per-call timing and per-event sizes
    #[arg(long, global = true)]
    pub debug: bool,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// `[level] args` with inspect-style values
    #[default]
    Pretty,
    /// One JSON object per console event
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run script files in order in one persistent sandbox
    Run(RunArgs),
    /// Run an inline snippet
    Eval(EvalArgs),
}

#[derive(clap::Args)]
pub struct RunArgs {
    /// Script files; state defined by one is visible to the next
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

#[derive(clap::Args)]
pub struct EvalArgs {
    /// Script source
    pub code: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_with_global_flags() {
        let cli = Cli::try_parse_from([
            "sandcastle",
            "run",
            "a.js",
            "b.js",
            "--cursor",
            "c-1",
            "--format",
            "json",
        ])
        .unwrap();

        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.files, vec![PathBuf::from("a.js"), PathBuf::from("b.js")])
            }
            Commands::Eval(_) => panic!("expected run"),
        }
        assert_eq!(cli.cursor.as_deref(), Some("c-1"));
        assert_eq!(cli.format, Some(OutputFormat::Json));
        assert!(!cli.debug);
    }

    #[test]
    fn test_run_requires_files() {
        assert!(Cli::try_parse_from(["sandcastle", "run"]).is_err());
    }
}
