mod cli;
mod config;
mod observability;
mod output;

use std::fs;

use anyhow::{Context, Result};
use clap::Parser;
use sandcastle_runtime::core::Cursor;
use sandcastle_runtime::{ExecuteOptions, SandboxContext};

use cli::{Cli, Commands};
use output::print_error;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = config::load(cli.config.as_deref())?;
    if cli.debug {
        settings.sandbox.debug = true;
    }
    observability::init_tracing(&settings.logging.level, settings.sandbox.debug);
    let format = cli.format.unwrap_or_default();

    let scripts = match &cli.command {
        Commands::Run(args) => args
            .files
            .iter()
            .map(|path| {
                let code = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                Ok((path.display().to_string(), code))
            })
            .collect::<Result<Vec<_>>>()?,
        Commands::Eval(args) => vec![("<eval>".to_string(), args.code.clone())],
    };

    let context = SandboxContext::create(settings.sandbox)
        .await
        .context("Failed to create sandbox")?;
    context.on_console(move |meta, level, args| {
        println!("{}", output::render_event(meta, level, args, format));
    });
    context.on_error(|e| print_error(&e.to_string()));

    for (name, code) in scripts {
        let options = ExecuteOptions {
            cursor: cli.cursor.clone().map(Cursor::with_ref),
            ..Default::default()
        };
        let execution = context
            .execute(code, options)
            .await
            .with_context(|| format!("{name} failed"))?;
        tracing::debug!(target: "sandcastle", %execution, script = %name, "Script finished");
    }

    context.dispose();
    Ok(())
}
