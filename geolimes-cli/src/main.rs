mod cli;
mod config;
mod error;
mod output;
mod run;
mod server;

use clap::Parser;
use cli::{Cli, Commands};
use config::LinkConfig;
use error::{exit_with_error, CliError, CliResult};
use run::{Pipeline, RunOptions, Workspace};

fn init_tracing(cli: &Cli) {
    // --quiet silences everything, --verbose shows info (or RUST_LOG when
    // set), and the default keeps warnings so failed pages and retries
    // still surface.
    let filter = if cli.quiet {
        tracing_subscriber::EnvFilter::new("off")
    } else if cli.verbose {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
    } else {
        tracing_subscriber::EnvFilter::new("warn")
    };

    let ansi = !(cli.no_color || std::env::var_os("NO_COLOR").is_some());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(ansi)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.no_color || std::env::var_os("NO_COLOR").is_some() {
        colored::control::set_override(false);
    }

    init_tracing(&cli);

    if let Err(e) = run(cli).await {
        exit_with_error(e);
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let workspace = Workspace::new(cli.workdir);

    match cli.command {
        Commands::Run {
            config,
            database,
            chunk_size,
            workers,
        } => {
            let task = LinkConfig::from_file(&config)?.validate()?;
            let options = RunOptions {
                database,
                chunk_size,
                workers,
            };
            let report = Pipeline::new(workspace, options).run_to_files(&task).await?;
            println!("{}", report.summary());
            Ok(())
        }

        Commands::Serve {
            database,
            listen,
            workers,
        } => {
            let options = RunOptions {
                database,
                chunk_size: None,
                workers,
            };
            let pipeline = Pipeline::new(workspace, options);
            println!("Server listening on {listen}");
            server::serve(listen, pipeline)
                .await
                .map_err(|e| CliError::Server(format!("server on {listen}: {e}")))
        }

        Commands::Fingerprint { config } => {
            let task = LinkConfig::from_file(&config)?.validate()?;
            println!("source {}", task.source.fingerprint());
            println!("target {}", task.target.fingerprint());
            Ok(())
        }
    }
}
