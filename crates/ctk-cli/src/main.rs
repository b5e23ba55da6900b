mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{Failure, RuntimeArgs};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "ctk-runtime",
    version,
    about = "Register a GPU runtime handler with a container engine and restart it"
)]
struct Cli {
    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Register the runtime handler in the engine config and restart the engine.
    Setup {
        /// Container engine: docker, containerd or crio.
        engine: String,
        #[command(flatten)]
        args: RuntimeArgs,
    },
    /// Remove the runtime handler from the engine config and restart the engine.
    Cleanup {
        /// Container engine: docker, containerd or crio.
        engine: String,
        #[command(flatten)]
        args: RuntimeArgs,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("CTK_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let json_output = cli.json;
    let result = match cli.command {
        Commands::Setup { engine, args } => commands::setup::run(&engine, &args, json_output),
        Commands::Cleanup { engine, args } => commands::cleanup::run(&engine, &args, json_output),
        Commands::Completions { shell } => {
            commands::completions::run::<Cli>(shell).map_err(Failure::from)
        }
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir).map_err(Failure::from),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(failure) => {
            eprintln!("error: {}", failure.message);
            if let Some(hint) = &failure.hint {
                eprintln!("hint: {hint}");
            }
            ExitCode::from(failure.code)
        }
    }
}
