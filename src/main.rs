use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::ffi::OsString;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// vgo - Reproducible, registry-free dependency management for Go projects
#[derive(Parser)]
#[command(name = "vgo")]
#[command(author, version, about, long_about = None)]
#[command(allow_external_subcommands = true)]
struct Cli {
    /// Increase log verbosity (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover the project's imports and create vgo.yaml
    Init {
        /// Print the manifest that would be written without installing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Install every dependency listed in vgo.yaml
    Install {
        /// Print the resolved manifest without cloning, checking out or writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Add a dependency (or change its version) and install it
    Get {
        /// Repository name (e.g., github.com/pkg/errors)
        name: String,

        /// Requested version: branch, tag or commit id
        version: Option<String>,
    },

    /// Fetch remote changes and move dependencies to their newest matching revision
    Update {
        /// Only update this dependency
        name: Option<String>,
    },

    /// Remove a direct dependency
    Remove {
        /// Repository name
        name: String,
    },

    /// Show the dependency tree
    Tree,

    /// Run the go toolchain with the given arguments
    #[command(disable_help_flag = true)]
    Go {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<OsString>,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Anything else is passed to the go toolchain
    #[command(external_subcommand)]
    External(Vec<OsString>),
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("vgo={}", default_level).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Init { dry_run } => commands::init::run(dry_run),
        Commands::Install { dry_run } => commands::install::run(dry_run),
        Commands::Get { name, version } => commands::get::run(name, version),
        Commands::Update { name } => commands::update::run(name),
        Commands::Remove { name } => commands::remove::run(name),
        Commands::Tree => commands::tree::run(),
        Commands::Go { args } => commands::go::run(args),
        Commands::External(args) => commands::go::run(args),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "vgo", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
