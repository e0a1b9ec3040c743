// src/main.rs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use envsolve::resolver::{neuter, parse_diagnostic, ReplayBackend, Resolver};
use envsolve::{Error, MatchSpec, ResolverConfig, Session};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "envsolve")]
#[command(author, version, about = "Iterative dependency resolution for conda-style environments", long_about = None)]
struct Cli {
    /// Resolver config file (default: <config dir>/envsolve/resolver.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the request the first solver attempt would receive
    Plan {
        /// Session file (TOML)
        session: PathBuf,
    },
    /// Resolve a session against a recorded solver transcript
    Replay {
        /// Session file (TOML)
        session: PathBuf,
        /// JSON array of recorded solver responses
        transcript: PathBuf,
    },
    /// Show the conflicts extracted from a solver diagnostic
    Explain {
        /// File holding the diagnostic text
        diagnostic: PathBuf,
    },
    /// Print the relaxed form of a match spec
    Neuter {
        /// Match spec, e.g. "numpy==1.26.4=py311_0"
        spec: String,
    },
}

fn load_session(path: &Path) -> Result<Session> {
    Session::from_file(path).with_context(|| format!("loading session {}", path.display()))
}

fn cmd_plan(config: &ResolverConfig, session_path: &Path) -> Result<()> {
    let session = load_session(session_path)?;
    let input = session.input_state()?;
    let index = session.load_index(config.package_format)?;

    // The backend is never called while planning
    let backend = Arc::new(ReplayBackend::new(Vec::new()));
    let request = Resolver::new(backend, &index, config)
        .with_mode(session.mode())
        .plan(&input)?;

    print!("{}", request);
    Ok(())
}

fn cmd_replay(config: &ResolverConfig, session_path: &Path, transcript: &Path) -> Result<()> {
    let session = load_session(session_path)?;
    let input = session.input_state()?;
    let service = session.index_service(config.package_format);
    let index = service.get()?;
    let backend = Arc::new(
        ReplayBackend::from_file(transcript)
            .with_context(|| format!("loading transcript {}", transcript.display()))?,
    );

    let result = Resolver::new(backend, index.as_ref(), config)
        .with_mode(session.mode())
        .solve(&input);

    let resolution = match result {
        Ok(resolution) => resolution,
        Err(Error::Unsatisfiable {
            diagnostic,
            conflicts,
        }) => {
            println!("Unsatisfiable. Conflicting packages: {}", conflicts.join(", "));
            println!("{}", diagnostic);
            anyhow::bail!("no solution found");
        }
        Err(e) => return Err(e.into()),
    };

    println!("Solution ({} packages):", resolution.records.len());
    for record in &resolution.records {
        println!("  {}", record);
    }
    if !resolution.neutered.is_empty() {
        println!("Relaxed history specs:");
        for spec in resolution.neutered.values() {
            println!("  {}", spec);
        }
    }
    println!("Solver attempts: {}", resolution.attempts);
    Ok(())
}

fn cmd_explain(diagnostic: &Path) -> Result<()> {
    let text = std::fs::read_to_string(diagnostic)
        .with_context(|| format!("reading {}", diagnostic.display()))?;
    let parsed = parse_diagnostic(&text);

    if parsed.unsatisfiable.is_empty() && parsed.not_found.is_empty() {
        println!("No conflicts recognised");
        return Ok(());
    }
    if !parsed.unsatisfiable.is_empty() {
        println!("Unsatisfiable:");
        for spec in parsed.unsatisfiable.values() {
            println!("  {}", spec);
        }
    }
    if !parsed.not_found.is_empty() {
        println!("Not found:");
        for spec in parsed.not_found.values() {
            println!("  {}", spec);
        }
    }
    Ok(())
}

fn cmd_neuter(spec: &str) -> Result<()> {
    let spec = MatchSpec::parse(spec)?;
    println!("{}", neuter(&spec));
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ResolverConfig::load(cli.config.as_deref())?;

    match cli.command {
        Some(Commands::Plan { session }) => cmd_plan(&config, &session),
        Some(Commands::Replay {
            session,
            transcript,
        }) => cmd_replay(&config, &session, &transcript),
        Some(Commands::Explain { diagnostic }) => cmd_explain(&diagnostic),
        Some(Commands::Neuter { spec }) => cmd_neuter(&spec),
        None => {
            info!("{}", envsolve::user_agent());
            println!("Envsolve v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'envsolve --help' for usage information");
            Ok(())
        }
    }
}
