// build.rs

use clap::{Arg, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: session file
fn session_arg() -> Arg {
    Arg::new("session")
        .required(true)
        .value_name("SESSION")
        .help("Session file (TOML)")
}

fn build_cli() -> Command {
    Command::new("envsolve")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Envsolve Contributors")
        .about("Iterative dependency resolution for conda-style environments")
        .subcommand_required(false)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .global(true)
                .help("Resolver config file (default: <config dir>/envsolve/resolver.toml)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(clap::ArgAction::SetTrue)
                .help("Log debug output"),
        )
        .subcommand(
            Command::new("plan")
                .about("Print the request the first solver attempt would receive")
                .arg(session_arg()),
        )
        .subcommand(
            Command::new("replay")
                .about("Resolve a session against a recorded solver transcript")
                .arg(session_arg())
                .arg(
                    Arg::new("transcript")
                        .required(true)
                        .help("JSON array of recorded solver responses"),
                ),
        )
        .subcommand(
            Command::new("explain")
                .about("Show the conflicts extracted from a solver diagnostic")
                .arg(
                    Arg::new("diagnostic")
                        .required(true)
                        .help("File holding the diagnostic text"),
                ),
        )
        .subcommand(
            Command::new("neuter")
                .about("Print the relaxed form of a match spec")
                .arg(Arg::new("spec").required(true).help("Match spec")),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory - use CARGO_MANIFEST_DIR which is always set by cargo
    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("envsolve.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
