use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use nicefox_auth::secrets::SecretStore;

const DEFAULT_SECRETS_DIR: &str = "/var/lib/nicefox-auth/secrets";

#[derive(Parser)]
#[command(author, version, about = "Admin CLI for per-domain JWT secrets", long_about = None)]
struct Args {
    /// Directory holding one secret file per domain.
    /// Defaults to $JWT_SECRETS_DIR.
    #[clap(long, short)]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Manage per-domain signing secrets.
    Secret {
        #[command(subcommand)]
        cmd: SecretCommands,
    },
}

#[derive(Subcommand, Debug, Clone)]
enum SecretCommands {
    /// Get the secret for a domain, creating it if missing.
    Get { domain: String },
    /// Regenerate the secret for a domain. Every outstanding token for
    /// it stops verifying.
    Rotate { domain: String },
    /// List all domains with a secret.
    List,
    /// Delete the secret for a domain.
    Delete { domain: String },
}

fn main() -> ExitCode {
    let args = Args::parse();

    let dir = args
        .dir
        .or_else(|| std::env::var_os("JWT_SECRETS_DIR").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SECRETS_DIR));

    let store = match SecretStore::new(&dir, false) {
        Ok(store) => store,
        Err(err) => {
            eprintln!(
                "cannot open secrets directory {}: {err}",
                dir.display()
            );
            return ExitCode::FAILURE;
        }
    };

    let Commands::Secret { cmd } = args.cmd;
    match run(&store, cmd) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

/// Results go to stdout, one value per line; diagnostics go to stderr.
fn run(
    store: &SecretStore,
    cmd: SecretCommands,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        SecretCommands::Get { domain } => {
            let secret = store.provision_or_get(&domain)?;
            println!("{secret}");
        }
        SecretCommands::Rotate { domain } => {
            let secret = store.rotate(&domain)?;
            eprintln!("rotated secret for: {domain}");
            println!("{secret}");
        }
        SecretCommands::List => {
            let domains = store.list()?;
            if domains.is_empty() {
                eprintln!("no secrets configured");
            }
            for domain in domains {
                println!("{domain}");
            }
        }
        SecretCommands::Delete { domain } => {
            if store.delete(&domain)? {
                eprintln!("deleted secret for: {domain}");
            } else {
                return Err(format!("no secret found for: {domain}").into());
            }
        }
    }

    Ok(())
}
