//! Netscope CLI

use std::path::{Path, PathBuf};
use std::process;

use anyhow::Context;
use netscope::{Config, InitStatus, Inspector};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Netscope v{}", env!("CARGO_PKG_VERSION"));
        eprintln!();
        eprintln!("Usage: netscope <command> [options]");
        eprintln!();
        eprintln!("Commands:");
        eprintln!("  serve [config.toml]   Run the viewer server until Ctrl-C");
        eprintln!("  check <config.toml>   Validate a configuration file");
        process::exit(1);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("netscope=info")),
        )
        .init();

    let command = &args[1];

    let result = match command.as_str() {
        "serve" => serve(args.get(2).map(PathBuf::from).as_deref()),
        "check" => {
            if args.len() < 3 {
                eprintln!("Usage: netscope check <config.toml>");
                process::exit(1);
            }
            check(Path::new(&args[2]))
        }
        _ => {
            eprintln!("Unknown command: {command}");
            eprintln!("Run 'netscope' for usage information.");
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(Config::default()),
    }
}

fn serve(path: Option<&Path>) -> anyhow::Result<()> {
    let mut config = load_config(path)?;
    // Standalone runs always open the debug gate.
    config.debuggable = true;

    let runtime = tokio::runtime::Runtime::new().context("starting runtime")?;
    runtime.block_on(async {
        let inspector = Inspector::new(config)?;

        match inspector.init().await? {
            InitStatus::Started(addr) | InitStatus::AlreadyRunning(addr) => {
                println!("Netscope viewer API on http://{addr}");
            }
            InitStatus::NotEnabled => anyhow::bail!("inspector not enabled"),
        }

        tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
        info!("Received SIGINT, shutting down");
        inspector.stop().await;
        Ok(())
    })
}

fn check(path: &Path) -> anyhow::Result<()> {
    let config = load_config(Some(path))?;
    println!(
        "{}: ok (listen {}, keep {} requests)",
        path.display(),
        config.socket_addr()?,
        config.store.max_requests
    );
    Ok(())
}
