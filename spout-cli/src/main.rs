mod cli;
mod error;

use std::io::{self, IsTerminal, Read, Write};
use std::process;

use clap::Parser;
use tracing::{Level, error, info};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::{
    cli::Args,
    error::{CliError, Result},
};
use spout::{Credentials, Spout, SpoutConfig, SpoutMessage};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let api_key = read_api_key()?;
    let credentials = Credentials::new(args.oid, api_key);

    let mut config = SpoutConfig::new(args.data_type).max_buffer(args.buffer);
    if args.raw {
        config = config.raw();
    }
    if let Some(inv_id) = args.inv_id {
        config = config.inv_id(inv_id);
    }
    if let Some(tag) = args.tag {
        config = config.tag(tag);
    }
    if let Some(cat) = args.cat {
        config = config.cat(cat);
    }

    info!("Registering...");
    let mut spout = Spout::open(&credentials, config).await?;

    info!("Starting to listen...");
    let mut stdout = io::stdout().lock();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            msg = spout.recv() => match msg {
                Some(SpoutMessage::Json(value)) => {
                    serde_json::to_writer_pretty(&mut stdout, &value)?;
                    stdout.write_all(b"\n")?;
                }
                Some(SpoutMessage::Raw(line)) => {
                    stdout.write_all(line.as_bytes())?;
                    stdout.write_all(b"\n")?;
                }
                None => break,
            },
        }
    }

    info!(dropped = spout.dropped(), "Exiting.");
    spout.shutdown().await;
    Ok(())
}

/// Secret key from `LC_API_KEY`, or prompted on stderr when attached to a
/// terminal so piped stdout stays pure JSON.
fn read_api_key() -> Result<String> {
    if let Ok(key) = std::env::var("LC_API_KEY") {
        let key = key.trim().to_owned();
        if !key.is_empty() {
            return Ok(key);
        }
    }
    if !io::stdin().is_terminal() {
        let mut key = String::new();
        io::stdin().read_to_string(&mut key)?;
        let key = key.trim().to_owned();
        return if key.is_empty() {
            Err(CliError::MissingApiKey)
        } else {
            Ok(key)
        };
    }
    eprint!("Enter secret API key: ");
    io::stderr().flush()?;
    let mut key = String::new();
    io::stdin().read_line(&mut key)?;
    let key = key.trim().to_owned();
    if key.is_empty() {
        return Err(CliError::MissingApiKey);
    }
    Ok(key)
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(io::stderr)
                .with_level(verbose),
        )
        .init();
}
