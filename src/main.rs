//! Nominatim CLI - Geocode from the command line
//!
//! Runs one search, reverse lookup or status check against a Nominatim
//! server and prints the response to stdout.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use nominatim_cli::api::NominatimClient;
use nominatim_cli::cli::{describe_error, Cli, CliError};
use nominatim_cli::config::ClientConfig;
use nominatim_cli::fetch::ResponseBody;

/// Sets up logging to stderr so stdout carries only the response.
/// `--verbose` wins over `RUST_LOG`; the fallback level is `warn`.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("warn,nominatim_cli=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn run(cli: &Cli) -> Result<ResponseBody, CliError> {
    let mut config = ClientConfig::from_env()?;
    cli.apply_to(&mut config);
    config.validate()?;

    let client = NominatimClient::new(&config)?;
    cli.execute(&client).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli).await {
        Ok(body) => {
            println!("{}", body.to_display_string());
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("Error: {}", describe_error(&err));
            ExitCode::FAILURE
        }
    }
}
