//! `vstream` command line client.
//!
//! Sends one request and prints the status code and body.

mod cli;

use std::{io::Write, process::ExitCode};

use clap::Parser;
use vstream::{Connection, ProtocolVersion, RestVerb, create_request};

#[tokio::main]
async fn main() -> ExitCode {
    // Applications embedding the library install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = cli::Cli::parse();
    #[cfg(feature = "metrics")]
    let metrics = if cli.print_metrics {
        match metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(err) => {
                tracing::warn!(error = %err, "metrics recorder unavailable");
                None
            }
        }
    } else {
        None
    };

    let code = run(&cli).await;

    #[cfg(feature = "metrics")]
    if let Some(handle) = metrics {
        handle.run_upkeep();
        eprint!("{}", handle.render());
    }
    code
}

async fn run(cli: &cli::Cli) -> ExitCode {
    let verb: RestVerb = match cli.verb.parse() {
        Ok(verb) => verb,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(2);
        }
    };
    let version = match cli.vst_version {
        cli::VstVersion::V1_0 => ProtocolVersion::V1_0,
        cli::VstVersion::V1_1 => ProtocolVersion::V1_1,
    };

    let connection = match Connection::builder()
        .version(version)
        .request_timeout(cli.timeout())
        .connect(cli.endpoint.as_str())
        .await
    {
        Ok(connection) => connection,
        Err(err) => {
            eprintln!("{}: {err} ({})", cli.endpoint, err.code());
            return ExitCode::FAILURE;
        }
    };

    let mut request = create_request(verb, cli.path.clone()).with_database(cli.database.clone());
    if let Some(body) = &cli.body {
        request = request.with_body(body.clone());
    }

    let outcome = connection.send_request(request).await;
    connection.close();
    match outcome {
        Ok(response) => {
            println!("{}", response.status_code());
            let mut stdout = std::io::stdout().lock();
            if stdout
                .write_all(response.body())
                .and_then(|()| stdout.flush())
                .is_err()
            {
                return ExitCode::FAILURE;
            }
            if response.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(err) => {
            eprintln!("request failed: {err} ({})", err.code());
            ExitCode::FAILURE
        }
    }
}
