//! Command line interface for the `vstream` binary.
//!
//! Kept free of library types so the build script can include it to render
//! the man page.

use std::time::Duration;

use clap::{Parser, ValueEnum};

/// Protocol version selectable on the command line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum VstVersion {
    #[value(name = "1.0")]
    V1_0,
    #[default]
    #[value(name = "1.1")]
    V1_1,
}

/// Send one request to a server and print the response.
#[derive(Debug, Parser)]
#[command(name = "vstream", version, about = "Send a request over a chunked binary connection")]
pub struct Cli {
    /// Server address as `HOST:PORT`.
    #[arg(short, long, default_value = "127.0.0.1:8529")]
    pub endpoint: String,
    /// Database the request is addressed to.
    #[arg(short, long, default_value = "_system")]
    pub database: String,
    /// Protocol version announced in the preamble.
    #[arg(long, value_enum, default_value_t)]
    pub vst_version: VstVersion,
    /// Request timeout in seconds.
    #[arg(short, long, default_value_t = 120.0, allow_negative_numbers = true)]
    pub timeout: f64,
    /// Request body sent as-is.
    #[arg(short, long)]
    pub body: Option<String>,
    /// Print collected metrics in Prometheus text format to stderr on exit.
    #[arg(long)]
    pub print_metrics: bool,
    /// REST verb, for example `GET` or `post`.
    pub verb: String,
    /// Request path.
    pub path: String,
}

impl Cli {
    /// Request timeout as a [`Duration`]; non-positive values disable it.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout > 0.0)
            .then(|| Duration::try_from_secs_f64(self.timeout).ok())
            .flatten()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use clap::Parser;
    use rstest::rstest;

    use super::{Cli, VstVersion};

    #[test]
    fn parses_request_arguments() {
        let cli = Cli::parse_from([
            "vstream",
            "--endpoint",
            "db:8529",
            "--vst-version",
            "1.0",
            "--body",
            "{}",
            "post",
            "/_api/cursor",
        ]);
        assert_eq!(cli.endpoint, "db:8529");
        assert_eq!(cli.vst_version, VstVersion::V1_0);
        assert_eq!(cli.body.as_deref(), Some("{}"));
        assert_eq!(cli.verb, "post");
        assert_eq!(cli.path, "/_api/cursor");
        assert_eq!(cli.database, "_system");
    }

    #[rstest]
    #[case("2.5", Some(Duration::from_millis(2500)))]
    #[case("0", None)]
    #[case("-1", None)]
    fn timeout_converts_seconds(#[case] raw: &str, #[case] expected: Option<Duration>) {
        let cli = Cli::parse_from(["vstream", "--timeout", raw, "GET", "/"]);
        assert_eq!(cli.timeout(), expected);
    }
}
