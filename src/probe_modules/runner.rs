//! Everything `main` does between argument parsing and `process::exit`.
use chrono::{DateTime, Utc};
use clap::CommandFactory;
use tracing::debug;

use crate::probe_modules::api::MmsClient;
use crate::probe_modules::check::run_check;
use crate::probe_modules::config::{CliArgs, ProbeConfig};
use crate::probe_modules::reporter::Reporter;
use crate::probe_modules::threshold::Severity;

/// Exit code for a usage error, outside the severity codes.
pub const USAGE_EXIT_CODE: i32 = 2;

pub fn usage() -> String {
    CliArgs::command().render_help().to_string()
}

/// Runs one check and returns the text for stdout with the exit code.
pub async fn run(args: CliArgs, now: DateTime<Utc>) -> (String, i32) {
    let mut reporter = Reporter::new();

    let config = match ProbeConfig::from_args(args) {
        Ok(Some(config)) => config,
        Ok(None) => return (usage(), USAGE_EXIT_CODE),
        Err(e) => {
            reporter.add_result(Severity::Unknown, e.to_string());
            return reporter.finish();
        }
    };
    debug!(
        server = %config.server,
        group_id = %config.group_id,
        hostname = %config.hostname,
        metric = ?config.metric,
        "Loaded configuration."
    );

    match MmsClient::new(&config.server, config.timeout, config.credentials.clone()) {
        Ok(api) => run_check(&config, &api, now, &mut reporter).await,
        Err(e) => reporter.add_result(
            Severity::Unknown,
            format!("Failed to create API. Error: {e}"),
        ),
    }

    reporter.finish()
}
