use chrono::Utc;
use clap::Parser;
use std::process;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use check_mongodb_mms::probe_modules::config::CliArgs;
use check_mongodb_mms::probe_modules::runner;
use check_mongodb_mms::version::VERSION;

fn init_logging() {
    // stdout belongs to the plugin output line, so logs go to stderr.
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false);

    // Default to `warn` if RUST_LOG is not set.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = CliArgs::parse();
    init_logging();
    info!(version = VERSION, "Starting check.");

    let (output, code) = runner::run(args, Utc::now()).await;
    println!("{}", output.trim_end());
    info!(exit_code = code, "Check finished.");
    process::exit(code);
}
