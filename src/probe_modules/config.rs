use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};
use tracing::{debug, info};

use crate::probe_modules::error::ProbeError;

pub const DEFAULT_SERVER: &str = "https://mms.mongodb.com";
pub const CREDENTIALS_FILE: &str = ".mongodb_mms";

/// Command line surface of the probe.
///
/// `groupid` and `hostname` are optional here so that a missing value prints
/// usage and exits 2 instead of going through clap's error path.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "check_mongodb_mms",
    version = crate::version::VERSION,
    about = "Checks a host or metric in MongoDB MMS / Ops Manager",
    after_help = "-w and -c support the standard nagios threshold formats.\n\
                  See https://nagios-plugins.org/doc/guidelines.html#THRESHOLDFORMAT for more details."
)]
pub struct CliArgs {
    /// The MMS/Ops Manager group ID that contains the server
    #[arg(short = 'g', long = "groupid")]
    pub group_id: Option<String>,

    /// hostname:port of the mongod/s to check
    #[arg(short = 'H', long = "hostname")]
    pub hostname: Option<String>,

    /// Metric to query (no metric means check last ping age in seconds)
    #[arg(short = 'm', long = "metric")]
    pub metric: Option<String>,

    /// Database name for DB_ metrics
    #[arg(short = 'd', long = "dbname")]
    pub db_name: Option<String>,

    /// The maximum number of seconds old a metric can be before it is considered stale
    #[arg(short = 'a', long = "maxage", default_value_t = 360)]
    pub max_age: i64,

    /// Hostname and port of the MMS/Ops Manager service
    #[arg(short = 's', long = "server", default_value = DEFAULT_SERVER)]
    pub server: String,

    /// Warning threshold for the given metric
    #[arg(short = 'w', long = "warning", default_value = "~:", allow_hyphen_values = true)]
    pub warning: String,

    /// Critical threshold for the given metric
    #[arg(short = 'c', long = "critical", default_value = "~:", allow_hyphen_values = true)]
    pub critical: String,

    /// Timeout in seconds for connecting to and reading from the service
    #[arg(short = 't', long = "timeout", default_value_t = 10)]
    pub timeout: u64,

    /// The size of the epoch
    #[arg(short = 'r', long = "granularity", value_enum, default_value_t = Granularity::Minute, ignore_case = true)]
    pub granularity: Granularity,

    /// The ISO-8601 time period (after the PT prefix) to look back over
    #[arg(short = 'p', long = "period", default_value = "1H")]
    pub period: String,

    /// The username for auth
    #[arg(short = 'u', long = "username")]
    pub username: Option<String>,

    /// The API key for the user
    #[arg(short = 'k', long = "apikey")]
    pub api_key: Option<String>,

    /// TOML file holding `username` and `apikey` (default: $HOME/.mongodb_mms)
    #[arg(short = 'f', long = "credentials")]
    pub credentials_file: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    #[value(name = "MINUTE")]
    Minute,
    #[value(name = "HOUR")]
    Hour,
    #[value(name = "DAY")]
    Day,
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Granularity::Minute => "MINUTE",
            Granularity::Hour => "HOUR",
            Granularity::Day => "DAY",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub api_key: String,
}

/// Contents of the optional credentials file.
#[derive(Deserialize, Debug, Default, Clone)]
pub struct CredentialsFile {
    pub username: Option<String>,
    pub apikey: Option<String>,
}

/// Everything a single check needs, fixed once at startup.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub group_id: String,
    pub hostname: String,
    pub metric: Option<String>,
    pub db_name: Option<String>,
    pub max_age_seconds: i64,
    pub server: String,
    pub warning: String,
    pub critical: String,
    pub timeout: Duration,
    pub granularity: Granularity,
    pub period: String,
    pub credentials: Option<Credentials>,
}

impl ProbeConfig {
    /// Returns `Ok(None)` when a required flag is missing.
    pub fn from_args(args: CliArgs) -> Result<Option<Self>, ProbeError> {
        let (Some(group_id), Some(hostname)) = (
            args.group_id.filter(|g| !g.is_empty()),
            args.hostname.filter(|h| !h.is_empty()),
        ) else {
            return Ok(None);
        };

        let file = match &args.credentials_file {
            Some(path) => Some(load_credentials_file(path)?),
            None => default_credentials_path()
                .filter(|path| path.is_file())
                .map(|path| load_credentials_file(&path))
                .transpose()?,
        }
        .unwrap_or_default();

        let username = args.username.or(file.username).filter(|u| !u.is_empty());
        let api_key = args.api_key.or(file.apikey).filter(|k| !k.is_empty());
        let credentials = match (username, api_key) {
            (Some(username), Some(api_key)) => Some(Credentials { username, api_key }),
            (None, None) => None,
            _ => {
                return Err(ProbeError::Config(
                    "both username and apikey are required for authentication".to_string(),
                ));
            }
        };

        Ok(Some(ProbeConfig {
            group_id,
            hostname,
            metric: args.metric.filter(|m| !m.is_empty()),
            db_name: args.db_name.filter(|d| !d.is_empty()),
            max_age_seconds: args.max_age,
            server: args.server.trim_end_matches('/').to_string(),
            warning: args.warning,
            critical: args.critical,
            timeout: Duration::from_secs(args.timeout),
            granularity: args.granularity,
            period: args.period,
            credentials,
        }))
    }
}

fn default_credentials_path() -> Option<PathBuf> {
    env::var_os("HOME").map(|home| Path::new(&home).join(CREDENTIALS_FILE))
}

pub fn load_credentials_file(path: &Path) -> Result<CredentialsFile, ProbeError> {
    debug!(path = ?path, "Loading credentials file.");
    let content = fs::read_to_string(path).map_err(|e| {
        ProbeError::Config(format!(
            "Failed to read credentials file {}. Error: {e}",
            path.display()
        ))
    })?;
    let file: CredentialsFile = toml::from_str(&content).map_err(|e| {
        ProbeError::Config(format!(
            "Failed to parse credentials file {}. Error: {e}",
            path.display()
        ))
    })?;
    info!(path = ?path, has_username = file.username.is_some(), "Loaded credentials file.");
    Ok(file)
}
