//! Turns one host or metric lookup into exactly one check result.
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::probe_modules::api::{Host, MetricQuery, MmsApi};
use crate::probe_modules::config::ProbeConfig;
use crate::probe_modules::reporter::Reporter;
use crate::probe_modules::threshold::{classify, Severity};

/// Runs the configured check against `api` as of `now`.
///
/// Every failure becomes an UNKNOWN result, so the reporter always ends up
/// holding exactly one outcome.
pub async fn run_check<A>(config: &ProbeConfig, api: &A, now: DateTime<Utc>, reporter: &mut Reporter)
where
    A: MmsApi + ?Sized,
{
    let host = match api.fetch_host_by_name(&config.group_id, &config.hostname).await {
        Ok(host) => host,
        Err(e) => {
            warn!(group_id = %config.group_id, hostname = %config.hostname, error = %e, "Host lookup failed.");
            reporter.add_result(Severity::Unknown, e.to_string());
            return;
        }
    };
    debug!(host_id = %host.id, last_ping = ?host.last_ping, "Resolved host.");

    match config.metric.as_deref() {
        None => check_host(config, &host, now, reporter),
        Some(metric_name) => check_metric(config, api, &host, metric_name, now, reporter).await,
    }
}

/// Liveness: how long ago the service last heard from the host.
fn check_host(config: &ProbeConfig, host: &Host, now: DateTime<Utc>, reporter: &mut Reporter) {
    let Some(last_ping) = host.last_ping else {
        reporter.add_result(
            Severity::Unknown,
            format!("No last ping recorded for host {}", config.hostname),
        );
        return;
    };
    let age = seconds_between(last_ping, now);
    info!(host_id = %host.id, age_seconds = age, "Checking last ping age.");

    match classify(&config.warning, &config.critical, age) {
        Ok(severity) => reporter.add_result(severity, format!("Last ping was {age} seconds ago")),
        Err(e) => reporter.add_result(Severity::Unknown, e.to_string()),
    }
}

async fn check_metric<A>(
    config: &ProbeConfig,
    api: &A,
    host: &Host,
    metric_name: &str,
    now: DateTime<Utc>,
    reporter: &mut Reporter,
) where
    A: MmsApi + ?Sized,
{
    let query = MetricQuery {
        group_id: &config.group_id,
        host_id: &host.id,
        metric_name,
        granularity: config.granularity,
        period: &config.period,
        db_name: config.db_name.as_deref(),
    };
    let metric = match api.fetch_metric(&query).await {
        Ok(metric) => metric,
        Err(e) => {
            warn!(host_id = %host.id, metric = metric_name, error = %e, "Metric lookup failed.");
            reporter.add_result(Severity::Unknown, e.to_string());
            return;
        }
    };

    let Some(point) = metric.last_data_point() else {
        reporter.add_result(
            Severity::Unknown,
            format!("No data points found for {metric_name}"),
        );
        return;
    };

    let age = seconds_between(point.timestamp, now).trunc() as i64;
    info!(metric = metric_name, age_seconds = age, value = point.value, "Checking last data point.");
    // Staleness outranks the thresholds and suppresses perf data.
    if age > config.max_age_seconds {
        reporter.add_result(
            Severity::Critical,
            format!("Last data point for {metric_name} is {age} seconds old."),
        );
        return;
    }

    reporter.add_perf_datum(metric_name, "", point.value);

    match classify(&config.warning, &config.critical, point.value) {
        Ok(severity) => reporter.add_result(severity, metric.summarize_last_data_point()),
        Err(e) => reporter.add_result(Severity::Unknown, e.to_string()),
    }
}

fn seconds_between(then: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let elapsed = now.signed_duration_since(then);
    match elapsed.num_microseconds() {
        Some(micros) => micros as f64 / 1_000_000.0,
        None => elapsed.num_seconds() as f64,
    }
}
