//! Access to the MMS / Ops Manager public API (`/api/public/v1.0`).
use async_trait::async_trait;

use crate::probe_modules::config::Granularity;
use crate::probe_modules::error::ProbeError;

pub mod client;
pub mod models;

pub use client::MmsClient;
pub use models::{DataPoint, Host, Metric};

pub const API_PREFIX: &str = "/api/public/v1.0";

/// Parameters of a metric series request.
#[derive(Debug, Clone)]
pub struct MetricQuery<'a> {
    pub group_id: &'a str,
    pub host_id: &'a str,
    pub metric_name: &'a str,
    pub granularity: Granularity,
    /// Appended to `PT`, e.g. `1H`.
    pub period: &'a str,
    pub db_name: Option<&'a str>,
}

/// The two lookups a check performs.
#[async_trait]
pub trait MmsApi {
    async fn fetch_host_by_name(&self, group_id: &str, hostname: &str)
        -> Result<Host, ProbeError>;

    async fn fetch_metric(&self, query: &MetricQuery<'_>) -> Result<Metric, ProbeError>;
}

pub fn host_by_name_path(group_id: &str, hostname: &str) -> String {
    format!("/groups/{group_id}/hosts/byName/{hostname}")
}

pub fn metric_path(query: &MetricQuery<'_>) -> String {
    let mut path = format!(
        "/groups/{}/hosts/{}/metrics/{}",
        query.group_id, query.host_id, query.metric_name
    );
    if let Some(db_name) = query.db_name {
        path.push('/');
        path.push_str(&escape_path_segment(db_name));
    }
    format!(
        "{path}?granularity={}&period=PT{}",
        query.granularity, query.period
    )
}

/// Percent-encodes every reserved character. Spaces come out as `%20`,
/// which is what the service expects in database names.
pub fn escape_path_segment(piece: &str) -> String {
    urlencoding::encode(piece).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(db_name: Option<&str>) -> MetricQuery<'_> {
        MetricQuery {
            group_id: "grp",
            host_id: "h1",
            metric_name: "DB_DATA_SIZE_TOTAL",
            granularity: Granularity::Hour,
            period: "2H",
            db_name,
        }
    }

    #[test]
    fn test_host_path() {
        assert_eq!(
            host_by_name_path("grp", "db1.example.com:27017"),
            "/groups/grp/hosts/byName/db1.example.com:27017"
        );
    }

    #[test]
    fn test_metric_path_without_db() {
        assert_eq!(
            metric_path(&query(None)),
            "/groups/grp/hosts/h1/metrics/DB_DATA_SIZE_TOTAL?granularity=HOUR&period=PT2H"
        );
    }

    #[test]
    fn test_db_name_is_percent_encoded() {
        let path = metric_path(&query(Some("my db/with slash")));
        assert_eq!(
            path,
            "/groups/grp/hosts/h1/metrics/DB_DATA_SIZE_TOTAL/my%20db%2Fwith%20slash?granularity=HOUR&period=PT2H"
        );
        assert!(!path.contains('+'));
    }

    #[test]
    fn test_escape_reserved_characters() {
        assert_eq!(escape_path_segment("a+b"), "a%2Bb");
        assert_eq!(escape_path_segment("a?b&c=d#e"), "a%3Fb%26c%3Dd%23e");
        assert_eq!(escape_path_segment("plain_name-1.2~"), "plain_name-1.2~");
    }
}
