use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer};

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    pub id: String,
    #[serde(default)]
    pub hostname: String,
    /// Absent until the agent has reported the host at least once.
    #[serde(default)]
    pub last_ping: Option<DateTime<Utc>>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub type_name: Option<String>,
    #[serde(default)]
    pub replica_set_name: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DataPoint {
    pub timestamp: DateTime<Utc>,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub value: f64,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub metric_name: String,
    #[serde(default)]
    pub units: Option<String>,
    #[serde(default)]
    pub granularity: Option<String>,
    #[serde(default)]
    pub database_name: Option<String>,
    #[serde(default)]
    pub data_points: Vec<DataPoint>,
}

impl Metric {
    /// The most recent point by position; the service returns them oldest first.
    pub fn last_data_point(&self) -> Option<&DataPoint> {
        self.data_points.last()
    }

    /// One-line summary used as the message of a metric check.
    pub fn summarize_last_data_point(&self) -> String {
        match self.last_data_point() {
            Some(point) => format!(
                "{} = {} at {}",
                self.metric_name,
                point.value,
                point.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
            None => format!("{} has no data points", self.metric_name),
        }
    }
}

/// Body the service sends alongside any non-200 status.
#[derive(Deserialize, Debug, Default)]
pub struct ErrorBody {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

// The service reports points it has no sample for as `"value": null`.
fn null_as_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}
