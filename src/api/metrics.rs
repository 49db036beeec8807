//! Summary counters from the metrics backend.
//!
//! Counts are Prometheus series named `<scope>_summary_<metric>` and labelled
//! by namespace (plus user or device for the narrower scopes). A query with a
//! point in time, or without a start, is an instant query returning one
//! value; anything else is a range query returning a series.

use serde_json::Value;

use super::{try_request_value, ApiClient};
use crate::constants::{DEFAULT_RANGE_STEP, METRICS_QUERY_PATH, METRICS_QUERY_RANGE_PATH};
use crate::state::Alert;

/// Counted entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum CountType {
    /// Registered users.
    User,
    /// Users with at least one online device.
    OnlineUser,
    /// Registered devices.
    Device,
    /// Devices currently online.
    OnlineDevice,
    /// Labels.
    Label,
    /// Access policies.
    Policy,
    /// Raised alarms.
    Alarm,
}

impl CountType {
    /// Metric name suffix.
    #[must_use]
    pub fn metric_name(self) -> &'static str {
        match self {
            Self::User => "user_count",
            Self::OnlineUser => "online_user_count",
            Self::Device => "device_count",
            Self::OnlineDevice => "online_device_count",
            Self::Label => "label_count",
            Self::Policy => "policy_count",
            Self::Alarm => "alarm_count",
        }
    }
}

/// Parameters of a count lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountQuery {
    /// What to count.
    pub count_type: CountType,
    /// Tenant namespace.
    pub namespace: String,
    /// Narrow to one user.
    pub user_id: Option<String>,
    /// Narrow to one device. Takes precedence over `user_id`.
    pub device_id: Option<String>,
    /// Evaluation time of an instant query.
    pub time: Option<String>,
    /// Range start.
    pub start: Option<String>,
    /// Range end, now when absent.
    pub end: Option<String>,
    /// Range resolution, one day when absent.
    pub step: Option<String>,
}

impl CountQuery {
    /// Instant query for the whole namespace.
    #[must_use]
    pub fn new(count_type: CountType, namespace: impl Into<String>) -> Self {
        Self {
            count_type,
            namespace: namespace.into(),
            user_id: None,
            device_id: None,
            time: None,
            start: None,
            end: None,
            step: None,
        }
    }

    /// The PromQL selector for this query.
    #[must_use]
    pub fn promql(&self) -> String {
        let metric = self.count_type.metric_name();
        let ns = format!("namespace=\"{}\"", label_value(&self.namespace));
        if let Some(device_id) = &self.device_id {
            let device_id = label_value(device_id);
            format!("device_summary_{metric}{{{ns},deviceID=\"{device_id}\"}}")
        } else if let Some(user_id) = &self.user_id {
            let user_id = label_value(user_id);
            format!("user_summary_{metric}{{{ns},userID=\"{user_id}\"}}")
        } else {
            format!("namespace_summary_{metric}{{{ns}}}")
        }
    }

    /// `true` when this is an instant query.
    #[must_use]
    pub fn is_instant(&self) -> bool {
        self.time.is_some() || self.start.is_none()
    }

    /// Endpoint path and query parameters. `now` is the range end used when
    /// none was given, in Unix seconds.
    #[must_use]
    pub fn request(&self, now: i64) -> (&'static str, Vec<(&'static str, String)>) {
        let mut params = vec![("query", self.promql())];
        if self.is_instant() {
            if let Some(time) = &self.time {
                params.push(("time", time.clone()));
            }
            return (METRICS_QUERY_PATH, params);
        }

        params.push(("start", self.start.clone().unwrap_or_default()));
        params.push(("end", self.end.clone().unwrap_or_else(|| now.to_string())));
        params.push((
            "step",
            self.step.clone().unwrap_or_else(|| DEFAULT_RANGE_STEP.to_string()),
        ));
        (METRICS_QUERY_RANGE_PATH, params)
    }
}

/// Escape a string for use inside a double-quoted PromQL label value.
fn label_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}

/// One point of a range result.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Unix timestamp in seconds.
    pub timestamp: f64,
    /// Sample value as reported by the backend.
    pub value: String,
}

/// Outcome of a count lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum CountResult {
    /// Instant query: value of the first series, if any.
    Count(Option<String>),
    /// Range query: samples of the first series, if any.
    Values(Option<Vec<Sample>>),
}

/// Look up a count.
///
/// # Errors
///
/// Failures are surfaced the way [`super::try_request`] does: an alert to
/// render, or `None` when the failure was already shown as a toast.
pub async fn get_count(client: &ApiClient, query: &CountQuery) -> Result<CountResult, Option<Alert>> {
    let (path, params) = query.request(chrono::Utc::now().timestamp());
    let body = try_request_value(client.state(), client.get(path, &params)).await?;
    log::debug!("[Api] Metrics result for {}: {body:?}", query.promql());

    let data = body.as_ref().and_then(|b| b.get("data"));
    Ok(if query.is_instant() {
        CountResult::Count(data.and_then(first_vector_value))
    } else {
        CountResult::Values(data.and_then(first_matrix_values))
    })
}

fn first_series(data: &Value) -> Option<&Value> {
    data.get("result")?.as_array()?.first()
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_vector_value(data: &Value) -> Option<String> {
    let pair = first_series(data)?.get("value")?.as_array()?;
    scalar_to_string(pair.get(1)?)
}

fn first_matrix_values(data: &Value) -> Option<Vec<Sample>> {
    let values = first_series(data)?.get("values")?.as_array()?;
    Some(
        values
            .iter()
            .filter_map(|point| {
                let point = point.as_array()?;
                Some(Sample {
                    timestamp: point.first()?.as_f64()?,
                    value: scalar_to_string(point.get(1)?)?,
                })
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_promql_scopes() {
        let mut q = CountQuery::new(CountType::OnlineDevice, "acme");
        assert_eq!(q.promql(), r#"namespace_summary_online_device_count{namespace="acme"}"#);

        q.user_id = Some("u1".to_string());
        assert_eq!(
            q.promql(),
            r#"user_summary_online_device_count{namespace="acme",userID="u1"}"#
        );

        q.device_id = Some("d1".to_string());
        assert_eq!(
            q.promql(),
            r#"device_summary_online_device_count{namespace="acme",deviceID="d1"}"#
        );
    }

    #[test]
    fn test_label_values_are_escaped() {
        let mut q = CountQuery::new(CountType::Device, r#"ac"me"#);
        q.user_id = Some(r"dom\u1".to_string());
        assert_eq!(
            q.promql(),
            r#"user_summary_device_count{namespace="ac\"me",userID="dom\\u1"}"#
        );
    }

    #[test]
    fn test_instant_vs_range_selection() {
        let mut q = CountQuery::new(CountType::User, "acme");
        let (path, params) = q.request(1_700_000_000);
        assert_eq!(path, "/metrics/api/v1/query");
        assert_eq!(params.len(), 1);

        q.start = Some("1699000000".to_string());
        let (path, params) = q.request(1_700_000_000);
        assert_eq!(path, "/metrics/api/v1/query_range");
        assert!(params.contains(&("end", "1700000000".to_string())));
        assert!(params.contains(&("step", "1d".to_string())));

        // A point in time wins over a range start
        q.time = Some("1699500000".to_string());
        let (path, params) = q.request(1_700_000_000);
        assert_eq!(path, "/metrics/api/v1/query");
        assert!(params.contains(&("time", "1699500000".to_string())));
    }

    #[test]
    fn test_first_vector_value() {
        let data = json!({
            "resultType": "vector",
            "result": [{"metric": {}, "value": [1_700_000_000.0, "42"]}]
        });
        assert_eq!(first_vector_value(&data), Some("42".to_string()));
        assert_eq!(first_vector_value(&json!({"result": []})), None);
    }

    #[test]
    fn test_first_matrix_values() {
        let data = json!({
            "resultType": "matrix",
            "result": [{"metric": {}, "values": [[1.0, "3"], [2.0, "5"]]}]
        });
        assert_eq!(
            first_matrix_values(&data),
            Some(vec![
                Sample { timestamp: 1.0, value: "3".to_string() },
                Sample { timestamp: 2.0, value: "5".to_string() },
            ])
        );
        assert_eq!(first_matrix_values(&json!({"result": []})), None);
    }
}
