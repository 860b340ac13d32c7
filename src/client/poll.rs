use futures::future::BoxFuture;

use super::error::ClientError;
use crate::models::ScheduleSnapshot;

/// Source of full state snapshots, polled on mount and on a fixed timer
pub trait PollSource: Send {
    fn fetch_snapshot(&self) -> BoxFuture<'_, Result<ScheduleSnapshot, ClientError>>;
}

/// Poll source backed by the tracking API's schedule endpoint
pub struct HttpPollSource {
    http: reqwest::Client,
    base_url: String,
    driver_id: Option<i64>,
}

impl HttpPollSource {
    /// Monitoring-scoped source: fetches every schedule
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            driver_id: None,
        }
    }

    /// Driver-scoped source: fetches that driver's schedules only
    pub fn for_driver(base_url: impl Into<String>, driver_id: i64) -> Self {
        Self {
            driver_id: Some(driver_id),
            ..Self::new(base_url)
        }
    }
}

impl PollSource for HttpPollSource {
    fn fetch_snapshot(&self) -> BoxFuture<'_, Result<ScheduleSnapshot, ClientError>> {
        Box::pin(async move {
            let mut request = self
                .http
                .get(format!("{}/api/schedules", self.base_url.trim_end_matches('/')));
            if let Some(driver_id) = self.driver_id {
                request = request.query(&[("driver_id", driver_id)]);
            }
            let response = request
                .send()
                .await?
                .error_for_status()
                .map_err(|e| ClientError::Network(e.to_string()))?;
            Ok(response.json::<ScheduleSnapshot>().await?)
        })
    }
}
