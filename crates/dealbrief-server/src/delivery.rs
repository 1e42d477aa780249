use std::time::Duration;

use dealbrief_resilience::{Guard, ServiceError};
use reqwest::Client;
use serde::Serialize;

const BREAKER: &str = "report_delivery";

/// Pushes finished reports to the report-storage service.
pub struct ReportDelivery {
    client: Client,
    endpoint: String,
    guard: Guard,
}

#[derive(Serialize)]
struct DeliveryBody<'a> {
    result: &'a str,
}

impl ReportDelivery {
    /// # Errors
    ///
    /// Returns [`ServiceError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(endpoint: &str, timeout_secs: u64, guard: Guard) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            guard,
        })
    }

    async fn post(&self, url: &str, report: &str) -> Result<(), ServiceError> {
        let response = self
            .client
            .post(url)
            .json(&DeliveryBody { result: report })
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ServiceError::Status {
            service: "report storage".to_string(),
            status: status.as_u16(),
            body: body.chars().take(500).collect(),
        })
    }

    /// POST `{"result": report}` to `{endpoint}/{submission_id}`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Status`] on a non-2xx answer,
    /// [`ServiceError::CircuitOpen`] while the delivery breaker is open, or
    /// [`ServiceError::Http`] on transport failure.
    pub async fn deliver(&self, submission_id: &str, report: &str) -> Result<(), ServiceError> {
        let url = format!("{}/{submission_id}", self.endpoint);
        self.guard.call(BREAKER, || self.post(&url, report)).await?;
        tracing::info!(submission_id, report_chars = report.len(), url = %url, "report delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dealbrief_core::BreakerConfig;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn delivery(uri: &str) -> ReportDelivery {
        ReportDelivery::new(&format!("{uri}/reports/"), 5, Guard::new(BreakerConfig::default()))
            .expect("client")
    }

    #[tokio::test]
    async fn posts_report_keyed_by_submission_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/reports/s1"))
            .and(body_json(serde_json::json!({ "result": "# Report" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        delivery(&server.uri())
            .deliver("s1", "# Report")
            .await
            .expect("delivery should succeed");
    }

    #[tokio::test]
    async fn rejected_delivery_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("storage down"))
            .mount(&server)
            .await;

        let err = delivery(&server.uri())
            .deliver("s1", "# Report")
            .await
            .expect_err("500 should fail");
        assert!(matches!(err, ServiceError::Status { status: 500, ref body, .. } if body == "storage down"));
    }
}
