//! Client for the document-processing API.
//!
//! Two calls: `POST /document` submits a file for processing and returns a
//! job id; `GET /document/{id}` reports the job status and, once the job
//! leaves `processing`, the extraction results.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::ApiError;

/// Job status value that means "not done yet".
const STATUS_PROCESSING: &str = "processing";

/// Response to a document submission.
#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: String,
}

/// Polled result of a document job.
#[derive(Debug, Clone, Deserialize)]
pub struct JobResult {
    pub status: String,
    #[serde(default)]
    pub preview: Option<String>,
    #[serde(default)]
    pub fields: Vec<ExtractedField>,
}

/// One extracted field, e.g. an invoice amount or due date.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedField {
    pub name: String,
    pub content: String,
}

/// Document API client.
pub struct DocumentApi {
    base_url: String,
    secret_key: SecretString,
    poll_interval: Duration,
    client: reqwest::Client,
}

impl DocumentApi {
    pub fn new(
        base_url: impl Into<String>,
        secret_key: SecretString,
        poll_interval: Duration,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key,
            poll_interval,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn auth_header(&self) -> String {
        format!("secret_key {}", self.secret_key.expose_secret())
    }

    /// Submit a document for processing; returns the remote job id.
    pub async fn submit(&self, filename: &str, bytes: Vec<u8>) -> Result<String, ApiError> {
        let endpoint = self.endpoint("/document");
        let part = Part::bytes(bytes).file_name(filename.to_string());
        let form = Form::new().part("file", part);

        let resp = self
            .client
            .post(&endpoint)
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .multipart(form)
            .send()
            .await
            .map_err(|e| ApiError::Request {
                endpoint: endpoint.clone(),
                source: e,
            })?;
        // TODO retry on 5xx
        let resp = check_status(resp, &endpoint).await?;

        let submitted: SubmitResponse =
            resp.json().await.map_err(|e| ApiError::InvalidResponse {
                endpoint,
                reason: e.to_string(),
            })?;
        Ok(submitted.id)
    }

    /// Poll a job until its status leaves `processing`, then return the
    /// result payload.
    pub async fn wait_for_result(&self, job_id: &str) -> Result<JobResult, ApiError> {
        let endpoint = self.endpoint(&format!("/document/{job_id}"));
        loop {
            let resp = self
                .client
                .get(&endpoint)
                .header(reqwest::header::AUTHORIZATION, self.auth_header())
                .send()
                .await
                .map_err(|e| ApiError::Request {
                    endpoint: endpoint.clone(),
                    source: e,
                })?;
            // TODO retry on 5xx
            let resp = check_status(resp, &endpoint).await?;

            let result: JobResult = resp.json().await.map_err(|e| ApiError::InvalidResponse {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;

            if result.status == STATUS_PROCESSING {
                tokio::time::sleep(self.poll_interval).await;
                continue;
            }
            return Ok(result);
        }
    }
}

/// Turn a non-2xx response into an error carrying the body text.
async fn check_status(
    resp: reqwest::Response,
    endpoint: &str,
) -> Result<reqwest::Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ApiError::Status {
        endpoint: endpoint.to_string(),
        status,
        body,
    })
}
