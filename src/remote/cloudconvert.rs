//! CloudConvert v2 REST client.
//!
//! Only the five calls the gateway needs are implemented. Job status is
//! polled with `GET /jobs/{id}`; the overall bound on that loop lives in the
//! gateway, while each individual HTTP call is bounded by the `reqwest`
//! client timeout.

use super::{job_request, ConversionService, RemoteJob};
use crate::config::GatewayConfig;
use crate::error::Error;
use crate::format::FileType;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

/// CloudConvert wraps every resource in a `data` envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

/// Shape of CloudConvert error bodies.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
    code: Option<String>,
}

/// `reqwest`-backed [`ConversionService`] for the CloudConvert API.
#[derive(Clone)]
pub struct CloudConvertClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    poll_interval: Duration,
}

impl std::fmt::Debug for CloudConvertClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudConvertClient")
            .field("base_url", &self.base_url)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl CloudConvertClient {
    pub fn new(config: &GatewayConfig) -> Result<Self, Error> {
        if config.api_key.is_empty() {
            return Err(Error::InvalidConfig(
                "CloudConvert API key is not set (CLOUDCONVERT_API_KEY)".into(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.api_base_url.clone(),
            api_key: config.api_key.clone(),
            poll_interval: config.poll_interval(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn fetch_job(&self, job_id: &str) -> Result<RemoteJob, Error> {
        let response = self
            .http
            .get(self.url(&format!("/jobs/{job_id}")))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| Error::RemoteApi {
                message: format!("job status request failed: {e}"),
            })?;

        if !response.status().is_success() {
            return Err(Error::RemoteApi {
                message: error_message(response).await,
            });
        }

        let envelope: Envelope<RemoteJob> = response.json().await.map_err(|e| Error::RemoteApi {
            message: format!("unreadable job status: {e}"),
        })?;
        Ok(envelope.data)
    }
}

/// Turn a non-success response into `"<status>: <message> (<code>)"`.
async fn error_message(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ApiErrorBody>(&body) {
        Ok(ApiErrorBody {
            message: Some(msg),
            code: Some(code),
        }) => format!("{status}: {msg} ({code})"),
        Ok(ApiErrorBody {
            message: Some(msg), ..
        }) => format!("{status}: {msg}"),
        _ if body.trim().is_empty() => status.to_string(),
        _ => format!("{status}: {}", body.trim()),
    }
}

#[async_trait]
impl ConversionService for CloudConvertClient {
    async fn create_job(&self, input: FileType, output: FileType) -> Result<RemoteJob, Error> {
        let response = self
            .http
            .post(self.url("/jobs"))
            .bearer_auth(&self.api_key)
            .json(&job_request(input, output))
            .send()
            .await
            .map_err(|e| Error::JobCreationFailed {
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(Error::JobCreationFailed {
                message: error_message(response).await,
            });
        }

        let envelope: Envelope<RemoteJob> =
            response.json().await.map_err(|e| Error::JobCreationFailed {
                message: format!("unreadable job payload: {e}"),
            })?;
        info!("Created remote job {} ({} → {})", envelope.data.id, input, output);
        Ok(envelope.data)
    }

    async fn upload(&self, job: &RemoteJob, file_name: &str, bytes: Bytes) -> Result<(), Error> {
        let upload_form = job
            .upload_task()
            .and_then(|t| t.result.as_ref())
            .and_then(|r| r.form.as_ref())
            .ok_or_else(|| Error::UploadFailed {
                message: "Upload task not found".into(),
            })?;

        let len = bytes.len() as u64;
        let mut form = Form::new();
        for (key, value) in upload_form.fields() {
            form = form.text(key, value);
        }
        let part = Part::stream_with_length(bytes, len).file_name(file_name.to_string());
        form = form.part("file", part);

        debug!("Uploading {} bytes as '{}' for job {}", len, file_name, job.id);

        // The form URL is pre-signed; it must not carry our bearer token.
        let response = self
            .http
            .post(&upload_form.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::UploadFailed {
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(Error::UploadFailed {
                message: error_message(response).await,
            });
        }
        Ok(())
    }

    async fn wait(&self, job_id: &str) -> Result<RemoteJob, Error> {
        let mut polls = 0u32;
        loop {
            let job = self.fetch_job(job_id).await?;
            polls += 1;
            if job.is_terminal() {
                debug!("Job {} terminal after {} polls: {:?}", job_id, polls, job.status);
                return Ok(job);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn download(&self, url: &str) -> Result<Bytes, Error> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::DownloadFailed {
                status: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::DownloadFailed {
                status: status
                    .canonical_reason()
                    .map(str::to_string)
                    .unwrap_or_else(|| status.to_string()),
            });
        }

        response.bytes().await.map_err(|e| Error::DownloadFailed {
            status: format!("body read failed: {e}"),
        })
    }

    async fn delete_job(&self, job_id: &str) -> Result<(), Error> {
        let response = self
            .http
            .delete(self.url(&format!("/jobs/{job_id}")))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| Error::RemoteApi {
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(Error::RemoteApi {
                message: error_message(response).await,
            });
        }
        Ok(())
    }
}
