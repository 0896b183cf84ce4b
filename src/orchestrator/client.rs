//! Client side of the `POST /convert` exchange.

use super::SourceFile;
use crate::config::OrchestratorConfig;
use crate::error::{Error, JobError};
use crate::format::{self, FileType};
use crate::gateway::ConvertedFile;
use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use reqwest::header::{HeaderName, CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::debug;

/// Submits one file to a conversion gateway.
#[async_trait]
pub trait ConversionClient: Send + Sync {
    async fn convert(&self, file: &SourceFile, output: FileType) -> Result<ConvertedFile, JobError>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// [`ConversionClient`] that posts multipart uploads to a running gateway.
#[derive(Debug, Clone)]
pub struct HttpConversionClient {
    http: reqwest::Client,
    convert_url: String,
    timeout_secs: u64,
}

impl HttpConversionClient {
    pub fn new(config: &OrchestratorConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            convert_url: config.convert_url(),
            timeout_secs: config.request_timeout_secs,
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> JobError {
        if e.is_timeout() {
            JobError::Timeout {
                secs: self.timeout_secs,
            }
        } else {
            JobError::Transport {
                detail: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl ConversionClient for HttpConversionClient {
    async fn convert(&self, file: &SourceFile, output: FileType) -> Result<ConvertedFile, JobError> {
        let mime = format::detect_format(&file.name)
            .map(FileType::content_type)
            .unwrap_or("application/octet-stream");
        let part = Part::stream_with_length(file.bytes.clone(), file.size())
            .file_name(file.name.clone())
            .mime_str(mime)
            .map_err(|e| self.transport_error(e))?;
        let form = Form::new()
            .part("file", part)
            .text("outputFormat", output.as_str().to_string());

        debug!("POST {} ('{}' → {})", self.convert_url, file.name, output);
        let response = self
            .http
            .post(&self.convert_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|b| b.error)
                .unwrap_or_else(|| "Conversion failed".to_string());
            return Err(JobError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let header = |name: HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let content_type = header(CONTENT_TYPE).unwrap_or_else(|| output.content_type().to_string());
        let file_name = header(CONTENT_DISPOSITION)
            .as_deref()
            .and_then(disposition_file_name)
            .unwrap_or_else(|| format::output_file_name(&file.name, output));

        let bytes = response.bytes().await.map_err(|e| self.transport_error(e))?;
        Ok(ConvertedFile {
            file_name,
            format: output,
            content_type,
            bytes,
        })
    }
}

/// Extract the download name from a `Content-Disposition` value.
///
/// An RFC 6266 `filename*=UTF-8''…` parameter wins over the plain quoted
/// `filename`, which servers reduce to ASCII.
pub(crate) fn disposition_file_name(value: &str) -> Option<String> {
    let params: Vec<&str> = value.split(';').map(str::trim).collect();

    let extended = params
        .iter()
        .find_map(|p| p.strip_prefix("filename*="))
        .and_then(|v| {
            let (charset, rest) = v.split_once('\'')?;
            let (_lang, encoded) = rest.split_once('\'')?;
            if !charset.eq_ignore_ascii_case("utf-8") {
                return None;
            }
            percent_decode_str(encoded)
                .decode_utf8()
                .ok()
                .map(|s| s.into_owned())
        })
        .filter(|v| !v.is_empty());

    extended.or_else(|| {
        params
            .iter()
            .find_map(|p| p.strip_prefix("filename="))
            .map(|v| v.trim_matches('"').to_string())
            .filter(|v| !v.is_empty())
    })
}
