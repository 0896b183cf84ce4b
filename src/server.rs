//! HTTP surface of the gateway.
//!
//! | Method | Path       | Purpose                                   |
//! |--------|------------|-------------------------------------------|
//! | POST   | `/convert` | multipart `file` + optional `outputFormat` |
//! | GET    | `/formats` | the supported format table                |
//! | GET    | `/health`  | liveness probe                            |
//!
//! Errors are always answered with a JSON body `{"error": "<message>"}`.

use crate::config::GatewayConfig;
use crate::error::{Error, ErrorKind};
use crate::format::{self, FormatDescriptor};
use crate::gateway::{self, Upload};
use crate::remote::{CloudConvertClient, ConversionService};
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::BytesMut;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Room for multipart boundaries and the small text fields on top of the
/// file itself.
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

/// Bytes left unescaped in an RFC 5987 `ext-value` (`attr-char`).
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// State shared by all handlers. Immutable; the gateway keeps nothing
/// between requests.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub service: Arc<dyn ConversionService>,
}

impl AppState {
    pub fn new(config: GatewayConfig, service: Arc<dyn ConversionService>) -> Self {
        Self {
            config: Arc::new(config),
            service,
        }
    }

    /// State backed by the real CloudConvert API.
    pub fn cloudconvert(config: GatewayConfig) -> Result<Self, Error> {
        let client = CloudConvertClient::new(&config)?;
        Ok(Self::new(config, Arc::new(client)))
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self.kind() {
            ErrorKind::Validation | ErrorKind::Client => debug!("Client error: {}", self),
            ErrorKind::Remote | ErrorKind::Timeout => warn!("Conversion failed: {}", self),
            ErrorKind::Internal => error!("Internal error: {:#}", self),
        }

        let status = self.status_code();
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Build the API router with all endpoints.
pub fn build_router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.config.max_file_size.saturating_add(MULTIPART_OVERHEAD))
        .unwrap_or(usize::MAX);

    Router::new()
        .route("/convert", post(convert_file))
        .route("/formats", get(list_formats))
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(addr: &str, state: AppState) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        "Conversion gateway listening on {} (max upload {}MB)",
        listener.local_addr()?,
        format::size_limit_mb(state.config.max_file_size)
    );
    axum::serve(listener, build_router(state)).await
}

/// Liveness probe.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// The supported format table, in display order.
pub async fn list_formats() -> Json<&'static [FormatDescriptor]> {
    Json(format::all_formats())
}

/// `POST /convert`: convert the uploaded `file` to `outputFormat`.
pub async fn convert_file(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, Error> {
    let mut multipart = multipart.map_err(|e| Error::BadRequest(e.body_text()))?;
    let max = state.config.max_file_size;

    let mut upload: Option<Upload> = None;
    let mut requested_output: Option<String> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max, Part::Form))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let mut buf = BytesMut::new();
                // Reject as soon as the limit is crossed instead of buffering
                // the whole body first.
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| multipart_error(e, max, Part::File))?
                {
                    if (buf.len() + chunk.len()) as u64 > max {
                        debug!("Upload '{}' exceeds {} bytes, rejecting", file_name, max);
                        return Err(Error::FileTooLarge {
                            limit_mb: format::size_limit_mb(max),
                        });
                    }
                    buf.extend_from_slice(&chunk);
                }
                upload = Some(Upload::new(file_name, buf.freeze()));
            }
            "outputFormat" => {
                requested_output = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| multipart_error(e, max, Part::Form))?,
                );
            }
            other => debug!("Ignoring multipart field '{}'", other),
        }
    }

    let upload = upload.ok_or(Error::MissingFile)?;
    let converted = gateway::convert(
        upload,
        requested_output.as_deref(),
        &state.config,
        state.service.as_ref(),
    )
    .await?;

    let disposition = content_disposition(&converted.file_name);
    let headers = [
        (CONTENT_TYPE, converted.content_type),
        (CONTENT_DISPOSITION, disposition),
        (CONTENT_LENGTH, converted.bytes.len().to_string()),
    ];
    Ok((StatusCode::OK, headers, converted.bytes).into_response())
}

/// Which part of the multipart body was being read when an error hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Part {
    File,
    Form,
}

/// Body-limit overruns arrive as multipart errors with status 413.
fn multipart_error(e: MultipartError, max_file_size: u64, part: Part) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        overrun_error(part, max_file_size)
    } else {
        Error::BadRequest(e.body_text())
    }
}

/// Only an overrun inside the `file` field is the file's fault; anything
/// else means the form fields around it are oversized.
fn overrun_error(part: Part, max_file_size: u64) -> Error {
    match part {
        Part::File => Error::FileTooLarge {
            limit_mb: format::size_limit_mb(max_file_size),
        },
        Part::Form => Error::BadRequest(format!(
            "form fields exceed {MULTIPART_OVERHEAD} bytes"
        )),
    }
}

/// `attachment` disposition with an ASCII `filename` fallback and the exact
/// name as RFC 6266 `filename*`.
fn content_disposition(name: &str) -> String {
    let fallback = header_safe_file_name(name);
    if fallback == name {
        format!("attachment; filename=\"{fallback}\"")
    } else {
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            fallback,
            utf8_percent_encode(name, ATTR_CHAR)
        )
    }
}

/// Replace characters that would break a quoted `filename="…"` parameter
/// or a header value.
fn header_safe_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_control() || !c.is_ascii() => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn header_safe_file_name_replaces_quotes() {
        assert_eq!(header_safe_file_name("a\"b\\c\r\n.pdf"), "a_b_c__.pdf");
        assert_eq!(header_safe_file_name("résumé.docx"), "r_sum_.docx");
    }

    #[test]
    fn ascii_names_have_plain_disposition() {
        assert_eq!(
            content_disposition("report.pdf"),
            "attachment; filename=\"report.pdf\""
        );
    }

    #[test]
    fn non_ascii_names_get_extended_parameter() {
        assert_eq!(
            content_disposition("résumé 1.docx"),
            "attachment; filename=\"r_sum_ 1.docx\"; filename*=UTF-8''r%C3%A9sum%C3%A9%201.docx"
        );
    }

    #[test]
    fn overruns_blame_the_right_part() {
        assert!(matches!(
            overrun_error(Part::File, 10_485_760),
            Error::FileTooLarge { ref limit_mb } if limit_mb == "10"
        ));
        let err = overrun_error(Part::Form, 10_485_760);
        assert!(matches!(err, Error::BadRequest(_)));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn error_renders_json_body() {
        let response = Error::FileTooLarge {
            limit_mb: "10".into(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "File too large. Maximum size is 10MB");
    }

    #[tokio::test]
    async fn remote_errors_are_500() {
        let response = Error::Timeout { secs: 5 }.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
