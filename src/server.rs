//! HTTP surface: the two-route router and its handlers.
//!
//! Both handlers are stateless single-shot request/response cycles; the
//! only shared state is the [`Extractor`] handle. Error bodies are plain
//! text, mirroring what the frontend expects from this API.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Json, Router,
    body::Body,
    extract::{Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::error;

use crate::{
    formats::{InfoResponse, RawInfo, build_info_response},
    ytdlp::Extractor,
};

#[derive(Clone)]
pub struct AppState {
    extractor: Arc<dyn Extractor>,
}

/// Plain-text error response with an explicit status.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Builds the application router.
///
/// The cross-origin header is stamped on every response: success, error,
/// and unmatched paths alike. Origin-matching CORS middleware would skip
/// requests without an `Origin` header, so a plain set-header layer it is.
pub fn app(extractor: Arc<dyn Extractor>, allow_origin: &str) -> anyhow::Result<Router> {
    let allow_origin: HeaderValue = allow_origin
        .parse()
        .with_context(|| format!("ALLOW_ORIGIN {allow_origin:?} is not a valid header value"))?;

    Ok(Router::new()
        .route("/info", get(info))
        .route("/download", get(download))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            allow_origin,
        ))
        .with_state(AppState { extractor }))
}

#[derive(Debug, Deserialize)]
struct InfoQuery {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DownloadQuery {
    url: Option<String>,
    itag: Option<String>,
}

/// An empty query value is as useless as an absent one; both are client
/// errors and neither starts a subprocess.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}

async fn info(
    State(state): State<AppState>,
    Query(query): Query<InfoQuery>,
) -> ApiResult<Json<InfoResponse>> {
    let url = present(query.url).ok_or_else(|| ApiError::bad_request("Missing url"))?;

    let stdout = state
        .extractor
        .capture_info(&url)
        .await
        .map_err(|err| ApiError::internal(err.to_string()))?;

    let raw: RawInfo = serde_json::from_slice(&stdout).map_err(|err| {
        error!(%url, "discarding unparseable tool output: {err}");
        ApiError::internal(format!("yt-dlp returned invalid JSON: {err}"))
    })?;

    Ok(Json(build_info_response(raw, &url)))
}

async fn download(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<Response> {
    let (Some(url), Some(itag)) = (present(query.url), present(query.itag)) else {
        return Err(ApiError::bad_request("Missing url or itag"));
    };

    // A spawn failure happens before any byte of the body is produced, so
    // it can still be reported as a status. Failures after this point
    // truncate the stream and show up only in the log.
    let stream = state
        .extractor
        .open_stream(&url, &itag)
        .await
        .map_err(|err| ApiError::internal(err.to_string()))?;

    let mut response = Body::from_stream(ReaderStream::new(stream)).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_static("attachment"),
    );
    Ok(response)
}
