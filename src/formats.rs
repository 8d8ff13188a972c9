//! Data model for the `/info` endpoint.
//!
//! [`RawInfo`] and [`RawFormat`] mirror the slice of yt-dlp's
//! `--dump-single-json` document this service actually reads. Everything is
//! optional because the tool's output varies wildly between extractors and
//! older uploads. [`build_info_response`] reshapes that payload into the
//! reduced schema the API exposes.

use serde::{Deserialize, Serialize};

/// The subset of the tool's JSON report we parse.
#[derive(Debug, Deserialize)]
pub struct RawInfo {
    pub title: Option<String>,
    #[serde(default)]
    pub formats: Vec<RawFormat>,
}

/// One entry of the tool's format list.
#[derive(Debug, Deserialize)]
pub struct RawFormat {
    #[serde(rename = "format_id")]
    pub format_id: Option<String>,
    pub format_note: Option<String>,
    pub height: Option<i64>,
    pub abr: Option<f64>,
    pub vcodec: Option<String>,
    pub ext: Option<String>,
    pub filesize: Option<i64>,
    /// Formats without a resolvable URL (e.g. storyboards) are dropped
    /// during projection.
    pub url: Option<String>,
}

/// Whether a format carries a video track. The tool reports audio-only
/// formats with the sentinel codec `"none"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MediaKind {
    Audio,
    Video,
}

/// One downloadable variant, reshaped for the frontend.
#[derive(Debug, Clone, Serialize)]
pub struct FormatDescriptor {
    pub itag: String,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub quality: String,
    pub size: i64,
    pub ext: String,
    /// The request URL, echoed so the client can pair descriptors with the
    /// media they came from.
    pub source: String,
}

/// Body of a successful `/info` response.
#[derive(Debug, Clone, Serialize)]
pub struct InfoResponse {
    pub title: String,
    pub formats: Vec<FormatDescriptor>,
}

/// Projects the tool's report into an [`InfoResponse`].
///
/// Keeps only formats with a resolvable URL, in the order the tool listed
/// them. Quality labels: audio gets the average bitrate ("128 kbps", "?"
/// when unknown), video gets the tool's format note when present, otherwise
/// the pixel height ("720p").
pub fn build_info_response(info: RawInfo, source_url: &str) -> InfoResponse {
    let formats = info
        .formats
        .into_iter()
        .filter(|format| format.url.as_deref().is_some_and(|url| !url.is_empty()))
        .map(|format| describe_format(format, source_url))
        .collect();

    InfoResponse {
        title: info.title.unwrap_or_default(),
        formats,
    }
}

fn describe_format(format: RawFormat, source_url: &str) -> FormatDescriptor {
    let kind = if format.vcodec.as_deref() == Some("none") {
        MediaKind::Audio
    } else {
        MediaKind::Video
    };

    let quality = match kind {
        MediaKind::Audio => match format.abr {
            Some(abr) if abr > 0.0 => format!("{abr} kbps"),
            _ => "? kbps".to_string(),
        },
        MediaKind::Video => format
            .format_note
            .filter(|note| !note.is_empty())
            .or_else(|| format.height.map(|height| format!("{height}p")))
            .unwrap_or_else(|| "?".to_string()),
    };

    FormatDescriptor {
        itag: format.format_id.unwrap_or_default(),
        kind,
        quality,
        size: format.filesize.unwrap_or(0),
        ext: format.ext.unwrap_or_default(),
        source: source_url.to_string(),
    }
}
