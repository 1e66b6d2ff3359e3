//! Request normalization.
//!
//! JSON bodies and URL query strings both deserialize into [`SearchParams`]
//! and go through the same functions here, so the two entry points cannot
//! drift apart. Nothing in this module performs I/O.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::images::is_image_content_type;

pub const DEFAULT_LIMIT: u32 = 20;
pub const MAX_LIMIT: u32 = 100;
pub const DEFAULT_THRESHOLD: f64 = 0.0;

/// Which stored embedding the backend compares against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    Visual,
    Text,
    #[default]
    Combined,
}

impl SearchType {
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value {
            "visual" => Ok(SearchType::Visual),
            "text" => Ok(SearchType::Text),
            "combined" => Ok(SearchType::Combined),
            other => Err(ValidationError::InvalidSearchType(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchType::Visual => "visual",
            SearchType::Text => "text",
            SearchType::Combined => "combined",
        }
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Image,
    Video,
}

impl FileType {
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value {
            "image" => Ok(FileType::Image),
            "video" => Ok(FileType::Video),
            other => Err(ValidationError::InvalidFileType(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Image => "image",
            FileType::Video => "video",
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("search_type must be 'visual', 'text', or 'combined' (got {0:?})")]
    InvalidSearchType(String),

    #[error("file_type must be 'image' or 'video' (got {0:?})")]
    InvalidFileType(String),

    #[error("Uploaded file must be an image")]
    NotAnImage(Option<String>),

    #[error("Uploaded image is empty")]
    EmptyImage,

    #[error("missing multipart field 'image'")]
    MissingImage,

    #[error("malformed upload: {0}")]
    MalformedUpload(String),

    #[error("query must not be empty")]
    EmptyQuery,

    #[error("limit must be between 1 and 100, got {0}")]
    LimitOutOfRange(i64),

    #[error("threshold must be between 0.0 and 1.0, got {0}")]
    ThresholdOutOfRange(f64),
}

impl ValidationError {
    /// Constraint violations on numeric fields, as opposed to bad values.
    pub fn is_range_violation(&self) -> bool {
        matches!(
            self,
            ValidationError::LimitOutOfRange(_) | ValidationError::ThresholdOutOfRange(_)
        )
    }
}

/// Raw caller-supplied parameters, shared by every search entry point.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: Option<String>,

    #[serde(default, alias = "searchType")]
    pub search_type: Option<String>,

    #[serde(default)]
    pub limit: Option<i64>,

    #[serde(default)]
    pub threshold: Option<f64>,

    #[serde(default, alias = "fileType")]
    pub file_type: Option<String>,

    #[serde(default)]
    pub decade: Option<String>,

    /// Translate the query to English before encoding it.
    #[serde(default)]
    pub translate: bool,

    #[serde(default, alias = "sourceLanguage")]
    pub source_language: Option<String>,
}

/// Validated filter fields common to every query shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Filters {
    pub search_type: SearchType,
    pub limit: u32,
    pub threshold: f64,
    pub file_type: Option<FileType>,
    pub decade: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextQuery {
    pub text: String,
    pub filters: Filters,
    pub translate: bool,
    /// Per-request override of the configured source language
    pub source_language: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageQuery {
    pub image: Vec<u8>,
    pub content_type: String,
    pub filters: Filters,
}

pub fn normalize_filters(params: &SearchParams) -> Result<Filters, ValidationError> {
    let search_type = match params.search_type.as_deref() {
        Some(value) => SearchType::parse(value)?,
        None => SearchType::default(),
    };

    let limit = match params.limit {
        Some(limit) if (1..=MAX_LIMIT as i64).contains(&limit) => limit as u32,
        Some(limit) => return Err(ValidationError::LimitOutOfRange(limit)),
        None => DEFAULT_LIMIT,
    };

    let threshold = match params.threshold {
        // NaN fails the range check too
        Some(threshold) if (0.0..=1.0).contains(&threshold) => threshold,
        Some(threshold) => return Err(ValidationError::ThresholdOutOfRange(threshold)),
        None => DEFAULT_THRESHOLD,
    };

    let file_type = params
        .file_type
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(FileType::parse)
        .transpose()?;

    let decade = params
        .decade
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);

    Ok(Filters {
        search_type,
        limit,
        threshold,
        file_type,
        decade,
    })
}

pub fn normalize_text_query(params: &SearchParams) -> Result<TextQuery, ValidationError> {
    let filters = normalize_filters(params)?;

    let text = params
        .query
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .ok_or(ValidationError::EmptyQuery)?
        .to_string();

    let source_language = params
        .source_language
        .as_deref()
        .map(str::trim)
        .filter(|lang| !lang.is_empty())
        .map(str::to_string);

    Ok(TextQuery {
        text,
        filters,
        translate: params.translate,
        source_language,
    })
}

pub fn normalize_image_query(
    params: &SearchParams,
    content_type: Option<&str>,
    image: Vec<u8>,
) -> Result<ImageQuery, ValidationError> {
    let filters = normalize_filters(params)?;

    let content_type = match content_type {
        Some(content_type) if is_image_content_type(content_type) => content_type.to_string(),
        other => return Err(ValidationError::NotAnImage(other.map(str::to_string))),
    };

    if image.is_empty() {
        return Err(ValidationError::EmptyImage);
    }

    Ok(ImageQuery {
        image,
        content_type,
        filters,
    })
}
