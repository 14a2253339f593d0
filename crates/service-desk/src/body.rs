//! Request and response payload shapes for the resilient client.

use reqwest::multipart::{Form, Part};
use serde_json::Value;

use crate::{Result, ServiceDeskError};

/// Body of a service desk request. The content type follows from the variant.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Multipart(MultipartBody),
}

/// A file to upload as one multipart part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub field: String,
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Owned description of a multipart form.
///
/// `reqwest` consumes a [`Form`] when sending, so the client rebuilds one
/// from this description for every attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartBody {
    fields: Vec<(String, String)>,
    files: Vec<FilePart>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a text field.
    pub fn text(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.fields.push((name.into(), value.to_string()));
        self
    }

    /// Adds a file part.
    pub fn file(mut self, part: FilePart) -> Self {
        self.files.push(part);
        self
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn files(&self) -> &[FilePart] {
        &self.files
    }

    /// Builds a fresh form for one attempt.
    pub(crate) fn to_form(&self) -> Result<Form> {
        let mut form = Form::new();
        for (name, value) in &self.fields {
            form = form.text(name.clone(), value.clone());
        }
        for file in &self.files {
            let mut part = Part::bytes(file.bytes.clone()).file_name(file.filename.clone());
            if let Some(content_type) = &file.content_type {
                part = part.mime_str(content_type).map_err(|e| {
                    ServiceDeskError::InvalidRequest(format!(
                        "invalid content type '{content_type}' for '{}': {e}",
                        file.filename
                    ))
                })?;
            }
            form = form.part(file.field.clone(), part);
        }
        Ok(form)
    }
}

/// A binary download, e.g. a ticket attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub bytes: Vec<u8>,
    pub filename: Option<String>,
    pub content_type: Option<String>,
}

/// Decodes a success body: an object as-is, an array wrapped as `{"data": [...]}`.
/// An empty body decodes to an empty object.
pub(crate) fn decode_body(bytes: &[u8]) -> Result<Value> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(serde_json::Map::new()));
    }

    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(map)) => Ok(Value::Object(map)),
        Ok(Value::Array(items)) => Ok(serde_json::json!({ "data": items })),
        Ok(other) => Err(ServiceDeskError::Decode(format!(
            "expected a JSON object or array, got {other}"
        ))),
        Err(e) => Err(ServiceDeskError::Decode(e.to_string())),
    }
}

/// Extracts the `filename` parameter of a `Content-Disposition` header.
pub(crate) fn filename_from_disposition(header: &str) -> Option<String> {
    header.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("filename") {
            return None;
        }
        let value = value.trim().trim_matches('"');
        (!value.is_empty()).then(|| value.to_string())
    })
}
