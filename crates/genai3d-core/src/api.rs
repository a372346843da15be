//! Wire types for the backend HTTP endpoints
//!
//! `/generate` and `/upload` share [`GenerationResponse`], `/convert` answers
//! with [`ConvertResponse`], and `/models` lists [`ModelEntry`] values.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ClientError;

/// Fallback shown when a generation result has neither an image nor an error
pub const UNKNOWN_ERROR_MESSAGE: &str = "An unknown error occurred.";

/// Raw JSON body of `/generate` and `/upload`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GenerationResponse {
    #[serde(default)]
    pub image_path: Option<String>,
    #[serde(default)]
    pub enriched_prompt: Option<String>,
    #[serde(default)]
    pub new_filename: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// A successful generation: the image to show and what to pass on to conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult {
    pub image_path: String,
    pub enriched_prompt: Option<String>,
    pub suggested_filename: Option<String>,
}

impl GenerationResponse {
    /// Split the response into a usable image or a domain error.
    ///
    /// An image path wins even if an error field is also present; an empty
    /// image path counts as missing.
    pub fn into_result(self) -> Result<GenerationResult, ClientError> {
        match self.image_path.filter(|p| !p.is_empty()) {
            Some(image_path) => Ok(GenerationResult {
                image_path,
                enriched_prompt: self.enriched_prompt.filter(|p| !p.is_empty()),
                suggested_filename: self.new_filename.filter(|f| !f.is_empty()),
            }),
            None => Err(ClientError::Domain(
                self.error
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| UNKNOWN_ERROR_MESSAGE.to_string()),
            )),
        }
    }
}

/// Decode a `/generate` or `/upload` body
pub fn parse_generation(body: &str) -> Result<GenerationResult, ClientError> {
    let response: GenerationResponse = serde_json::from_str(body)?;
    response.into_result()
}

/// Mesh density offered by the conversion service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u32", try_from = "u32")]
pub enum FaceCount {
    F1000,
    F2500,
    #[default]
    F5000,
    F10000,
    F25000,
    F40000,
}

impl FaceCount {
    pub const ALL: [FaceCount; 6] = [
        FaceCount::F1000,
        FaceCount::F2500,
        FaceCount::F5000,
        FaceCount::F10000,
        FaceCount::F25000,
        FaceCount::F40000,
    ];

    pub fn value(self) -> u32 {
        match self {
            FaceCount::F1000 => 1000,
            FaceCount::F2500 => 2500,
            FaceCount::F5000 => 5000,
            FaceCount::F10000 => 10000,
            FaceCount::F25000 => 25000,
            FaceCount::F40000 => 40000,
        }
    }
}

impl From<FaceCount> for u32 {
    fn from(count: FaceCount) -> Self {
        count.value()
    }
}

impl TryFrom<u32> for FaceCount {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        FaceCount::ALL
            .into_iter()
            .find(|c| c.value() == value)
            .ok_or_else(|| format!("unsupported face count: {}", value))
    }
}

impl fmt::Display for FaceCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

/// Everything `/convert` needs, assembled at trigger time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    pub image_path: String,
    pub enriched_prompt: Option<String>,
    pub generate_texture: bool,
    pub face_count: FaceCount,
    /// Push channel session the completion event will be delivered on
    pub session_id: String,
    pub suggested_filename: Option<String>,
    /// Per-request id echoed back on push events
    pub request_id: String,
}

impl ConversionRequest {
    /// Multipart field list in the order the backend expects.
    /// Optional fields are omitted rather than sent as placeholders.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![("image_path", self.image_path.clone())];
        if let Some(prompt) = &self.enriched_prompt {
            fields.push(("enriched_prompt", prompt.clone()));
        }
        fields.push(("generate_texture", self.generate_texture.to_string()));
        fields.push(("face_count", self.face_count.to_string()));
        fields.push(("sid", self.session_id.clone()));
        if let Some(filename) = &self.suggested_filename {
            fields.push(("new_filename", filename.clone()));
        }
        fields.push(("request_id", self.request_id.clone()));
        fields
    }
}

/// Closed set of follow-up actions the backend may ask the client to perform
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    RefreshLibrary,
    ShowNotice { message: String },
    DisplayModel { model_path: String },
}

/// Raw JSON body of `/convert`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConvertResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub command: Option<ClientCommand>,
    /// Legacy script payload. Never executed; only logged.
    #[serde(default, skip_serializing)]
    pub js: Option<String>,
}

/// Decode a `/convert` body
pub fn parse_convert(body: &str) -> Result<ConvertResponse, ClientError> {
    let response: ConvertResponse = serde_json::from_str(body)?;
    if response.js.as_deref().is_some_and(|js| !js.trim().is_empty()) {
        tracing::warn!("Ignoring script payload in /convert response");
    }
    Ok(response)
}

/// One entry of the `/models` listing
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ModelEntry {
    pub name: String,
    /// Seconds since the epoch; the backend may send fractional seconds
    pub created_at: f64,
}

/// Decode a `/models` body
pub fn parse_models(body: &str) -> Result<Vec<ModelEntry>, ClientError> {
    Ok(serde_json::from_str(body)?)
}
