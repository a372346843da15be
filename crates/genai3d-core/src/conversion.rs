//! Image → 3D asset request lifecycle
//!
//! A conversion completes through either the `/convert` HTTP response or a
//! push event on the client's channel, in any order, possibly both. Only the
//! most recent conversion may change what the viewer shows, and displaying
//! its asset happens at most once.

use std::sync::Arc;
use std::time::Duration;

use crate::api::{ClientCommand, ConversionRequest, ConvertResponse, FaceCount, GenerationResult};
use crate::effect::{Affordance, UiEffect};
use crate::error::ClientError;
use crate::push::PushChannel;

pub const CONVERSION_FAILED_MESSAGE: &str = "Conversion failed. Please try again.";
pub const CONVERSION_TIMED_OUT_MESSAGE: &str = "Conversion timed out. Please try again.";
pub const CHANNEL_CLOSED_MESSAGE: &str = "Lost connection to the server. Please try again.";

/// How long a conversion may wait for its completion before giving up
pub const CONVERSION_TIMEOUT: Duration = Duration::from_secs(600);

/// Conversion controls shown under a generated image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionForm {
    result: GenerationResult,
    pub generate_texture: bool,
    pub face_count: FaceCount,
}

impl ConversionForm {
    pub fn new(result: GenerationResult) -> Self {
        Self {
            result,
            generate_texture: true,
            face_count: FaceCount::default(),
        }
    }

    pub fn result(&self) -> &GenerationResult {
        &self.result
    }

    pub fn image_path(&self) -> &str {
        &self.result.image_path
    }

    pub fn enriched_prompt(&self) -> Option<&str> {
        self.result.enriched_prompt.as_deref()
    }
}

/// A started conversion: the request to send and the token to answer with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionTicket {
    pub token: u64,
    pub request: ConversionRequest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Outcome {
    Pending,
    Completed { model_path: String },
    Failed,
    /// Replaced by a new image; a late asset only refreshes the library
    Abandoned,
}

#[derive(Debug, Clone)]
struct LatestConversion {
    token: u64,
    request_id: String,
    outcome: Outcome,
    waited: Duration,
}

pub struct ConversionController {
    channel: Arc<dyn PushChannel>,
    pub convert_button: Affordance,
    last_token: u64,
    latest: Option<LatestConversion>,
    /// Last asset this controller asked the viewer to show
    displayed: Option<String>,
    timeout: Duration,
}

impl ConversionController {
    pub fn new(channel: Arc<dyn PushChannel>) -> Self {
        Self::with_timeout(channel, CONVERSION_TIMEOUT)
    }

    pub fn with_timeout(channel: Arc<dyn PushChannel>, timeout: Duration) -> Self {
        Self {
            channel,
            convert_button: Affordance::new("Convert to 3D", "Converting..."),
            last_token: 0,
            latest: None,
            displayed: None,
            timeout,
        }
    }

    pub fn session_id(&self) -> &str {
        self.channel.session_id()
    }

    pub fn is_pending(&self) -> bool {
        self.latest
            .as_ref()
            .is_some_and(|latest| latest.outcome == Outcome::Pending)
    }

    /// Request id of the most recent conversion
    pub fn latest_request_id(&self) -> Option<&str> {
        self.latest.as_ref().map(|latest| latest.request_id.as_str())
    }

    /// Start a conversion from the current form state. A no-op while one is
    /// already in flight on this channel.
    pub fn trigger(&mut self, form: &ConversionForm) -> Option<ConversionTicket> {
        if self.is_pending() {
            tracing::debug!("Conversion already in flight, ignoring trigger");
            return None;
        }

        self.last_token += 1;
        let token = self.last_token;
        let request_id = uuid::Uuid::new_v4().to_string();

        let request = ConversionRequest {
            image_path: form.result.image_path.clone(),
            enriched_prompt: form.result.enriched_prompt.clone(),
            generate_texture: form.generate_texture,
            face_count: form.face_count,
            session_id: self.channel.session_id().to_string(),
            suggested_filename: form.result.suggested_filename.clone(),
            request_id: request_id.clone(),
        };

        tracing::info!(
            request_id = %request_id,
            face_count = form.face_count.value(),
            texture = form.generate_texture,
            "Starting conversion"
        );

        self.latest = Some(LatestConversion {
            token,
            request_id,
            outcome: Outcome::Pending,
            waited: Duration::ZERO,
        });
        self.convert_button.set_busy();

        Some(ConversionTicket { token, request })
    }

    /// Apply the `/convert` HTTP response for `token`
    pub fn on_http_response(
        &mut self,
        token: u64,
        response: Result<ConvertResponse, ClientError>,
    ) -> Vec<UiEffect> {
        if self.latest.as_ref().map(|l| l.token) != Some(token) {
            tracing::debug!(token, "Dropping stale conversion response");
            return Vec::new();
        }

        match response {
            Ok(response) => {
                let mut effects = Vec::new();
                if let Some(message) = response.message.filter(|m| !m.is_empty()) {
                    effects.push(UiEffect::Notify(message));
                }
                match response.command {
                    Some(ClientCommand::RefreshLibrary) => effects.push(UiEffect::RefreshLibrary),
                    Some(ClientCommand::ShowNotice { message }) => {
                        effects.push(UiEffect::Notify(message))
                    }
                    Some(ClientCommand::DisplayModel { model_path }) => {
                        effects.extend(self.complete_with(model_path))
                    }
                    None => {}
                }
                effects
            }
            Err(e) => {
                tracing::error!("Error during conversion request: {}", e);
                if !self.is_pending() {
                    // Already completed over the push channel
                    return Vec::new();
                }
                self.fail();
                vec![UiEffect::Notify(CONVERSION_FAILED_MESSAGE.to_string())]
            }
        }
    }

    /// Push channel reported a finished asset
    pub fn on_model_complete(&mut self, model_path: &str, request_id: Option<&str>) -> Vec<UiEffect> {
        if !self.accepts(request_id) {
            tracing::debug!(?request_id, "Dropping completion for another request");
            return Vec::new();
        }
        self.complete_with(model_path.to_string())
    }

    /// Push channel reported a failed conversion
    pub fn on_model_error(&mut self, error: Option<&str>, request_id: Option<&str>) -> Vec<UiEffect> {
        if !self.accepts(request_id) {
            tracing::debug!(?request_id, "Dropping error for another request");
            return Vec::new();
        }
        if !self.is_pending() {
            tracing::warn!("Conversion error with nothing in flight: {:?}", error);
            return Vec::new();
        }

        self.fail();
        let message = error
            .filter(|e| !e.is_empty())
            .unwrap_or(CONVERSION_FAILED_MESSAGE);
        tracing::error!("Conversion failed: {}", message);
        vec![UiEffect::Notify(message.to_string())]
    }

    /// Advance the pending conversion's clock. Gives up once it has waited
    /// longer than the timeout.
    pub fn tick(&mut self, elapsed: Duration) -> Vec<UiEffect> {
        let timeout = self.timeout;
        let Some(latest) = self.latest.as_mut().filter(|l| l.outcome == Outcome::Pending) else {
            return Vec::new();
        };
        latest.waited += elapsed;
        if latest.waited < timeout {
            return Vec::new();
        }

        tracing::warn!(request_id = %latest.request_id, "Conversion timed out");
        self.fail();
        vec![UiEffect::Notify(CONVERSION_TIMED_OUT_MESSAGE.to_string())]
    }

    /// The push channel closed; a pending conversion can no longer hear
    /// about its asset.
    pub fn on_channel_closed(&mut self) -> Vec<UiEffect> {
        if !self.is_pending() {
            return Vec::new();
        }
        self.fail();
        vec![UiEffect::Notify(CHANNEL_CLOSED_MESSAGE.to_string())]
    }

    /// A new image replaced the form. Frees the affordance; a late asset for
    /// the old conversion is not displayed.
    pub fn abandon(&mut self) {
        if let Some(latest) = self.latest.as_mut().filter(|l| l.outcome == Outcome::Pending) {
            tracing::debug!(request_id = %latest.request_id, "Abandoning conversion");
            latest.outcome = Outcome::Abandoned;
        }
        self.convert_button.restore();
    }

    /// Events without an id are attributed to the latest conversion
    fn accepts(&self, request_id: Option<&str>) -> bool {
        match (request_id, &self.latest) {
            (Some(id), Some(latest)) => id == latest.request_id,
            _ => true,
        }
    }

    fn fail(&mut self) {
        if let Some(latest) = self.latest.as_mut() {
            latest.outcome = Outcome::Failed;
        }
        self.convert_button.restore();
    }

    fn complete_with(&mut self, model_path: String) -> Vec<UiEffect> {
        self.convert_button.restore();

        if let Some(latest) = self.latest.as_mut() {
            if latest.outcome == (Outcome::Completed { model_path: model_path.clone() }) {
                return Vec::new();
            }
            if latest.outcome == Outcome::Abandoned {
                latest.outcome = Outcome::Completed { model_path };
                return vec![UiEffect::RefreshLibrary];
            }
            latest.outcome = Outcome::Completed {
                model_path: model_path.clone(),
            };
        } else if self.displayed.as_deref() == Some(model_path.as_str()) {
            return Vec::new();
        }

        tracing::info!(model = %model_path, "Conversion complete");
        self.displayed = Some(model_path.clone());
        vec![UiEffect::DisplayModel(model_path), UiEffect::RefreshLibrary]
    }
}
