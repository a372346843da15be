//! Prompt/upload → image request lifecycle
//!
//! `Idle → Submitting → {Succeeded, Failed} → Idle`. A submission while
//! another is in flight is ignored, and each request carries a token so a
//! response that arrives after a newer submission cannot touch the UI.

use crate::api::GenerationResult;
use crate::conversion::ConversionForm;
use crate::effect::{Affordance, UiEffect};
use crate::error::ClientError;

pub const GENERATION_FAILED_MESSAGE: &str = "Generation failed. Please try again.";
pub const UPLOAD_FAILED_MESSAGE: &str = "Upload failed. Please try again.";
pub const NO_IMAGE_SELECTED_MESSAGE: &str = "Please select an image to upload.";

/// Where the image comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationSource {
    /// `/generate` with a text prompt
    Prompt,
    /// `/upload` with a user-picked file
    Upload,
}

/// Permission to issue one request; the token must come back with the response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationTicket {
    pub token: u64,
    pub source: GenerationSource,
    /// Effects to apply immediately (stage reset)
    pub effects: Vec<UiEffect>,
}

/// Outcome of a submit attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Started(GenerationTicket),
    /// A request is already in flight
    Ignored,
    /// Rejected before any request was made
    Rejected(UiEffect),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Submitting { token: u64, source: GenerationSource },
}

#[derive(Debug, Clone)]
pub struct GenerationController {
    phase: Phase,
    last_token: u64,
    pub generate_button: Affordance,
    pub upload_button: Affordance,
    conversion_form: Option<ConversionForm>,
}

impl Default for GenerationController {
    fn default() -> Self {
        Self::new()
    }
}

impl GenerationController {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            last_token: 0,
            generate_button: Affordance::new("Generate", "Generating..."),
            upload_button: Affordance::new("Upload Image", "Uploading..."),
            conversion_form: None,
        }
    }

    pub fn is_submitting(&self) -> bool {
        matches!(self.phase, Phase::Submitting { .. })
    }

    /// Conversion controls for the last successful result, if any
    pub fn conversion_form(&self) -> Option<&ConversionForm> {
        self.conversion_form.as_ref()
    }

    pub fn conversion_form_mut(&mut self) -> Option<&mut ConversionForm> {
        self.conversion_form.as_mut()
    }

    /// Submit the prompt form. An empty prompt is still sent; the backend
    /// validates it.
    pub fn submit_prompt(&mut self) -> Submission {
        self.start(GenerationSource::Prompt)
    }

    /// Submit the upload form
    pub fn submit_upload(&mut self, file_selected: bool) -> Submission {
        if !file_selected {
            return Submission::Rejected(UiEffect::Notify(NO_IMAGE_SELECTED_MESSAGE.to_string()));
        }
        self.start(GenerationSource::Upload)
    }

    fn start(&mut self, source: GenerationSource) -> Submission {
        if self.is_submitting() {
            tracing::debug!("Submission ignored, request already in flight");
            return Submission::Ignored;
        }

        self.last_token += 1;
        let token = self.last_token;
        self.phase = Phase::Submitting { token, source };
        self.button_mut(source).set_busy();
        self.conversion_form = None;

        Submission::Started(GenerationTicket {
            token,
            source,
            effects: vec![UiEffect::ClearStage],
        })
    }

    /// Apply the response for `token`. Responses for anything but the
    /// in-flight request are dropped.
    pub fn complete(
        &mut self,
        token: u64,
        result: Result<GenerationResult, ClientError>,
    ) -> Vec<UiEffect> {
        let source = match self.phase {
            Phase::Submitting { token: pending, source } if pending == token => source,
            _ => {
                tracing::debug!(token, "Dropping stale generation response");
                return Vec::new();
            }
        };

        self.phase = Phase::Idle;
        self.button_mut(source).restore();

        match result {
            Ok(result) => {
                tracing::info!(image = %result.image_path, "Image ready");
                let image_path = result.image_path.clone();
                self.conversion_form = Some(ConversionForm::new(result));
                vec![UiEffect::ShowSourceImage(image_path)]
            }
            Err(ClientError::Domain(message)) => {
                tracing::warn!("Generation rejected: {}", message);
                vec![UiEffect::Notify(message)]
            }
            Err(e) => {
                tracing::error!("Error during {:?} request: {}", source, e);
                let message = match source {
                    GenerationSource::Prompt => GENERATION_FAILED_MESSAGE,
                    GenerationSource::Upload => UPLOAD_FAILED_MESSAGE,
                };
                vec![UiEffect::Notify(message.to_string())]
            }
        }
    }

    fn button_mut(&mut self, source: GenerationSource) -> &mut Affordance {
        match source {
            GenerationSource::Prompt => &mut self.generate_button,
            GenerationSource::Upload => &mut self.upload_button,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{parse_generation, FaceCount};

    fn started(submission: Submission) -> GenerationTicket {
        match submission {
            Submission::Started(ticket) => ticket,
            other => panic!("expected a started submission, got {:?}", other),
        }
    }

    #[test]
    fn test_submit_disables_button_and_clears_stage() {
        let mut controller = GenerationController::new();
        let ticket = started(controller.submit_prompt());

        assert!(controller.is_submitting());
        assert!(!controller.generate_button.enabled);
        assert_eq!(controller.generate_button.label, "Generating...");
        assert_eq!(ticket.effects, vec![UiEffect::ClearStage]);
    }

    #[test]
    fn test_success_renders_image_annotation_and_defaults() {
        let mut controller = GenerationController::new();
        let ticket = started(controller.submit_prompt());

        let result = parse_generation(r#"{"image_path": "/img/a.png", "enriched_prompt": "a cat"}"#);
        let effects = controller.complete(ticket.token, result);

        assert_eq!(effects, vec![UiEffect::ShowSourceImage("/img/a.png".into())]);
        assert!(controller.generate_button.enabled);
        assert_eq!(controller.generate_button.label, "Generate");

        let form = controller.conversion_form().unwrap();
        assert_eq!(form.enriched_prompt(), Some("a cat"));
        assert_eq!(form.face_count, FaceCount::F5000);
        assert!(form.generate_texture);
    }

    #[test]
    fn test_domain_error_is_shown_verbatim() {
        let mut controller = GenerationController::new();
        let ticket = started(controller.submit_prompt());

        let effects = controller.complete(ticket.token, parse_generation(r#"{"error": "bad prompt"}"#));

        assert_eq!(effects, vec![UiEffect::Notify("bad prompt".into())]);
        assert!(controller.generate_button.enabled);
        assert_eq!(controller.generate_button.label, "Generate");
        assert!(controller.conversion_form().is_none());
    }

    #[test]
    fn test_transport_error_uses_generic_message_per_source() {
        let mut controller = GenerationController::new();
        let ticket = started(controller.submit_upload(true));
        assert_eq!(controller.upload_button.label, "Uploading...");

        let effects = controller.complete(ticket.token, Err(ClientError::Status(500)));

        assert_eq!(effects, vec![UiEffect::Notify(UPLOAD_FAILED_MESSAGE.into())]);
        assert!(controller.upload_button.enabled);
        assert!(controller.generate_button.enabled);
    }

    #[test]
    fn test_upload_without_file_is_rejected() {
        let mut controller = GenerationController::new();
        assert_eq!(
            controller.submit_upload(false),
            Submission::Rejected(UiEffect::Notify(NO_IMAGE_SELECTED_MESSAGE.into()))
        );
        assert!(!controller.is_submitting());
    }

    #[test]
    fn test_resubmit_while_pending_is_ignored() {
        let mut controller = GenerationController::new();
        let _ticket = started(controller.submit_prompt());
        assert_eq!(controller.submit_prompt(), Submission::Ignored);
        assert_eq!(controller.submit_upload(true), Submission::Ignored);
    }

    #[test]
    fn test_stale_response_cannot_overwrite_newer_state() {
        let mut controller = GenerationController::new();
        let first = started(controller.submit_prompt());
        controller.complete(first.token, parse_generation(r#"{"image_path": "one.png"}"#));

        let second = started(controller.submit_prompt());
        // A duplicate delivery of the first response arrives late
        let effects = controller.complete(first.token, parse_generation(r#"{"image_path": "one.png"}"#));
        assert!(effects.is_empty());
        assert!(controller.is_submitting());

        let effects = controller.complete(second.token, parse_generation(r#"{"image_path": "two.png"}"#));
        assert_eq!(effects, vec![UiEffect::ShowSourceImage("two.png".into())]);
    }

    #[test]
    fn test_new_submission_clears_previous_conversion_controls() {
        let mut controller = GenerationController::new();
        let ticket = started(controller.submit_prompt());
        controller.complete(ticket.token, parse_generation(r#"{"image_path": "one.png"}"#));
        assert!(controller.conversion_form().is_some());

        let _ = started(controller.submit_prompt());
        assert!(controller.conversion_form().is_none());
    }
}
