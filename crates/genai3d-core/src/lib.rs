//! genai3d Core - Orchestration state for the text-to-3D browser client
//!
//! This crate holds everything that does not need a browser:
//! - Wire types for the generation, upload, conversion, and listing endpoints
//! - Generation and conversion request lifecycles with stale-response tokens
//! - Push channel parsing and routing
//! - The wireframe material cache and viewer session lifecycle
//! - Model library listing state and the transient notification bus

pub mod api;
pub mod config;
pub mod conversion;
pub mod effect;
pub mod error;
pub mod generation;
pub mod library;
pub mod material_cache;
pub mod notify;
pub mod push;
pub mod viewer;

pub use api::{ClientCommand, ConversionRequest, ConvertResponse, FaceCount, GenerationResponse, GenerationResult, ModelEntry};
pub use config::{ClientConfig, DirectionalLightSpec, ViewerSettings};
pub use conversion::{ConversionController, ConversionForm, ConversionTicket};
pub use effect::{Affordance, UiEffect};
pub use error::{ClientError, PushError};
pub use generation::{GenerationController, GenerationSource, GenerationTicket, Submission};
pub use library::{LibraryClick, ModelAsset, ModelLibrary, RefreshTicket};
pub use material_cache::{MaterialCache, MeshId, RenderMode, SurfaceState};
pub use notify::NotificationBus;
pub use push::{PushChannel, PushEvent, PushEventRouter, PushQueue};
pub use viewer::{DisplayTarget, LoadPhase, ModelViewer, SessionId, ViewerSession};
