//! Backend communication: HTTP requests and the push channel
//!
//! Async tasks and WebSocket callbacks never touch Bevy state. They push
//! into shared queues that the frame systems below drain.

use bevy::prelude::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use genai3d_core::api::{parse_convert, parse_generation, parse_models};
use genai3d_core::{
    ClientConfig, ClientError, ConversionTicket, ConvertResponse, GenerationResult, ModelEntry,
    PushQueue, RefreshTicket,
};

use crate::app::{Conversion, EffectMessage, Generation, Library, PushRouter};
use crate::file_picker::PickedImage;

/// Backend connection configuration
#[derive(Resource, Debug, Clone, Default)]
pub struct ServerConfig(pub ClientConfig);

impl ServerConfig {
    /// Create config from the `?server=` query parameter or the page origin
    #[cfg(target_arch = "wasm32")]
    pub fn from_browser() -> Self {
        let Some(window) = web_sys::window() else {
            tracing::error!("No window object, using relative URLs");
            return Self::default();
        };
        let location = window.location();

        let search = location.search().unwrap_or_default();
        let protocol = location.protocol().unwrap_or_default();
        let host = location.host().unwrap_or_else(|_| "localhost:5000".to_string());

        Self(ClientConfig::from_location(&search, &protocol, &host, |raw| {
            js_sys::decode_uri_component(raw).ok().map(String::from)
        }))
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_browser() -> Self {
        Self::default()
    }
}

/// Push events received on the WebSocket, waiting for the frame loop
#[derive(Resource, Clone)]
pub struct PushInbox(pub PushQueue);

/// Reconnect attempts in a row before the channel is considered lost
const MAX_RECONNECT_ATTEMPTS: u32 = 5;
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    #[default]
    Connecting,
    Open,
    Closed,
}

/// Push channel connection state, written by the WebSocket callbacks
#[derive(Resource, Default)]
pub struct PushConnection {
    state: Arc<Mutex<ChannelState>>,
    failures: u32,
    retry: Option<Timer>,
    gave_up: bool,
}

impl PushConnection {
    pub fn state(&self) -> ChannelState {
        self.state.lock().map(|state| *state).unwrap_or(ChannelState::Closed)
    }

    fn set_state(&self, state: ChannelState) {
        if let Ok(mut current) = self.state.lock() {
            *current = state;
        }
    }
}

/// Exponential backoff: 1 s, 2 s, 4 s ... capped
fn reconnect_delay(failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(16);
    Duration::from_secs(1u64 << exponent).min(MAX_RECONNECT_DELAY)
}

/// A finished HTTP request, carrying the token it was issued with
#[derive(Debug)]
pub enum HttpCompletion {
    Generation {
        token: u64,
        result: Result<GenerationResult, ClientError>,
    },
    Conversion {
        token: u64,
        result: Result<ConvertResponse, ClientError>,
    },
    Models {
        ticket: RefreshTicket,
        result: Result<Vec<ModelEntry>, ClientError>,
    },
}

/// Shared completion queue between async tasks and Bevy
#[derive(Resource, Default, Clone)]
pub struct PendingHttp(pub Arc<Mutex<Vec<HttpCompletion>>>);

impl PendingHttp {
    fn push(&self, completion: HttpCompletion) {
        if let Ok(mut queue) = self.0.lock() {
            queue.push(completion);
        }
    }
}

pub struct NetworkPlugin;

impl Plugin for NetworkPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(ServerConfig::from_browser())
            .init_resource::<PendingHttp>()
            .init_resource::<PushConnection>()
            .add_systems(Startup, (connect_push_channel, fetch_initial_models))
            .add_systems(Update, (process_completions, pump_push_events, maintain_push_channel));
    }
}

fn connect_push_channel(connection: Res<PushConnection>, inbox: Res<PushInbox>, config: Res<ServerConfig>) {
    open_push_channel(&config.0, &inbox.0, &connection.state);
}

/// Open the WebSocket bound to this client's session id
fn open_push_channel(config: &ClientConfig, queue: &PushQueue, state: &Arc<Mutex<ChannelState>>) {
    // In WASM, we use web_sys WebSocket
    #[cfg(target_arch = "wasm32")]
    {
        use genai3d_core::PushChannel;
        use wasm_bindgen::prelude::*;
        use web_sys::{CloseEvent, MessageEvent, WebSocket};

        let set_state = |state: &Arc<Mutex<ChannelState>>, value: ChannelState| {
            if let Ok(mut current) = state.lock() {
                *current = value;
            }
        };

        let ws_url = config.ws_url_with_session(queue.session_id());
        tracing::info!("Connecting push channel: {}", ws_url);
        set_state(state, ChannelState::Connecting);

        match WebSocket::new(&ws_url) {
            Ok(ws) => {
                ws.set_binary_type(web_sys::BinaryType::Arraybuffer);

                let open_state = state.clone();
                let onopen = Closure::wrap(Box::new(move |_| {
                    tracing::info!("Push channel connected");
                    set_state(&open_state, ChannelState::Open);
                }) as Box<dyn FnMut(JsValue)>);
                ws.set_onopen(Some(onopen.as_ref().unchecked_ref()));
                onopen.forget();

                let close_state = state.clone();
                let onclose = Closure::wrap(Box::new(move |e: CloseEvent| {
                    tracing::warn!("Push channel closed: code {}", e.code());
                    set_state(&close_state, ChannelState::Closed);
                }) as Box<dyn FnMut(CloseEvent)>);
                ws.set_onclose(Some(onclose.as_ref().unchecked_ref()));
                onclose.forget();

                let queue = queue.clone();
                let onmessage = Closure::wrap(Box::new(move |e: MessageEvent| {
                    if let Ok(text) = e.data().dyn_into::<js_sys::JsString>() {
                        let text: String = text.into();
                        tracing::debug!("Push message: {}", text);
                        // Rejected payloads are logged by the queue
                        let _ = queue.push_raw(&text);
                    }
                }) as Box<dyn FnMut(MessageEvent)>);
                ws.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));
                onmessage.forget();
            }
            Err(e) => {
                tracing::error!("Failed to create WebSocket: {:?}", e);
                set_state(state, ChannelState::Closed);
            }
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        let _ = (config, queue);
        tracing::info!("Push channel not available in native mode");
        if let Ok(mut current) = state.lock() {
            *current = ChannelState::Closed;
        }
    }
}

/// Reconnect a closed channel with backoff. Once it is considered lost, a
/// pending conversion can no longer complete over push and is failed.
fn maintain_push_channel(
    time: Res<Time>,
    mut connection: ResMut<PushConnection>,
    inbox: Res<PushInbox>,
    config: Res<ServerConfig>,
    mut conversion: ResMut<Conversion>,
    mut effects: MessageWriter<EffectMessage>,
) {
    match connection.state() {
        ChannelState::Connecting => {}
        ChannelState::Open => {
            connection.failures = 0;
            connection.retry = None;
            connection.gave_up = false;
        }
        ChannelState::Closed if connection.gave_up => {
            for effect in conversion.0.on_channel_closed() {
                effects.write(EffectMessage(effect));
            }
        }
        ChannelState::Closed => {
            let Some(timer) = connection.retry.as_mut() else {
                connection.failures += 1;
                if connection.failures > MAX_RECONNECT_ATTEMPTS {
                    tracing::error!("Push channel lost after {} reconnect attempts", MAX_RECONNECT_ATTEMPTS);
                    connection.gave_up = true;
                    return;
                }
                let delay = reconnect_delay(connection.failures);
                tracing::warn!("Reconnecting push channel in {:?}", delay);
                connection.retry = Some(Timer::new(delay, TimerMode::Once));
                return;
            };

            if timer.tick(time.delta()).just_finished() {
                connection.retry = None;
                connection.set_state(ChannelState::Connecting);
                open_push_channel(&config.0, &inbox.0, &connection.state);
            }
        }
    }
}

/// Populate the model library at page load
fn fetch_initial_models(
    mut library: ResMut<Library>,
    config: Res<ServerConfig>,
    pending: Res<PendingHttp>,
) {
    let ticket = library.0.begin_refresh();
    fetch_models(&config.0, ticket, &pending);
}

/// Hand finished requests to their controllers
pub fn process_completions(
    pending: Res<PendingHttp>,
    mut generation: ResMut<Generation>,
    mut conversion: ResMut<Conversion>,
    mut library: ResMut<Library>,
    mut effects: MessageWriter<EffectMessage>,
) {
    let completions = {
        if let Ok(mut queue) = pending.0.lock() {
            std::mem::take(&mut *queue)
        } else {
            Vec::new()
        }
    };

    for completion in completions {
        let produced = match completion {
            HttpCompletion::Generation { token, result } => generation.0.complete(token, result),
            HttpCompletion::Conversion { token, result } => conversion.0.on_http_response(token, result),
            HttpCompletion::Models { ticket, result } => {
                library.0.finish_refresh(ticket, result);
                Vec::new()
            }
        };
        for effect in produced {
            effects.write(EffectMessage(effect));
        }
    }
}

/// Route queued push events into the conversion lifecycle
pub fn pump_push_events(
    router: Res<PushRouter>,
    mut conversion: ResMut<Conversion>,
    mut effects: MessageWriter<EffectMessage>,
) {
    for effect in router.0.pump(&mut conversion.0) {
        effects.write(EffectMessage(effect));
    }
}

/// POST `/generate` with the prompt
pub fn post_generate(config: &ClientConfig, prompt: &str, token: u64, pending: &PendingHttp) {
    #[cfg(target_arch = "wasm32")]
    {
        use wasm_bindgen_futures::spawn_local;

        let url = config.endpoint("generate");
        let prompt = prompt.to_string();
        let pending = pending.clone();

        spawn_local(async move {
            tracing::info!("Requesting image generation");
            let result: Result<GenerationResult, ClientError> = async {
                let form = form_data(&[("prompt", prompt)])?;
                let body = send(gloo_net::http::Request::post(&url).body(form)).await?;
                parse_generation(&body)
            }
            .await;
            pending.push(HttpCompletion::Generation { token, result });
        });
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        let _ = (config, prompt);
        pending.push(HttpCompletion::Generation { token, result: Err(unavailable()) });
    }
}

/// POST `/upload` with a user-picked image
pub fn post_upload(config: &ClientConfig, image: &PickedImage, token: u64, pending: &PendingHttp) {
    #[cfg(target_arch = "wasm32")]
    {
        use wasm_bindgen_futures::spawn_local;

        let url = config.endpoint("upload");
        let image = image.clone();
        let pending = pending.clone();

        spawn_local(async move {
            tracing::info!("Uploading image: {}", image.filename);
            let result: Result<GenerationResult, ClientError> = async {
                let form = web_sys::FormData::new().map_err(js_error)?;
                let blob = image.to_blob().map_err(js_error)?;
                form.append_with_blob_and_filename("image", &blob, &image.filename)
                    .map_err(js_error)?;
                let body = send(gloo_net::http::Request::post(&url).body(form)).await?;
                parse_generation(&body)
            }
            .await;
            pending.push(HttpCompletion::Generation { token, result });
        });
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        let _ = (config, image);
        pending.push(HttpCompletion::Generation { token, result: Err(unavailable()) });
    }
}

/// POST `/convert` for a started conversion
pub fn post_convert(config: &ClientConfig, ticket: &ConversionTicket, pending: &PendingHttp) {
    let token = ticket.token;

    #[cfg(target_arch = "wasm32")]
    {
        use wasm_bindgen_futures::spawn_local;

        let url = config.endpoint("convert");
        let fields = ticket.request.form_fields();
        let pending = pending.clone();

        spawn_local(async move {
            let result: Result<ConvertResponse, ClientError> = async {
                let form = form_data(&fields)?;
                let body = send(gloo_net::http::Request::post(&url).body(form)).await?;
                parse_convert(&body)
            }
            .await;
            pending.push(HttpCompletion::Conversion { token, result });
        });
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        let _ = config;
        pending.push(HttpCompletion::Conversion { token, result: Err(unavailable()) });
    }
}

/// GET `/models`
pub fn fetch_models(config: &ClientConfig, ticket: RefreshTicket, pending: &PendingHttp) {
    #[cfg(target_arch = "wasm32")]
    {
        use wasm_bindgen_futures::spawn_local;

        let url = config.endpoint("models");
        let pending = pending.clone();

        spawn_local(async move {
            tracing::debug!("Fetching models from: {}", url);
            let result: Result<Vec<ModelEntry>, ClientError> = async {
                let body = send(gloo_net::http::Request::get(&url).build()).await?;
                parse_models(&body)
            }
            .await;
            pending.push(HttpCompletion::Models { ticket, result });
        });
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        let _ = config;
        pending.push(HttpCompletion::Models { ticket, result: Err(unavailable()) });
    }
}

/// Send a request and return the body of a successful response
#[cfg(target_arch = "wasm32")]
async fn send(
    request: Result<gloo_net::http::Request, gloo_net::Error>,
) -> Result<String, ClientError> {
    let request = request.map_err(|e| ClientError::Transport(e.to_string()))?;
    let response = request
        .send()
        .await
        .map_err(|e| ClientError::Transport(e.to_string()))?;

    if !response.ok() {
        return Err(ClientError::Status(response.status()));
    }

    response
        .text()
        .await
        .map_err(|e| ClientError::Transport(e.to_string()))
}

#[cfg(target_arch = "wasm32")]
fn form_data<S: AsRef<str>>(fields: &[(&str, S)]) -> Result<web_sys::FormData, ClientError> {
    let form = web_sys::FormData::new().map_err(js_error)?;
    for (name, value) in fields {
        form.append_with_str(name, value.as_ref()).map_err(js_error)?;
    }
    Ok(form)
}

#[cfg(target_arch = "wasm32")]
fn js_error(e: wasm_bindgen::JsValue) -> ClientError {
    ClientError::Transport(format!("{:?}", e))
}

#[cfg(not(target_arch = "wasm32"))]
fn unavailable() -> ClientError {
    ClientError::Transport("HTTP not available in native mode".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_backoff_doubles_and_caps() {
        assert_eq!(reconnect_delay(1), Duration::from_secs(1));
        assert_eq!(reconnect_delay(2), Duration::from_secs(2));
        assert_eq!(reconnect_delay(4), Duration::from_secs(8));
        assert_eq!(reconnect_delay(10), MAX_RECONNECT_DELAY);
        assert_eq!(reconnect_delay(u32::MAX), MAX_RECONNECT_DELAY);
    }

    #[test]
    fn test_channel_state_follows_callbacks() {
        let connection = PushConnection::default();
        assert_eq!(connection.state(), ChannelState::Connecting);
        connection.set_state(ChannelState::Closed);
        assert_eq!(connection.state(), ChannelState::Closed);
    }
}
