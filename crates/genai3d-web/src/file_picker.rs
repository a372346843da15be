//! Browser file access for WASM
//!
//! Picks an image to upload and triggers asset downloads through
//! JavaScript interop with hidden input and anchor elements.

use bevy::prelude::*;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// File picker plugin
pub struct FilePickerPlugin;

impl Plugin for FilePickerPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<UploadSelection>()
            .init_resource::<PendingPicks>()
            .add_systems(Update, process_picked_files);
    }
}

/// An image read from the user's disk
#[derive(Debug, Clone)]
pub struct PickedImage {
    /// Filename (without path)
    pub filename: String,
    /// MIME type reported by the browser, may be empty
    pub mime_type: String,
    pub content: Vec<u8>,
}

impl PickedImage {
    #[cfg(target_arch = "wasm32")]
    pub fn to_blob(&self) -> Result<web_sys::Blob, wasm_bindgen::JsValue> {
        let uint8_array = js_sys::Uint8Array::from(self.content.as_slice());
        let array = js_sys::Array::new();
        array.push(&uint8_array.buffer());

        let options = web_sys::BlobPropertyBag::new();
        if !self.mime_type.is_empty() {
            options.set_type(&self.mime_type);
        }
        web_sys::Blob::new_with_u8_array_sequence_and_options(&array, &options)
    }
}

/// Image currently selected in the upload form
#[derive(Resource, Default)]
pub struct UploadSelection(pub Option<PickedImage>);

/// Files read by JavaScript callbacks, waiting for the frame loop
#[derive(Resource, Default)]
pub struct PendingPicks(pub Arc<Mutex<VecDeque<PickedImage>>>);

/// Latest pick replaces the current selection
fn process_picked_files(pending: Res<PendingPicks>, mut selection: ResMut<UploadSelection>) {
    if let Ok(mut picks) = pending.0.lock() {
        if let Some(image) = picks.drain(..).last() {
            tracing::info!("Selected image for upload: {}", image.filename);
            selection.0 = Some(image);
        }
    }
}

// ============================================================================
// JavaScript Interop (WASM only)
// ============================================================================

#[cfg(target_arch = "wasm32")]
mod js_interop {
    use super::*;
    use wasm_bindgen::prelude::*;
    use wasm_bindgen::JsCast;
    use web_sys::{HtmlAnchorElement, HtmlInputElement};

    /// Open a file picker dialog using a hidden HTML input element
    pub fn open_file_picker(accept: &str, pending: Arc<Mutex<VecDeque<PickedImage>>>) {
        let Some(document) = web_sys::window().and_then(|w| w.document()) else {
            tracing::error!("open_file_picker: no document object");
            return;
        };

        let input: HtmlInputElement = match document
            .create_element("input")
            .map(|el| el.dyn_into::<HtmlInputElement>())
        {
            Ok(Ok(input)) => input,
            _ => {
                tracing::error!("open_file_picker: failed to create input element");
                return;
            }
        };

        input.set_type("file");
        input.set_accept(accept);
        input.style().set_property("display", "none").ok();

        let Some(body) = document.body() else {
            tracing::error!("open_file_picker: no document body");
            return;
        };
        if let Err(e) = body.append_child(&input) {
            tracing::error!("open_file_picker: failed to append input to body: {:?}", e);
            return;
        }

        let input_clone = input.clone();
        let closure = Closure::wrap(Box::new(move |_event: web_sys::Event| {
            if let Some(file) = input_clone.files().and_then(|files| files.get(0)) {
                read_file(file, pending.clone());
            } else {
                tracing::debug!("open_file_picker: no file selected");
            }

            // Remove the input element
            if let Some(parent) = input_clone.parent_node() {
                parent.remove_child(&input_clone).ok();
            }
        }) as Box<dyn FnMut(_)>);

        input.set_onchange(Some(closure.as_ref().unchecked_ref()));
        closure.forget();

        input.click();
    }

    fn read_file(file: web_sys::File, pending: Arc<Mutex<VecDeque<PickedImage>>>) {
        let reader = match web_sys::FileReader::new() {
            Ok(reader) => reader,
            Err(e) => {
                tracing::error!("read_file: failed to create FileReader: {:?}", e);
                return;
            }
        };
        let reader_clone = reader.clone();
        let filename = file.name();
        let mime_type = file.type_();

        let onload = Closure::wrap(Box::new(move |_: web_sys::Event| {
            let buffer = reader_clone
                .result()
                .ok()
                .and_then(|result| result.dyn_into::<js_sys::ArrayBuffer>().ok());
            let Some(buffer) = buffer else {
                tracing::error!("read_file: could not read {}", filename);
                return;
            };

            let content = js_sys::Uint8Array::new(&buffer).to_vec();
            if let Ok(mut picks) = pending.lock() {
                picks.push_back(PickedImage {
                    filename: filename.clone(),
                    mime_type: mime_type.clone(),
                    content,
                });
            }
        }) as Box<dyn FnMut(_)>);

        reader.set_onload(Some(onload.as_ref().unchecked_ref()));
        onload.forget();

        if let Err(e) = reader.read_as_array_buffer(&file) {
            tracing::error!("read_file: read failed: {:?}", e);
        }
    }

    /// Download a served file through a temporary anchor element
    pub fn download(url: &str, filename: &str) {
        let Some(document) = web_sys::window().and_then(|w| w.document()) else {
            return;
        };

        let anchor: HtmlAnchorElement = match document
            .create_element("a")
            .map(|el| el.dyn_into::<HtmlAnchorElement>())
        {
            Ok(Ok(anchor)) => anchor,
            _ => return,
        };

        anchor.set_href(url);
        anchor.set_download(filename);

        if let Some(body) = document.body() {
            body.append_child(&anchor).ok();
            anchor.click();
            body.remove_child(&anchor).ok();
        }
    }
}

// Non-WASM stubs
#[cfg(not(target_arch = "wasm32"))]
mod js_interop {
    use super::*;

    pub fn open_file_picker(_accept: &str, _pending: Arc<Mutex<VecDeque<PickedImage>>>) {
        tracing::warn!("File picker not supported on this platform");
    }

    pub fn download(url: &str, _filename: &str) {
        tracing::warn!("Download not supported on this platform: {}", url);
    }
}

pub use js_interop::download;

/// Helper to open the image picker from UI
pub fn trigger_image_open(pending: &PendingPicks) {
    js_interop::open_file_picker("image/*", pending.0.clone());
}
