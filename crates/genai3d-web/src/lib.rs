//! genai3d Web - browser client for prompt → image → 3D generation
//!
//! This crate provides the browser front end using Bevy, egui and WebGPU.

mod app;
mod file_picker;
mod network;
mod ui;
mod viewer;

use wasm_bindgen::prelude::*;

/// Entry point for WASM module
#[wasm_bindgen(start)]
pub fn main() {
    // Set panic hook for better error messages
    console_error_panic_hook::set_once();

    // Initialize logging with filtering to reduce wgpu noise
    tracing_wasm::set_as_global_default_with_config(
        tracing_wasm::WASMLayerConfigBuilder::new()
            .set_max_level(tracing::Level::WARN)
            .build()
    );

    app::run();
}
