//! UI overlays using bevy_egui

use bevy::prelude::*;
use bevy_egui::{egui, EguiContexts, EguiPrimaryContextPass};
use genai3d_core::{Affordance, FaceCount, LibraryClick, Submission};

use crate::app::{Conversion, EffectMessage, FormState, Generation, Library, Notifications, Viewer};
use crate::file_picker::{self, PendingPicks, UploadSelection};
use crate::network::{self, ChannelState, PendingHttp, PushConnection, ServerConfig};
use crate::viewer::StageLayout;

const PANEL_WIDTH: f32 = 280.0;

pub struct UiPlugin;

impl Plugin for UiPlugin {
    fn build(&self, app: &mut App) {
        // bevy_egui 0.38+ runs UI in its own pass for proper input handling
        app.add_systems(EguiPrimaryContextPass, ui_system);
    }
}

/// Button that follows an `Affordance`
fn affordance_button(ui: &mut egui::Ui, affordance: &Affordance) -> egui::Response {
    ui.add_enabled(
        affordance.enabled,
        egui::Button::new(affordance.label).min_size(egui::vec2(ui.available_width(), 28.0)),
    )
}

/// Forward a submission outcome. Returns the token when a request should go out.
fn start_submission(submission: Submission, effects: &mut MessageWriter<EffectMessage>) -> Option<u64> {
    match submission {
        Submission::Started(ticket) => {
            for effect in ticket.effects {
                effects.write(EffectMessage(effect));
            }
            Some(ticket.token)
        }
        Submission::Rejected(effect) => {
            effects.write(EffectMessage(effect));
            None
        }
        Submission::Ignored => None,
    }
}

fn ui_system(
    mut contexts: EguiContexts,
    mut generation: ResMut<Generation>,
    mut conversion: ResMut<Conversion>,
    library: Res<Library>,
    mut viewer: ResMut<Viewer>,
    notifications: Res<Notifications>,
    mut form: ResMut<FormState>,
    selection: Res<UploadSelection>,
    picks: Res<PendingPicks>,
    config: Res<ServerConfig>,
    pending: Res<PendingHttp>,
    push: Res<PushConnection>,
    mut layout: ResMut<StageLayout>,
    mut effects: MessageWriter<EffectMessage>,
) {
    let Ok(ctx) = contexts.ctx_mut() else { return };

    // Generation panel (left side)
    let left = egui::SidePanel::left("generation_panel")
        .default_width(PANEL_WIDTH)
        .resizable(true)
        .show(ctx, |ui| {
            ui.heading("Generate");
            ui.separator();

            ui.label("Prompt");
            ui.add(
                egui::TextEdit::multiline(&mut form.prompt)
                    .hint_text("Describe an object...")
                    .desired_rows(3)
                    .desired_width(f32::INFINITY),
            );
            if affordance_button(ui, &generation.0.generate_button).clicked() {
                let submission = generation.0.submit_prompt();
                if let Some(token) = start_submission(submission, &mut effects) {
                    network::post_generate(&config.0, &form.prompt, token, &pending);
                }
            }

            ui.add_space(8.0);
            ui.separator();
            ui.label("Or upload an image");

            ui.horizontal(|ui| {
                if ui.button("Choose File...").clicked() {
                    file_picker::trigger_image_open(&picks);
                }
                let chosen = selection
                    .0
                    .as_ref()
                    .map(|image| image.filename.as_str())
                    .unwrap_or("No file chosen");
                ui.label(egui::RichText::new(chosen).color(egui::Color32::GRAY));
            });
            if affordance_button(ui, &generation.0.upload_button).clicked() {
                let submission = generation.0.submit_upload(selection.0.is_some());
                if let Some(token) = start_submission(submission, &mut effects) {
                    if let Some(image) = selection.0.as_ref() {
                        network::post_upload(&config.0, image, token, &pending);
                    }
                }
            }

            // Conversion form, once an image is available
            let Some(conversion_form) = generation.0.conversion_form_mut() else { return };

            ui.add_space(8.0);
            ui.separator();
            ui.heading("Convert");

            ui.label(egui::RichText::new(conversion_form.image_path()).small().color(egui::Color32::GRAY));
            if let Some(enriched) = conversion_form.enriched_prompt() {
                ui.label(egui::RichText::new("Enriched Prompt:").strong());
                ui.label(enriched);
            }

            ui.checkbox(&mut conversion_form.generate_texture, "Generate Texture");

            let mut face_count = conversion_form.face_count;
            egui::ComboBox::from_label("Face Count")
                .selected_text(face_count.to_string())
                .show_ui(ui, |ui| {
                    for option in FaceCount::ALL {
                        ui.selectable_value(&mut face_count, option, option.to_string());
                    }
                });
            conversion_form.face_count = face_count;

            if affordance_button(ui, &conversion.0.convert_button).clicked() {
                if let Some(ticket) = conversion.0.trigger(conversion_form) {
                    tracing::info!("Converting {}", conversion_form.image_path());
                    network::post_convert(&config.0, &ticket, &pending);
                }
            }
        });
    layout.left_panel = left.response.rect.width();

    // Viewer controls and model library (right side)
    let right = egui::SidePanel::right("library_panel")
        .default_width(PANEL_WIDTH)
        .resizable(true)
        .show(ctx, |ui| {
            ui.heading("View");
            ui.separator();

            let mut wireframe = viewer.0.mode().is_wireframe();
            if ui.checkbox(&mut wireframe, "Wireframe").changed() {
                viewer.0.set_wireframe(wireframe);
            }

            // Shows the source image only while the button is held down
            let has_image = viewer.0.source_image().is_some();
            let held = ui
                .add_enabled(has_image, egui::Button::new("Show Image"))
                .is_pointer_button_down_on();
            viewer.0.sync_hold(held);

            ui.add_space(8.0);
            ui.separator();
            ui.heading("Models");

            let mut click = LibraryClick::None;
            egui::ScrollArea::vertical().show(ui, |ui| {
                for (index, asset) in library.0.assets().iter().enumerate() {
                    let (row, download) = ui
                        .horizontal(|ui| {
                            let row = ui.selectable_label(
                                false,
                                format!("{}\n{}", asset.name, asset.local_timestamp()),
                            );
                            let download = ui.small_button("Download");
                            (row, download)
                        })
                        .inner;

                    let resolved = LibraryClick::resolve(index, row.clicked(), download.clicked());
                    if resolved != LibraryClick::None {
                        click = resolved;
                    }
                }
            });

            match click {
                LibraryClick::Select(index) => {
                    if let Some(effect) = library.0.select(index) {
                        effects.write(EffectMessage(effect));
                    }
                }
                LibraryClick::Download(index) => {
                    if let Some(asset) = library.0.assets().get(index) {
                        file_picker::download(&config.0.endpoint(&asset.path), &asset.name);
                    }
                }
                LibraryClick::None => {}
            }

            ui.separator();
            ui.horizontal(|ui| {
                ui.label(format!("{} models", library.0.assets().len()));
                let (color, status) = match push.state() {
                    ChannelState::Open => (egui::Color32::GREEN, "Live"),
                    ChannelState::Connecting => (egui::Color32::YELLOW, "Connecting"),
                    ChannelState::Closed => (egui::Color32::RED, "Offline"),
                };
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.label(egui::RichText::new(status).small().color(egui::Color32::GRAY));
                    ui.label(egui::RichText::new("●").color(color));
                });
            });
        });
    layout.right_panel = right.response.rect.width();

    // Transient notification, top center
    if let Some(message) = notifications.0.visible_message() {
        egui::Area::new(egui::Id::new("notification"))
            .anchor(egui::Align2::CENTER_TOP, egui::vec2(0.0, 16.0))
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                egui::Frame::popup(ui.style()).show(ui, |ui| {
                    ui.label(message);
                });
            });
    }
}
