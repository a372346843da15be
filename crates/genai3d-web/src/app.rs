//! Bevy application setup and the shared client state

use std::sync::Arc;

use bevy::prelude::*;
use bevy_egui::EguiPlugin;
use bevy_picking::DefaultPickingPlugins;
use genai3d_core::{
    ConversionController, GenerationController, ModelLibrary, ModelViewer, NotificationBus,
    PushEventRouter, PushQueue, UiEffect, ViewerSettings,
};

use crate::file_picker::FilePickerPlugin;
use crate::network::{self, NetworkPlugin, PendingHttp, PushInbox, ServerConfig};
use crate::ui::UiPlugin;
use crate::viewer::ViewerPlugin;

/// Prompt → image lifecycle
#[derive(Resource, Default)]
pub struct Generation(pub GenerationController);

/// Image → 3D lifecycle
#[derive(Resource)]
pub struct Conversion(pub ConversionController);

/// Push events → conversion lifecycle
#[derive(Resource)]
pub struct PushRouter(pub PushEventRouter);

/// Previously produced models
#[derive(Resource, Default)]
pub struct Library(pub ModelLibrary);

/// Live viewer session, display target and wireframe cache
#[derive(Resource, Default)]
pub struct Viewer(pub ModelViewer<Handle<StandardMaterial>>);

#[derive(Resource, Default)]
pub struct Notifications(pub NotificationBus);

/// Fixed viewer constants
#[derive(Resource, Default)]
pub struct Settings(pub ViewerSettings);

/// Editable form fields that are not part of any controller
#[derive(Resource, Default)]
pub struct FormState {
    pub prompt: String,
}

/// A controller side effect waiting to be applied this frame
#[derive(Message, Debug, Clone)]
pub struct EffectMessage(pub UiEffect);

/// Apply controller effects in the order they were produced
pub fn apply_effects(
    mut effects: MessageReader<EffectMessage>,
    mut notifications: ResMut<Notifications>,
    mut viewer: ResMut<Viewer>,
    mut library: ResMut<Library>,
    mut conversion: ResMut<Conversion>,
    config: Res<ServerConfig>,
    pending: Res<PendingHttp>,
) {
    for EffectMessage(effect) in effects.read() {
        match effect {
            UiEffect::Notify(message) => notifications.0.notify(message.clone()),
            UiEffect::ClearStage => {
                // A new image is on its way; the old form's conversion no
                // longer owns the Convert button
                conversion.0.abandon();
                viewer.0.clear_stage();
            }
            UiEffect::ShowSourceImage(path) => viewer.0.set_source_image(path),
            UiEffect::DisplayModel(path) => {
                viewer.0.display(&config.0.asset_url(path));
            }
            UiEffect::RefreshLibrary => {
                let ticket = library.0.begin_refresh();
                network::fetch_models(&config.0, ticket, &pending);
            }
        }
    }
}

/// Advance everything that expires on the frame clock
fn tick_timers(
    time: Res<Time>,
    mut notifications: ResMut<Notifications>,
    mut conversion: ResMut<Conversion>,
    mut effects: MessageWriter<EffectMessage>,
) {
    notifications.0.tick(time.delta());
    for effect in conversion.0.tick(time.delta()) {
        effects.write(EffectMessage(effect));
    }
}

/// Run the Bevy application
pub fn run() {
    let settings = ViewerSettings::default();
    let push_queue = PushQueue::with_random_session();
    let conversion = ConversionController::new(Arc::new(push_queue.clone()));
    let router = PushEventRouter::new(Arc::new(push_queue.clone()));

    App::new()
        .insert_resource(ClearColor(Color::srgb(0.12, 0.12, 0.14)))
        .add_plugins(DefaultPlugins
            .set(WindowPlugin {
                primary_window: Some(Window {
                    title: "genai3d".to_string(),
                    canvas: Some("#genai3d-canvas".to_string()),
                    fit_canvas_to_parent: true,
                    prevent_default_event_handling: false,
                    ..default()
                }),
                ..default()
            })
            .set(AssetPlugin {
                // Asset paths from the backend are page-relative
                file_path: "".to_string(),
                // Don't look for .meta files - server doesn't have them
                meta_check: bevy::asset::AssetMetaCheck::Never,
                ..default()
            })
        )
        // bevy_picking must be added BEFORE EguiPlugin so it can detect PickingPlugin
        .add_plugins(DefaultPickingPlugins)
        .add_plugins(EguiPlugin::default())
        .insert_resource(Notifications(NotificationBus::with_duration(settings.notification_duration())))
        .insert_resource(Settings(settings))
        .insert_resource(Conversion(conversion))
        .insert_resource(PushRouter(router))
        .insert_resource(PushInbox(push_queue))
        .init_resource::<Generation>()
        .init_resource::<Library>()
        .init_resource::<Viewer>()
        .init_resource::<FormState>()
        .add_message::<EffectMessage>()
        .add_plugins(NetworkPlugin)
        .add_plugins(FilePickerPlugin)
        .add_plugins(ViewerPlugin)
        .add_plugins(UiPlugin)
        .add_systems(Update, (
            tick_timers.before(apply_effects),
            apply_effects.after(network::process_completions).after(network::pump_push_events),
        ))
        .run();
}
