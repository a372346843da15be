//! 3D stage: camera, lights, backdrop, model loading and wireframe mode
//!
//! The core `ModelViewer` decides which session is live. The systems here
//! make the ECS follow it: spawn the loaded scene for the live session,
//! despawn anything left from an older one, and keep every mesh in line
//! with the wireframe toggle.
//!
//! Wireframe is drawn from a line-list copy of each mesh rather than a line
//! polygon mode, which WebGPU and WebGL2 do not offer.

use bevy::asset::{LoadState, RecursiveDependencyLoadState, RenderAssetUsages};
use bevy::camera::visibility::RenderLayers;
use bevy::camera::Viewport;
use bevy::core_pipeline::tonemapping::Tonemapping;
use bevy::gltf::Gltf;
use bevy::image::{ImageAddressMode, ImageFilterMode, ImageSampler, ImageSamplerDescriptor};
use bevy::input::mouse::{MouseMotion, MouseWheel};
use bevy::math::Affine2;
use bevy::mesh::{Indices, PrimitiveTopology, VertexAttributeValues};
use bevy::prelude::*;
use bevy::render::render_resource::{Extent3d, TextureDimension, TextureFormat};
use bevy_egui::{EguiGlobalSettings, PrimaryEguiContext};
use genai3d_core::material_cache::triangle_edges;
use genai3d_core::{
    DisplayTarget, LoadPhase, MeshId, ModelViewer, RenderMode, SessionId, SurfaceState, ViewerSettings,
};

use crate::app::{apply_effects, Settings, Viewer};
use crate::network::ServerConfig;

/// Lux per unit of the configured light intensities
const DIRECTIONAL_LUX_PER_UNIT: f32 = 1500.0;
/// Ambient brightness per unit of the configured ambient intensity
const AMBIENT_BRIGHTNESS_PER_UNIT: f32 = 80.0;

pub struct ViewerPlugin;

impl Plugin for ViewerPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<OrbitCamera>()
            .init_resource::<StageLayout>()
            .init_resource::<LoadingModel>()
            .init_resource::<SourceImage>()
            .add_systems(Startup, setup_stage)
            .add_systems(Update, (
                update_viewport,
                sync_session.after(apply_effects),
                load_models.after(sync_session),
                update_orbit_camera.run_if(viewer_running),
                update_source_overlay.after(apply_effects),
            ))
            .add_systems(PostUpdate, (apply_render_mode, tag_new_meshes).chain());
    }
}

/// Marker component for the 3D camera
#[derive(Component)]
pub struct MainCamera;

/// Root of the loaded asset for one viewer session
#[derive(Component)]
pub struct ViewerRoot {
    pub session: SessionId,
}

/// A mesh of the live asset, with its identity in the material cache
#[derive(Component)]
pub struct ViewerMesh {
    pub id: MeshId,
    /// Line-list twin shown in wireframe mode
    pub edges: Option<Entity>,
}

/// Edges of a viewer mesh
#[derive(Component)]
pub struct EdgeOverlay;

/// Full-viewport image shown instead of the render
#[derive(Component)]
pub struct SourceImageOverlay;

/// Flat black material for edges, also substituted on untextured meshes
/// in wireframe mode
#[derive(Resource)]
pub struct WireframeMaterial(pub Handle<StandardMaterial>);

/// Side panel widths in logical pixels, reported by the UI
#[derive(Resource, Default)]
pub struct StageLayout {
    pub left_panel: f32,
    pub right_panel: f32,
}

/// glTF asset being loaded for a session
#[derive(Resource, Default)]
pub struct LoadingModel(pub Option<(SessionId, Handle<Gltf>)>);

/// Loaded handle for the current source image
#[derive(Resource, Default)]
pub struct SourceImage {
    pub path: Option<String>,
    pub handle: Option<Handle<Image>>,
}

/// Orbit camera state (Y-up)
#[derive(Debug, Clone, Resource)]
pub struct OrbitCamera {
    pub distance: f32,
    pub target_distance: f32, // For smooth zoom
    pub azimuth: f32,
    pub elevation: f32,
    pub target: Vec3,
    pub target_focus: Vec3, // For smooth panning
    pub sensitivity: f32,
    pub zoom_speed: f32,
    pub smooth_factor: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self::looking_from(ViewerSettings::default().camera_distance)
    }
}

impl OrbitCamera {
    /// Camera on +Z at `distance`, looking at the origin
    pub fn looking_from(distance: f32) -> Self {
        Self {
            distance,
            target_distance: distance,
            azimuth: 0.0,
            elevation: 0.0,
            target: Vec3::ZERO,
            target_focus: Vec3::ZERO,
            sensitivity: 0.005,
            zoom_speed: 0.1,
            smooth_factor: 0.15,
        }
    }

    pub fn eye(&self) -> Vec3 {
        let x = self.distance * self.azimuth.sin() * self.elevation.cos();
        let y = self.distance * self.elevation.sin();
        let z = self.distance * self.azimuth.cos() * self.elevation.cos();
        self.target + Vec3::new(x, y, z)
    }
}

fn viewer_running(viewer: Res<Viewer>) -> bool {
    viewer.0.is_running()
}

/// Tiling two-tone checker texture
fn checker_image() -> Image {
    let light = [200u8, 200, 200, 255];
    let dark = [120u8, 120, 120, 255];
    let data = [light, dark, dark, light].concat();

    let mut image = Image::new(
        Extent3d { width: 2, height: 2, depth_or_array_layers: 1 },
        TextureDimension::D2,
        data,
        TextureFormat::Rgba8UnormSrgb,
        RenderAssetUsages::RENDER_WORLD,
    );
    image.sampler = ImageSampler::Descriptor(ImageSamplerDescriptor {
        address_mode_u: ImageAddressMode::Repeat,
        address_mode_v: ImageAddressMode::Repeat,
        mag_filter: ImageFilterMode::Nearest,
        min_filter: ImageFilterMode::Nearest,
        ..default()
    });
    image
}

fn setup_stage(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    mut images: ResMut<Assets<Image>>,
    mut egui_global_settings: ResMut<EguiGlobalSettings>,
    settings: Res<Settings>,
) {
    let settings = &settings.0;

    // egui gets its own full-window camera; the 3D camera is a square viewport
    egui_global_settings.auto_create_primary_context = false;

    let camera = commands
        .spawn((
            Camera3d::default(),
            Camera {
                order: 0,
                ..default()
            },
            Projection::Perspective(PerspectiveProjection {
                fov: settings.fov_degrees.to_radians(),
                aspect_ratio: 1.0,
                near: settings.near,
                far: settings.far,
                ..default()
            }),
            Tonemapping::TonyMcMapface,
            Msaa::Sample4,
            Transform::from_xyz(0.0, 0.0, settings.camera_distance).looking_at(Vec3::ZERO, Vec3::Y),
            MainCamera,
        ))
        .id();

    // Checkerboard backdrop fixed to the camera, just inside the far plane
    let backdrop_distance = settings.far * 0.9;
    let backdrop_size = 2.0 * backdrop_distance * (settings.fov_degrees.to_radians() / 2.0).tan();
    let backdrop_material = materials.add(StandardMaterial {
        base_color_texture: Some(images.add(checker_image())),
        unlit: true,
        uv_transform: Affine2::from_scale(Vec2::splat(settings.checker_repeat)),
        ..default()
    });
    commands.entity(camera).with_children(|parent| {
        parent.spawn((
            Mesh3d(meshes.add(Rectangle::new(backdrop_size, backdrop_size))),
            MeshMaterial3d(backdrop_material),
            Transform::from_xyz(0.0, 0.0, -backdrop_distance),
        ));
    });

    // Egui-only camera for UI overlay
    commands.spawn((
        PrimaryEguiContext,
        Camera3d::default(),
        RenderLayers::none(),
        Camera {
            order: 1,
            clear_color: ClearColorConfig::None,
            ..default()
        },
    ));

    commands.insert_resource(AmbientLight {
        color: Color::WHITE,
        brightness: settings.ambient_intensity * AMBIENT_BRIGHTNESS_PER_UNIT,
        affects_lightmapped_meshes: true,
    });

    for light in &settings.directional_lights {
        commands.spawn((
            DirectionalLight {
                illuminance: light.intensity * DIRECTIONAL_LUX_PER_UNIT,
                shadows_enabled: false,
                ..default()
            },
            Transform::from_translation(Vec3::from_array(light.position)).looking_at(Vec3::ZERO, Vec3::Y),
        ));
    }

    commands.insert_resource(WireframeMaterial(materials.add(StandardMaterial {
        base_color: Color::BLACK,
        unlit: true,
        ..default()
    })));

    // Source image overlay, rendered into the 3D camera's viewport
    commands.spawn((
        Node {
            position_type: PositionType::Absolute,
            width: Val::Percent(100.0),
            height: Val::Percent(100.0),
            ..default()
        },
        ImageNode::default(),
        BackgroundColor(Color::BLACK),
        Visibility::Hidden,
        UiTargetCamera(camera),
        SourceImageOverlay,
    ));
}

/// Keep the square viewport centered between the side panels
fn update_viewport(
    windows: Query<&Window>,
    layout: Res<StageLayout>,
    settings: Res<Settings>,
    mut camera_query: Query<&mut Camera, With<MainCamera>>,
) {
    let (Ok(window), Ok(mut camera)) = (windows.single(), camera_query.single_mut()) else {
        return;
    };

    let scale_factor = window.scale_factor();
    let left = (layout.left_panel * scale_factor) as u32;
    let right = (layout.right_panel * scale_factor) as u32;
    let region_width = window.physical_width().saturating_sub(left).saturating_sub(right);
    if region_width == 0 || window.physical_height() == 0 {
        return;
    }
    let (x, y, edge) = settings.0.viewport_rect(region_width, window.physical_height(), scale_factor);

    let position = UVec2::new(left + x, y);
    let size = UVec2::splat(edge);
    let unchanged = camera
        .viewport
        .as_ref()
        .is_some_and(|v| v.physical_position == position && v.physical_size == size);
    if !unchanged {
        camera.viewport = Some(Viewport {
            physical_position: position,
            physical_size: size,
            ..default()
        });
    }
}

/// Make the spawned scene follow the live viewer session
fn sync_session(
    mut commands: Commands,
    viewer: Res<Viewer>,
    mut loading: ResMut<LoadingModel>,
    mut orbit: ResMut<OrbitCamera>,
    settings: Res<Settings>,
    roots: Query<(Entity, &ViewerRoot)>,
    asset_server: Res<AssetServer>,
) {
    let live = viewer.0.session();
    let live_id = live.map(|s| s.id);

    // Tear down everything that belongs to an older session
    let mut spawned = false;
    for (entity, root) in roots.iter() {
        if Some(root.session) == live_id {
            spawned = true;
        } else {
            tracing::debug!("Despawning viewer root for session {}", root.session.0);
            commands.entity(entity).despawn();
        }
    }
    if loading.0.as_ref().is_some_and(|(id, _)| Some(*id) != live_id) {
        loading.0 = None;
    }

    let Some(session) = live else { return };
    if spawned || loading.0.is_some() || session.phase != LoadPhase::Loading {
        return;
    }

    tracing::info!("Starting to load model: {}", session.asset_path);
    let handle: Handle<Gltf> = asset_server.load(session.asset_path.clone());
    loading.0 = Some((session.id, handle));
    *orbit = OrbitCamera::looking_from(settings.0.camera_distance);
}

/// Check loading state and spawn the default scene of a loaded glTF
fn load_models(
    mut commands: Commands,
    mut viewer: ResMut<Viewer>,
    mut loading: ResMut<LoadingModel>,
    asset_server: Res<AssetServer>,
    gltf_assets: Res<Assets<Gltf>>,
) {
    let Some((session, handle)) = loading.0.clone() else { return };

    if let Some(LoadState::Failed(e)) = asset_server.get_load_state(handle.id()) {
        tracing::error!("Failed to load model: {}", e);
        viewer.0.on_load_finished(session, Err(e.to_string()));
        loading.0 = None;
        return;
    }

    // Wait for meshes, materials and textures too, so the wireframe pass
    // sees the final materials
    match asset_server.get_recursive_dependency_load_state(handle.id()) {
        Some(RecursiveDependencyLoadState::Loaded) => {
            let scene = gltf_assets
                .get(&handle)
                .and_then(|gltf| gltf.default_scene.clone().or_else(|| gltf.scenes.first().cloned()));

            match scene {
                Some(scene_handle) => {
                    tracing::info!("Model loaded for session {}", session.0);
                    commands.spawn((SceneRoot(scene_handle), Transform::default(), ViewerRoot { session }));
                    viewer.0.on_load_finished(session, Ok(()));
                }
                None => {
                    tracing::error!("Model has no scene to display");
                    viewer.0.on_load_finished(session, Err("asset contains no scene".to_string()));
                }
            }
            loading.0 = None;
        }
        Some(RecursiveDependencyLoadState::Failed(e)) => {
            tracing::error!("Failed to load model dependencies: {}", e);
            viewer.0.on_load_finished(session, Err(e.to_string()));
            loading.0 = None;
        }
        _ => {
            // Still loading
        }
    }
}

/// Line-list mesh over the unique triangle edges of `mesh`
fn edge_mesh(mesh: &Mesh) -> Option<Mesh> {
    if mesh.primitive_topology() != PrimitiveTopology::TriangleList {
        return None;
    }
    let Some(VertexAttributeValues::Float32x3(positions)) = mesh.attribute(Mesh::ATTRIBUTE_POSITION) else {
        return None;
    };

    let indices: Vec<u32> = match mesh.indices() {
        Some(indices) => indices.iter().map(|i| i as u32).collect(),
        None => (0..positions.len() as u32).collect(),
    };
    let lines = triangle_edges(&indices);
    if lines.is_empty() {
        return None;
    }

    let mut edges = Mesh::new(PrimitiveTopology::LineList, RenderAssetUsages::default());
    edges.insert_attribute(Mesh::ATTRIBUTE_POSITION, positions.clone());
    edges.insert_indices(Indices::U32(lines));
    Some(edges)
}

/// Bring one mesh entity in line with the viewer's current mode.
/// Returns the material to swap in, if it differs from `current`.
fn apply_surface(
    commands: &mut Commands,
    viewer: &mut ModelViewer<Handle<StandardMaterial>>,
    entity: Entity,
    mesh: &ViewerMesh,
    current: &Handle<StandardMaterial>,
    materials: &Assets<StandardMaterial>,
    wireframe_material: &Handle<StandardMaterial>,
) -> Option<Handle<StandardMaterial>> {
    let textured = materials
        .get(current)
        .is_some_and(|m| m.base_color_texture.is_some());
    let mut surface = SurfaceState::new(current.clone(), textured);

    viewer.apply_mode(mesh.id, &mut surface, wireframe_material);

    // Without edges the substitute fill is all there is to show
    if let Some(edges) = mesh.edges {
        let (fill, lines) = if surface.wireframe {
            (Visibility::Hidden, Visibility::Inherited)
        } else {
            (Visibility::Inherited, Visibility::Hidden)
        };
        commands.entity(entity).insert(fill);
        commands.entity(edges).insert(lines);
    }

    (surface.material != *current).then_some(surface.material)
}

/// Re-run the wireframe pass over the live scene when the toggle changes
fn apply_render_mode(
    mut commands: Commands,
    mut viewer: ResMut<Viewer>,
    mut applied: Local<RenderMode>,
    mut meshes: Query<(Entity, &ViewerMesh, &mut MeshMaterial3d<StandardMaterial>)>,
    materials: Res<Assets<StandardMaterial>>,
    wireframe_material: Res<WireframeMaterial>,
) {
    let mode = viewer.0.mode();
    if *applied == mode {
        return;
    }
    *applied = mode;

    for (entity, mesh, mut material) in meshes.iter_mut() {
        if let Some(swapped) = apply_surface(
            &mut commands,
            &mut viewer.0,
            entity,
            mesh,
            &material.0,
            &materials,
            &wireframe_material.0,
        ) {
            material.0 = swapped;
        }
    }
}

/// Assign identities to freshly spawned meshes of the live asset, give each
/// its edge overlay and apply the current mode before they are first rendered
fn tag_new_meshes(
    mut commands: Commands,
    mut viewer: ResMut<Viewer>,
    roots: Query<Entity, With<ViewerRoot>>,
    children_query: Query<&Children>,
    mut untagged: Query<
        (&Mesh3d, &mut MeshMaterial3d<StandardMaterial>, &Transform, Option<&ChildOf>),
        (Without<ViewerMesh>, Without<EdgeOverlay>),
    >,
    mut meshes: ResMut<Assets<Mesh>>,
    materials: Res<Assets<StandardMaterial>>,
    wireframe_material: Res<WireframeMaterial>,
) {
    let mut found = Vec::new();
    for root in roots.iter() {
        collect_descendants(root, &children_query, &mut found);
    }

    for entity in found {
        let Ok((mesh3d, mut material, transform, parent)) = untagged.get_mut(entity) else { continue };
        let Some(id) = viewer.0.assign_mesh_id() else { return };

        // Sibling rather than child, so hiding the fill keeps the edges visible
        let edges = match (meshes.get(&mesh3d.0).and_then(edge_mesh), parent) {
            (Some(edges), Some(parent)) => Some(
                commands
                    .spawn((
                        Mesh3d(meshes.add(edges)),
                        MeshMaterial3d(wireframe_material.0.clone()),
                        *transform,
                        Visibility::Hidden,
                        EdgeOverlay,
                        ChildOf(parent.parent()),
                    ))
                    .id(),
            ),
            _ => None,
        };

        let tagged = ViewerMesh { id, edges };
        if let Some(swapped) = apply_surface(
            &mut commands,
            &mut viewer.0,
            entity,
            &tagged,
            &material.0,
            &materials,
            &wireframe_material.0,
        ) {
            material.0 = swapped;
        }
        commands.entity(entity).insert(tagged);
    }
}

fn collect_descendants(entity: Entity, children_query: &Query<&Children>, out: &mut Vec<Entity>) {
    if let Ok(children) = children_query.get(entity) {
        for child in children.iter() {
            out.push(child);
            collect_descendants(child, children_query, out);
        }
    }
}

/// Orbit, pan and zoom around the model
fn update_orbit_camera(
    mut camera_query: Query<&mut Transform, With<MainCamera>>,
    mut orbit: ResMut<OrbitCamera>,
    mut mouse_motion: MessageReader<MouseMotion>,
    mut mouse_wheel: MessageReader<MouseWheel>,
    mouse_button: Res<ButtonInput<MouseButton>>,
    touch_input: Res<Touches>,
    time: Res<Time>,
    mut contexts: bevy_egui::EguiContexts,
) {
    // Don't process camera controls while egui owns the pointer
    let egui_wants_pointer = contexts
        .ctx_mut()
        .map(|ctx| ctx.wants_pointer_input() || ctx.is_pointer_over_area())
        .unwrap_or(false);

    let mut total_motion = Vec2::ZERO;
    for motion in mouse_motion.read() {
        total_motion += motion.delta;
    }

    if mouse_button.pressed(MouseButton::Left) && !egui_wants_pointer {
        orbit.azimuth -= total_motion.x * orbit.sensitivity;
        orbit.elevation = (orbit.elevation + total_motion.y * orbit.sensitivity).clamp(-1.5, 1.5);
    }

    // Pan in the camera plane with right drag
    if mouse_button.pressed(MouseButton::Right) && !egui_wants_pointer {
        let right = Vec3::new(orbit.azimuth.cos(), 0.0, -orbit.azimuth.sin());
        let pan_speed = orbit.distance * 0.002;
        orbit.target_focus -= right * total_motion.x * pan_speed;
        orbit.target_focus += Vec3::Y * total_motion.y * pan_speed;
    }

    if !egui_wants_pointer {
        for scroll in mouse_wheel.read() {
            let zoom_factor = 1.0 - scroll.y * orbit.zoom_speed * 0.3;
            orbit.target_distance = (orbit.target_distance * zoom_factor).clamp(0.2, 50.0);
        }
    } else {
        // Drain the scroll events even if we're not using them
        for _ in mouse_wheel.read() {}
    }

    // Touch support for mobile
    if touch_input.iter().count() == 1 && !egui_wants_pointer {
        for touch in touch_input.iter() {
            let delta = touch.delta();
            if delta != Vec2::ZERO {
                orbit.azimuth -= delta.x * orbit.sensitivity;
                orbit.elevation = (orbit.elevation + delta.y * orbit.sensitivity).clamp(-1.5, 1.5);
            }
        }
    }

    // Pinch to zoom
    let touches: Vec<_> = touch_input.iter().collect();
    if let [t1, t2] = touches.as_slice() {
        let curr_dist = t1.position().distance(t2.position());
        let prev_dist = (t1.position() - t1.delta()).distance(t2.position() - t2.delta());
        let zoom_factor = prev_dist / curr_dist.max(1.0);
        orbit.target_distance = (orbit.target_distance * zoom_factor).clamp(0.2, 50.0);
    }

    // Smooth interpolation for zoom and target
    let dt = time.delta_secs();
    let lerp_factor = 1.0 - (-orbit.smooth_factor * 60.0 * dt).exp();
    orbit.distance += (orbit.target_distance - orbit.distance) * lerp_factor;
    let target_step = (orbit.target_focus - orbit.target) * lerp_factor;
    orbit.target += target_step;

    if let Ok(mut transform) = camera_query.single_mut() {
        transform.translation = orbit.eye();
        transform.look_at(orbit.target, Vec3::Y);
    }
}

/// Show the source image while nothing is rendered, or while "Show Image" is held
fn update_source_overlay(
    viewer: Res<Viewer>,
    config: Res<ServerConfig>,
    mut source: ResMut<SourceImage>,
    asset_server: Res<AssetServer>,
    mut overlay: Query<(&mut ImageNode, &mut Visibility), With<SourceImageOverlay>>,
) {
    let path = viewer.0.source_image();
    if source.path.as_deref() != path {
        source.path = path.map(str::to_string);
        source.handle = path.map(|p| asset_server.load(config.0.asset_url(p)));
    }

    let Ok((mut image_node, mut visibility)) = overlay.single_mut() else { return };

    let show = source.handle.is_some()
        && (!viewer.0.is_running() || viewer.0.display_target() == DisplayTarget::SourceImage);

    if let Some(handle) = &source.handle {
        if image_node.image != *handle {
            image_node.image = handle.clone();
        }
    }

    let wanted = if show { Visibility::Inherited } else { Visibility::Hidden };
    if *visibility != wanted {
        *visibility = wanted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orbit_starts_on_positive_z() {
        let orbit = OrbitCamera::looking_from(3.0);
        let eye = orbit.eye();
        assert!((eye - Vec3::new(0.0, 0.0, 3.0)).length() < 1e-5);
    }

    #[test]
    fn test_checker_image_tiles() {
        let image = checker_image();
        assert_eq!(image.width(), 2);
        assert!(matches!(image.sampler, ImageSampler::Descriptor(ref d) if d.address_mode_u == ImageAddressMode::Repeat));
    }

    #[test]
    fn test_edge_mesh_of_cuboid() {
        let cube = Mesh::from(Cuboid::default());
        let edges = edge_mesh(&cube).unwrap();

        assert_eq!(edges.primitive_topology(), PrimitiveTopology::LineList);
        // Six faces, four sides and one diagonal each
        assert_eq!(edges.indices().unwrap().len(), 60);

        let lines = Mesh::new(PrimitiveTopology::LineList, RenderAssetUsages::default());
        assert!(edge_mesh(&lines).is_none());
    }

    struct Stage {
        app: App,
        wire: Handle<StandardMaterial>,
        plain: (Entity, Handle<StandardMaterial>),
        textured: (Entity, Handle<StandardMaterial>),
    }

    fn stage() -> Stage {
        let mut app = App::new();
        app.add_plugins((MinimalPlugins, AssetPlugin::default()))
            .init_asset::<Mesh>()
            .init_asset::<StandardMaterial>()
            .init_resource::<Viewer>()
            .add_systems(Update, (apply_render_mode, tag_new_meshes).chain());

        let world = app.world_mut();
        let (wire, red, brick) = {
            let mut materials = world.resource_mut::<Assets<StandardMaterial>>();
            let wire = materials.add(StandardMaterial {
                base_color: Color::BLACK,
                unlit: true,
                ..default()
            });
            let red = materials.add(StandardMaterial::from(Color::srgb(1.0, 0.0, 0.0)));
            let brick = materials.add(StandardMaterial {
                base_color_texture: Some(Handle::default()),
                ..default()
            });
            (wire, red, brick)
        };
        let cube = world.resource_mut::<Assets<Mesh>>().add(Mesh::from(Cuboid::default()));
        world.insert_resource(WireframeMaterial(wire.clone()));

        // Displaying starts in wireframe mode
        let session = world.resource_mut::<Viewer>().0.display("models/a.glb").id;
        let root = world.spawn((ViewerRoot { session }, Transform::default())).id();
        let plain = world
            .spawn((Mesh3d(cube.clone()), MeshMaterial3d(red.clone()), ChildOf(root)))
            .id();
        let textured = world
            .spawn((Mesh3d(cube), MeshMaterial3d(brick.clone()), ChildOf(root)))
            .id();

        Stage { app, wire, plain: (plain, red), textured: (textured, brick) }
    }

    fn material_of(app: &App, entity: Entity) -> Handle<StandardMaterial> {
        app.world().get::<MeshMaterial3d<StandardMaterial>>(entity).unwrap().0.clone()
    }

    fn edges_of(app: &App, entity: Entity) -> Entity {
        app.world().get::<ViewerMesh>(entity).unwrap().edges.unwrap()
    }

    fn visibility(app: &App, entity: Entity) -> Visibility {
        *app.world().get::<Visibility>(entity).unwrap()
    }

    #[test]
    fn test_loaded_meshes_are_wireframe_after_first_update() {
        let Stage { mut app, wire, plain, textured } = stage();
        app.update();

        // Untextured: substitute material, fill hidden, edges shown
        assert_eq!(material_of(&app, plain.0), wire);
        assert_eq!(visibility(&app, plain.0), Visibility::Hidden);
        assert_eq!(visibility(&app, edges_of(&app, plain.0)), Visibility::Inherited);

        // Textured: material kept and not captured, still drawn as edges
        assert_eq!(material_of(&app, textured.0), textured.1);
        assert_eq!(visibility(&app, textured.0), Visibility::Hidden);
        assert_eq!(visibility(&app, edges_of(&app, textured.0)), Visibility::Inherited);
        let textured_id = app.world().get::<ViewerMesh>(textured.0).unwrap().id;
        let viewer = app.world().resource::<Viewer>();
        assert!(!viewer.0.material_cache().is_captured(textured_id));
        assert_eq!(viewer.0.material_cache().len(), 1);
    }

    #[test]
    fn test_toggle_off_restores_exact_originals() {
        let Stage { mut app, plain, textured, .. } = stage();
        app.update();

        app.world_mut().resource_mut::<Viewer>().0.set_wireframe(false);
        app.update();

        for (entity, original) in [plain, textured] {
            assert_eq!(material_of(&app, entity), original);
            assert_eq!(visibility(&app, entity), Visibility::Inherited);
            assert_eq!(visibility(&app, edges_of(&app, entity)), Visibility::Hidden);
        }

        // Edge overlays are never tagged as meshes of their own
        app.update();
        let tagged = app
            .world_mut()
            .query::<&ViewerMesh>()
            .iter(app.world())
            .count();
        assert_eq!(tagged, 2);
    }
}
