//! Viewer session lifecycle and display state
//!
//! The scene, its loaded asset and its material cache belong to exactly one
//! [`ViewerSession`]. Displaying a new asset tears the previous session down
//! first; load results for a session that is no longer live are ignored.

use crate::material_cache::{MaterialCache, MeshId, RenderMode, SurfaceState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Loading,
    Ready,
    /// Load failed; the scene stays empty
    Failed,
}

/// Which of the two stage elements is visible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayTarget {
    #[default]
    Render,
    SourceImage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerSession {
    pub id: SessionId,
    pub asset_path: String,
    pub phase: LoadPhase,
}

#[derive(Debug, Clone)]
pub struct ModelViewer<M> {
    session: Option<ViewerSession>,
    last_session: u64,
    mode: RenderMode,
    target: DisplayTarget,
    source_image: Option<String>,
    cache: MaterialCache<M>,
    next_mesh: u64,
}

impl<M: Clone> Default for ModelViewer<M> {
    fn default() -> Self {
        Self {
            session: None,
            last_session: 0,
            mode: RenderMode::Normal,
            target: DisplayTarget::Render,
            source_image: None,
            cache: MaterialCache::new(),
            next_mesh: 0,
        }
    }
}

impl<M: Clone> ModelViewer<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self) -> Option<&ViewerSession> {
        self.session.as_ref()
    }

    /// Frame systems run only while this is true
    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    /// Replace the live session with one loading `path`. Every display
    /// starts in wireframe mode.
    pub fn display(&mut self, path: &str) -> ViewerSession {
        self.teardown();
        self.mode = RenderMode::Wireframe;

        self.last_session += 1;
        let session = ViewerSession {
            id: SessionId(self.last_session),
            asset_path: normalize_asset_path(path),
            phase: LoadPhase::Loading,
        };
        tracing::info!(session = session.id.0, path = %session.asset_path, "Displaying model");

        self.session = Some(session.clone());
        self.target = DisplayTarget::Render;
        session
    }

    /// Release the live session and everything captured for it
    pub fn teardown(&mut self) -> Option<ViewerSession> {
        self.cache.clear();
        self.next_mesh = 0;
        let previous = self.session.take();
        if let Some(previous) = &previous {
            tracing::debug!(session = previous.id.0, "Viewer session torn down");
        }
        previous
    }

    /// Reset the stage for a new submission: no model, no source image
    pub fn clear_stage(&mut self) -> Option<ViewerSession> {
        self.source_image = None;
        self.target = DisplayTarget::Render;
        self.teardown()
    }

    /// Record the asset load outcome. Returns false for a session that is
    /// no longer live.
    pub fn on_load_finished(&mut self, id: SessionId, result: Result<(), String>) -> bool {
        let Some(session) = self.session.as_mut().filter(|s| s.id == id) else {
            tracing::debug!(session = id.0, "Ignoring load result for stale session");
            return false;
        };

        session.phase = match result {
            Ok(()) => LoadPhase::Ready,
            Err(e) => {
                tracing::error!("Failed to load model {}: {}", session.asset_path, e);
                LoadPhase::Failed
            }
        };
        true
    }

    /// Identity for a mesh spawned into the live session
    pub fn assign_mesh_id(&mut self) -> Option<MeshId> {
        self.session.as_ref()?;
        let id = MeshId(self.next_mesh);
        self.next_mesh += 1;
        Some(id)
    }

    /// Change the toggle. Returns true when the mode actually changed and the
    /// scene needs another pass.
    pub fn set_wireframe(&mut self, enabled: bool) -> bool {
        let mode = RenderMode::from_toggle(enabled);
        if mode == self.mode {
            return false;
        }
        self.mode = mode;
        true
    }

    /// Bring one mesh in line with the current mode
    pub fn apply_mode(&mut self, id: MeshId, surface: &mut SurfaceState<M>, wireframe_material: &M) {
        self.cache.apply(id, surface, self.mode, wireframe_material);
    }

    pub fn material_cache(&self) -> &MaterialCache<M> {
        &self.cache
    }

    pub fn set_source_image(&mut self, path: &str) {
        self.source_image = Some(path.to_string());
    }

    pub fn source_image(&self) -> Option<&str> {
        self.source_image.as_deref()
    }

    pub fn press_show_image(&mut self) {
        self.target = DisplayTarget::SourceImage;
    }

    pub fn release_show_image(&mut self) {
        self.target = DisplayTarget::Render;
    }

    /// Follow the hold state of the "Show Image" control. Release counts
    /// even when the pointer has left the control.
    pub fn sync_hold(&mut self, held: bool) {
        match (held, self.target) {
            (true, DisplayTarget::Render) => self.press_show_image(),
            (false, DisplayTarget::SourceImage) => self.release_show_image(),
            _ => {}
        }
    }

    pub fn display_target(&self) -> DisplayTarget {
        self.target
    }
}

/// Asset paths from the backend are page-relative; the loader wants them
/// without a leading slash.
fn normalize_asset_path(path: &str) -> String {
    path.trim().trim_start_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_replaces_session_and_clears_cache() {
        let mut viewer: ModelViewer<&str> = ModelViewer::new();
        viewer.set_wireframe(true);

        let first = viewer.display("models/a.glb");
        let id = viewer.assign_mesh_id().unwrap();
        let mut surface = SurfaceState::new("red", false);
        viewer.apply_mode(id, &mut surface, &"wire");
        assert_eq!(viewer.material_cache().len(), 1);

        let second = viewer.display("/models/b.glb");
        assert_ne!(first.id, second.id);
        assert_eq!(second.asset_path, "models/b.glb");
        assert!(viewer.material_cache().is_empty());
        assert_eq!(viewer.assign_mesh_id(), Some(MeshId(0)));
    }

    #[test]
    fn test_display_turns_wireframe_on() {
        let mut viewer: ModelViewer<&str> = ModelViewer::new();
        assert_eq!(viewer.mode(), RenderMode::Normal);

        viewer.display("models/a.glb");
        assert_eq!(viewer.mode(), RenderMode::Wireframe);

        viewer.set_wireframe(false);
        viewer.display("models/b.glb");
        assert!(viewer.mode().is_wireframe());
    }

    #[test]
    fn test_stale_load_result_is_ignored() {
        let mut viewer: ModelViewer<&str> = ModelViewer::new();
        let first = viewer.display("models/a.glb");
        let second = viewer.display("models/b.glb");

        assert!(!viewer.on_load_finished(first.id, Ok(())));
        assert_eq!(viewer.session().unwrap().phase, LoadPhase::Loading);

        assert!(viewer.on_load_finished(second.id, Err("404".into())));
        assert_eq!(viewer.session().unwrap().phase, LoadPhase::Failed);
        assert!(viewer.is_running());
    }

    #[test]
    fn test_mesh_ids_need_a_live_session() {
        let mut viewer: ModelViewer<&str> = ModelViewer::new();
        assert_eq!(viewer.assign_mesh_id(), None);
        viewer.display("models/a.glb");
        viewer.teardown();
        assert!(!viewer.is_running());
        assert_eq!(viewer.assign_mesh_id(), None);
    }

    #[test]
    fn test_new_mesh_reflects_toggle_before_first_frame() {
        let mut viewer: ModelViewer<&str> = ModelViewer::new();
        viewer.set_wireframe(true);
        viewer.display("models/a.glb");

        let mut plain = SurfaceState::new("red", false);
        let mut textured = SurfaceState::new("brick", true);
        let a = viewer.assign_mesh_id().unwrap();
        let b = viewer.assign_mesh_id().unwrap();
        viewer.apply_mode(a, &mut plain, &"wire");
        viewer.apply_mode(b, &mut textured, &"wire");

        assert_eq!(plain.material, "wire");
        assert!(plain.wireframe);
        assert_eq!(textured.material, "brick");
        assert!(textured.wireframe);
    }

    #[test]
    fn test_set_wireframe_reports_changes_only() {
        let mut viewer: ModelViewer<&str> = ModelViewer::new();
        assert!(!viewer.set_wireframe(false));
        assert!(viewer.set_wireframe(true));
        assert!(!viewer.set_wireframe(true));
        assert_eq!(viewer.mode(), RenderMode::Wireframe);
    }

    #[test]
    fn test_show_image_hold_reverts_on_release() {
        let mut viewer: ModelViewer<&str> = ModelViewer::new();
        viewer.set_source_image("/img/a.png");

        viewer.sync_hold(true);
        assert_eq!(viewer.display_target(), DisplayTarget::SourceImage);
        // Pointer released somewhere outside the button
        viewer.sync_hold(false);
        assert_eq!(viewer.display_target(), DisplayTarget::Render);
    }

    #[test]
    fn test_clear_stage_drops_image_and_session() {
        let mut viewer: ModelViewer<&str> = ModelViewer::new();
        viewer.set_source_image("/img/a.png");
        viewer.display("models/a.glb");

        assert!(viewer.clear_stage().is_some());
        assert_eq!(viewer.source_image(), None);
        assert!(!viewer.is_running());
    }
}
