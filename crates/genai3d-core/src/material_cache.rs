//! Wireframe material substitution
//!
//! Untextured meshes get their material swapped for a flat wireframe one and
//! the original is remembered by mesh id for the rest of the viewer session;
//! textured meshes keep their material and only switch the wireframe flag.
//! Turning the mode off puts back exactly what was captured.
//!
//! The renderer draws wireframe as a separate line-list mesh built with
//! [`triangle_edges`], so it needs no line polygon mode from the GPU.
//!
//! Generic over the material handle so the browser can use asset handles and
//! tests can use plain values.

use std::collections::{HashMap, HashSet};

/// Stable per-session identity of a mesh in the live scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    #[default]
    Normal,
    Wireframe,
}

impl RenderMode {
    pub fn from_toggle(enabled: bool) -> Self {
        if enabled {
            RenderMode::Wireframe
        } else {
            RenderMode::Normal
        }
    }

    pub fn is_wireframe(self) -> bool {
        self == RenderMode::Wireframe
    }
}

/// What the renderer currently shows for one mesh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceState<M> {
    pub material: M,
    /// Active material carries a base color texture
    pub textured: bool,
    pub wireframe: bool,
}

impl<M> SurfaceState<M> {
    pub fn new(material: M, textured: bool) -> Self {
        Self {
            material,
            textured,
            wireframe: false,
        }
    }
}

#[derive(Debug, Clone)]
struct Original<M> {
    material: M,
    textured: bool,
}

#[derive(Debug, Clone)]
pub struct MaterialCache<M> {
    originals: HashMap<MeshId, Original<M>>,
}

impl<M> Default for MaterialCache<M> {
    fn default() -> Self {
        Self {
            originals: HashMap::new(),
        }
    }
}

impl<M: Clone> MaterialCache<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bring one mesh in line with `mode`. Applying the same mode twice
    /// leaves the surface unchanged. An untextured material is captured at
    /// most once per session.
    pub fn apply(
        &mut self,
        id: MeshId,
        surface: &mut SurfaceState<M>,
        mode: RenderMode,
        wireframe_material: &M,
    ) {
        match mode {
            RenderMode::Wireframe => {
                if !self.originals.contains_key(&id) && !surface.textured {
                    self.originals.insert(
                        id,
                        Original {
                            material: surface.material.clone(),
                            textured: surface.textured,
                        },
                    );
                }
                if self.originals.contains_key(&id) {
                    surface.material = wireframe_material.clone();
                    surface.textured = false;
                }
                surface.wireframe = true;
            }
            RenderMode::Normal => {
                if let Some(original) = self.originals.get(&id) {
                    surface.material = original.material.clone();
                    surface.textured = original.textured;
                }
                surface.wireframe = false;
            }
        }
    }

    pub fn is_captured(&self, id: MeshId) -> bool {
        self.originals.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.originals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.originals.is_empty()
    }

    /// Forget every capture (session teardown)
    pub fn clear(&mut self) {
        self.originals.clear();
    }
}

/// Unique edges of a triangle list as line-list indices. Each shared edge
/// appears once; a trailing partial triangle is ignored.
pub fn triangle_edges(indices: &[u32]) -> Vec<u32> {
    let mut seen = HashSet::new();
    let mut lines = Vec::new();
    for triangle in indices.chunks_exact(3) {
        for (a, b) in [
            (triangle[0], triangle[1]),
            (triangle[1], triangle[2]),
            (triangle[2], triangle[0]),
        ] {
            if a != b && seen.insert((a.min(b), a.max(b))) {
                lines.push(a);
                lines.push(b);
            }
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIRE: &str = "wire";

    fn scene() -> Vec<(MeshId, SurfaceState<&'static str>)> {
        vec![
            (MeshId(0), SurfaceState::new("red", false)),
            (MeshId(1), SurfaceState::new("brick", true)),
            (MeshId(2), SurfaceState::new("blue", false)),
        ]
    }

    fn apply(cache: &mut MaterialCache<&'static str>, scene: &mut [(MeshId, SurfaceState<&'static str>)], mode: RenderMode) {
        for (id, surface) in scene.iter_mut() {
            cache.apply(*id, surface, mode, &WIRE);
        }
    }

    #[test]
    fn test_enable_substitutes_only_untextured() {
        let mut cache = MaterialCache::new();
        let mut scene = scene();
        apply(&mut cache, &mut scene, RenderMode::Wireframe);

        assert_eq!(scene[0].1.material, WIRE);
        assert_eq!(scene[1].1.material, "brick");
        assert!(scene[1].1.wireframe);
        assert_eq!(scene[2].1.material, WIRE);
        assert_eq!(cache.len(), 2);
        assert!(!cache.is_captured(MeshId(1)));
    }

    #[test]
    fn test_enable_twice_equals_once() {
        let mut once_cache = MaterialCache::new();
        let mut once = scene();
        apply(&mut once_cache, &mut once, RenderMode::Wireframe);

        let mut twice_cache = MaterialCache::new();
        let mut twice = scene();
        apply(&mut twice_cache, &mut twice, RenderMode::Wireframe);
        apply(&mut twice_cache, &mut twice, RenderMode::Wireframe);

        assert_eq!(once, twice);
        assert_eq!(once_cache.len(), twice_cache.len());

        // The second pass must not have captured the substitute
        apply(&mut twice_cache, &mut twice, RenderMode::Normal);
        assert_eq!(twice, scene());
    }

    #[test]
    fn test_disable_restores_exact_originals() {
        let mut cache = MaterialCache::new();
        let mut scene_state = scene();
        apply(&mut cache, &mut scene_state, RenderMode::Wireframe);
        apply(&mut cache, &mut scene_state, RenderMode::Normal);

        assert_eq!(scene_state, scene());
        // Captures outlive the toggle; only teardown forgets them
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_original_is_captured_once_per_session() {
        let mut cache = MaterialCache::new();
        let mut surface = SurfaceState::new("red", false);

        cache.apply(MeshId(7), &mut surface, RenderMode::Wireframe, &WIRE);
        cache.apply(MeshId(7), &mut surface, RenderMode::Normal, &WIRE);
        assert_eq!(surface.material, "red");

        // Whatever the mesh shows on the next enable, the first capture wins
        surface.material = "green";
        cache.apply(MeshId(7), &mut surface, RenderMode::Wireframe, &WIRE);
        assert_eq!(surface.material, WIRE);
        cache.apply(MeshId(7), &mut surface, RenderMode::Normal, &WIRE);
        assert_eq!(surface.material, "red");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_triangle_edges_share_diagonal_once() {
        // Quad split along 0-2
        let lines = triangle_edges(&[0, 1, 2, 0, 2, 3]);
        assert_eq!(lines, vec![0, 1, 1, 2, 2, 0, 2, 3, 3, 0]);
        assert!(triangle_edges(&[0, 1]).is_empty());
    }

    #[test]
    fn test_disable_without_capture_is_noop() {
        let mut cache = MaterialCache::new();
        let mut scene_state = scene();
        apply(&mut cache, &mut scene_state, RenderMode::Normal);
        apply(&mut cache, &mut scene_state, RenderMode::Normal);
        assert_eq!(scene_state, scene());
    }

    #[test]
    fn test_toggle_maps_to_mode() {
        assert!(RenderMode::from_toggle(true).is_wireframe());
        assert_eq!(RenderMode::from_toggle(false), RenderMode::Normal);
    }
}
