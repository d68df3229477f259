use std::sync::Arc;

use glam::{Mat4, Vec4};
use log::debug;
use parking_lot::RwLock;

use crate::backdrop::{release_resources, BackdropInstance, LightRig};
use crate::camera::{CameraFramer, CameraState};
use crate::config::BackdropKind;
use crate::error::BackdropFallback;
use crate::geometry::Bounds;
use crate::material::TextureSlot;
use crate::mesh::{MeshData, MeshHierarchy};
use crate::resolver::{AssetState, LoadedAsset};
use crate::resources::{ResourceId, ResourceLedger};

/// Outcome of handing a finished load to the stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachResult {
    Attached,
    /// A newer load of the same slot was started; the result was dropped.
    Superseded,
    /// The session was torn down; the result was dropped.
    Disposed,
}

/// One mesh to draw this frame.
#[derive(Debug, Clone)]
pub struct DrawItem {
    pub mesh_id: Option<ResourceId>,
    pub mesh: Arc<MeshData>,
    pub model: Mat4,
    pub color: Vec4,
    pub texture: Option<TextureSlot>,
}

/// Everything a presenter needs for one frame.
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    pub draws: Vec<DrawItem>,
    pub camera: CameraState,
    pub lights: LightRig,
    pub clear_color: u32,
}

#[derive(Debug, Default)]
struct StageState {
    asset: Option<LoadedAsset>,
    backdrop: Option<BackdropInstance>,
    camera: CameraState,
    model_spin: f32,
    backdrop_spin: f32,
    ledger: ResourceLedger,
    disposed: bool,
    asset_generation: u64,
    backdrop_generation: u64,
}

impl StageState {
    fn combined_bounds(&self) -> Option<Bounds> {
        let asset = self.asset.as_ref().map(|asset| asset.bounds);
        let backdrop = self.backdrop.as_ref().and_then(|b| b.framing_extent);
        match (asset, backdrop) {
            (Some(a), Some(b)) => Some(a.union(b)),
            (a, b) => a.or(b),
        }
    }

    fn reframe(&mut self, framer: &CameraFramer) {
        let Some(bounds) = self.combined_bounds() else {
            return;
        };
        let aspect = self.camera.aspect;
        self.camera = framer.frame(&bounds, self.backdrop.is_some(), aspect);
        debug!(
            "camera framed at ({:.2}, {:.2}, {:.2})",
            self.camera.position.x, self.camera.position.y, self.camera.position.z
        );
    }
}

/// Scene state shared between the render loop and load completions.
///
/// Handles are cheap to clone; every clone sees the same scene.
#[derive(Debug)]
pub struct Stage {
    state: Arc<RwLock<StageState>>,
    framer: CameraFramer,
}

impl Clone for Stage {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            framer: self.framer,
        }
    }
}

impl Stage {
    pub fn new(framer: CameraFramer) -> Self {
        let camera = CameraState {
            field_of_view: framer.field_of_view,
            ..CameraState::default()
        };
        Self {
            state: Arc::new(RwLock::new(StageState {
                camera,
                ..StageState::default()
            })),
            framer,
        }
    }

    /// Starts a new asset load and returns its ticket. Older tickets stop
    /// being accepted.
    pub fn begin_asset_load(&self) -> u64 {
        let mut state = self.state.write();
        state.asset_generation += 1;
        state.asset_generation
    }

    pub fn begin_backdrop_load(&self) -> u64 {
        let mut state = self.state.write();
        state.backdrop_generation += 1;
        state.backdrop_generation
    }

    /// Replaces the asset if `ticket` is still current and the stage is live,
    /// releasing the previous asset's resources and reframing the camera.
    pub fn attach_asset(&self, ticket: u64, mut asset: LoadedAsset) -> AttachResult {
        let mut state = self.state.write();
        if state.disposed {
            return AttachResult::Disposed;
        }
        if ticket != state.asset_generation {
            return AttachResult::Superseded;
        }
        let StageState { asset: slot, ledger, .. } = &mut *state;
        if let Some(previous) = slot.as_mut() {
            previous.hierarchy.release_resources(ledger);
        }
        asset.hierarchy.allocate_resources(ledger);
        asset.refresh_bounds();
        *slot = Some(asset);
        state.reframe(&self.framer);
        AttachResult::Attached
    }

    /// Replaces the backdrop under the same rules as [`Stage::attach_asset`].
    pub fn attach_backdrop(&self, ticket: u64, mut backdrop: BackdropInstance) -> AttachResult {
        let mut state = self.state.write();
        if state.disposed {
            return AttachResult::Disposed;
        }
        if ticket != state.backdrop_generation {
            return AttachResult::Superseded;
        }
        let StageState {
            backdrop: slot,
            ledger,
            ..
        } = &mut *state;
        if let Some(previous) = slot.as_mut() {
            release_resources(previous, ledger);
        }
        backdrop.group.allocate_resources(ledger);
        *slot = Some(backdrop);
        state.backdrop_spin = 0.0;
        state.reframe(&self.framer);
        AttachResult::Attached
    }

    /// Mutates the asset hierarchy in place. Geometry, bounds and camera are
    /// left as they are.
    pub fn with_asset_mut<R>(&self, f: impl FnOnce(&mut MeshHierarchy) -> R) -> Option<R> {
        let mut state = self.state.write();
        if state.disposed {
            return None;
        }
        state.asset.as_mut().map(|asset| f(&mut asset.hierarchy))
    }

    /// Per-frame animation step.
    pub fn advance(&self, rotate_model: bool, rotation_step: f32) {
        let mut state = self.state.write();
        if state.disposed {
            return;
        }
        if rotate_model && state.asset.is_some() {
            state.model_spin = (state.model_spin + rotation_step) % std::f32::consts::TAU;
        }
        if let Some(step) = state.backdrop.as_ref().map(|b| b.spin_step) {
            state.backdrop_spin = (state.backdrop_spin + step) % std::f32::consts::TAU;
        }
    }

    /// Undoes accumulated rotation and reframes the current scene.
    pub fn reset_view(&self) {
        let mut state = self.state.write();
        state.model_spin = 0.0;
        state.backdrop_spin = 0.0;
        state.reframe(&self.framer);
    }

    /// Aspect-only camera update.
    pub fn resize(&self, width: u32, height: u32) {
        self.state.write().camera.set_viewport(width, height);
    }

    pub fn camera(&self) -> CameraState {
        self.state.read().camera
    }

    pub fn model_spin(&self) -> f32 {
        self.state.read().model_spin
    }

    pub fn combined_bounds(&self) -> Option<Bounds> {
        self.state.read().combined_bounds()
    }

    pub fn asset_state(&self) -> Option<AssetState> {
        self.state.read().asset.as_ref().map(|asset| asset.state)
    }

    pub fn asset_bounds(&self) -> Option<Bounds> {
        self.state.read().asset.as_ref().map(|asset| asset.bounds)
    }

    pub fn asset_path(&self) -> Option<String> {
        self.state.read().asset.as_ref().map(|asset| asset.path.clone())
    }

    pub fn backdrop_kind(&self) -> Option<BackdropKind> {
        self.state.read().backdrop.as_ref().map(BackdropInstance::kind)
    }

    /// Why the attached backdrop is a grid stand-in, if it is one.
    pub fn backdrop_fallback(&self) -> Option<BackdropFallback> {
        self.state
            .read()
            .backdrop
            .as_ref()
            .and_then(|b| b.fallback.clone())
    }

    /// Colors of the asset's sub-meshes in traversal order.
    pub fn asset_colors(&self) -> Vec<u32> {
        self.state
            .read()
            .asset
            .as_ref()
            .map(|asset| {
                asset
                    .hierarchy
                    .renderables()
                    .into_iter()
                    .map(|(_, node)| node.material.color)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn live_resources(&self) -> usize {
        self.state.read().ledger.live_count()
    }

    pub fn released_resources(&self) -> u64 {
        self.state.read().ledger.released_total()
    }

    /// Resource ids released since the last call, for the renderer to free.
    pub fn drain_released(&self) -> Vec<ResourceId> {
        self.state.write().ledger.drain_released()
    }

    pub fn is_disposed(&self) -> bool {
        self.state.read().disposed
    }

    /// Marks the stage torn down and releases everything it holds. Returns
    /// `false` when it was already disposed.
    pub fn dispose(&self) -> bool {
        let mut state = self.state.write();
        if state.disposed {
            return false;
        }
        state.disposed = true;
        let StageState {
            asset,
            backdrop,
            ledger,
            ..
        } = &mut *state;
        if let Some(mut asset) = asset.take() {
            asset.hierarchy.release_resources(ledger);
        }
        if let Some(mut backdrop) = backdrop.take() {
            release_resources(&mut backdrop, ledger);
        }
        true
    }

    /// Draw list and camera for the current frame.
    pub fn snapshot(&self) -> FrameSnapshot {
        let state = self.state.read();
        let mut draws = Vec::new();
        let mut collect = |hierarchy: &MeshHierarchy, spin: f32| {
            let base = Mat4::from_rotation_y(spin) * hierarchy.root.matrix();
            hierarchy.visit_renderables(base, |model, node| {
                if node.mesh.is_empty() {
                    return;
                }
                draws.push(DrawItem {
                    mesh_id: node.resource,
                    mesh: Arc::clone(&node.mesh),
                    model,
                    color: node.material.rgba(),
                    texture: node.material.texture.clone(),
                });
            });
        };
        if let Some(backdrop) = &state.backdrop {
            collect(&backdrop.group, state.backdrop_spin);
        }
        if let Some(asset) = &state.asset {
            collect(&asset.hierarchy, state.model_spin);
        }
        let (lights, clear_color) = state
            .backdrop
            .as_ref()
            .map_or((LightRig::neutral(), 0x000000), |b| (b.lights, b.clear_color));
        FrameSnapshot {
            draws,
            camera: state.camera,
            lights,
            clear_color,
        }
    }
}
