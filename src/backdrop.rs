use std::sync::Arc;

use glam::{Quat, Vec2, Vec3};
use log::{info, warn};

use crate::config::{BackdropKind, BackdropParams, ViewerTuning};
use crate::error::BackdropFallback;
use crate::geometry::Bounds;
use crate::material::{hex_to_rgb, Material, TextureSlot};
use crate::mesh::{MeshData, MeshHierarchy, MeshNode, RenderableMesh, Transform};
use crate::resolver::{AssetResolver, LoadedScene};
use crate::resources::ResourceLedger;
use crate::source::AssetSource;
use crate::texture::{checkerboard, linear_gradient, radial_gradient};

/// Ambient term plus one directional key light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightRig {
    pub ambient: Vec3,
    /// Position the key light shines from, towards the origin.
    pub key_position: Vec3,
    pub key_color: Vec3,
    pub key_intensity: f32,
}

impl LightRig {
    pub fn new(ambient: u32, ambient_intensity: f32, key: u32, key_intensity: f32, key_position: Vec3) -> Self {
        Self {
            ambient: hex_to_rgb(ambient) * ambient_intensity,
            key_position,
            key_color: hex_to_rgb(key),
            key_intensity,
        }
    }

    pub fn studio() -> Self {
        Self::new(0xFFFFFF, 0.8, 0xFFFFFF, 1.2, Vec3::new(10.0, 20.0, 15.0))
    }

    pub fn showroom() -> Self {
        Self::new(0xFFFFFF, 0.5, 0xFFFFFF, 1.0, Vec3::new(10.0, 30.0, 10.0))
    }

    pub fn street() -> Self {
        Self::new(0x444444, 0.6, 0xFFAA00, 0.8, Vec3::new(20.0, 30.0, 10.0))
    }

    pub fn neutral() -> Self {
        Self::new(0xFFFFFF, 1.2, 0xFFFFFF, 2.0, Vec3::new(10.0, 20.0, 15.0))
    }

    pub fn key_direction(&self) -> Vec3 {
        (-self.key_position).normalize_or_zero()
    }
}

impl Default for LightRig {
    fn default() -> Self {
        Self::neutral()
    }
}

/// What was actually built, with the per-variant details.
#[derive(Debug, Clone, PartialEq)]
pub enum BackdropVariant {
    Grid,
    Gradient,
    Room {
        /// Surfaces that received their image texture.
        textured_surfaces: usize,
    },
    LoadedScene {
        path: String,
    },
    Custom {
        path: String,
    },
}

impl BackdropVariant {
    pub fn kind(&self) -> BackdropKind {
        match self {
            Self::Grid => BackdropKind::Grid,
            Self::Gradient => BackdropKind::Gradient,
            Self::Room { .. } => BackdropKind::Room,
            Self::LoadedScene { .. } => BackdropKind::LoadedScene,
            Self::Custom { .. } => BackdropKind::Custom,
        }
    }
}

/// Environment group composited behind the viewed asset.
#[derive(Debug, Clone)]
pub struct BackdropInstance {
    /// Variant that was asked for; differs from `variant.kind()` after a
    /// fallback.
    pub requested: BackdropKind,
    pub variant: BackdropVariant,
    pub group: MeshHierarchy,
    pub lights: LightRig,
    pub clear_color: u32,
    /// Radians added to the group's yaw every frame.
    pub spin_step: f32,
    /// Extent the camera must keep in view. Procedural backdrops surround
    /// the scene and leave framing to the asset.
    pub framing_extent: Option<Bounds>,
    pub fallback: Option<BackdropFallback>,
}

impl BackdropInstance {
    pub fn kind(&self) -> BackdropKind {
        self.variant.kind()
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

/// Releases every GPU resource the instance holds. Safe to call twice.
pub fn release_resources(instance: &mut BackdropInstance, ledger: &mut ResourceLedger) -> usize {
    instance.group.release_resources(ledger)
}

/// Builds backdrop instances.
pub struct BackdropComposer<S> {
    resolver: AssetResolver<S>,
    tuning: Arc<ViewerTuning>,
    extent: f32,
}

impl<S: AssetSource> BackdropComposer<S> {
    pub fn new(resolver: AssetResolver<S>, tuning: Arc<ViewerTuning>, target_size: f32) -> Self {
        let extent = (target_size * tuning.backdrop_scale).max(1.0);
        Self {
            resolver,
            tuning,
            extent,
        }
    }

    /// Side length of the procedural floor.
    pub fn extent(&self) -> f32 {
        self.extent
    }

    /// Builds the requested variant. Variants that fetch content fall back
    /// to the grid when the content is unavailable, so this never fails.
    pub async fn build(&self, kind: BackdropKind, params: &BackdropParams) -> BackdropInstance {
        let instance = match kind {
            BackdropKind::Grid => self.grid(),
            BackdropKind::Gradient => self.gradient(),
            BackdropKind::Room => self.room().await,
            BackdropKind::LoadedScene => self.loaded_scene(&params.candidates).await,
            BackdropKind::Custom => match params.image_path.as_deref() {
                Some(path) if !path.trim().is_empty() => self.custom(path.trim()).await,
                _ => self.fallback(BackdropKind::Custom, BackdropFallback::MissingImagePath),
            },
        };
        info!(
            "backdrop {} built ({} surface(s))",
            instance.kind(),
            instance.group.renderable_count()
        );
        instance
    }

    fn instance(
        &self,
        variant: BackdropVariant,
        group: MeshHierarchy,
        lights: LightRig,
        clear_color: u32,
    ) -> BackdropInstance {
        BackdropInstance {
            requested: variant.kind(),
            variant,
            group,
            lights,
            clear_color,
            spin_step: 0.0,
            framing_extent: None,
            fallback: None,
        }
    }

    fn fallback(&self, requested: BackdropKind, reason: BackdropFallback) -> BackdropInstance {
        warn!("{requested} backdrop unavailable, using grid: {reason}");
        BackdropInstance {
            requested,
            fallback: Some(reason),
            ..self.grid()
        }
    }

    /// Checkerboard floor with a translucent panel behind the model.
    pub fn grid(&self) -> BackdropInstance {
        let extent = self.extent;
        let cells = 8;
        let texture = checkerboard(self.tuning.texture_size, cells, 0xF5F5F5, 0xDADADA, 0xB0B0B0);
        let floor = RenderableMesh::new("grid-floor", MeshData::ground_plane(extent, extent))
            .with_material(
                Material::solid("grid-floor", 0xFFFFFF, 0.9)
                    .with_texture(TextureSlot::new(texture, Vec2::splat(extent / 10.0 / cells as f32))),
            );
        let panel = RenderableMesh::new("grid-panel", MeshData::panel(extent, extent * 0.5))
            .with_material(Material::solid("grid-panel", 0xFFFFFF, 0.9).with_opacity(0.35))
            .with_transform(Transform::from_translation(Vec3::new(0.0, 0.0, -extent * 0.25)));
        let group = MeshHierarchy::with_children(
            "grid",
            vec![MeshNode::Renderable(floor), MeshNode::Renderable(panel)],
        );
        self.instance(BackdropVariant::Grid, group, LightRig::studio(), 0xEEEEEE)
    }

    /// Gradient dome around the scene with a soft radial floor. Spins slowly.
    pub fn gradient(&self) -> BackdropInstance {
        let size = self.tuning.texture_size;
        let dome = RenderableMesh::new("gradient-dome", MeshData::sphere(self.extent, 48, 24, true))
            .with_material(
                Material::solid("gradient-dome", 0xFFFFFF, 1.0)
                    .with_texture(TextureSlot::new(linear_gradient(size, 0x2A2A35, 0x0A0A0A), Vec2::ONE)),
            );
        let floor = RenderableMesh::new("gradient-floor", MeshData::ground_plane(self.extent, self.extent))
            .with_material(
                Material::solid("gradient-floor", 0xFFFFFF, 0.8)
                    .with_texture(TextureSlot::new(radial_gradient(size, 0x1A1A1A, 0x0A0A0A), Vec2::ONE)),
            );
        let group = MeshHierarchy::with_children(
            "gradient",
            vec![MeshNode::Renderable(dome), MeshNode::Renderable(floor)],
        );
        let mut instance = self.instance(BackdropVariant::Gradient, group, LightRig::neutral(), 0x0A0A0A);
        instance.spin_step = self.tuning.backdrop_spin_step;
        instance
    }

    /// Floor, back and side walls and a ceiling. Missing textures leave the
    /// surface with its solid color.
    pub async fn room(&self) -> BackdropInstance {
        let extent = self.extent;
        let height = extent * 0.5;
        let half = extent * 0.5;

        let floor_texture = self.texture_or_solid(&self.tuning.room_floor_texture, Vec2::splat(20.0)).await;
        let wall_texture = self.texture_or_solid(&self.tuning.room_wall_texture, Vec2::new(4.0, 2.0)).await;
        let textured_surfaces = usize::from(floor_texture.is_some()) + usize::from(wall_texture.is_some());

        let surface = |name: &str, color: u32, roughness: f32, texture: &Option<TextureSlot>| {
            let material = Material::solid(name, color, roughness);
            match texture {
                Some(texture) => material.with_texture(texture.clone()),
                None => material,
            }
        };
        let wall = |name: &str, yaw: f32, offset: Vec3| {
            RenderableMesh::new(name, MeshData::panel(extent, height))
                .with_material(surface(name, 0x9A9A9A, 0.7, &wall_texture))
                .with_transform(Transform {
                    translation: offset,
                    rotation: Quat::from_rotation_y(yaw),
                    scale: Vec3::ONE,
                })
        };

        let floor = RenderableMesh::new("room-floor", MeshData::ground_plane(extent, extent))
            .with_material(surface("room-floor", 0xBDB8B0, 0.8, &floor_texture));
        let ceiling = RenderableMesh::new("room-ceiling", MeshData::ground_plane(extent, extent))
            .with_material(Material::solid("room-ceiling", 0x222222, 0.9))
            .with_transform(Transform {
                translation: Vec3::new(0.0, height, 0.0),
                rotation: Quat::from_rotation_x(std::f32::consts::PI),
                scale: Vec3::ONE,
            });
        let children = vec![
            MeshNode::Renderable(floor),
            MeshNode::Renderable(wall("room-back", 0.0, Vec3::new(0.0, 0.0, -half))),
            MeshNode::Renderable(wall(
                "room-left",
                std::f32::consts::FRAC_PI_2,
                Vec3::new(-half, 0.0, 0.0),
            )),
            MeshNode::Renderable(wall(
                "room-right",
                -std::f32::consts::FRAC_PI_2,
                Vec3::new(half, 0.0, 0.0),
            )),
            MeshNode::Renderable(ceiling),
        ];
        let group = MeshHierarchy::with_children("room", children);
        self.instance(
            BackdropVariant::Room { textured_surfaces },
            group,
            LightRig::showroom(),
            0xDDDDDD,
        )
    }

    async fn texture_or_solid(&self, path: &str, repeat: Vec2) -> Option<TextureSlot> {
        match self.resolver.load_image(path).await {
            Ok(image) => Some(TextureSlot::new(image, repeat)),
            Err(err) => {
                warn!("room texture {path} unavailable, using solid color: {err:#}");
                None
            }
        }
    }

    /// First loadable scene bundle among `candidates`, or the grid.
    pub async fn loaded_scene(&self, candidates: &[String]) -> BackdropInstance {
        let scene = self
            .resolver
            .load_auxiliary(candidates, self.tuning.candidate_timeout)
            .await;
        match scene {
            Some(scene) => self.scene_instance(scene),
            None => self.fallback(
                BackdropKind::LoadedScene,
                BackdropFallback::BackdropUnavailable {
                    attempts: candidates.len(),
                },
            ),
        }
    }

    fn scene_instance(&self, scene: LoadedScene) -> BackdropInstance {
        let lights = scene
            .lights
            .first()
            .map(|light| LightRig {
                key_position: light.position,
                key_color: light.color,
                key_intensity: light.intensity,
                ..LightRig::street()
            })
            .unwrap_or_else(LightRig::street);
        let framing_extent = scene.hierarchy.bounds();
        let mut instance = self.instance(
            BackdropVariant::LoadedScene { path: scene.path },
            scene.hierarchy,
            lights,
            0x87CEEB,
        );
        instance.framing_extent = framing_extent;
        instance
    }

    /// Image panel behind the model, sized to the image's aspect ratio.
    pub async fn custom(&self, path: &str) -> BackdropInstance {
        let image = match self.resolver.load_image(path).await {
            Ok(image) => image,
            Err(err) => {
                return self.fallback(
                    BackdropKind::Custom,
                    BackdropFallback::ImageUnavailable {
                        path: path.to_string(),
                        reason: format!("{err:#}"),
                    },
                )
            }
        };
        let (width, height) = image.dimensions();
        let panel_height = self.extent * 0.5;
        let panel_width = panel_height * width as f32 / height.max(1) as f32;
        let panel = RenderableMesh::new("custom-panel", MeshData::panel(panel_width, panel_height))
            .with_material(
                Material::solid("custom-panel", 0xFFFFFF, 1.0)
                    .with_texture(TextureSlot::new(image, Vec2::ONE)),
            )
            .with_transform(Transform::from_translation(Vec3::new(0.0, 0.0, -self.extent * 0.25)));
        let group = MeshHierarchy::with_children("custom", vec![MeshNode::Renderable(panel)]);
        self.instance(
            BackdropVariant::Custom {
                path: path.to_string(),
            },
            group,
            LightRig::neutral(),
            0x000000,
        )
    }
}
