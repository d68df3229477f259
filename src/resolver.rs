use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use glam::Vec2;
use log::{debug, info, warn};
use tokio::sync::mpsc::UnboundedSender;

use crate::bundle::SceneBundle;
use crate::config::ViewerTuning;
use crate::error::{FetchError, LoadFailure, LoadWarning};
use crate::geometry::Bounds;
use crate::material::{Material, TextureSlot};
use crate::mesh::{MeshData, MeshHierarchy, MeshNode, RenderableMesh};
use crate::mtl::{parse_mtl, MaterialLibrary};
use crate::obj::parse_obj;
use crate::scene::{BundleScene, Light};
use crate::source::{sibling_path, AssetSource};
use crate::texture::{decode_image, TextureImage};

/// Lifecycle of the viewed asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetState {
    Pending,
    Loaded,
    /// The real asset could not be loaded; a placeholder stands in.
    Failed,
}

/// Mesh hierarchy of the viewed asset plus what is known about it.
#[derive(Debug, Clone)]
pub struct LoadedAsset {
    pub path: String,
    pub hierarchy: MeshHierarchy,
    /// Bounds after the current root transform.
    pub bounds: Bounds,
    pub state: AssetState,
    pub materials: Option<MaterialLibrary>,
}

impl LoadedAsset {
    pub fn is_placeholder(&self) -> bool {
        self.state == AssetState::Failed
    }

    pub fn refresh_bounds(&mut self) {
        if let Some(bounds) = self.hierarchy.bounds() {
            self.bounds = bounds;
        }
    }
}

/// Result of a primary load. Failures are data; nothing is thrown past the
/// viewer.
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    Success(LoadedAsset),
    /// Usable asset with something missing (material or texture).
    Degraded(LoadedAsset, Vec<LoadWarning>),
    Failed(LoadFailure),
}

impl LoadOutcome {
    pub fn asset(&self) -> Option<&LoadedAsset> {
        match self {
            Self::Success(asset) | Self::Degraded(asset, _) => Some(asset),
            Self::Failed(_) => None,
        }
    }
}

/// Progress events sent on the optional side channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadProgress {
    Started { path: String },
    Fetched { path: String, bytes: usize },
    Finished { path: String, ok: bool },
}

/// Backdrop scene loaded from a bundle.
#[derive(Debug, Clone)]
pub struct LoadedScene {
    pub path: String,
    pub hierarchy: MeshHierarchy,
    pub lights: Vec<Light>,
}

/// Fetches and decodes assets from an [`AssetSource`].
pub struct AssetResolver<S> {
    source: Arc<S>,
    tuning: Arc<ViewerTuning>,
    progress: Option<UnboundedSender<LoadProgress>>,
}

impl<S> Clone for AssetResolver<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            tuning: Arc::clone(&self.tuning),
            progress: self.progress.clone(),
        }
    }
}

impl<S: AssetSource> AssetResolver<S> {
    pub fn new(source: Arc<S>, tuning: Arc<ViewerTuning>) -> Self {
        Self {
            source,
            tuning,
            progress: None,
        }
    }

    pub fn with_progress(mut self, sender: UnboundedSender<LoadProgress>) -> Self {
        self.progress = Some(sender);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn report(&self, event: LoadProgress) {
        if let Some(sender) = &self.progress {
            // A dropped receiver only means nobody is listening.
            let _ = sender.send(event);
        }
    }

    async fn fetch(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        self.report(LoadProgress::Started {
            path: path.to_string(),
        });
        let result = self.source.fetch(path).await;
        if let Ok(bytes) = &result {
            self.report(LoadProgress::Fetched {
                path: path.to_string(),
                bytes: bytes.len(),
            });
        }
        result
    }

    /// Loads the viewed asset, its material file first when one is hinted.
    ///
    /// A material failure degrades to default materials; a mesh failure
    /// yields [`LoadOutcome::Failed`]. The whole load is bounded by the
    /// primary timeout.
    pub async fn load_primary(&self, path: &str, material_hint: Option<&str>) -> LoadOutcome {
        let path = path.trim();
        if path.is_empty() {
            return LoadOutcome::Failed(LoadFailure::MissingPath);
        }
        let outcome = match tokio::time::timeout(
            self.tuning.primary_timeout,
            self.load_primary_inner(path, material_hint),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => LoadOutcome::Failed(LoadFailure::TimedOut {
                path: path.to_string(),
            }),
        };
        match &outcome {
            LoadOutcome::Success(asset) => info!(
                "loaded {path}: {} sub-mesh(es)",
                asset.hierarchy.renderable_count()
            ),
            LoadOutcome::Degraded(_, warnings) => {
                for warning in warnings {
                    warn!("{warning}");
                }
            }
            LoadOutcome::Failed(reason) => warn!("{reason}"),
        }
        self.report(LoadProgress::Finished {
            path: path.to_string(),
            ok: outcome.asset().is_some(),
        });
        outcome
    }

    async fn load_primary_inner(&self, path: &str, material_hint: Option<&str>) -> LoadOutcome {
        let mut warnings = Vec::new();

        let mut materials = match material_hint.map(str::trim).filter(|h| !h.is_empty()) {
            Some(hint) => match self.load_materials(hint, &mut warnings).await {
                Ok(library) => Some(library),
                Err(reason) => {
                    warnings.push(LoadWarning::MaterialUnavailable {
                        path: hint.to_string(),
                        reason,
                    });
                    None
                }
            },
            None => None,
        };

        let bytes = match self.fetch(path).await {
            Ok(bytes) => bytes,
            Err(err) => return LoadOutcome::Failed(LoadFailure::from_fetch(path, err)),
        };
        let model = match std::str::from_utf8(&bytes)
            .context("mesh file is not UTF-8 text")
            .and_then(parse_obj)
        {
            Ok(model) => model,
            Err(err) => {
                return LoadOutcome::Failed(LoadFailure::Malformed {
                    path: path.to_string(),
                    reason: format!("{err:#}"),
                })
            }
        };

        if materials.is_none() && material_hint.is_none() {
            if let Some(lib) = model.material_libs.first() {
                let lib_path = sibling_path(path, lib);
                match self.load_materials(&lib_path, &mut warnings).await {
                    Ok(library) => materials = Some(library),
                    Err(reason) => warnings.push(LoadWarning::MaterialUnavailable {
                        path: lib_path,
                        reason,
                    }),
                }
            }
        }

        let name = path.rsplit('/').next().unwrap_or(path);
        let hierarchy = model.into_hierarchy(name);
        let Some(bounds) = hierarchy.local_bounds().filter(|_| !hierarchy.is_empty()) else {
            return LoadOutcome::Failed(LoadFailure::EmptyGeometry {
                path: path.to_string(),
            });
        };
        let asset = LoadedAsset {
            path: path.to_string(),
            hierarchy,
            bounds,
            state: AssetState::Loaded,
            materials,
        };
        if warnings.is_empty() {
            LoadOutcome::Success(asset)
        } else {
            LoadOutcome::Degraded(asset, warnings)
        }
    }

    /// Fetches and parses a material file, then the diffuse maps it names.
    /// Map failures become warnings; the material keeps its solid color.
    async fn load_materials(
        &self,
        path: &str,
        warnings: &mut Vec<LoadWarning>,
    ) -> Result<MaterialLibrary, String> {
        let bytes = self.fetch(path).await.map_err(|err| err.to_string())?;
        let text = std::str::from_utf8(&bytes).map_err(|err| err.to_string())?;
        let mut library = parse_mtl(text).map_err(|err| format!("{err:#}"))?;
        debug!("{path}: {} material(s)", library.len());

        for material in library.iter_mut() {
            let Some(map) = material.texture_path.clone() else {
                continue;
            };
            let map_path = sibling_path(path, &map);
            match self.fetch_image(&map_path).await {
                Ok(image) => {
                    material.texture = Some(TextureSlot::new(image, Vec2::ONE));
                }
                Err(err) => warnings.push(LoadWarning::TextureUnavailable {
                    path: map_path,
                    reason: format!("{err:#}"),
                }),
            }
        }
        Ok(library)
    }

    /// Tries `candidates` in order, each bounded by `per_attempt`. The first
    /// candidate that loads wins; later candidates are never started.
    pub async fn load_auxiliary(
        &self,
        candidates: &[String],
        per_attempt: Duration,
    ) -> Option<LoadedScene> {
        for candidate in candidates {
            let scene = match tokio::time::timeout(per_attempt, self.load_scene(candidate)).await {
                Ok(Ok(scene)) => Some(scene),
                Ok(Err(err)) => {
                    warn!("backdrop candidate {candidate} failed: {err:#}");
                    None
                }
                Err(_) => {
                    warn!("backdrop candidate {candidate} timed out after {per_attempt:?}");
                    None
                }
            };
            self.report(LoadProgress::Finished {
                path: candidate.clone(),
                ok: scene.is_some(),
            });
            if scene.is_some() {
                info!("backdrop scene {candidate} loaded");
                return scene;
            }
        }
        None
    }

    /// Loads one scene bundle and builds its renderable group.
    async fn load_scene(&self, path: &str) -> Result<LoadedScene> {
        let bytes = self.fetch(path).await?;
        let bundle = SceneBundle::from_bytes(path, bytes)?;
        let scene = BundleScene::from_xml(bundle.scene_xml())?;
        let name = path.rsplit('/').next().unwrap_or(path);
        let hierarchy = scene.into_hierarchy(name, &bundle)?;
        Ok(LoadedScene {
            path: path.to_string(),
            hierarchy,
            lights: scene.lights,
        })
    }

    /// Fetches and decodes an image, bounded by the candidate timeout.
    pub async fn load_image(&self, path: &str) -> Result<TextureImage> {
        let result = self.fetch_image(path).await;
        self.report(LoadProgress::Finished {
            path: path.to_string(),
            ok: result.is_ok(),
        });
        result
    }

    async fn fetch_image(&self, path: &str) -> Result<TextureImage> {
        let timeout = self.tuning.candidate_timeout;
        let bytes = tokio::time::timeout(timeout, self.fetch(path))
            .await
            .map_err(|_| anyhow!("fetching {path} timed out after {timeout:?}"))??;
        decode_image(&bytes).with_context(|| format!("decoding {path}"))
    }
}

/// Box substituted when the viewed asset cannot be loaded.
pub fn placeholder_asset(path: &str, tuning: &ViewerTuning) -> LoadedAsset {
    let color = tuning.palette.first().copied().unwrap_or(0xFF0000);
    let node = RenderableMesh::new("placeholder", MeshData::cuboid(tuning.placeholder_size))
        .with_material(Material::generated(color));
    let hierarchy = MeshHierarchy::with_children("placeholder", vec![MeshNode::Renderable(node)]);
    let half = tuning.placeholder_size * 0.5;
    LoadedAsset {
        path: path.to_string(),
        bounds: hierarchy.local_bounds().unwrap_or(Bounds::new(-half, half)),
        hierarchy,
        state: AssetState::Failed,
        materials: None,
    }
}
