use std::fmt;
use std::time::Duration;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::ViewerError;

/// Backdrop variants the composer knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BackdropKind {
    #[default]
    Grid,
    Gradient,
    Room,
    LoadedScene,
    Custom,
}

impl BackdropKind {
    pub const ALL: [BackdropKind; 5] = [
        BackdropKind::Grid,
        BackdropKind::Gradient,
        BackdropKind::Room,
        BackdropKind::LoadedScene,
        BackdropKind::Custom,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name.trim().to_ascii_lowercase().as_str() {
            "grid" | "studio" => Self::Grid,
            "gradient" => Self::Gradient,
            "room" | "showroom" => Self::Room,
            "scene" | "loadedscene" | "loaded-scene" | "street" => Self::LoadedScene,
            "custom" | "image" => Self::Custom,
            _ => return None,
        };
        Some(kind)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Grid => "grid",
            Self::Gradient => "gradient",
            Self::Room => "room",
            Self::LoadedScene => "loadedScene",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for BackdropKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-session viewer configuration supplied by the host page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewerConfig {
    pub asset_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub material_hint: Option<String>,
    pub auto_rotate: bool,
    pub auto_scale: bool,
    pub target_size: f32,
    pub backdrop_type: BackdropKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_backdrop_path: Option<String>,
    /// Ordered scene-bundle locations tried for the `loadedScene` backdrop.
    pub backdrop_candidates: Vec<String>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            asset_path: String::new(),
            material_hint: None,
            auto_rotate: true,
            auto_scale: true,
            target_size: 15.0,
            backdrop_type: BackdropKind::Grid,
            custom_backdrop_path: None,
            backdrop_candidates: default_candidates(),
        }
    }
}

fn default_candidates() -> Vec<String> {
    [
        "assets/scenes/showroom.scene",
        "assets/scenes/studio.scene",
        "assets/scenes/street.scene",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl ViewerConfig {
    pub fn new(asset_path: impl Into<String>) -> Self {
        Self {
            asset_path: asset_path.into(),
            ..Self::default()
        }
    }

    /// Parses a JSON configuration document and validates it.
    pub fn from_json(json: &str) -> Result<Self, ViewerError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|err| ViewerError::InvalidConfig(format!("malformed JSON: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ViewerError> {
        if !self.target_size.is_finite() || self.target_size <= 0.0 {
            return Err(ViewerError::InvalidConfig(format!(
                "target size must be a positive number, got {}",
                self.target_size
            )));
        }
        if self.backdrop_type == BackdropKind::Custom
            && self
                .custom_backdrop_path
                .as_deref()
                .map_or(true, |path| path.trim().is_empty())
        {
            return Err(ViewerError::InvalidConfig(
                "custom backdrop requires customBackdropPath".into(),
            ));
        }
        Ok(())
    }

    /// Parameters for the configured backdrop.
    pub fn backdrop_params(&self) -> BackdropParams {
        BackdropParams {
            image_path: self.custom_backdrop_path.clone(),
            candidates: self.backdrop_candidates.clone(),
        }
    }
}

/// Optional inputs for the backdrop variants that fetch content.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BackdropParams {
    pub image_path: Option<String>,
    pub candidates: Vec<String>,
}

impl BackdropParams {
    pub fn image(path: impl Into<String>) -> Self {
        Self {
            image_path: Some(path.into()),
            candidates: Vec::new(),
        }
    }

    pub fn candidates<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            image_path: None,
            candidates: paths.into_iter().map(Into::into).collect(),
        }
    }
}

/// Read-only constants shared by the viewer components.
///
/// Injected at construction instead of living in globals so each component
/// can be exercised with its own values.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerTuning {
    /// Colors assigned round-robin to sub-meshes without authored materials.
    pub palette: Vec<u32>,
    /// Smallest extent used as a scale divisor.
    pub min_extent: f32,
    pub framing_multiplier: f32,
    pub backdrop_framing_multiplier: f32,
    /// Camera height above center, as a fraction of the scene height.
    pub camera_lift: f32,
    /// Look-at offset above center, as a fraction of the scene height.
    pub look_at_bias: f32,
    /// Vertical field of view in degrees.
    pub field_of_view: f32,
    /// Radians added to the model's yaw every frame while rotating.
    pub rotation_step: f32,
    pub backdrop_spin_step: f32,
    pub candidate_timeout: Duration,
    pub primary_timeout: Duration,
    pub frame_interval: Duration,
    pub placeholder_size: Vec3,
    /// Backdrop dimensions relative to the target size.
    pub backdrop_scale: f32,
    pub texture_size: u32,
    pub room_floor_texture: String,
    pub room_wall_texture: String,
}

impl Default for ViewerTuning {
    fn default() -> Self {
        Self {
            palette: vec![
                0xFF0000, 0x00FF00, 0x0000FF, 0xFFFF00, 0xFF00FF, 0x00FFFF, 0xFF8800, 0x88FF00,
                0x0088FF, 0x8800FF,
            ],
            min_extent: 1e-4,
            framing_multiplier: 1.8,
            backdrop_framing_multiplier: 2.4,
            camera_lift: 0.3,
            look_at_bias: 0.05,
            field_of_view: 50.0,
            rotation_step: 0.005,
            backdrop_spin_step: 0.0005,
            candidate_timeout: Duration::from_millis(4000),
            primary_timeout: Duration::from_secs(30),
            frame_interval: Duration::from_millis(16),
            placeholder_size: Vec3::new(5.0, 8.0, 0.5),
            backdrop_scale: 4.0,
            texture_size: 256,
            room_floor_texture: "assets/textures/floor-tiles.jpg".into(),
            room_wall_texture: "assets/textures/concrete-wall.jpg".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_config_uses_defaults_for_missing_fields() {
        let config =
            ViewerConfig::from_json(r#"{"assetPath": "assets/3dmodel/pant.obj", "autoRotate": false}"#)
                .unwrap();
        assert_eq!(config.asset_path, "assets/3dmodel/pant.obj");
        assert!(!config.auto_rotate);
        assert!(config.auto_scale);
        assert_eq!(config.target_size, 15.0);
        assert_eq!(config.backdrop_type, BackdropKind::Grid);
        assert_eq!(config.backdrop_candidates.len(), 3);
    }

    #[test]
    fn json_config_parses_backdrop_variant() {
        let config = ViewerConfig::from_json(
            r#"{"assetPath": "a.obj", "backdropType": "loadedScene", "backdropCandidates": ["x.scene"]}"#,
        )
        .unwrap();
        assert_eq!(config.backdrop_type, BackdropKind::LoadedScene);
        assert_eq!(config.backdrop_params().candidates, vec!["x.scene".to_string()]);
    }

    #[test]
    fn rejects_non_positive_target_size() {
        let mut config = ViewerConfig::new("a.obj");
        config.target_size = 0.0;
        assert!(config.validate().is_err());
        config.target_size = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn custom_backdrop_requires_path() {
        let mut config = ViewerConfig::new("a.obj");
        config.backdrop_type = BackdropKind::Custom;
        assert!(config.validate().is_err());
        config.custom_backdrop_path = Some("bg.png".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn backdrop_names_round_trip_through_aliases() {
        assert_eq!(BackdropKind::from_name("showroom"), Some(BackdropKind::Room));
        assert_eq!(BackdropKind::from_name("Scene"), Some(BackdropKind::LoadedScene));
        assert_eq!(BackdropKind::from_name("neon"), None);
        for kind in BackdropKind::ALL {
            assert_eq!(BackdropKind::from_name(kind.name()), Some(kind));
        }
    }
}
