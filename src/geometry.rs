//! Bounding volumes and the normalization pass that puts every loaded model
//! into the same on-screen frame.

use glam::{Mat4, Vec3};
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mesh::MeshHierarchy;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.min(max),
            max: max.max(min),
        }
    }

    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        points.into_iter().fold(None, |acc, p| {
            Some(match acc {
                Some(b) => Bounds::including(b, p),
                None => Bounds::new(p, p),
            })
        })
    }

    pub fn including(self, point: Vec3) -> Self {
        Self {
            min: self.min.min(point),
            max: self.max.max(point),
        }
    }

    pub fn union(self, other: Bounds) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn max_extent(&self) -> f32 {
        self.size().max_element()
    }

    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    /// True when at least one dimension is thinner than `epsilon`.
    pub fn is_degenerate(&self, epsilon: f32) -> bool {
        self.size().min_element() < epsilon
    }

    pub fn translated(&self, offset: Vec3) -> Self {
        Self {
            min: self.min + offset,
            max: self.max + offset,
        }
    }

    /// Bounds of the eight transformed corners.
    pub fn transformed(&self, matrix: Mat4) -> Self {
        let corners = (0..8).map(|i| {
            matrix.transform_point3(Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            ))
        });
        Self::from_points(corners).unwrap_or(*self)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("mesh hierarchy has no renderable geometry")]
    Empty,
    #[error("mesh hierarchy has non-finite coordinates")]
    NonFinite,
}

/// Inputs of the normalization pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizeOptions {
    pub auto_scale: bool,
    pub target_size: f32,
    pub min_extent: f32,
}

/// Result of normalizing a hierarchy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    pub scale: f32,
    pub translation: Vec3,
    /// Bounds after the new root transform.
    pub bounds: Bounds,
}

/// Uniform scale that brings the largest dimension of `bounds` to
/// `target_size`. Always finite and strictly positive.
pub fn scale_factor(bounds: &Bounds, target_size: f32, min_extent: f32) -> f32 {
    let divisor = bounds.max_extent().max(min_extent.max(f32::EPSILON));
    let scale = target_size / divisor;
    if scale.is_finite() && scale > 0.0 {
        scale
    } else {
        1.0
    }
}

/// Rewrites the root transform so the model is uniformly scaled, centered on
/// X/Z and resting on `y = 0`.
///
/// The measurement ignores the previous root transform, so running the pass
/// twice yields the same result as running it once.
pub fn normalize(
    hierarchy: &mut MeshHierarchy,
    options: &NormalizeOptions,
) -> Result<Normalization, GeometryError> {
    let local = hierarchy.local_bounds().ok_or(GeometryError::Empty)?;
    if !local.is_finite() {
        return Err(GeometryError::NonFinite);
    }
    hierarchy.root.translation = Vec3::ZERO;

    let scale = if options.auto_scale {
        scale_factor(&local, options.target_size, options.min_extent)
    } else {
        1.0
    };
    let scaled = Bounds::new(local.min * scale, local.max * scale);
    let center = scaled.center();
    let translation = Vec3::new(-center.x, -scaled.min.y, -center.z);

    hierarchy.root.scale = Vec3::splat(scale);
    hierarchy.root.translation = translation;
    let bounds = scaled.translated(translation);
    debug!(
        "normalized {}: scale={scale:.4} size=({:.3}, {:.3}, {:.3})",
        hierarchy.name,
        bounds.size().x,
        bounds.size().y,
        bounds.size().z
    );
    Ok(Normalization {
        scale,
        translation,
        bounds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{MeshData, MeshNode, RenderableMesh, Transform};

    fn box_hierarchy(size: Vec3, offset: Vec3) -> MeshHierarchy {
        let node = RenderableMesh::new("body", MeshData::cuboid(size))
            .with_transform(Transform::from_translation(offset));
        MeshHierarchy::with_children("model", vec![MeshNode::Renderable(node)])
    }

    fn options(target_size: f32) -> NormalizeOptions {
        NormalizeOptions {
            auto_scale: true,
            target_size,
            min_extent: 1e-4,
        }
    }

    #[test]
    fn scales_small_model_up_to_target() {
        let mut hierarchy = box_hierarchy(Vec3::new(0.3, 0.2, 0.1), Vec3::ZERO);
        let result = normalize(&mut hierarchy, &options(5.0)).unwrap();
        assert!((result.scale - 5.0 / 0.3).abs() < 1e-3);
        assert!((result.bounds.max_extent() - 5.0).abs() < 0.01);
        let measured = hierarchy.bounds().unwrap();
        assert!((measured.max_extent() - 5.0).abs() < 0.01);
    }

    #[test]
    fn rests_on_ground_and_centers_horizontally() {
        let mut hierarchy = box_hierarchy(Vec3::new(4.0, 2.0, 1.0), Vec3::new(7.0, -30.0, 3.0));
        normalize(&mut hierarchy, &options(10.0)).unwrap();
        let bounds = hierarchy.bounds().unwrap();
        assert!(bounds.min.y.abs() < 1e-4);
        assert!(bounds.center().x.abs() < 1e-4);
        assert!(bounds.center().z.abs() < 1e-4);
        assert!((bounds.size().x - 10.0).abs() < 1e-3);
        assert!((bounds.size().y - 5.0).abs() < 1e-3);
    }

    #[test]
    fn normalization_is_idempotent() {
        let mut hierarchy = box_hierarchy(Vec3::new(1.0, 3.0, 2.0), Vec3::new(-2.0, 5.0, 1.0));
        let first = normalize(&mut hierarchy, &options(15.0)).unwrap();
        let after_first = hierarchy.bounds().unwrap();
        let second = normalize(&mut hierarchy, &options(15.0)).unwrap();
        let after_second = hierarchy.bounds().unwrap();
        assert_eq!(first, second);
        assert!((after_first.min - after_second.min).length() < 1e-5);
        assert!((after_first.max - after_second.max).length() < 1e-5);
    }

    #[test]
    fn without_auto_scale_only_translates() {
        let mut hierarchy = box_hierarchy(Vec3::new(2.0, 2.0, 2.0), Vec3::new(0.0, 10.0, 0.0));
        let mut opts = options(15.0);
        opts.auto_scale = false;
        let result = normalize(&mut hierarchy, &opts).unwrap();
        assert_eq!(result.scale, 1.0);
        assert_eq!(result.translation, Vec3::new(0.0, -9.0, 0.0));
    }

    #[test]
    fn scale_is_positive_and_finite_for_degenerate_bounds() {
        let cases = [
            Bounds::new(Vec3::ZERO, Vec3::ZERO),
            Bounds::new(Vec3::ZERO, Vec3::new(2.0, 0.0, 2.0)),
            Bounds::new(Vec3::splat(3.0), Vec3::new(3.0, 3.0, 1e-9)),
            Bounds::new(Vec3::splat(-1.0), Vec3::splat(1.0)),
        ];
        for bounds in cases {
            for target in [0.001, 1.0, 15.0, 1e6] {
                let scale = scale_factor(&bounds, target, 1e-4);
                assert!(scale.is_finite(), "{bounds:?} -> {scale}");
                assert!(scale > 0.0, "{bounds:?} -> {scale}");
            }
        }
        assert_eq!(scale_factor(&Bounds::new(Vec3::ZERO, Vec3::ZERO), 1.0, 0.0), 1.0 / f32::EPSILON);
    }

    #[test]
    fn flat_plane_normalizes_without_infinities() {
        let plane = RenderableMesh::new("plane", MeshData::ground_plane(2.0, 2.0));
        let mut hierarchy = MeshHierarchy::with_children("flat", vec![MeshNode::Renderable(plane)]);
        let result = normalize(&mut hierarchy, &options(5.0)).unwrap();
        assert!((result.scale - 2.5).abs() < 1e-5);
        assert!(result.bounds.is_finite());
        assert_eq!(result.bounds.min.y, 0.0);
    }

    #[test]
    fn empty_hierarchy_is_rejected() {
        let mut hierarchy = MeshHierarchy::new("empty");
        assert_eq!(normalize(&mut hierarchy, &options(5.0)), Err(GeometryError::Empty));
    }

    #[test]
    fn transformed_bounds_cover_rotated_corners() {
        let bounds = Bounds::new(Vec3::new(-1.0, 0.0, -2.0), Vec3::new(1.0, 1.0, 2.0));
        let rotated = bounds.transformed(Mat4::from_rotation_y(std::f32::consts::FRAC_PI_2));
        assert!((rotated.size().x - 4.0).abs() < 1e-4);
        assert!((rotated.size().z - 2.0).abs() < 1e-4);
    }
}
