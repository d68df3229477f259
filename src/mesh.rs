use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::geometry::Bounds;
use crate::material::Material;
use crate::resources::{ResourceId, ResourceKind, ResourceLedger};

/// Floats per interleaved vertex: `position.xyz`, `normal.xyz`, `uv.xy`.
pub const VERTEX_STRIDE: usize = 8;

/// Local transform of a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    /// Builds a transform from Euler angles in degrees, applied Z, Y then X.
    pub fn from_euler_degrees(translation: Vec3, rotation: Vec3, scale: Vec3) -> Self {
        let rotation = Quat::from_rotation_z(rotation.z.to_radians())
            * Quat::from_rotation_y(rotation.y.to_radians())
            * Quat::from_rotation_x(rotation.x.to_radians());
        Self {
            translation,
            rotation,
            scale,
        }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Interleaved vertex and index buffers for one sub-mesh.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MeshData {
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / VERTEX_STRIDE
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty() || self.vertices.is_empty()
    }

    pub fn positions(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.vertices
            .chunks_exact(VERTEX_STRIDE)
            .map(|v| Vec3::new(v[0], v[1], v[2]))
    }

    fn push_vertex(&mut self, position: Vec3, normal: Vec3, uv: [f32; 2]) -> u32 {
        let index = self.vertex_count() as u32;
        self.vertices.extend_from_slice(&[
            position.x, position.y, position.z, normal.x, normal.y, normal.z, uv[0], uv[1],
        ]);
        index
    }

    fn push_quad(&mut self, corners: [Vec3; 4], normal: Vec3) {
        let uvs = [[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]];
        let base = self.push_vertex(corners[0], normal, uvs[0]);
        for (corner, uv) in corners.iter().zip(uvs.iter()).skip(1) {
            self.push_vertex(*corner, normal, *uv);
        }
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    /// Axis-aligned box centered on the origin.
    pub fn cuboid(size: Vec3) -> Self {
        let h = size * 0.5;
        let mut mesh = Self::default();
        let faces = [
            (Vec3::Z, [(-1., -1., 1.), (1., -1., 1.), (1., 1., 1.), (-1., 1., 1.)]),
            (Vec3::NEG_Z, [(1., -1., -1.), (-1., -1., -1.), (-1., 1., -1.), (1., 1., -1.)]),
            (Vec3::NEG_X, [(-1., -1., -1.), (-1., -1., 1.), (-1., 1., 1.), (-1., 1., -1.)]),
            (Vec3::X, [(1., -1., 1.), (1., -1., -1.), (1., 1., -1.), (1., 1., 1.)]),
            (Vec3::Y, [(-1., 1., 1.), (1., 1., 1.), (1., 1., -1.), (-1., 1., -1.)]),
            (Vec3::NEG_Y, [(-1., -1., -1.), (1., -1., -1.), (1., -1., 1.), (-1., -1., 1.)]),
        ];
        for (normal, corners) in faces {
            let corners = corners.map(|(x, y, z)| Vec3::new(x, y, z) * h);
            mesh.push_quad(corners, normal);
        }
        mesh
    }

    /// Horizontal plane at `y = 0` facing up.
    pub fn ground_plane(width: f32, depth: f32) -> Self {
        let (w, d) = (width * 0.5, depth * 0.5);
        let mut mesh = Self::default();
        mesh.push_quad(
            [
                Vec3::new(-w, 0.0, d),
                Vec3::new(w, 0.0, d),
                Vec3::new(w, 0.0, -d),
                Vec3::new(-w, 0.0, -d),
            ],
            Vec3::Y,
        );
        mesh
    }

    /// Vertical panel in the XY plane facing +Z, resting on `y = 0`.
    pub fn panel(width: f32, height: f32) -> Self {
        let w = width * 0.5;
        let mut mesh = Self::default();
        mesh.push_quad(
            [
                Vec3::new(-w, 0.0, 0.0),
                Vec3::new(w, 0.0, 0.0),
                Vec3::new(w, height, 0.0),
                Vec3::new(-w, height, 0.0),
            ],
            Vec3::Z,
        );
        mesh
    }

    /// UV sphere. With `inward` set the normals and winding face the center,
    /// for sky domes viewed from inside.
    pub fn sphere(radius: f32, segments: u32, rings: u32, inward: bool) -> Self {
        let segments = segments.max(3);
        let rings = rings.max(2);
        let mut mesh = Self::default();
        for ring in 0..=rings {
            let v = ring as f32 / rings as f32;
            let phi = v * std::f32::consts::PI;
            for segment in 0..=segments {
                let u = segment as f32 / segments as f32;
                let theta = u * std::f32::consts::TAU;
                let dir = Vec3::new(phi.sin() * theta.cos(), phi.cos(), phi.sin() * theta.sin());
                let normal = if inward { -dir } else { dir };
                mesh.push_vertex(dir * radius, normal, [u, v]);
            }
        }
        let stride = segments + 1;
        for ring in 0..rings {
            for segment in 0..segments {
                let a = ring * stride + segment;
                let b = a + stride;
                if inward {
                    mesh.indices.extend_from_slice(&[a, a + 1, b, a + 1, b + 1, b]);
                } else {
                    mesh.indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
                }
            }
        }
        mesh
    }
}

/// Sub-mesh that owns renderable geometry.
#[derive(Debug, Clone)]
pub struct RenderableMesh {
    pub name: String,
    pub transform: Transform,
    pub mesh: Arc<MeshData>,
    pub material: Material,
    /// Material name the source file bound to this sub-mesh, if any.
    pub material_ref: Option<String>,
    pub resource: Option<ResourceId>,
}

impl RenderableMesh {
    pub fn new(name: impl Into<String>, mesh: MeshData) -> Self {
        Self {
            name: name.into(),
            transform: Transform::IDENTITY,
            mesh: Arc::new(mesh),
            material: Material::default(),
            material_ref: None,
            resource: None,
        }
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }
}

/// Node of a mesh hierarchy: either a pure grouping node or a sub-mesh.
#[derive(Debug, Clone)]
pub enum MeshNode {
    Group {
        name: String,
        transform: Transform,
        children: Vec<MeshNode>,
    },
    Renderable(RenderableMesh),
}

impl MeshNode {
    pub fn group(name: impl Into<String>, children: Vec<MeshNode>) -> Self {
        Self::Group {
            name: name.into(),
            transform: Transform::IDENTITY,
            children,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Group { name, .. } => name,
            Self::Renderable(mesh) => &mesh.name,
        }
    }

    pub fn transform(&self) -> &Transform {
        match self {
            Self::Group { transform, .. } => transform,
            Self::Renderable(mesh) => &mesh.transform,
        }
    }

    fn visit<'a>(
        &'a self,
        parent: Mat4,
        visitor: &mut dyn FnMut(Mat4, &'a RenderableMesh),
    ) {
        let world = parent * self.transform().matrix();
        match self {
            Self::Group { children, .. } => {
                for child in children {
                    child.visit(world, visitor);
                }
            }
            Self::Renderable(mesh) => visitor(world, mesh),
        }
    }

    fn visit_mut(&mut self, visitor: &mut dyn FnMut(&mut RenderableMesh)) {
        match self {
            Self::Group { children, .. } => {
                for child in children {
                    child.visit_mut(visitor);
                }
            }
            Self::Renderable(mesh) => visitor(mesh),
        }
    }
}

/// Tree of sub-meshes under a root transform.
///
/// The root transform is what normalization rewrites; child transforms are
/// part of the asset and are never touched.
#[derive(Debug, Clone)]
pub struct MeshHierarchy {
    pub name: String,
    pub root: Transform,
    pub children: Vec<MeshNode>,
}

impl MeshHierarchy {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root: Transform::IDENTITY,
            children: Vec::new(),
        }
    }

    pub fn with_children(name: impl Into<String>, children: Vec<MeshNode>) -> Self {
        Self {
            children,
            ..Self::new(name)
        }
    }

    pub fn push(&mut self, node: MeshNode) {
        self.children.push(node);
    }

    /// Depth-first walk over renderable nodes with their transform relative
    /// to `base`.
    pub fn visit_renderables<'a>(&'a self, base: Mat4, mut visitor: impl FnMut(Mat4, &'a RenderableMesh)) {
        for child in &self.children {
            child.visit(base, &mut visitor);
        }
    }

    /// Mutable depth-first walk; the index is the node's traversal position.
    pub fn for_each_renderable_mut(&mut self, mut visitor: impl FnMut(usize, &mut RenderableMesh)) {
        let mut index = 0;
        let mut counted = |mesh: &mut RenderableMesh| {
            visitor(index, mesh);
            index += 1;
        };
        for child in &mut self.children {
            child.visit_mut(&mut counted);
        }
    }

    pub fn renderables(&self) -> Vec<(usize, &RenderableMesh)> {
        let mut out = Vec::new();
        self.visit_renderables(Mat4::IDENTITY, |_, mesh| {
            let index = out.len();
            out.push((index, mesh));
        });
        out
    }

    pub fn renderable_count(&self) -> usize {
        let mut count = 0;
        self.visit_renderables(Mat4::IDENTITY, |_, mesh| {
            if !mesh.mesh.is_empty() {
                count += 1;
            }
        });
        count
    }

    pub fn is_empty(&self) -> bool {
        self.renderable_count() == 0
    }

    /// Bounds in the hierarchy's own space, ignoring the root transform.
    pub fn local_bounds(&self) -> Option<Bounds> {
        self.bounds_with(Mat4::IDENTITY)
    }

    /// Bounds after applying the root transform.
    pub fn bounds(&self) -> Option<Bounds> {
        self.bounds_with(self.root.matrix())
    }

    pub fn bounds_with(&self, base: Mat4) -> Option<Bounds> {
        let mut bounds: Option<Bounds> = None;
        self.visit_renderables(base, |world, mesh| {
            for position in mesh.mesh.positions() {
                let point = world.transform_point3(position);
                bounds = Some(match bounds {
                    Some(b) => b.including(point),
                    None => Bounds::new(point, point),
                });
            }
        });
        bounds
    }

    /// Assigns resource ids to every sub-mesh and texture that lacks one.
    pub fn allocate_resources(&mut self, ledger: &mut ResourceLedger) -> usize {
        let mut allocated = 0;
        self.for_each_renderable_mut(|_, mesh| {
            if mesh.resource.is_none() {
                mesh.resource = Some(ledger.allocate(ResourceKind::MeshBuffers));
                allocated += 1;
            }
            if let Some(texture) = mesh.material.texture.as_mut() {
                if texture.resource.is_none() {
                    texture.resource = Some(ledger.allocate(ResourceKind::Texture));
                    allocated += 1;
                }
            }
        });
        allocated
    }

    /// Releases every resource id held by the hierarchy. Calling it again is
    /// a no-op because the ids are taken out of the nodes.
    pub fn release_resources(&mut self, ledger: &mut ResourceLedger) -> usize {
        let mut released = 0;
        self.for_each_renderable_mut(|_, mesh| {
            if let Some(id) = mesh.resource.take() {
                released += usize::from(ledger.release(id));
            }
            if let Some(id) = mesh.material.texture.as_mut().and_then(|t| t.resource.take()) {
                released += usize::from(ledger.release(id));
            }
        });
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cuboid_bounds_match_size() {
        let hierarchy = MeshHierarchy::with_children(
            "box",
            vec![MeshNode::Renderable(RenderableMesh::new(
                "box",
                MeshData::cuboid(Vec3::new(2.0, 4.0, 6.0)),
            ))],
        );
        let bounds = hierarchy.local_bounds().unwrap();
        assert_eq!(bounds.min, Vec3::new(-1.0, -2.0, -3.0));
        assert_eq!(bounds.max, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(MeshData::cuboid(Vec3::ONE).indices.len(), 36);
    }

    #[test]
    fn child_transforms_contribute_to_bounds() {
        let child = RenderableMesh::new("cube", MeshData::cuboid(Vec3::ONE))
            .with_transform(Transform::from_translation(Vec3::new(10.0, 0.0, 0.0)));
        let mut hierarchy = MeshHierarchy::with_children(
            "model",
            vec![MeshNode::group("arm", vec![MeshNode::Renderable(child)])],
        );
        hierarchy.root.translation = Vec3::new(0.0, 5.0, 0.0);

        let local = hierarchy.local_bounds().unwrap();
        assert_eq!(local.center(), Vec3::new(10.0, 0.0, 0.0));
        let world = hierarchy.bounds().unwrap();
        assert_eq!(world.center(), Vec3::new(10.0, 5.0, 0.0));
    }

    #[test]
    fn empty_hierarchy_has_no_bounds() {
        let hierarchy = MeshHierarchy::with_children("empty", vec![MeshNode::group("g", vec![])]);
        assert!(hierarchy.is_empty());
        assert!(hierarchy.local_bounds().is_none());
    }

    #[test]
    fn resources_are_allocated_and_released_once() {
        let mut ledger = ResourceLedger::new();
        let mut hierarchy = MeshHierarchy::with_children(
            "model",
            vec![
                MeshNode::Renderable(RenderableMesh::new("a", MeshData::cuboid(Vec3::ONE))),
                MeshNode::Renderable(RenderableMesh::new("b", MeshData::cuboid(Vec3::ONE))),
            ],
        );
        assert_eq!(hierarchy.allocate_resources(&mut ledger), 2);
        assert_eq!(hierarchy.allocate_resources(&mut ledger), 0);
        assert_eq!(ledger.live_count(), 2);
        assert_eq!(hierarchy.release_resources(&mut ledger), 2);
        assert_eq!(hierarchy.release_resources(&mut ledger), 0);
        assert_eq!(ledger.live_count(), 0);
    }

    #[test]
    fn inward_sphere_normals_point_to_center() {
        let sphere = MeshData::sphere(10.0, 8, 4, true);
        for vertex in sphere.vertices.chunks_exact(VERTEX_STRIDE) {
            let position = Vec3::new(vertex[0], vertex[1], vertex[2]);
            let normal = Vec3::new(vertex[3], vertex[4], vertex[5]);
            assert!(position.dot(normal) < 0.0);
        }
    }
}
