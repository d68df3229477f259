use std::sync::Arc;

use glam::{Vec2, Vec3, Vec4};
use image::RgbaImage;

use crate::mesh::MeshHierarchy;
use crate::mtl::MaterialLibrary;
use crate::resources::ResourceId;

/// Where a material came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialOrigin {
    /// Defined by a companion material file or a scene bundle.
    Authored,
    /// Picked from the palette by the applicator.
    Generated,
    /// Synthesized when nothing else is available.
    Default,
}

/// Texture bound to a material, shared between frames.
#[derive(Debug, Clone)]
pub struct TextureSlot {
    pub image: Arc<RgbaImage>,
    pub repeat: Vec2,
    pub resource: Option<ResourceId>,
}

impl TextureSlot {
    pub fn new(image: RgbaImage, repeat: Vec2) -> Self {
        Self {
            image: Arc::new(image),
            repeat,
            resource: None,
        }
    }
}

/// Surface description of a renderable sub-mesh.
#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    /// `0xRRGGBB`.
    pub color: u32,
    pub opacity: f32,
    pub roughness: f32,
    pub metalness: f32,
    pub texture: Option<TextureSlot>,
    /// Diffuse map path as written in the material file, before it is fetched.
    pub texture_path: Option<String>,
    pub origin: MaterialOrigin,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "default".into(),
            color: 0xCCCCCC,
            opacity: 1.0,
            roughness: 0.5,
            metalness: 0.1,
            texture: None,
            texture_path: None,
            origin: MaterialOrigin::Default,
        }
    }
}

impl Material {
    pub fn generated(color: u32) -> Self {
        Self {
            name: format!("palette-{color:06x}"),
            color,
            roughness: 0.3,
            metalness: 0.2,
            origin: MaterialOrigin::Generated,
            ..Self::default()
        }
    }

    pub fn authored(name: impl Into<String>, color: u32) -> Self {
        Self {
            name: name.into(),
            color,
            origin: MaterialOrigin::Authored,
            ..Self::default()
        }
    }

    pub fn solid(name: impl Into<String>, color: u32, roughness: f32) -> Self {
        Self {
            name: name.into(),
            color,
            roughness,
            origin: MaterialOrigin::Authored,
            ..Self::default()
        }
    }

    pub fn with_texture(mut self, texture: TextureSlot) -> Self {
        self.texture = Some(texture);
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }

    pub fn rgb(&self) -> Vec3 {
        hex_to_rgb(self.color)
    }

    pub fn rgba(&self) -> Vec4 {
        self.rgb().extend(self.opacity)
    }
}

pub fn hex_to_rgb(hex: u32) -> Vec3 {
    Vec3::new(
        ((hex >> 16) & 0xFF) as f32 / 255.0,
        ((hex >> 8) & 0xFF) as f32 / 255.0,
        (hex & 0xFF) as f32 / 255.0,
    )
}

pub fn rgb_to_hex(color: Vec3) -> u32 {
    let channel = |value: f32| (value.clamp(0.0, 1.0) * 255.0).round() as u32;
    (channel(color.x) << 16) | (channel(color.y) << 8) | channel(color.z)
}

/// Summary of an [`MaterialApplicator::apply`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterialReport {
    pub authored: usize,
    pub generated: usize,
    /// Material names referenced by the mesh but absent from the library.
    pub missing: Vec<String>,
}

/// Assigns materials to every renderable node of a hierarchy.
#[derive(Debug, Clone)]
pub struct MaterialApplicator {
    palette: Arc<[u32]>,
}

impl MaterialApplicator {
    pub fn new(palette: &[u32]) -> Self {
        let palette: Arc<[u32]> = if palette.is_empty() {
            Arc::from(vec![Material::default().color])
        } else {
            Arc::from(palette)
        };
        Self { palette }
    }

    pub fn palette(&self) -> &[u32] {
        &self.palette
    }

    pub fn palette_color(&self, index: usize) -> u32 {
        self.palette[index % self.palette.len()]
    }

    /// Resolves authored materials from `library` and colors every other
    /// sub-mesh from the palette by its traversal index.
    pub fn apply(
        &self,
        hierarchy: &mut MeshHierarchy,
        library: Option<&MaterialLibrary>,
    ) -> MaterialReport {
        let mut report = MaterialReport::default();
        hierarchy.for_each_renderable_mut(|index, node| {
            let authored = node
                .material_ref
                .as_deref()
                .and_then(|name| match library.and_then(|lib| lib.get(name)) {
                    Some(material) => Some(material.clone()),
                    None => {
                        if library.is_some() && !report.missing.iter().any(|m| m == name) {
                            report.missing.push(name.to_string());
                        }
                        None
                    }
                });
            match authored {
                Some(material) => {
                    node.material = material;
                    report.authored += 1;
                }
                None if node.material.origin == MaterialOrigin::Authored => {
                    report.authored += 1;
                }
                None => {
                    node.material = Material::generated(self.palette_color(index));
                    report.generated += 1;
                }
            }
        });
        report
    }

    /// Recolors every generated material in place. Geometry and transforms
    /// are left untouched.
    pub fn change_color(&self, hierarchy: &mut MeshHierarchy, color: u32) -> usize {
        let color = color & 0xFF_FFFF;
        let mut changed = 0;
        hierarchy.for_each_renderable_mut(|_, node| {
            if node.material.origin == MaterialOrigin::Generated {
                node.material.color = color;
                changed += 1;
            }
        });
        changed
    }

    /// Moves every generated material to the next palette entry.
    pub fn cycle(&self, hierarchy: &mut MeshHierarchy) -> usize {
        let palette = Arc::clone(&self.palette);
        let mut changed = 0;
        hierarchy.for_each_renderable_mut(|_, node| {
            if node.material.origin != MaterialOrigin::Generated {
                return;
            }
            let next = palette
                .iter()
                .position(|c| *c == node.material.color)
                .map_or(0, |current| (current + 1) % palette.len());
            node.material.color = palette[next];
            changed += 1;
        });
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{MeshData, MeshNode, RenderableMesh};
    use glam::Vec3;

    fn hierarchy_with(count: usize) -> MeshHierarchy {
        let mut hierarchy = MeshHierarchy::new("model");
        for i in 0..count {
            hierarchy.push(MeshNode::Renderable(RenderableMesh::new(
                format!("part-{i}"),
                MeshData::cuboid(Vec3::ONE),
            )));
        }
        hierarchy
    }

    fn colors(hierarchy: &MeshHierarchy) -> Vec<u32> {
        hierarchy
            .renderables()
            .into_iter()
            .map(|(_, node)| node.material.color)
            .collect()
    }

    #[test]
    fn palette_cycles_in_traversal_order() {
        let applicator = MaterialApplicator::new(&[0x111111, 0x222222, 0x333333]);
        let mut hierarchy = hierarchy_with(7);
        let report = applicator.apply(&mut hierarchy, None);
        assert_eq!(report.generated, 7);
        let expected: Vec<u32> = (0..7).map(|i| [0x111111, 0x222222, 0x333333][i % 3]).collect();
        assert_eq!(colors(&hierarchy), expected);

        let mut again = hierarchy_with(7);
        applicator.apply(&mut again, None);
        assert_eq!(colors(&again), expected);
    }

    #[test]
    fn nested_groups_share_one_index_sequence() {
        let applicator = MaterialApplicator::new(&[1, 2, 3, 4]);
        let mut hierarchy = MeshHierarchy::new("model");
        hierarchy.push(MeshNode::Renderable(RenderableMesh::new(
            "a",
            MeshData::cuboid(Vec3::ONE),
        )));
        hierarchy.push(MeshNode::group(
            "sleeves",
            vec![
                MeshNode::Renderable(RenderableMesh::new("b", MeshData::cuboid(Vec3::ONE))),
                MeshNode::Renderable(RenderableMesh::new("c", MeshData::cuboid(Vec3::ONE))),
            ],
        ));
        applicator.apply(&mut hierarchy, None);
        assert_eq!(colors(&hierarchy), vec![1, 2, 3]);
    }

    #[test]
    fn authored_materials_win_over_palette() {
        let library = crate::mtl::parse_mtl("newmtl denim\nKd 0 0 1\n").unwrap();
        let applicator = MaterialApplicator::new(&[0xFF0000]);
        let mut hierarchy = hierarchy_with(2);
        hierarchy.for_each_renderable_mut(|index, node| {
            node.material_ref = Some(if index == 0 { "denim" } else { "missing" }.into());
        });
        let report = applicator.apply(&mut hierarchy, Some(&library));
        assert_eq!(report.authored, 1);
        assert_eq!(report.generated, 1);
        assert_eq!(report.missing, vec!["missing".to_string()]);
        assert_eq!(colors(&hierarchy), vec![0x0000FF, 0xFF0000]);
    }

    #[test]
    fn change_color_only_touches_generated_materials() {
        let applicator = MaterialApplicator::new(&[0xFF0000]);
        let mut hierarchy = hierarchy_with(2);
        applicator.apply(&mut hierarchy, None);
        hierarchy.for_each_renderable_mut(|index, node| {
            if index == 1 {
                node.material = Material::authored("leather", 0x553311);
            }
        });
        let changed = applicator.change_color(&mut hierarchy, 0x00FF00);
        assert_eq!(changed, 1);
        assert_eq!(colors(&hierarchy), vec![0x00FF00, 0x553311]);
    }

    #[test]
    fn cycle_advances_to_next_palette_entry() {
        let applicator = MaterialApplicator::new(&[1, 2, 3]);
        let mut hierarchy = hierarchy_with(3);
        applicator.apply(&mut hierarchy, None);
        applicator.cycle(&mut hierarchy);
        assert_eq!(colors(&hierarchy), vec![2, 3, 1]);
        applicator.change_color(&mut hierarchy, 0xABCDEF);
        applicator.cycle(&mut hierarchy);
        assert_eq!(colors(&hierarchy), vec![1, 1, 1]);
    }

    #[test]
    fn hex_conversion_is_symmetric() {
        let color = hex_to_rgb(0xFF8800);
        assert_eq!(rgb_to_hex(color), 0xFF8800);
        assert!((color.y - 136.0 / 255.0).abs() < 1e-6);
    }
}
