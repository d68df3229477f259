use anyhow::{anyhow, Context, Result};
use glam::{Vec2, Vec3};
use log::debug;
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

use crate::bundle::SceneBundle;
use crate::material::{rgb_to_hex, Material, TextureSlot};
use crate::mesh::{MeshData, MeshHierarchy, MeshNode, RenderableMesh, Transform};
use crate::obj::parse_obj;
use crate::texture::decode_image;

/// Scene description stored inside a [`SceneBundle`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BundleScene {
    pub objects: Vec<SceneObject>,
    pub lights: Vec<Light>,
}

impl BundleScene {
    /// Parses the scene XML of a backdrop bundle.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let document = Document::parse(xml).context("invalid scene XML")?;
        let mut objects = Vec::new();

        for node in document.descendants().filter(|n| n.has_tag_name("object")) {
            let mut object = SceneObject {
                name: required_text(&node, "name")?,
                ..SceneObject::default()
            };
            object.object_type = optional_text(&node, "type").unwrap_or_else(|| "mesh".to_string());
            object.mesh = optional_text(&node, "mesh");
            object.texture = optional_text(&node, "texture");
            object.color = parse_color(optional_text(&node, "color"), object.color)
                .with_context(|| format!("object {}", object.name))?;
            object.position = parse_vec3(optional_text(&node, "position"), object.position)
                .with_context(|| format!("object {}", object.name))?;
            object.rotation = parse_vec3(optional_text(&node, "rotation"), object.rotation)
                .with_context(|| format!("object {}", object.name))?;
            object.scale = parse_vec3(optional_text(&node, "scale"), object.scale)
                .with_context(|| format!("object {}", object.name))?;
            object.intensity = parse_f32(optional_text(&node, "intensity"), object.intensity)?;
            object.opacity = parse_f32(optional_text(&node, "opacity"), object.opacity)?;
            objects.push(object);
        }

        let lights = objects
            .iter()
            .filter(|obj| obj.object_type == "light")
            .map(|obj| Light {
                position: obj.position,
                color: obj.color,
                intensity: obj.intensity,
            })
            .collect();

        Ok(Self { objects, lights })
    }

    /// Builds the renderable group, resolving mesh and texture files from
    /// `bundle`. Objects whose mesh cannot be resolved are an error; a
    /// missing texture only drops the texture.
    pub fn into_hierarchy(&self, name: &str, bundle: &SceneBundle) -> Result<MeshHierarchy> {
        let mut hierarchy = MeshHierarchy::new(name);
        for object in &self.objects {
            let geometry: Vec<(String, MeshData, Option<String>)> = match object.object_type.as_str() {
                "light" | "camera" => continue,
                "plane" => vec![(object.name.clone(), MeshData::ground_plane(1.0, 1.0), None)],
                "panel" => vec![(object.name.clone(), MeshData::panel(1.0, 1.0), None)],
                "box" => vec![(object.name.clone(), MeshData::cuboid(Vec3::ONE), None)],
                _ => {
                    let file = object
                        .mesh
                        .as_deref()
                        .ok_or_else(|| anyhow!("object {} has no <mesh>", object.name))?;
                    let text = bundle.extract_text(file)?;
                    parse_obj(text)
                        .with_context(|| format!("mesh {file} of object {}", object.name))?
                        .groups
                        .into_iter()
                        .map(|g| (g.name, g.mesh, g.material))
                        .collect()
                }
            };

            let mut material =
                Material::authored(format!("{}-surface", object.name), rgb_to_hex(object.color))
                    .with_opacity(object.opacity);
            if let Some(texture) = object.texture.as_deref() {
                match bundle.extract_file(texture).and_then(decode_image) {
                    Ok(image) => {
                        material = material.with_texture(TextureSlot::new(image, Vec2::ONE));
                    }
                    Err(err) => debug!("texture {texture} of {} skipped: {err:#}", object.name),
                }
            }

            let children = geometry
                .into_iter()
                .map(|(part, mesh, material_ref)| {
                    let mut node = RenderableMesh::new(part, mesh).with_material(material.clone());
                    node.material_ref = material_ref;
                    MeshNode::Renderable(node)
                })
                .collect();
            hierarchy.push(MeshNode::Group {
                name: object.name.clone(),
                transform: Transform::from_euler_degrees(
                    object.position,
                    object.rotation,
                    object.scale,
                ),
                children,
            });
        }
        if hierarchy.is_empty() {
            return Err(anyhow!("scene {name} has no renderable objects"));
        }
        Ok(hierarchy)
    }
}

/// Object as described in the scene XML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub name: String,
    #[serde(rename = "type")]
    pub object_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub texture: Option<String>,
    #[serde(default = "default_color")]
    pub color: Vec3,
    #[serde(default)]
    pub position: Vec3,
    /// Euler angles in degrees.
    #[serde(default)]
    pub rotation: Vec3,
    #[serde(default = "default_scale")]
    pub scale: Vec3,
    #[serde(default = "default_intensity")]
    pub intensity: f32,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
}

impl Default for SceneObject {
    fn default() -> Self {
        Self {
            name: String::new(),
            object_type: String::new(),
            mesh: None,
            texture: None,
            color: default_color(),
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: default_scale(),
            intensity: default_intensity(),
            opacity: default_opacity(),
        }
    }
}

fn default_color() -> Vec3 {
    Vec3::ONE
}

fn default_scale() -> Vec3 {
    Vec3::ONE
}

fn default_intensity() -> f32 {
    1.0
}

fn default_opacity() -> f32 {
    1.0
}

/// Light extracted from the scene object list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Light {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

fn required_text(node: &Node<'_, '_>, tag: &str) -> Result<String> {
    optional_text(node, tag).ok_or_else(|| anyhow!("<{tag}> tag is missing"))
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    node.children()
        .find(|child| child.has_tag_name(tag))
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.to_string())
}

fn parse_triple(value: &str, what: &str) -> Result<Vec3> {
    let numbers = value
        .split_whitespace()
        .map(|component| component.parse::<f32>())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("{what} has a non-numeric component: {value}"))?;
    match numbers.as_slice() {
        [x, y, z] if x.is_finite() && y.is_finite() && z.is_finite() => Ok(Vec3::new(*x, *y, *z)),
        _ => Err(anyhow!("{what} needs three finite components: {value}")),
    }
}

fn parse_vec3(value: Option<String>, default: Vec3) -> Result<Vec3> {
    value.map_or(Ok(default), |value| parse_triple(&value, "vector"))
}

/// Colors are written as `0-255` channel triples.
fn parse_color(value: Option<String>, default: Vec3) -> Result<Vec3> {
    value.map_or(Ok(default), |value| {
        parse_triple(&value, "color").map(|rgb| (rgb / 255.0).clamp(Vec3::ZERO, Vec3::ONE))
    })
}

fn parse_f32(value: Option<String>, default: f32) -> Result<f32> {
    match value {
        Some(value) => value
            .parse::<f32>()
            .map_err(|err| anyhow!("failed to parse float: {err}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{encode, BundleEndian};

    const SAMPLE: &str = r#"
    <scene>
        <object>
            <name>Floor</name>
            <type>plane</type>
            <scale>40 1 40</scale>
            <color>200 200 200</color>
        </object>
        <object>
            <name>Bench</name>
            <mesh>bench.obj</mesh>
            <position>0 0 -6</position>
            <rotation>0 90 0</rotation>
        </object>
        <object>
            <name>Sun</name>
            <type>light</type>
            <intensity>2.5</intensity>
            <position>0 5 0</position>
            <color>255 128 0</color>
        </object>
    </scene>
    "#;

    const BENCH: &str = "v 0 0 0\nv 2 0 0\nv 2 1 0\nv 0 1 0\nf 1 2 3 4\n";

    #[test]
    fn parse_scene_populates_objects_and_lights() {
        let scene = BundleScene::from_xml(SAMPLE).unwrap();
        assert_eq!(scene.objects.len(), 3);
        let bench = scene.objects.iter().find(|o| o.name == "Bench").unwrap();
        assert_eq!(bench.object_type, "mesh");
        assert_eq!(bench.mesh.as_deref(), Some("bench.obj"));
        assert_eq!(scene.lights.len(), 1);
        let light = scene.lights[0];
        assert_eq!(light.position, Vec3::new(0.0, 5.0, 0.0));
        assert!((light.intensity - 2.5).abs() < f32::EPSILON);
        assert_eq!(light.color, Vec3::new(1.0, 128.0 / 255.0, 0.0));
    }

    #[test]
    fn missing_name_is_an_error() {
        let bad = "<scene><object><type>mesh</type></object></scene>";
        assert!(BundleScene::from_xml(bad).is_err());
    }

    #[test]
    fn malformed_vector_is_an_error() {
        let bad = "<scene><object><name>a</name><position>1 two</position></object></scene>";
        assert!(BundleScene::from_xml(bad).is_err());
    }

    #[test]
    fn builds_hierarchy_from_bundle_files() {
        let buffer = encode(BundleEndian::Little, 1, &[("bench.obj", BENCH.as_bytes())], SAMPLE);
        let bundle = SceneBundle::from_bytes("showroom", buffer).unwrap();
        let scene = BundleScene::from_xml(bundle.scene_xml()).unwrap();
        let hierarchy = scene.into_hierarchy("showroom", &bundle).unwrap();

        assert_eq!(hierarchy.children.len(), 2);
        assert_eq!(hierarchy.renderable_count(), 2);
        let bounds = hierarchy.bounds().unwrap();
        assert!((bounds.size().x - 40.0).abs() < 1e-3);
        let floor = &hierarchy.renderables()[0].1;
        assert_eq!(floor.material.color, 0xC8C8C8);
    }

    #[test]
    fn missing_mesh_file_is_an_error() {
        let buffer = encode(BundleEndian::Little, 1, &[], SAMPLE);
        let bundle = SceneBundle::from_bytes("broken", buffer).unwrap();
        let scene = BundleScene::from_xml(bundle.scene_xml()).unwrap();
        let err = scene.into_hierarchy("broken", &bundle).unwrap_err();
        assert!(err.to_string().contains("bench.obj"));
    }
}
