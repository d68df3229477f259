use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use glam::{Vec2, Vec3};

use crate::mesh::{MeshData, MeshHierarchy, MeshNode, RenderableMesh, VERTEX_STRIDE};

/// One sub-mesh of an OBJ file: a group (`o`/`g`) with a single bound
/// material.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjGroup {
    pub name: String,
    pub material: Option<String>,
    pub mesh: MeshData,
}

/// Parsed OBJ file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjModel {
    pub groups: Vec<ObjGroup>,
    /// Files named by `mtllib` statements.
    pub material_libs: Vec<String>,
}

impl ObjModel {
    pub fn triangle_count(&self) -> usize {
        self.groups.iter().map(|g| g.mesh.indices.len() / 3).sum()
    }

    /// Converts the groups into renderable nodes under a fresh root.
    pub fn into_hierarchy(self, name: impl Into<String>) -> MeshHierarchy {
        let children = self
            .groups
            .into_iter()
            .map(|group| {
                let mut node = RenderableMesh::new(group.name, group.mesh);
                node.material_ref = group.material;
                MeshNode::Renderable(node)
            })
            .collect();
        MeshHierarchy::with_children(name, children)
    }
}

/// Parses an OBJ file from memory.
///
/// Vertices are laid out as `position.xyz`, `normal.xyz`, `uv.xy`. Faces are
/// fan-triangulated; a new sub-mesh starts at every `o`, `g` or `usemtl`
/// statement that follows faces.
pub fn parse_obj(data: &str) -> Result<ObjModel> {
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut uvs = Vec::new();
    let mut material_libs = Vec::new();
    let mut pending: Vec<PendingGroup> = vec![PendingGroup::new("default", None)];

    for (line_no, line) in data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        let Some(tag) = parts.next() else {
            continue;
        };
        match tag {
            "v" => positions.push(
                parse_vec3(parts)
                    .with_context(|| format!("invalid vertex on line {}", line_no + 1))?,
            ),
            "vn" => normals.push(
                parse_vec3(parts)
                    .with_context(|| format!("invalid normal on line {}", line_no + 1))?,
            ),
            "vt" => uvs.push(
                parse_vec2(parts)
                    .with_context(|| format!("invalid texture coordinate on line {}", line_no + 1))?,
            ),
            "f" => {
                let polygon = parse_face(parts)
                    .with_context(|| format!("invalid face on line {}", line_no + 1))?;
                if let Some(group) = pending.last_mut() {
                    triangulate_face(&polygon, &mut group.faces);
                }
            }
            "o" | "g" => {
                let name = parts.collect::<Vec<_>>().join(" ");
                let material = pending.last().and_then(|g| g.material.clone());
                start_group(&mut pending, name, material);
            }
            "usemtl" => {
                let material = parts.collect::<Vec<_>>().join(" ");
                let name = pending
                    .last()
                    .map(|g| g.name.clone())
                    .unwrap_or_else(|| "default".into());
                start_group(&mut pending, name, Some(material).filter(|m| !m.is_empty()));
            }
            "mtllib" => material_libs.extend(parts.map(String::from)),
            _ => {}
        }
    }

    if positions.is_empty() {
        return Err(anyhow!("OBJ file does not define any vertices"));
    }

    let mut groups = Vec::new();
    for group in pending.into_iter().filter(|g| !g.faces.is_empty()) {
        let mut mesh = build_mesh(&positions, &normals, &uvs, &group.faces)
            .with_context(|| format!("in group {}", group.name))?;
        if needs_normals(&mesh.vertices) {
            compute_normals(&mut mesh);
        }
        groups.push(ObjGroup {
            name: group.name,
            material: group.material,
            mesh,
        });
    }

    Ok(ObjModel {
        groups,
        material_libs,
    })
}

struct PendingGroup {
    name: String,
    material: Option<String>,
    faces: Vec<[FaceIndex; 3]>,
}

impl PendingGroup {
    fn new(name: impl Into<String>, material: Option<String>) -> Self {
        Self {
            name: name.into(),
            material,
            faces: Vec::new(),
        }
    }
}

fn start_group(pending: &mut Vec<PendingGroup>, name: String, material: Option<String>) {
    let name = if name.is_empty() { "default".to_string() } else { name };
    match pending.last_mut() {
        // Nothing was emitted under the current header yet, so rename it.
        Some(current) if current.faces.is_empty() => {
            current.name = name;
            current.material = material;
        }
        _ => pending.push(PendingGroup::new(name, material)),
    }
}

fn parse_component<'a>(parts: &mut impl Iterator<Item = &'a str>) -> Result<f32> {
    let value = parts
        .next()
        .ok_or_else(|| anyhow!("missing vector component"))?
        .parse::<f32>()?;
    if !value.is_finite() {
        return Err(anyhow!("non-finite vector component"));
    }
    Ok(value)
}

fn parse_vec3<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Vec3> {
    let x = parse_component(&mut parts)?;
    let y = parse_component(&mut parts)?;
    let z = parse_component(&mut parts)?;
    Ok(Vec3::new(x, y, z))
}

fn parse_vec2<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Vec2> {
    let u = parse_component(&mut parts)?;
    let v = parts
        .next()
        .map(|s| s.parse::<f32>())
        .transpose()?
        .unwrap_or(0.0);
    Ok(Vec2::new(u, v))
}

fn parse_face<'a>(parts: impl Iterator<Item = &'a str>) -> Result<Vec<FaceIndex>> {
    let mut indices = Vec::new();
    for part in parts {
        let mut segments = part.split('/');
        let v = segments
            .next()
            .ok_or_else(|| anyhow!("missing vertex index"))?
            .parse::<i32>()?;
        let vt = parse_optional_index(segments.next())?;
        let vn = parse_optional_index(segments.next())?;
        indices.push(FaceIndex { v, vt, vn });
    }
    if indices.len() < 3 {
        return Err(anyhow!("faces must reference at least 3 vertices"));
    }
    Ok(indices)
}

fn parse_optional_index(segment: Option<&str>) -> Result<i32> {
    match segment {
        None | Some("") => Ok(0),
        Some(s) => Ok(s.parse::<i32>()?),
    }
}

fn triangulate_face(polygon: &[FaceIndex], faces: &mut Vec<[FaceIndex; 3]>) {
    if polygon.len() < 3 {
        return;
    }
    for i in 1..(polygon.len() - 1) {
        faces.push([polygon[0], polygon[i], polygon[i + 1]]);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Key {
    position: usize,
    uv: Option<usize>,
    normal: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
struct FaceIndex {
    v: i32,
    vt: i32,
    vn: i32,
}

fn build_mesh(
    positions: &[Vec3],
    normals: &[Vec3],
    uvs: &[Vec2],
    faces: &[[FaceIndex; 3]],
) -> Result<MeshData> {
    let mut lookup: HashMap<Key, u32> = HashMap::new();
    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    for face in faces {
        for idx in face {
            let pos_index = fix_index(idx.v, positions.len())
                .ok_or_else(|| anyhow!("invalid vertex index {}", idx.v))?;
            let key = Key {
                position: pos_index,
                uv: fix_index(idx.vt, uvs.len()),
                normal: fix_index(idx.vn, normals.len()),
            };
            let next_index = (vertices.len() / VERTEX_STRIDE) as u32;
            let entry = lookup.entry(key).or_insert_with(|| {
                let position = positions[pos_index];
                let normal = key.normal.map(|i| normals[i]).unwrap_or(Vec3::ZERO);
                let uv = key.uv.map(|i| uvs[i]).unwrap_or(Vec2::ZERO);
                vertices.extend_from_slice(&[
                    position.x, position.y, position.z, normal.x, normal.y, normal.z, uv.x,
                    // OBJ has V pointing up, textures are sampled top-down.
                    1.0 - uv.y,
                ]);
                next_index
            });
            indices.push(*entry);
        }
    }

    Ok(MeshData { vertices, indices })
}

fn fix_index(index: i32, len: usize) -> Option<usize> {
    if index > 0 {
        let zero_based = index as usize - 1;
        (zero_based < len).then_some(zero_based)
    } else if index < 0 {
        let abs = index.unsigned_abs() as usize;
        (abs <= len).then_some(len - abs)
    } else {
        None
    }
}

fn needs_normals(vertices: &[f32]) -> bool {
    vertices
        .chunks_exact(VERTEX_STRIDE)
        .any(|chunk| chunk[3] == 0.0 && chunk[4] == 0.0 && chunk[5] == 0.0)
}

fn compute_normals(mesh: &mut MeshData) {
    let vertex_count = mesh.vertex_count();
    let mut accum = vec![Vec3::ZERO; vertex_count];
    let position = |vertices: &[f32], i: usize| {
        Vec3::from_slice(&vertices[i * VERTEX_STRIDE..i * VERTEX_STRIDE + 3])
    };

    for triangle in mesh.indices.chunks_exact(3) {
        let [i0, i1, i2] = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);
        let p0 = position(&mesh.vertices, i0);
        let p1 = position(&mesh.vertices, i1);
        let p2 = position(&mesh.vertices, i2);
        let normal = (p1 - p0).cross(p2 - p0);
        if normal.length_squared() > f32::EPSILON {
            let normal = normal.normalize();
            accum[i0] += normal;
            accum[i1] += normal;
            accum[i2] += normal;
        }
    }

    for (i, normal) in accum.into_iter().enumerate() {
        let offset = i * VERTEX_STRIDE;
        let current = Vec3::from_slice(&mesh.vertices[offset + 3..offset + 6]);
        if current != Vec3::ZERO {
            continue;
        }
        let normal = normal.normalize_or_zero();
        mesh.vertices[offset + 3] = normal.x;
        mesh.vertices[offset + 4] = normal.y;
        mesh.vertices[offset + 5] = normal.z;
    }
}
