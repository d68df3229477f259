use anyhow::{anyhow, Context, Result};

use crate::material::{rgb_to_hex, Material};

/// Materials defined by a companion `.mtl` file, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct MaterialLibrary {
    materials: Vec<Material>,
}

impl MaterialLibrary {
    pub fn get(&self, name: &str) -> Option<&Material> {
        self.materials.iter().find(|m| m.name == name)
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Material> {
        self.materials.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Material> {
        self.materials.iter_mut()
    }
}

/// Parses the subset of the MTL format the viewer renders: `newmtl`, `Kd`,
/// `Ns`, `d`/`Tr` and `map_Kd`.
pub fn parse_mtl(data: &str) -> Result<MaterialLibrary> {
    let mut materials: Vec<Material> = Vec::new();

    for (line_no, line) in data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        let Some(tag) = parts.next() else {
            continue;
        };
        if tag == "newmtl" {
            let name = parts.collect::<Vec<_>>().join(" ");
            if name.is_empty() {
                return Err(anyhow!("unnamed material on line {}", line_no + 1));
            }
            materials.push(Material::authored(name, 0xFFFFFF));
            continue;
        }
        let Some(current) = materials.last_mut() else {
            continue;
        };
        match tag {
            "Kd" => {
                let rgb = parse_floats::<3>(parts)
                    .with_context(|| format!("invalid Kd on line {}", line_no + 1))?;
                current.color = rgb_to_hex(rgb.into());
            }
            "Ns" => {
                let [shininess] = parse_floats::<1>(parts)
                    .with_context(|| format!("invalid Ns on line {}", line_no + 1))?;
                current.roughness = shininess_to_roughness(shininess);
            }
            "d" => {
                let [d] = parse_floats::<1>(parts)
                    .with_context(|| format!("invalid d on line {}", line_no + 1))?;
                current.opacity = d.clamp(0.0, 1.0);
            }
            "Tr" => {
                let [tr] = parse_floats::<1>(parts)
                    .with_context(|| format!("invalid Tr on line {}", line_no + 1))?;
                current.opacity = (1.0 - tr).clamp(0.0, 1.0);
            }
            "map_Kd" => {
                // Options such as `-s 1 1 1` precede the file name.
                if let Some(path) = parts.last() {
                    current.texture_path = Some(path.to_string());
                }
            }
            _ => {}
        }
    }

    Ok(MaterialLibrary { materials })
}

fn parse_floats<'a, const N: usize>(mut parts: impl Iterator<Item = &'a str>) -> Result<[f32; N]> {
    let mut out = [0.0; N];
    for slot in &mut out {
        let value = parts
            .next()
            .ok_or_else(|| anyhow!("missing component"))?
            .parse::<f32>()?;
        if !value.is_finite() {
            return Err(anyhow!("non-finite component"));
        }
        *slot = value;
    }
    Ok(out)
}

fn shininess_to_roughness(shininess: f32) -> f32 {
    1.0 - (shininess.clamp(0.0, 1000.0) / 1000.0).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multiple_materials() {
        let data = "# exported\nnewmtl denim\nKd 0.0 0.0 1.0\nNs 250\nd 0.5\n\nnewmtl button\nKd 1 1 0\nmap_Kd -s 2 2 1 textures/button.png\n";
        let library = parse_mtl(data).unwrap();
        assert_eq!(library.len(), 2);

        let denim = library.get("denim").unwrap();
        assert_eq!(denim.color, 0x0000FF);
        assert_eq!(denim.opacity, 0.5);
        assert!((denim.roughness - 0.5).abs() < 1e-5);

        let button = library.get("button").unwrap();
        assert_eq!(button.color, 0xFFFF00);
        assert_eq!(button.texture_path.as_deref(), Some("textures/button.png"));
        assert!(library.get("lining").is_none());
    }

    #[test]
    fn statements_before_newmtl_are_ignored() {
        let library = parse_mtl("Kd 1 0 0\nnewmtl a\n").unwrap();
        assert_eq!(library.get("a").unwrap().color, 0xFFFFFF);
    }

    #[test]
    fn rejects_malformed_color() {
        let err = parse_mtl("newmtl a\nKd 1 zero 0\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
