use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

const MAGIC: &[u8; 4] = b"GVSB";
const HEADER_LEN: usize = 16;
const TRAILER_LEN: usize = 16;

/// File entry from the bundle table of contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleEntry {
    pub name: String,
    pub offset: u64,
    pub size: u64,
}

/// Self-contained backdrop scene: scene XML plus the mesh and texture files
/// it references, in one binary container.
///
/// Layout: `GVSB`, `u32` version, `u64` TOC offset, file blobs, scene XML,
/// then the TOC (`u32` count, per entry `u32` name length, name, `u64`
/// offset, `u64` size) and a trailer of `u64` scene offset and `u64` scene
/// size. Integers are little- or big-endian; both are accepted.
#[derive(Debug, Clone)]
pub struct SceneBundle {
    label: String,
    data: Arc<[u8]>,
    version: u32,
    files: Vec<BundleEntry>,
    scene_xml: String,
}

impl SceneBundle {
    pub fn from_bytes(label: impl Into<String>, data: Vec<u8>) -> Result<Self> {
        let label = label.into();
        let data: Arc<[u8]> = Arc::from(data.into_boxed_slice());
        let (version, files, scene_xml) =
            parse_bundle(&data).with_context(|| format!("invalid scene bundle {label}"))?;
        Ok(Self {
            label,
            data,
            version,
            files,
            scene_xml,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn scene_xml(&self) -> &str {
        &self.scene_xml
    }

    pub fn files(&self) -> &[BundleEntry] {
        &self.files
    }

    pub fn file(&self, name: &str) -> Option<&BundleEntry> {
        self.files.iter().find(|entry| entry.name == name)
    }

    pub fn extract_file(&self, name: &str) -> Result<&[u8]> {
        let entry = self
            .file(name)
            .ok_or_else(|| anyhow!("file not found in bundle {}: {name}", self.label))?;
        let (start, end) = span(entry.offset, entry.size, self.data.len())
            .ok_or_else(|| anyhow!("entry {} extends past bundle bounds", entry.name))?;
        Ok(&self.data[start..end])
    }

    pub fn extract_text(&self, name: &str) -> Result<&str> {
        let bytes = self.extract_file(name)?;
        std::str::from_utf8(bytes).with_context(|| format!("{name} is not valid UTF-8"))
    }
}

/// Byte order used by [`encode`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BundleEndian {
    Little,
    Big,
}

impl BundleEndian {
    fn decode_u32(self, bytes: [u8; 4]) -> u32 {
        match self {
            Self::Little => u32::from_le_bytes(bytes),
            Self::Big => u32::from_be_bytes(bytes),
        }
    }

    fn decode_u64(self, bytes: [u8; 8]) -> u64 {
        match self {
            Self::Little => u64::from_le_bytes(bytes),
            Self::Big => u64::from_be_bytes(bytes),
        }
    }

    fn encode_u32(self, value: u32) -> [u8; 4] {
        match self {
            Self::Little => value.to_le_bytes(),
            Self::Big => value.to_be_bytes(),
        }
    }

    fn encode_u64(self, value: u64) -> [u8; 8] {
        match self {
            Self::Little => value.to_le_bytes(),
            Self::Big => value.to_be_bytes(),
        }
    }
}

/// Builds a bundle buffer from named files and scene XML.
pub fn encode(endian: BundleEndian, version: u32, files: &[(&str, &[u8])], scene_xml: &str) -> Vec<u8> {
    let mut buffer = Vec::new();
    buffer.extend_from_slice(MAGIC);
    buffer.extend_from_slice(&endian.encode_u32(version));
    buffer.extend_from_slice(&[0; 8]);

    let mut entries = Vec::with_capacity(files.len());
    for (name, data) in files {
        entries.push((*name, buffer.len() as u64, data.len() as u64));
        buffer.extend_from_slice(data);
    }

    let scene_offset = buffer.len() as u64;
    buffer.extend_from_slice(scene_xml.as_bytes());

    let toc_offset = buffer.len() as u64;
    buffer.extend_from_slice(&endian.encode_u32(entries.len() as u32));
    for (name, offset, size) in &entries {
        buffer.extend_from_slice(&endian.encode_u32(name.len() as u32));
        buffer.extend_from_slice(name.as_bytes());
        buffer.extend_from_slice(&endian.encode_u64(*offset));
        buffer.extend_from_slice(&endian.encode_u64(*size));
    }
    buffer.extend_from_slice(&endian.encode_u64(scene_offset));
    buffer.extend_from_slice(&endian.encode_u64(scene_xml.len() as u64));
    buffer[8..16].copy_from_slice(&endian.encode_u64(toc_offset));
    buffer
}

fn parse_bundle(data: &[u8]) -> Result<(u32, Vec<BundleEntry>, String)> {
    if data.len() < HEADER_LEN + TRAILER_LEN + 4 {
        return Err(anyhow!("bundle too small (len={})", data.len()));
    }
    if &data[..4] != MAGIC {
        return Err(anyhow!(
            "invalid bundle magic: expected GVSB, found {:?}",
            &data[..4]
        ));
    }
    let version_bytes = read_array::<4>(data, 4)?;
    let toc_bytes = read_array::<8>(data, 8)?;

    let mut last_error = None;
    for endian in [BundleEndian::Little, BundleEndian::Big] {
        let toc_offset = endian.decode_u64(toc_bytes);
        match parse_toc(data, endian, toc_offset) {
            Ok((files, scene_xml)) => {
                return Ok((endian.decode_u32(version_bytes), files, scene_xml));
            }
            Err(err) => last_error = Some(err),
        }
    }
    Err(last_error.unwrap_or_else(|| anyhow!("unable to locate bundle table of contents")))
}

fn parse_toc(data: &[u8], endian: BundleEndian, toc_offset: u64) -> Result<(Vec<BundleEntry>, String)> {
    let len = data.len();
    let toc_end = len - TRAILER_LEN;
    let mut cursor = usize::try_from(toc_offset)
        .ok()
        .filter(|start| (HEADER_LEN..toc_end).contains(start))
        .ok_or_else(|| anyhow!("TOC offset {toc_offset} is outside bundle bounds"))?;

    let count = endian.decode_u32(read_array(data, cursor)?);
    cursor += 4;
    let mut files = Vec::new();
    for _ in 0..count {
        let name_len = endian.decode_u32(read_array(data, cursor)?) as usize;
        cursor += 4;
        let name_end = cursor
            .checked_add(name_len)
            .filter(|end| *end <= toc_end)
            .ok_or_else(|| anyhow!("file name extends past TOC region"))?;
        let name = String::from_utf8(data[cursor..name_end].to_vec())
            .context("invalid UTF-8 in file name")?;
        cursor = name_end;
        let offset = endian.decode_u64(read_array(data, cursor)?);
        let size = endian.decode_u64(read_array(data, cursor + 8)?);
        cursor += 16;
        if span(offset, size, len).is_none() {
            return Err(anyhow!(
                "file entry {name} points outside bundle bounds (offset={offset}, size={size}, len={len})"
            ));
        }
        files.push(BundleEntry { name, offset, size });
    }
    if cursor != toc_end {
        return Err(anyhow!("TOC parsing ended at {cursor}, expected {toc_end}"));
    }

    let scene_offset = endian.decode_u64(read_array(data, toc_end)?);
    let scene_size = endian.decode_u64(read_array(data, toc_end + 8)?);
    let (start, end) = span(scene_offset, scene_size, len).ok_or_else(|| {
        anyhow!("scene blob points outside bundle bounds (offset={scene_offset}, size={scene_size})")
    })?;
    let scene_xml =
        String::from_utf8(data[start..end].to_vec()).context("scene XML is not valid UTF-8")?;
    Ok((files, scene_xml))
}

fn read_array<const N: usize>(data: &[u8], at: usize) -> Result<[u8; N]> {
    data.get(at..at + N)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| anyhow!("unexpected end of bundle while reading {N} bytes at {at}"))
}

fn span(offset: u64, size: u64, len: usize) -> Option<(usize, usize)> {
    let start = usize::try_from(offset).ok()?;
    let end = start.checked_add(usize::try_from(size).ok()?)?;
    (end <= len).then_some((start, end))
}
