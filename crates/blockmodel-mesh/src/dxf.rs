//! Minimal ASCII DXF reader for triangulated entities.
//!
//! Reads group-code/value pairs from the `ENTITIES` section and returns one
//! [`FaceRecord`] per model-space entity. Only `3DFACE` entities carry
//! corner coordinates; everything else is tagged by type and left empty so
//! that [`MeshBuilder`](crate::MeshBuilder) can ignore it.

use std::path::Path;

use blockmodel_math::Point3;

use crate::builder::{EntityKind, FaceRecord};
use crate::error::{MeshError, Result};

const BINARY_SENTINEL: &[u8] = b"AutoCAD Binary DXF";

/// Read a DXF file from a path.
pub fn read_dxf(path: impl AsRef<Path>) -> Result<Vec<FaceRecord>> {
    let data = std::fs::read(path)?;
    if data.starts_with(BINARY_SENTINEL) {
        return Err(MeshError::BinaryDxf);
    }
    let text = String::from_utf8_lossy(&data);
    parse_dxf(&text)
}

/// Parse ASCII DXF content.
pub fn parse_dxf(text: &str) -> Result<Vec<FaceRecord>> {
    if text.as_bytes().starts_with(BINARY_SENTINEL) {
        return Err(MeshError::BinaryDxf);
    }

    let mut pairs = GroupPairs::new(text);
    let mut records = Vec::new();
    let mut in_entities = false;
    let mut expect_section_name = false;
    let mut current: Option<EntityBuilder> = None;

    while let Some(pair) = pairs.next_pair()? {
        let (line, code, value) = pair;

        if expect_section_name {
            expect_section_name = false;
            if code == 2 {
                in_entities = value == "ENTITIES";
                continue;
            }
        }

        if code == 0 {
            if let Some(entity) = current.take() {
                if let Some(record) = entity.finish() {
                    records.push(record);
                }
            }
            match value {
                "SECTION" => expect_section_name = true,
                "ENDSEC" => in_entities = false,
                "EOF" => break,
                name if in_entities => current = Some(EntityBuilder::new(name)),
                _ => {}
            }
            continue;
        }

        if let Some(entity) = current.as_mut() {
            entity.apply(line, code, value)?;
        }
    }

    if let Some(entity) = current.take() {
        if let Some(record) = entity.finish() {
            records.push(record);
        }
    }

    tracing::debug!(entities = records.len(), "Parsed DXF entities");
    Ok(records)
}

/// Iterator over `(line, group code, value)` pairs.
struct GroupPairs<'a> {
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
}

impl<'a> GroupPairs<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().enumerate(),
        }
    }

    fn next_pair(&mut self) -> Result<Option<(usize, i32, &'a str)>> {
        let (code_idx, code_line) = loop {
            match self.lines.next() {
                // Tolerate trailing blank lines after EOF.
                Some((_, l)) if l.trim().is_empty() => continue,
                Some(entry) => break entry,
                None => return Ok(None),
            }
        };
        let code: i32 = code_line
            .trim()
            .parse()
            .map_err(|_| {
                MeshError::dxf(
                    code_idx + 1,
                    format!("invalid group code '{}'", code_line.trim()),
                )
            })?;
        let (value_idx, value_line) = self
            .lines
            .next()
            .ok_or_else(|| {
                MeshError::dxf(code_idx + 1, format!("group code {} has no value", code))
            })?;
        Ok(Some((value_idx + 1, code, value_line.trim())))
    }
}

/// Accumulates group values for one entity.
struct EntityBuilder {
    kind: EntityKind,
    corners: [[f64; 3]; 4],
    seen: [bool; 4],
    paper_space: bool,
}

impl EntityBuilder {
    fn new(name: &str) -> Self {
        Self {
            kind: EntityKind::from_dxf_name(name),
            corners: [[0.0; 3]; 4],
            seen: [false; 4],
            paper_space: false,
        }
    }

    fn apply(&mut self, line: usize, code: i32, value: &str) -> Result<()> {
        if code == 67 {
            self.paper_space = value == "1";
            return Ok(());
        }
        if self.kind != EntityKind::Face3d {
            return Ok(());
        }
        // 10..13 = x of corners 0..3, 20..23 = y, 30..33 = z.
        let (axis, corner) = match code {
            10..=13 => (0, code - 10),
            20..=23 => (1, code - 20),
            30..=33 => (2, code - 30),
            _ => return Ok(()),
        };
        let v: f64 = value.parse().map_err(|_| {
            MeshError::dxf(
                line,
                format!("invalid coordinate '{}' for group {}", value, code),
            )
        })?;
        self.corners[corner as usize][axis] = v;
        self.seen[corner as usize] = true;
        Ok(())
    }

    fn finish(self) -> Option<FaceRecord> {
        if self.paper_space {
            return None;
        }
        let corners = if self.kind == EntityKind::Face3d {
            let mut corners: Vec<Point3> = self.corners[..3]
                .iter()
                .map(|c| Point3::new(c[0], c[1], c[2]))
                .collect();
            // A missing fourth corner means a triangle: repeat the third.
            let fourth = if self.seen[3] { self.corners[3] } else { self.corners[2] };
            corners.push(Point3::new(fourth[0], fourth[1], fourth[2]));
            corners
        } else {
            Vec::new()
        };
        Some(FaceRecord {
            kind: self.kind,
            corners,
        })
    }
}
