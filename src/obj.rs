//! Loading triangle soups from Wavefront OBJ files.

use std::{fs, path::Path};

use thiserror::Error;
use wavefront_obj::obj::{ObjSet, Primitive};

use crate::{
    bvh::BvhTriangle,
    geometry::{DEGENERATE_EPSILON, FloatType, Triangle, WorldPoint, WorldVector},
};

#[derive(Debug, Error)]
pub enum ObjOpenError {
    #[error("Failed to read file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse file: {0}")]
    ParseError(#[from] wavefront_obj::ParseError),
}

/// Per-face data carried as the triangle payload.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceData {
    /// Index of the OBJ object the face came from
    pub object: usize,
    /// Material name from `usemtl`, if any
    pub material: Option<String>,
    /// Unit vertex normals, present only if all three vertices have a non-zero one
    pub normals: Option<Triangle<WorldVector>>,
}

pub fn load_obj(
    path: impl AsRef<Path>,
    scale: FloatType,
) -> Result<Vec<BvhTriangle<FaceData>>, ObjOpenError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    let triangles = parse_obj(content, scale)?;
    log::debug!("Loaded {} triangles from {}", triangles.len(), path.display());
    Ok(triangles)
}

/// Parses OBJ text, multiplying all vertex positions by `scale`.
/// Points and lines are skipped.
pub fn parse_obj(
    content: impl Into<String>,
    scale: FloatType,
) -> Result<Vec<BvhTriangle<FaceData>>, ObjOpenError> {
    let parsed = wavefront_obj::obj::parse(content.into())?;
    Ok(collect_triangles(parsed, scale))
}

fn collect_triangles(obj: ObjSet, scale: FloatType) -> Vec<BvhTriangle<FaceData>> {
    let mut triangles = Vec::new();
    let mut skipped = 0usize;

    for (object_index, o) in obj.objects.iter().enumerate() {
        let position = |i: usize| {
            let v = &o.vertices[i];
            WorldPoint::new(v.x as FloatType, v.y as FloatType, v.z as FloatType) * scale
        };
        // Zero length normals are dropped, as if the vertex had none
        let normal = |i: Option<usize>| {
            let n = &o.normals[i?];
            WorldVector::new(n.x as FloatType, n.y as FloatType, n.z as FloatType)
                .try_normalize(DEGENERATE_EPSILON)
        };

        for geometry in &o.geometry {
            for shape in &geometry.shapes {
                let Primitive::Triangle(a, b, c) = &shape.primitive else {
                    skipped += 1;
                    continue;
                };

                let normals = match [a.2, b.2, c.2].map(normal) {
                    [Some(na), Some(nb), Some(nc)] => Some(Triangle::new(na, nb, nc)),
                    _ => None,
                };

                triangles.push(BvhTriangle::new(
                    position(a.0),
                    position(b.0),
                    position(c.0),
                    FaceData {
                        object: object_index,
                        material: geometry.material_name.clone(),
                        normals,
                    },
                ));
            }
        }
    }

    if skipped > 0 {
        log::warn!("Skipped {skipped} non-triangle primitives");
    }

    triangles
}
