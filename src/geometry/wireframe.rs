//! Line segment geometry for visualising boxes, triangles and rays.

use std::io::{self, Write};

use super::{FloatType, Triangle, WorldBox, WorldPoint, WorldVector};

pub type LineSegment = [WorldPoint; 2];

/// Twelve edges of a box.
pub fn box_edges(b: &WorldBox) -> [LineSegment; 12] {
    let (min, max) = (b.min, b.max);
    let corner = |x: bool, y: bool, z: bool| {
        WorldPoint::new(
            if x { max.x } else { min.x },
            if y { max.y } else { min.y },
            if z { max.z } else { min.z },
        )
    };

    [
        // Edges along x
        [corner(false, false, false), corner(true, false, false)],
        [corner(false, true, false), corner(true, true, false)],
        [corner(false, false, true), corner(true, false, true)],
        [corner(false, true, true), corner(true, true, true)],
        // Edges along y
        [corner(false, false, false), corner(false, true, false)],
        [corner(true, false, false), corner(true, true, false)],
        [corner(false, false, true), corner(false, true, true)],
        [corner(true, false, true), corner(true, true, true)],
        // Edges along z
        [corner(false, false, false), corner(false, false, true)],
        [corner(true, false, false), corner(true, false, true)],
        [corner(false, true, false), corner(false, true, true)],
        [corner(true, true, false), corner(true, true, true)],
    ]
}

/// Outline of a triangle, drawn twice shifted by -offset and +offset along all axes,
/// so that it stays visible on top of the triangle surface itself.
pub fn triangle_edges(triangle: &Triangle<WorldPoint>, offset: FloatType) -> Vec<LineSegment> {
    let shift = WorldVector::repeat(offset);
    [-shift, shift]
        .into_iter()
        .flat_map(|shift| {
            triangle
                .edge_endpoints()
                .map(|(a, b)| [a + shift, b + shift])
        })
        .collect()
}

/// Writes segments as Wavefront OBJ line elements.
pub fn write_obj_lines<'a>(
    mut out: impl Write,
    segments: impl IntoIterator<Item = &'a LineSegment>,
) -> io::Result<()> {
    let mut vertex_count = 0usize;
    for [a, b] in segments {
        writeln!(out, "v {} {} {}", a.x, a.y, a.z)?;
        writeln!(out, "v {} {} {}", b.x, b.y, b.z)?;
        // OBJ indices are one based
        writeln!(out, "l {} {}", vertex_count + 1, vertex_count + 2)?;
        vertex_count += 2;
    }
    Ok(())
}
