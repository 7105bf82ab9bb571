//! Output facade for the simplified mesh.
//!
//! The mesh is handed out as a flat list of ccw triangles lifted to the
//! field's elevations (with per-vertex color when textured), ready for
//! rendering or export. Exports cover Wavefront OBJ and an SVG
//! wireframe of the planar triangulation for quick inspection.

use std::collections::HashMap;
use std::io::{self, Write};

use svg::node::element::{self, Group, Style};
use svg::Document;

use crate::common::*;
use crate::heightfield::HeightField;
use crate::quadedge::Subdivision;

/// One output triangle: lifted positions in ccw order, plus per-vertex
/// color when the field carries a texture.
#[derive(Debug, Clone)]
pub struct MeshTriangle {
    pub p: [DVec3; 3],
    pub color: Option<[[f64; 3]; 3]>,
}

/// Extract every face of the subdivision as a lifted triangle.
pub fn extract(sub: &Subdivision, hf: &HeightField) -> Vec<MeshTriangle> {
    sub.faces()
        .iter()
        .map(|(fid, _)| {
            let (a, b, c) = sub.tri_points(fid);
            let lift = |p: DVec2| vec3(p.x, p.y, hf.eval_at(p));
            let color = if hf.has_texture() {
                let rgb = |p: DVec2| {
                    let (r, g, b) = hf.color_at(p);
                    [r, g, b]
                };
                Some([rgb(a), rgb(b), rgb(c)])
            } else {
                None
            };
            MeshTriangle {
                p: [lift(a), lift(b), lift(c)],
                color,
            }
        })
        .collect()
}

/// Write the mesh as Wavefront OBJ, deduplicating shared vertices.
/// Colors, when present, use the common `v x y z r g b` extension.
pub fn write_obj<W: Write>(out: &mut W, tris: &[MeshTriangle]) -> io::Result<()> {
    let mut index: HashMap<(i64, i64), usize> = HashMap::new();
    let mut vert_lines: Vec<String> = Vec::new();
    let mut faces: Vec<[usize; 3]> = Vec::with_capacity(tris.len());

    for t in tris {
        let mut f = [0usize; 3];
        for (k, p) in t.p.iter().enumerate() {
            let key = (p.x.round() as i64, p.y.round() as i64);
            let next = vert_lines.len();
            let idx = *index.entry(key).or_insert(next);
            if idx == next {
                vert_lines.push(match &t.color {
                    Some(c) => format!(
                        "v {} {} {} {:.6} {:.6} {:.6}",
                        p.x, p.y, p.z, c[k][0], c[k][1], c[k][2]
                    ),
                    None => format!("v {} {} {}", p.x, p.y, p.z),
                });
            }
            // OBJ indices are 1-based
            f[k] = idx + 1;
        }
        faces.push(f);
    }

    for l in &vert_lines {
        writeln!(out, "{}", l)?;
    }
    for f in &faces {
        writeln!(out, "f {} {} {}", f[0], f[1], f[2])?;
    }
    Ok(())
}

pub struct SvgOptions {
    pub width: f64,
    pub height: f64,
}

/// Render the planar triangulation as an SVG wireframe, grid
/// coordinates scaled to the requested document size.
pub fn wireframe_svg(sub: &Subdivision, hf: &HeightField, options: &SvgOptions) -> Document {
    let sx = options.width / (hf.width() - 1).max(1) as f64;
    let sy = options.height / (hf.height() - 1).max(1) as f64;

    let mut g = Group::new().set("class", "mesh");
    for e in sub.edges() {
        let o = sub.org(e);
        let d = sub.dest(e);
        g = g.add(
            element::Line::new()
                .set("x1", o.x * sx)
                .set("y1", o.y * sy)
                .set("x2", d.x * sx)
                .set("y2", d.y * sy),
        );
    }

    Document::new()
        .set("width", format!("{}", options.width))
        .set("height", format!("{}", options.height))
        .add(Style::new(
            ".mesh { stroke-width: 0.5; fill: none; stroke: #444444; }",
        ))
        .add(g)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::heightfield::HeightField;
    use crate::quadedge::Subdivision;

    fn two_triangle_setup() -> (HeightField, Subdivision) {
        let hf = HeightField::new(4, 4, (0..16).map(|i| i as u16).collect(), None);
        let sub = Subdivision::new(
            vec2(0.0, 0.0),
            vec2(3.0, 0.0),
            vec2(3.0, 3.0),
            vec2(0.0, 3.0),
            true,
        );
        (hf, sub)
    }

    #[test]
    fn extract_lifts_elevations() {
        let (hf, sub) = two_triangle_setup();
        let tris = extract(&sub, &hf);
        assert_eq!(tris.len(), 2);
        for t in &tris {
            for p in &t.p {
                assert_eq!(p.z, hf.eval(p.x as i32, p.y as i32));
            }
            assert!(t.color.is_none());
        }
    }

    #[test]
    fn obj_deduplicates_shared_vertices() {
        let (hf, sub) = two_triangle_setup();
        let tris = extract(&sub, &hf);
        let mut out = Vec::new();
        write_obj(&mut out, &tris).unwrap();
        let text = String::from_utf8(out).unwrap();
        let nv = text.lines().filter(|l| l.starts_with("v ")).count();
        let nf = text.lines().filter(|l| l.starts_with("f ")).count();
        // two triangles over a rectangle share the diagonal's vertices
        assert_eq!((nv, nf), (4, 2));
        for l in text.lines().filter(|l| l.starts_with("f ")) {
            let idx: Vec<usize> = l[2..]
                .split_whitespace()
                .map(|t| t.parse().unwrap())
                .collect();
            assert!(idx.iter().all(|&i| i >= 1 && i <= nv));
        }
    }

    #[test]
    fn svg_wireframe_has_all_edges() {
        let (hf, sub) = two_triangle_setup();
        let doc = wireframe_svg(
            &sub,
            &hf,
            &SvgOptions {
                width: 300.0,
                height: 300.0,
            },
        );
        let text = doc.to_string();
        // 4 perimeter edges plus the diagonal
        assert_eq!(text.matches("<line").count(), 5);
    }
}
