use std::collections::HashMap;
use std::f32::consts::PI;

use anyhow::{anyhow, Context, Result};
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::shadow::Plane;

/// Indexed triangle geometry shared by receivers and casters.
///
/// Geometry is immutable once built; placement and colour are supplied per
/// draw through [`crate::frame::InstanceParams`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Mesh {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub triangles: Vec<[u32; 3]>,
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn index_count(&self) -> usize {
        self.triangles.len() * 3
    }

    /// Interleaved `position.xyz, normal.xyz` vertex stream.
    pub fn interleaved(&self) -> Vec<f32> {
        self.positions
            .iter()
            .zip(&self.normals)
            .flat_map(|(p, n)| [p.x, p.y, p.z, n.x, n.y, n.z])
            .collect()
    }

    pub fn flat_indices(&self) -> Vec<u32> {
        self.triangles.iter().flatten().copied().collect()
    }
}

/// Per-vertex normals where each incident face contributes in proportion to
/// its corner angle at that vertex.
pub fn angle_weighted_normals(positions: &[Vec3], triangles: &[[u32; 3]]) -> Vec<Vec3> {
    let mut accum = vec![Vec3::ZERO; positions.len()];
    for triangle in triangles {
        let [a, b, c] = triangle.map(|i| positions[i as usize]);
        let face = (b - a).cross(c - a);
        if face.length_squared() <= f32::EPSILON * f32::EPSILON {
            continue;
        }
        let face = face.normalize();
        let corners = [(a, b, c), (b, c, a), (c, a, b)];
        for (&index, (at, next, prev)) in triangle.iter().zip(corners) {
            let angle = (next - at).angle_between(prev - at);
            if angle.is_finite() {
                accum[index as usize] += face * angle;
            }
        }
    }
    accum.into_iter().map(Vec3::normalize_or_zero).collect()
}

/// Unit cube centred on the origin with one flat-shaded quad per face.
pub fn box_mesh() -> Mesh {
    const FACES: [(Vec3, [[f32; 3]; 4]); 6] = [
        (
            Vec3::Z,
            [[-0.5, 0.5, 0.5], [0.5, 0.5, 0.5], [0.5, -0.5, 0.5], [-0.5, -0.5, 0.5]],
        ),
        (
            Vec3::X,
            [[0.5, 0.5, 0.5], [0.5, 0.5, -0.5], [0.5, -0.5, -0.5], [0.5, -0.5, 0.5]],
        ),
        (
            Vec3::NEG_Z,
            [[0.5, 0.5, -0.5], [-0.5, 0.5, -0.5], [-0.5, -0.5, -0.5], [0.5, -0.5, -0.5]],
        ),
        (
            Vec3::NEG_X,
            [[-0.5, 0.5, -0.5], [-0.5, 0.5, 0.5], [-0.5, -0.5, 0.5], [-0.5, -0.5, -0.5]],
        ),
        (
            Vec3::Y,
            [[-0.5, 0.5, -0.5], [0.5, 0.5, -0.5], [0.5, 0.5, 0.5], [-0.5, 0.5, 0.5]],
        ),
        (
            Vec3::NEG_Y,
            [[-0.5, -0.5, -0.5], [0.5, -0.5, -0.5], [0.5, -0.5, 0.5], [-0.5, -0.5, 0.5]],
        ),
    ];

    let mut mesh = Mesh::default();
    for (face, (normal, corners)) in FACES.iter().enumerate() {
        let base = (face * 4) as u32;
        mesh.positions.extend(corners.iter().map(|c| Vec3::from_array(*c)));
        mesh.normals.extend([*normal; 4]);
        // Bottom corners run the other way round when seen from outside.
        if *normal == Vec3::NEG_Y {
            mesh.triangles.push([base, base + 1, base + 2]);
            mesh.triangles.push([base + 3, base, base + 2]);
        } else {
            mesh.triangles.push([base + 2, base + 1, base]);
            mesh.triangles.push([base + 2, base, base + 3]);
        }
    }
    mesh
}

/// Square of side `2 * half_size` lying on `plane`, wound counter-clockwise
/// around the plane normal.
pub fn receiver_quad(plane: &Plane, half_size: f32) -> Mesh {
    let n = plane.normal();
    let (u, v) = n.any_orthonormal_pair();
    let v = if u.cross(v).dot(n) > 0.0 { v } else { -v };
    let o = plane.origin();
    let s = half_size;
    Mesh {
        positions: vec![
            o - u * s - v * s,
            o + u * s - v * s,
            o - u * s + v * s,
            o + u * s + v * s,
        ],
        normals: vec![n; 4],
        triangles: vec![[0, 1, 3], [0, 3, 2]],
    }
}

/// Latitude/longitude sphere used as the default shadow caster model.
pub fn uv_sphere(radius: f32, rings: u32, segments: u32) -> Mesh {
    let rings = rings.max(2);
    let segments = segments.max(3);
    let mut mesh = Mesh::default();

    for ring in 0..=rings {
        let theta = PI * ring as f32 / rings as f32;
        for segment in 0..=segments {
            let phi = 2.0 * PI * segment as f32 / segments as f32;
            let normal = Vec3::new(theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin());
            mesh.positions.push(normal * radius);
            mesh.normals.push(normal);
        }
    }

    let stride = segments + 1;
    for ring in 0..rings {
        for segment in 0..segments {
            let a = ring * stride + segment;
            let b = a + stride;
            mesh.triangles.push([a, a + 1, b]);
            mesh.triangles.push([a + 1, b + 1, b]);
        }
    }
    mesh
}

/// Parses a Wavefront OBJ document into a [`Mesh`].
///
/// Polygons are fan-triangulated. Vertices without an explicit `vn` get
/// angle-weighted normals.
pub fn load_obj_from_str(data: &str) -> Result<Mesh> {
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut faces: Vec<[FaceIndex; 3]> = Vec::new();

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
            "f" => {
                let polygon = parse_face(parts)
                    .with_context(|| format!("invalid face on line {}", line_no + 1))?;
                for i in 1..polygon.len() - 1 {
                    faces.push([polygon[0], polygon[i], polygon[i + 1]]);
                }
            }
            _ => {}
        }
    }

    if positions.is_empty() {
        return Err(anyhow!("OBJ file does not define any vertices"));
    }
    build_mesh(&positions, &normals, &faces)
}

fn parse_vec3<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Vec3> {
    let mut component = || -> Result<f32> {
        Ok(parts
            .next()
            .ok_or_else(|| anyhow!("missing vector component"))?
            .parse::<f32>()?)
    };
    Ok(Vec3::new(component()?, component()?, component()?))
}

fn parse_face<'a>(parts: impl Iterator<Item = &'a str>) -> Result<Vec<FaceIndex>> {
    let mut indices = Vec::new();
    for part in parts {
        let mut segments = part.split('/');
        let v = segments
            .next()
            .ok_or_else(|| anyhow!("missing vertex index"))?
            .parse::<i32>()?;
        let vn = segments
            .nth(1)
            .filter(|s| !s.is_empty())
            .map(str::parse::<i32>)
            .transpose()?
            .unwrap_or(0);
        indices.push(FaceIndex { v, vn });
    }
    if indices.len() < 3 {
        return Err(anyhow!("faces must reference at least 3 vertices"));
    }
    Ok(indices)
}

#[derive(Debug, Clone, Copy)]
struct FaceIndex {
    v: i32,
    vn: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Key {
    position: usize,
    normal: Option<usize>,
}

fn build_mesh(positions: &[Vec3], normals: &[Vec3], faces: &[[FaceIndex; 3]]) -> Result<Mesh> {
    let mut lookup: HashMap<Key, u32> = HashMap::new();
    let mut mesh = Mesh::default();
    let mut explicit = Vec::new();

    for face in faces {
        let mut triangle = [0u32; 3];
        for (slot, idx) in triangle.iter_mut().zip(face) {
            let position =
                fix_index(idx.v, positions.len()).ok_or_else(|| anyhow!("invalid vertex index"))?;
            let normal = fix_index(idx.vn, normals.len());
            let key = Key { position, normal };
            *slot = *lookup.entry(key).or_insert_with(|| {
                mesh.positions.push(positions[position]);
                explicit.push(normal.map(|i| normals[i]));
                (mesh.positions.len() - 1) as u32
            });
        }
        mesh.triangles.push(triangle);
    }

    let derived = angle_weighted_normals(&mesh.positions, &mesh.triangles);
    mesh.normals = explicit
        .into_iter()
        .zip(derived)
        .map(|(given, derived)| {
            given
                .map(Vec3::normalize_or_zero)
                .filter(|n| *n != Vec3::ZERO)
                .unwrap_or(derived)
        })
        .collect();
    Ok(mesh)
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

#[cfg(test)]
mod tests {
    use super::*;

    fn face_normal(mesh: &Mesh, triangle: [u32; 3]) -> Vec3 {
        let [a, b, c] = triangle.map(|i| mesh.positions[i as usize]);
        (b - a).cross(c - a).normalize()
    }

    #[test]
    fn parses_simple_triangle() {
        let obj = "\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        let mesh = load_obj_from_str(obj).unwrap();
        assert_eq!(mesh.triangles, vec![[0, 1, 2]]);
        assert_eq!(mesh.interleaved().len(), 18);
        for normal in &mesh.normals {
            assert!((*normal - Vec3::Z).length() < 1e-5);
        }
    }

    #[test]
    fn keeps_explicit_normals_and_negative_indices() {
        let obj = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nvn 0 0 2\nf -4//1 -3//1 -2//1 -1//1\n";
        let mesh = load_obj_from_str(obj).unwrap();
        assert_eq!(mesh.triangles.len(), 2);
        assert_eq!(mesh.vertex_count(), 4);
        assert!(mesh.normals.iter().all(|n| *n == Vec3::Z));
    }

    #[test]
    fn rejects_out_of_range_faces() {
        assert!(load_obj_from_str("v 0 0 0\nv 1 0 0\nf 1 2 9\n").is_err());
        assert!(load_obj_from_str("# empty\n").is_err());
    }

    #[test]
    fn angle_weighting_favours_wide_corners() {
        // Two faces share vertex 0: one with a 90 degree corner facing +Z,
        // one with a thin corner facing +X.
        let positions = vec![
            Vec3::ZERO,
            Vec3::X,
            Vec3::Y,
            Vec3::new(0.0, 1.0, 0.1),
            Vec3::new(0.0, 1.0, -0.1),
        ];
        let normals = angle_weighted_normals(&positions, &[[0, 1, 2], [0, 4, 3]]);
        assert!(normals[0].z > normals[0].x.abs());
    }

    #[test]
    fn box_faces_point_outward() {
        let mesh = box_mesh();
        assert_eq!(mesh.vertex_count(), 24);
        assert_eq!(mesh.index_count(), 36);
        for triangle in &mesh.triangles {
            let normal = face_normal(&mesh, *triangle);
            let stored = mesh.normals[triangle[0] as usize];
            assert!((normal - stored).length() < 1e-5, "{normal} vs {stored}");
        }
    }

    #[test]
    fn receiver_quad_lies_on_plane_and_faces_normal() {
        let plane = Plane::horizontal(4.0);
        let mesh = receiver_quad(&plane, 130.0);
        assert!(mesh.positions.iter().all(|p| plane.contains(*p, 1e-4)));
        for triangle in &mesh.triangles {
            assert!((face_normal(&mesh, *triangle) - Vec3::Y).length() < 1e-5);
        }
        let xs: Vec<f32> = mesh.positions.iter().map(|p| p.x.abs()).collect();
        assert!(xs.iter().all(|x| (x - 130.0).abs() < 1e-3));
    }

    #[test]
    fn sphere_winding_is_outward() {
        let mesh = uv_sphere(5.0, 8, 12);
        for triangle in &mesh.triangles {
            let [a, b, c] = triangle.map(|i| mesh.positions[i as usize]);
            let area = (b - a).cross(c - a);
            if area.length() < 1e-4 {
                continue;
            }
            let centroid = (a + b + c) / 3.0;
            assert!(area.dot(centroid) > 0.0);
        }
    }
}
