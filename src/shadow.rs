use glam::{Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Homogeneous `w` values smaller than this are treated as a light sitting on
/// the projected point (or on the receiver plane).
pub const DEGENERATE_W_EPSILON: f32 = 1e-6;

#[derive(Debug, Error, PartialEq)]
pub enum PlaneError {
    #[error("plane normal must be non-zero, got {0}")]
    ZeroNormal(Vec3),
    #[error("plane coefficients must be finite, got normal {normal} offset {offset}")]
    NonFinite { normal: Vec3, offset: f32 },
}

/// Receiving surface defined by `dot(normal, x) + offset = 0`.
///
/// The normal is always unit length. Construction rescales the offset along
/// with the normal so the described surface stays the same.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PlaneCoefficients")]
pub struct Plane {
    normal: Vec3,
    offset: f32,
}

/// Raw `(normal, offset)` pair as written in data, before normalisation.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PlaneCoefficients {
    pub normal: Vec3,
    pub offset: f32,
}

impl TryFrom<PlaneCoefficients> for Plane {
    type Error = PlaneError;

    fn try_from(raw: PlaneCoefficients) -> Result<Self, Self::Error> {
        Plane::new(raw.normal, raw.offset)
    }
}

impl Plane {
    pub fn new(normal: Vec3, offset: f32) -> Result<Self, PlaneError> {
        if !normal.is_finite() || !offset.is_finite() {
            return Err(PlaneError::NonFinite { normal, offset });
        }
        let length = normal.length();
        if length <= f32::EPSILON {
            return Err(PlaneError::ZeroNormal(normal));
        }
        Ok(Self {
            normal: normal / length,
            offset: offset / length,
        })
    }

    /// Floor facing +Y located at `y = -offset`.
    pub fn horizontal(offset: f32) -> Self {
        Self {
            normal: Vec3::Y,
            offset,
        }
    }

    pub fn normal(&self) -> Vec3 {
        self.normal
    }

    pub fn offset(&self) -> f32 {
        self.offset
    }

    /// Signed distance from the plane, positive on the side the normal points to.
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.offset
    }

    pub fn contains(&self, point: Vec3, epsilon: f32) -> bool {
        self.signed_distance(point).abs() <= epsilon
    }

    /// Point on the plane closest to the origin.
    pub fn origin(&self) -> Vec3 {
        -self.normal * self.offset
    }
}

/// Projective transform flattening world-space geometry onto a [`Plane`] as
/// seen from a point light.
///
/// Stored column-major for the column-vector convention (`M * v`) shared by
/// glam and WGSL. The value carries no identity between frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowMatrix(Mat4);

impl ShadowMatrix {
    pub fn as_mat4(&self) -> &Mat4 {
        &self.0
    }

    pub fn to_cols_array_2d(&self) -> [[f32; 4]; 4] {
        self.0.to_cols_array_2d()
    }

    /// Applies the matrix without the homogeneous divide, the way the
    /// rasterizer receives it.
    pub fn transform(&self, point: Vec4) -> Vec4 {
        self.0 * point
    }

    /// Projects a world-space point onto the plane.
    ///
    /// Returns `None` when the homogeneous `w` is (nearly) zero, which happens
    /// when the light coincides with the point's height above the plane.
    pub fn project_point(&self, point: Vec3) -> Option<Vec3> {
        let projected = self.transform(point.extend(1.0));
        if !projected.w.is_finite() || projected.w.abs() < DEGENERATE_W_EPSILON {
            return None;
        }
        Some(projected.truncate() / projected.w)
    }
}

impl From<ShadowMatrix> for Mat4 {
    fn from(matrix: ShadowMatrix) -> Self {
        matrix.0
    }
}

/// Derives the planar shadow matrix for a light and receiver.
pub struct ShadowProjector;

impl ShadowProjector {
    /// Builds the matrix mapping any point `P` to the intersection of the ray
    /// `light -> P` with `plane`, once the homogeneous divide is applied.
    ///
    /// Points already on the plane map to themselves.
    pub fn compute(plane: &Plane, light: Vec3) -> ShadowMatrix {
        let n = plane.normal();
        let d = plane.offset();
        let l = light;
        let dot = n.dot(l);
        let diag = dot + d;

        let rows = [
            [diag - n.x * l.x, -n.y * l.x, -n.z * l.x, -d * l.x],
            [-n.x * l.y, diag - n.y * l.y, -n.z * l.y, -d * l.y],
            [-n.x * l.z, -n.y * l.z, diag - n.z * l.z, -d * l.z],
            [-n.x, -n.y, -n.z, dot],
        ];
        // glam reads the arrays as columns.
        ShadowMatrix(Mat4::from_cols_array_2d(&rows).transpose())
    }

    /// True when the light lies on (or extremely close to) the receiver, in
    /// which case every shadow collapses.
    pub fn is_degenerate(plane: &Plane, light: Vec3) -> bool {
        plane.signed_distance(light).abs() < DEGENERATE_W_EPSILON
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floor() -> Plane {
        Plane::new(Vec3::Y, 4.0).unwrap()
    }

    fn assert_close(a: Vec3, b: Vec3, eps: f32) {
        assert!((a - b).length() <= eps, "expected {b}, got {a}");
    }

    #[test]
    fn new_normalizes_normal_and_offset() {
        let plane = Plane::new(Vec3::new(0.0, 2.0, 0.0), 8.0).unwrap();
        assert_eq!(plane.normal(), Vec3::Y);
        assert_eq!(plane.offset(), 4.0);
        assert!(plane.contains(Vec3::new(3.0, -4.0, 7.0), 1e-6));
    }

    #[test]
    fn zero_normal_is_rejected() {
        assert_eq!(
            Plane::new(Vec3::ZERO, 1.0),
            Err(PlaneError::ZeroNormal(Vec3::ZERO))
        );
        assert!(Plane::new(Vec3::new(f32::NAN, 1.0, 0.0), 1.0).is_err());
    }

    #[test]
    fn raw_coefficients_are_normalized_on_conversion() {
        let plane = Plane::try_from(PlaneCoefficients {
            normal: Vec3::new(0.0, 2.0, 0.0),
            offset: 8.0,
        })
        .unwrap();
        assert_eq!(plane, Plane::horizontal(4.0));

        let zero = Plane::try_from(PlaneCoefficients {
            normal: Vec3::ZERO,
            offset: 4.0,
        });
        assert_eq!(zero, Err(PlaneError::ZeroNormal(Vec3::ZERO)));
    }

    #[test]
    fn matrix_layout_matches_row_definition() {
        let plane = floor();
        let light = Vec3::new(1.0, 30.0, 2.0);
        let m = ShadowProjector::compute(&plane, light);
        let mat = m.as_mat4();
        // Row 3 of the definition is [-n.x, -n.y, -n.z, dot(n, l)].
        assert_eq!(mat.row(3), Vec4::new(0.0, -1.0, 0.0, 30.0));
        // Row 0, column 3 is -d * l.x.
        assert_eq!(mat.col(3).x, -4.0);
    }

    #[test]
    fn points_on_plane_are_fixed() {
        let plane = floor();
        let light = Vec3::new(3.0, 25.0, -7.0);
        let m = ShadowProjector::compute(&plane, light);
        for point in [
            Vec3::new(0.0, -4.0, 0.0),
            Vec3::new(12.5, -4.0, -3.25),
            Vec3::new(-100.0, -4.0, 64.0),
        ] {
            assert_close(m.project_point(point).unwrap(), point, 1e-3);
        }
    }

    #[test]
    fn projection_is_collinear_with_light_and_lands_on_plane() {
        let plane = Plane::new(Vec3::new(0.3, 1.0, -0.2), 2.0).unwrap();
        let light = Vec3::new(-4.0, 40.0, 6.0);
        let m = ShadowProjector::compute(&plane, light);
        for point in [
            Vec3::new(5.0, 3.0, 0.0),
            Vec3::new(-12.0, 9.0, 20.0),
            Vec3::new(1.0, 0.5, -1.0),
        ] {
            let shadow = m.project_point(point).unwrap();
            assert!(plane.contains(shadow, 1e-3), "{shadow} not on plane");
            let to_point = (point - light).normalize();
            let to_shadow = (shadow - light).normalize();
            assert!(to_point.cross(to_shadow).length() < 1e-4);
            assert!(to_point.dot(to_shadow) > 0.0);
        }
    }

    #[test]
    fn projecting_twice_does_not_drift() {
        let plane = floor();
        let light = Vec3::new(2.0, 33.0, 1.0);
        let m = ShadowProjector::compute(&plane, light);
        let once = m.project_point(Vec3::new(7.0, 12.0, -3.0)).unwrap();
        let twice = m.project_point(once).unwrap();
        assert_close(twice, once, 1e-3);
    }

    #[test]
    fn caster_point_below_overhead_light() {
        let plane = floor();
        let light = Vec3::new(0.0, 30.0, 0.0);
        let point = Vec3::new(5.0, 3.0, 0.0);
        let shadow = ShadowProjector::compute(&plane, light)
            .project_point(point)
            .unwrap();
        let ratio = (light.y - (-plane.offset())) / (light.y - point.y);
        assert!((shadow.y + 4.0).abs() < 1e-4);
        assert!((shadow.x - point.x * ratio).abs() < 1e-4);
        assert!(shadow.z.abs() < 1e-6);
    }

    #[test]
    fn light_at_caster_point_is_reported_not_divided() {
        let plane = floor();
        let point = Vec3::new(5.0, 3.0, 0.0);
        let m = ShadowProjector::compute(&plane, point);
        let raw = m.transform(point.extend(1.0));
        assert!(raw.w.abs() < DEGENERATE_W_EPSILON);
        assert_eq!(m.project_point(point), None);
    }

    #[test]
    fn light_on_receiver_is_degenerate() {
        let plane = floor();
        assert!(ShadowProjector::is_degenerate(&plane, Vec3::new(9.0, -4.0, 1.0)));
        assert!(!ShadowProjector::is_degenerate(&plane, Vec3::new(0.0, 30.0, 0.0)));
    }

    #[test]
    fn different_light_heights_give_different_matrices() {
        let plane = floor();
        let a = ShadowProjector::compute(&plane, Vec3::new(0.0, 30.0, 0.0));
        let b = ShadowProjector::compute(&plane, Vec3::new(0.0, 35.0, 0.0));
        assert_ne!(a, b);
    }
}
