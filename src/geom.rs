//! Planar geometry primitives shared by the subdivision and the scan engine.
//!
//! Points live on the integer grid but are carried as `DVec2`; all
//! predicates are exact enough for grid-aligned input.

use crate::common::*;

/// Twice the signed area of the oriented triangle (a, b, c).
///
/// Positive iff the triangle is wound counterclockwise.
pub fn tri_area(a: DVec2, b: DVec2, c: DVec2) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

/// True area and diameter (longest side length) of the triangle (a, b, c),
/// taken in the plane of the grid.
pub fn tri_area_diam(a: DVec2, b: DVec2, c: DVec2) -> (f64, f64) {
    let area = tri_area(a, b, c).abs() * 0.5;
    let diam = glm::length(&(b - a))
        .max(glm::length(&(c - b)))
        .max(glm::length(&(a - c)));
    (area, diam)
}

/// Shape quality of a triangle: area over squared diameter, clamped to
/// [0, 1]. Zero for degenerate slivers; an equilateral triangle scores
/// about 0.43.
pub fn tri_quality(a: DVec2, b: DVec2, c: DVec2) -> f64 {
    let (area, diam) = tri_area_diam(a, b, c);
    if diam <= EPS {
        return 0.0;
    }
    (area / (diam * diam)).min(1.0)
}

/// `a / b`, with a zero result instead of an infinity when `b == 0`.
///
/// The scan sweep relies on this: dividing anyway would leave garbage in
/// the x bounds of horizontal edges and drop valid scan lines.
pub fn divide_safe(a: f64, b: f64) -> f64 {
    if b != 0.0 {
        a / b
    } else {
        0.0
    }
}

/// Intersection of segments a0–a1 and b0–b1, or `None` when they are
/// parallel. Used to cut a quadrilateral by both of its diagonals.
pub fn seg_intersection(a0: DVec2, a1: DVec2, b0: DVec2, b1: DVec2) -> Option<DVec2> {
    let da = a1 - a0;
    let db = b1 - b0;
    let denom = da.x * db.y - da.y * db.x;
    if denom.abs() < EPS {
        return None;
    }
    let t = ((b0.x - a0.x) * db.y - (b0.y - a0.y) * db.x) / denom;
    Some(a0 + da * t)
}

/// The plane z = a·x + b·y + c fitted through three lifted grid points.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Plane {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Plane {
    /// Fit the plane through three points by Cramer's rule.
    ///
    /// If the xy-projection of the triangle is degenerate, the plane
    /// degrades to the horizontal plane through the mean elevation.
    pub fn through(p: DVec3, q: DVec3, r: DVec3) -> Plane {
        let det = (q.x - p.x) * (r.y - p.y) - (q.y - p.y) * (r.x - p.x);
        if det == 0.0 {
            return Plane {
                a: 0.0,
                b: 0.0,
                c: (p.z + q.z + r.z) / 3.0,
            };
        }
        let a = ((q.z - p.z) * (r.y - p.y) - (q.y - p.y) * (r.z - p.z)) / det;
        let b = ((q.x - p.x) * (r.z - p.z) - (q.z - p.z) * (r.x - p.x)) / det;
        let c = p.z - a * p.x - b * p.y;
        Plane { a, b, c }
    }

    pub fn eval(&self, x: f64, y: f64) -> f64 {
        self.a * x + self.b * y + self.c
    }

    pub fn eval_int(&self, x: i32, y: i32) -> f64 {
        self.eval(x as f64, y as f64)
    }

    /// Unit normal of the lifted surface z = a·x + b·y + c.
    pub fn normal(&self) -> DVec3 {
        glm::normalize(&vec3(-self.a, -self.b, 1.0))
    }
}

/// Angle in radians between the facet normals of two planes.
pub fn angle_between_normals(u: &Plane, v: &Plane) -> f64 {
    let d = glm::dot(&u.normal(), &v.normal()).max(-1.0).min(1.0);
    d.acos()
}

/// Axis-aligned rectangle in the grid plane. Bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: DVec2,
    pub max: DVec2,
}

impl Aabb {
    pub fn new(min: DVec2, max: DVec2) -> Aabb {
        Aabb { min, max }
    }

    pub fn of_triangle(p: DVec2, q: DVec2, r: DVec2) -> Aabb {
        Aabb {
            min: vec2(p.x.min(q.x).min(r.x), p.y.min(q.y).min(r.y)),
            max: vec2(p.x.max(q.x).max(r.x), p.y.max(q.y).max(r.y)),
        }
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn contains(&self, p: DVec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }
}

/// Axis-aligned bounding volume of a lifted surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: DVec3,
    pub max: DVec3,
}

impl Bounds {
    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn tri_area_sign() {
        let a = vec2(0.0, 0.0);
        let b = vec2(2.0, 0.0);
        let c = vec2(0.0, 2.0);
        assert_approx_eq!(tri_area(a, b, c), 4.0);
        assert_approx_eq!(tri_area(a, c, b), -4.0);
        assert_approx_eq!(tri_area(a, b, vec2(4.0, 0.0)), 0.0);
    }

    #[test]
    fn plane_through_points() {
        // z = 2x - y + 3
        let p = Plane::through(
            vec3(0.0, 0.0, 3.0),
            vec3(1.0, 0.0, 5.0),
            vec3(0.0, 1.0, 2.0),
        );
        assert_approx_eq!(p.a, 2.0);
        assert_approx_eq!(p.b, -1.0);
        assert_approx_eq!(p.c, 3.0);
        assert_approx_eq!(p.eval(3.0, 4.0), 5.0);
    }

    #[test]
    fn plane_degenerate_fallback() {
        // colinear in xy: mean elevation, flat
        let p = Plane::through(
            vec3(0.0, 0.0, 3.0),
            vec3(1.0, 1.0, 6.0),
            vec3(2.0, 2.0, 9.0),
        );
        assert_approx_eq!(p.a, 0.0);
        assert_approx_eq!(p.b, 0.0);
        assert_approx_eq!(p.c, 6.0);
    }

    #[test]
    fn quality_ranges() {
        let q = tri_quality(vec2(0.0, 0.0), vec2(1.0, 0.0), vec2(0.5, 0.866));
        assert!(q > 0.4 && q < 0.45);
        // sliver
        let s = tri_quality(vec2(0.0, 0.0), vec2(100.0, 0.0), vec2(50.0, 0.01));
        assert!(s < 1e-4);
        assert_approx_eq!(
            tri_quality(vec2(0.0, 0.0), vec2(1.0, 0.0), vec2(2.0, 0.0)),
            0.0
        );
    }

    #[test]
    fn divide_safe_zero_denominator() {
        assert_approx_eq!(divide_safe(3.0, 2.0), 1.5);
        assert_approx_eq!(divide_safe(3.0, 0.0), 0.0);
    }

    #[test]
    fn normal_angle() {
        let flat = Plane { a: 0.0, b: 0.0, c: 1.0 };
        assert_approx_eq!(angle_between_normals(&flat, &flat), 0.0);
        let tilted = Plane { a: 1.0, b: 0.0, c: 0.0 };
        assert_approx_eq!(
            angle_between_normals(&flat, &tilted),
            std::f64::consts::FRAC_PI_4
        );
    }
}
