//! Scan conversion of triangles against candidate fit planes.
//!
//! For every triangle under consideration the engine sweeps the grid
//! samples in its interior, accumulating an aggregate error and the one
//! worst-offending sample (the candidate for insertion). A sweep can
//! serve one plane (data-independent refinement) or two at once (the
//! current and alternate planes of a data-dependent swap test), and
//! switches to a bilinear supersampled walk when a triangle is too thin
//! for integer sampling to be trusted.

use log::trace;

use crate::common::*;
use crate::geom::{divide_safe, tri_area, tri_quality, Aabb, Plane};
use crate::heightfield::{HeightField, UsedMap};

/// Per-triangle error norm used to aggregate pointwise errors and to
/// judge data-dependent swaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criterion {
    /// Minimize the sum of the L∞ (maximum absolute) errors.
    SumInf,
    /// Minimize the maximum of the L∞ errors.
    MaxInf,
    /// Minimize the sum of squared errors.
    Sum2,
    /// Minimize the angle between adjacent facet normals; only
    /// meaningful to the swap test, candidates fall back to L∞.
    Abn,
}

impl Default for Criterion {
    fn default() -> Criterion {
        Criterion::SumInf
    }
}

impl std::str::FromStr for Criterion {
    type Err = String;

    fn from_str(s: &str) -> Result<Criterion, String> {
        match s.to_ascii_lowercase().as_str() {
            "suminf" => Ok(Criterion::SumInf),
            "maxinf" => Ok(Criterion::MaxInf),
            "sum2" => Ok(Criterion::Sum2),
            "abn" => Ok(Criterion::Abn),
            _ => Err(format!("unknown criterion `{}`", s)),
        }
    }
}

/// Counters accumulated across a refinement run.
#[derive(Debug, Clone, Default)]
pub struct ScanStats {
    /// Samples visited by scan lines.
    pub scancount: u64,
    /// Triangles scan converted.
    pub nscan: u64,
    /// Triangles that needed the supersampled path.
    pub nsuper: u64,
    /// Pointwise error evaluations.
    pub update_cost: u64,
}

/// Supersampling factors are clamped here; an `area_thresh` of zero
/// asks for infinite resolution.
const MAX_SUPERSAMPLE: i32 = 4096;

/// Everything a scan needs, threaded explicitly instead of through
/// globals: the read-only inputs, the error weights, and the counters.
pub struct ScanContext<'a> {
    hf: &'a HeightField,
    used: &'a UsedMap,
    criterion: Criterion,
    emphasis: f64,
    area_thresh: f64,
    w1: f64,
    w2: f64,
    stats: &'a mut ScanStats,
}

impl<'a> ScanContext<'a> {
    pub fn new(
        hf: &'a HeightField,
        used: &'a UsedMap,
        criterion: Criterion,
        emphasis: f64,
        area_thresh: f64,
        stats: &'a mut ScanStats,
    ) -> ScanContext<'a> {
        let mut zrange = hf.zmax();
        if zrange <= 0.0 {
            zrange = 1.0;
        }
        ScanContext {
            hf,
            used,
            criterion,
            emphasis,
            area_thresh,
            w1: 1.0 - emphasis,
            w2: emphasis * zrange / 3.0,
            stats,
        }
    }
}

/// The planes interpolating a triangle's attributes, together with the
/// error and candidate accumulated while sweeping it. A scratch value
/// for swap tests as much as the payload of a freshly scanned face.
#[derive(Debug, Clone)]
pub struct FitPlane {
    pub z: Plane,
    pub r: Plane,
    pub g: Plane,
    pub b: Plane,
    /// True area of the fitted triangle.
    pub area: f64,
    /// Shape quality, area over squared diameter.
    pub quality: f64,
    /// Worst interior sample seen so far, if any had positive error.
    pub cand: Option<(i32, i32)>,
    /// Pointwise error of the candidate.
    pub cerr: f64,
    /// Aggregate error under the configured criterion.
    pub err: f64,
    /// Set when the accumulators already hold final values and the
    /// sweep may skip this plane.
    pub done: bool,
}

impl FitPlane {
    /// Fit the attribute planes through the lifted corners of the
    /// triangle p1,p2,p3 and reset the accumulators.
    pub fn new(hf: &HeightField, emphasis: f64, p1: DVec2, p2: DVec2, p3: DVec2) -> FitPlane {
        let v1 = vec3(p1.x, p1.y, hf.eval_at(p1));
        let v2 = vec3(p2.x, p2.y, hf.eval_at(p2));
        let v3 = vec3(p3.x, p3.y, hf.eval_at(p3));
        let z = Plane::through(v1, v2, v3);

        let (r, g, b) = if emphasis > 0.0 {
            let (r1, g1, b1) = hf.color_at(p1);
            let (r2, g2, b2) = hf.color_at(p2);
            let (r3, g3, b3) = hf.color_at(p3);
            let lift = |c1: f64, c2: f64, c3: f64| {
                Plane::through(
                    vec3(p1.x, p1.y, c1),
                    vec3(p2.x, p2.y, c2),
                    vec3(p3.x, p3.y, c3),
                )
            };
            (lift(r1, r2, r3), lift(g1, g2, g3), lift(b1, b2, b3))
        } else {
            (Plane::default(), Plane::default(), Plane::default())
        };

        FitPlane {
            z,
            r,
            g,
            b,
            area: tri_area(p1, p2, p3).abs() * 0.5,
            quality: tri_quality(p1, p2, p3),
            cand: None,
            cerr: 0.0,
            err: 0.0,
            done: false,
        }
    }

    fn accumulate(&mut self, criterion: Criterion, x: i32, y: i32, diff: f64) {
        if diff > self.cerr {
            self.cand = Some((x, y));
            self.cerr = diff;
        }
        match criterion {
            Criterion::Sum2 => self.err += diff * diff,
            _ => {
                if diff > self.err {
                    self.err = diff;
                }
            }
        }
    }

    /// Supersampled accumulation: every sub-pixel contributes to the
    /// aggregate, but only positions on the integer grid may become
    /// candidates.
    fn accumulate_super(&mut self, criterion: Criterion, x: i32, y: i32, ss: i32, diff: f64) {
        if x % ss == 0 && y % ss == 0 && diff > self.cerr {
            self.cand = Some((x / ss, y / ss));
            self.cerr = diff;
        }
        match criterion {
            Criterion::Sum2 => self.err += diff * diff,
            _ => {
                if diff > self.err {
                    self.err = diff;
                }
            }
        }
    }
}

fn span(x1: f64, x2: f64) -> Option<(i32, i32)> {
    let startx = x1.min(x2).ceil() as i32;
    let endx = x1.max(x2).floor() as i32;
    if startx > endx {
        None
    } else {
        Some((startx, endx))
    }
}

/// Sweep one scan line against the z planes only.
fn scan_line_z(
    ctx: &mut ScanContext,
    y: i32,
    mut u: Option<&mut FitPlane>,
    v: &mut FitPlane,
    x1: f64,
    x2: f64,
) {
    let (startx, endx) = match span(x1, x2) {
        Some(s) => s,
        None => return,
    };
    let (mut uz, du) = match u.as_deref() {
        Some(f) => (f.z.eval_int(startx, y), f.z.a),
        None => (0.0, 0.0),
    };
    let mut vz = v.z.eval_int(startx, y);
    let dv = v.z.a;
    for x in startx..=endx {
        if !ctx.used.get(x, y) {
            let zval = ctx.hf.sample(x, y) as f64;
            if let Some(f) = u.as_deref_mut() {
                f.accumulate(ctx.criterion, x, y, (zval - uz).abs());
            }
            v.accumulate(ctx.criterion, x, y, (zval - vz).abs());
            ctx.stats.update_cost += 1;
        }
        uz += du;
        vz += dv;
    }
    ctx.stats.scancount += (endx - startx + 1) as u64;
}

/// Sweep one scan line against the z and color planes.
fn scan_line_zrgb(
    ctx: &mut ScanContext,
    y: i32,
    mut u: Option<&mut FitPlane>,
    v: &mut FitPlane,
    x1: f64,
    x2: f64,
) {
    let (startx, endx) = match span(x1, x2) {
        Some(s) => s,
        None => return,
    };
    let eval4 = |f: &FitPlane| {
        [
            f.z.eval_int(startx, y),
            f.r.eval_int(startx, y),
            f.g.eval_int(startx, y),
            f.b.eval_int(startx, y),
        ]
    };
    let grad4 = |f: &FitPlane| [f.z.a, f.r.a, f.g.a, f.b.a];
    let (mut uv, ud) = match u.as_deref() {
        Some(f) => (eval4(f), grad4(f)),
        None => ([0.0; 4], [0.0; 4]),
    };
    let mut vv = eval4(v);
    let vd = grad4(v);
    let (w1, w2) = (ctx.w1, ctx.w2);
    for x in startx..=endx {
        if !ctx.used.get(x, y) {
            let zval = ctx.hf.sample(x, y) as f64;
            let (cr, cg, cb) = ctx.hf.color(x, y);
            let diff = |p: &[f64; 4]| {
                w1 * (zval - p[0]).abs()
                    + w2 * ((cr - p[1]).abs() + (cg - p[2]).abs() + (cb - p[3]).abs())
            };
            if let Some(f) = u.as_deref_mut() {
                let d = diff(&uv);
                f.accumulate(ctx.criterion, x, y, d);
            }
            let d = diff(&vv);
            v.accumulate(ctx.criterion, x, y, d);
            ctx.stats.update_cost += 1;
        }
        for k in 0..4 {
            uv[k] += ud[k];
            vv[k] += vd[k];
        }
    }
    ctx.stats.scancount += (endx - startx + 1) as u64;
}

/// Sweep one scan line at supersampled resolution `ss`, reading the
/// input through bilinear interpolation. Plane gradients must already
/// be scaled for the finer grid.
fn scan_line_super(
    ctx: &mut ScanContext,
    y: i32,
    mut u: Option<&mut FitPlane>,
    v: &mut FitPlane,
    x1: f64,
    x2: f64,
    ss: i32,
) {
    let (startx, endx) = match span(x1, x2) {
        Some(s) => s,
        None => return,
    };
    let with_color = ctx.emphasis != 0.0;
    let eval4 = |f: &FitPlane| {
        [
            f.z.eval_int(startx, y),
            f.r.eval_int(startx, y),
            f.g.eval_int(startx, y),
            f.b.eval_int(startx, y),
        ]
    };
    let grad4 = |f: &FitPlane| [f.z.a, f.r.a, f.g.a, f.b.a];
    let (mut uv, ud) = match u.as_deref() {
        Some(f) => (eval4(f), grad4(f)),
        None => ([0.0; 4], [0.0; 4]),
    };
    let mut vv = eval4(v);
    let vd = grad4(v);
    let (w1, w2) = (ctx.w1, ctx.w2);
    let ry = y as f64 / ss as f64;
    for x in startx..=endx {
        let rx = x as f64 / ss as f64;
        if !ctx.used.is_used_interp(rx, ry) {
            // a bilinear read touching a no-data corner yields nothing
            if let Some(zval) = ctx.hf.eval_interp(rx, ry) {
                let color = if with_color {
                    Some(ctx.hf.color_interp(rx, ry))
                } else {
                    None
                };
                let diff_of = |p: &[f64; 4]| match color {
                    Some((cr, cg, cb)) => {
                        w1 * (zval - p[0]).abs()
                            + w2 * ((cr - p[1]).abs() + (cg - p[2]).abs() + (cb - p[3]).abs())
                    }
                    None => (zval - p[0]).abs(),
                };
                let dv_err = diff_of(&vv);
                let du_err = diff_of(&uv);
                if let Some(f) = u.as_deref_mut() {
                    f.accumulate_super(ctx.criterion, x, y, ss, du_err);
                }
                v.accumulate_super(ctx.criterion, x, y, ss, dv_err);
                ctx.stats.update_cost += 1;
            }
        }
        for k in 0..4 {
            uv[k] += ud[k];
            vv[k] += vd[k];
        }
    }
    ctx.stats.scancount += (endx - startx + 1) as u64;
}

fn order_by_y(p: DVec2, q: DVec2, r: DVec2) -> [DVec2; 3] {
    let mut by_y = [p, q, r];
    by_y.sort_by(|a, b| a.y.partial_cmp(&b.y).unwrap());
    by_y
}

/// Scan the triangle p,q,r at integer resolution, accumulating into `v`
/// and (unless absent or done) `u`. Vertices need not be integral.
fn scan_triangle_normal(
    ctx: &mut ScanContext,
    p: DVec2,
    q: DVec2,
    r: DVec2,
    mut u: Option<&mut FitPlane>,
    v: &mut FitPlane,
) {
    // u and v each share a side and an angle with pqr; zero area on
    // either means pqr has no interior samples at all
    if v.area == 0.0 || u.as_deref().map_or(false, |f| f.area == 0.0) {
        return;
    }

    let by_y = order_by_y(p, q, r);

    let dx1 = divide_safe(by_y[1].x - by_y[0].x, by_y[1].y - by_y[0].y);
    let dx2 = divide_safe(by_y[2].x - by_y[0].x, by_y[2].y - by_y[0].y);
    let mut y = by_y[0].y.ceil() as i32;
    let frac = y as f64 - by_y[0].y;
    let mut x1 = by_y[0].x + dx1 * frac;
    let mut x2 = by_y[0].x + dx2 * frac;

    while (y as f64) < by_y[1].y {
        if ctx.emphasis == 0.0 {
            scan_line_z(ctx, y, u.as_deref_mut(), v, x1, x2);
        } else {
            scan_line_zrgb(ctx, y, u.as_deref_mut(), v, x1, x2);
        }
        x1 += dx1;
        x2 += dx2;
        y += 1;
    }

    let dx1 = divide_safe(by_y[2].x - by_y[1].x, by_y[2].y - by_y[1].y);
    let frac = y as f64 - by_y[1].y;
    let mut x1 = by_y[1].x + dx1 * frac;

    while y as f64 <= by_y[2].y {
        if ctx.emphasis == 0.0 {
            scan_line_z(ctx, y, u.as_deref_mut(), v, x1, x2);
        } else {
            scan_line_zrgb(ctx, y, u.as_deref_mut(), v, x1, x2);
        }
        x1 += dx1;
        x2 += dx2;
        y += 1;
    }
}

/// Scan the triangle p,q,r with supersample factor `ss`: coordinates
/// are blown up by `ss`, plane gradients divided to match, and the
/// input read through bilinear interpolation. The plane equations in
/// `u` and `v` are restored before returning.
fn scan_triangle_supersample(
    ctx: &mut ScanContext,
    p: DVec2,
    q: DVec2,
    r: DVec2,
    mut u: Option<&mut FitPlane>,
    v: &mut FitPlane,
    ss: i32,
) {
    if v.area == 0.0 || u.as_deref().map_or(false, |f| f.area == 0.0) {
        return;
    }

    let s = ss as f64;
    let by_y = order_by_y(p * s, q * s, r * s);

    let saved_u = u.as_deref().map(|f| (f.z, f.r, f.g, f.b));
    let saved_v = (v.z, v.r, v.g, v.b);
    let rescale = |f: &mut FitPlane, with_color: bool| {
        f.z.a /= s;
        f.z.b /= s;
        if with_color {
            f.r.a /= s;
            f.r.b /= s;
            f.g.a /= s;
            f.g.b /= s;
            f.b.a /= s;
            f.b.b /= s;
        }
    };
    let with_color = ctx.emphasis != 0.0;
    if let Some(f) = u.as_deref_mut() {
        rescale(f, with_color);
    }
    rescale(v, with_color);

    let dx1 = divide_safe(by_y[1].x - by_y[0].x, by_y[1].y - by_y[0].y);
    let dx2 = divide_safe(by_y[2].x - by_y[0].x, by_y[2].y - by_y[0].y);
    let mut y = by_y[0].y.ceil() as i32;
    let frac = y as f64 - by_y[0].y;
    let mut x1 = by_y[0].x + dx1 * frac;
    let mut x2 = by_y[0].x + dx2 * frac;

    while (y as f64) < by_y[1].y {
        scan_line_super(ctx, y, u.as_deref_mut(), v, x1, x2, ss);
        x1 += dx1;
        x2 += dx2;
        y += 1;
    }

    let dx1 = divide_safe(by_y[2].x - by_y[1].x, by_y[2].y - by_y[1].y);
    let frac = y as f64 - by_y[1].y;
    let mut x1 = by_y[1].x + dx1 * frac;

    while y as f64 <= by_y[2].y {
        scan_line_super(ctx, y, u.as_deref_mut(), v, x1, x2, ss);
        x1 += dx1;
        x2 += dx2;
        y += 1;
    }

    if ctx.criterion == Criterion::Sum2 {
        // each supersample covers 1/ss² of a grid cell
        if let Some(f) = u.as_deref_mut() {
            f.err /= s * s;
        }
        v.err /= s * s;
    }

    if let Some(f) = u.as_deref_mut() {
        let (z, r, g, b) = saved_u.unwrap();
        f.z = z;
        f.r = r;
        f.g = g;
        f.b = b;
    }
    let (z, r, g, b) = saved_v;
    v.z = z;
    v.r = r;
    v.g = g;
    v.b = b;
}

/// Scan the triangle p,q,r, choosing integer or supersampled sampling
/// from the triangle's shape. `v` is always accumulated; `u` is
/// skipped when absent or already final. Degenerate triangles are
/// skipped outright and contribute nothing.
pub fn scan_triangle(
    ctx: &mut ScanContext,
    p: DVec2,
    q: DVec2,
    r: DVec2,
    u: Option<&mut FitPlane>,
    v: &mut FitPlane,
) {
    let u = match u {
        Some(f) if f.done => None,
        other => other,
    };

    // the area sometimes comes out as ±1e-13 for flat triangles, hence
    // the threshold rather than a zero test
    let area = tri_area(p, q, r) / 2.0;
    if area < AREA_EPS {
        return;
    }

    let bb = Aabb::of_triangle(p, q, r);
    let raw = ((bb.width() + bb.height()) / (2.0 * area * ctx.area_thresh)).ceil();
    let ss = if raw.is_finite() {
        (raw as i64).max(1).min(MAX_SUPERSAMPLE as i64) as i32
    } else {
        MAX_SUPERSAMPLE
    };
    trace!(
        "scan ({:.1},{:.1}) ({:.1},{:.1}) ({:.1},{:.1}): area={} ss={}",
        p.x,
        p.y,
        q.x,
        q.y,
        r.x,
        r.y,
        area,
        ss
    );

    if ss == 1 {
        scan_triangle_normal(ctx, p, q, r, u, v);
    } else {
        scan_triangle_supersample(ctx, p, q, r, u, v, ss);
        ctx.stats.nsuper += 1;
    }
    ctx.stats.nscan += 1;
}

/// Visit every integer sample covered by the triangle p,q,r, in sweep
/// order. Error reporting walks the finished mesh with this.
pub fn for_each_sample(p: DVec2, q: DVec2, r: DVec2, mut visit: impl FnMut(i32, i32)) {
    let by_y = order_by_y(p, q, r);

    let dx1 = divide_safe(by_y[1].x - by_y[0].x, by_y[1].y - by_y[0].y);
    let dx2 = divide_safe(by_y[2].x - by_y[0].x, by_y[2].y - by_y[0].y);
    let mut y = by_y[0].y.ceil() as i32;
    let frac = y as f64 - by_y[0].y;
    let mut x1 = by_y[0].x + dx1 * frac;
    let mut x2 = by_y[0].x + dx2 * frac;

    let mut row = |y: i32, x1: f64, x2: f64| {
        if let Some((startx, endx)) = span(x1, x2) {
            for x in startx..=endx {
                visit(x, y);
            }
        }
    };

    while (y as f64) < by_y[1].y {
        row(y, x1, x2);
        x1 += dx1;
        x2 += dx2;
        y += 1;
    }

    let dx1 = divide_safe(by_y[2].x - by_y[1].x, by_y[2].y - by_y[1].y);
    let frac = y as f64 - by_y[1].y;
    let mut x1 = by_y[1].x + dx1 * frac;

    while y as f64 <= by_y[2].y {
        row(y, x1, x2);
        x1 += dx1;
        x2 += dx2;
        y += 1;
    }
}
