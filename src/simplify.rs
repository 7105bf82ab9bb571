//! The greedy refinement driver.
//!
//! A `Simplifier` owns the subdivision, the candidate heap, and the used
//! bitmap, and borrows the height field read-only. Each refinement step
//! pops the triangle with the worst candidate, inserts that sample as a
//! new vertex, rescans the faces incident to it, and (in data-dependent
//! mode) locally swaps edges of the affected region while doing so
//! lowers the combined error/shape cost.

use log::debug;

use crate::common::*;
use crate::geom::{angle_between_normals, seg_intersection, tri_area, Bounds};
use crate::heap::CandidateHeap;
use crate::heightfield::{HeightField, UsedMap};
use crate::quadedge::{EdgeRef, FaceId, HeapState, Subdivision};
use crate::scan::{self, Criterion, FitPlane, ScanContext, ScanStats};
use crate::Error;

/// Relative margin a swap must clear; on exact equality the current
/// diagonal is kept, which keeps the swap loop deterministic and finite.
const SWAP_HYSTERESIS: f64 = 1e-12;

/// The knobs of a refinement run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Color weight in [0, 1]; 0 ignores color entirely.
    pub emphasis: f64,
    /// false: incremental Delaunay; true: data-dependent swaps.
    pub datadep: bool,
    /// Blend between pure data-dependent (0) and pure shape-dependent
    /// (1) swap costs.
    pub qual_thresh: f64,
    pub criterion: Criterion,
    /// Supersampling trigger; 0 always supersamples, 1e30 never does.
    pub area_thresh: f64,
    /// Vertex budget for a whole run.
    pub limit: usize,
    /// Stop refining once the worst candidate error drops below this.
    pub thresh: f64,
    /// Weight of the sliver penalty in swap costs.
    pub alpha: f64,
    /// Multi-insertion extension flags; accepted but not implemented.
    pub parallel_insert: bool,
    pub multinsert: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            emphasis: 0.0,
            datadep: false,
            qual_thresh: 0.5,
            criterion: Criterion::default(),
            area_thresh: 1e30,
            limit: usize::MAX,
            thresh: 0.0,
            alpha: 0.0,
            parallel_insert: false,
            multinsert: false,
        }
    }
}

/// Greedy-insertion simplification of one height field.
pub struct Simplifier<'a> {
    hf: &'a HeightField,
    sub: Subdivision,
    heap: CandidateHeap,
    used: UsedMap,
    config: Config,
    stats: ScanStats,
    inserted: usize,
}

impl<'a> Simplifier<'a> {
    /// Set up the initial two-triangle cover of the grid rectangle and
    /// scan both triangles. Fails with `UnsupportedConfig` on invalid
    /// or unimplemented option combinations.
    pub fn new(hf: &'a HeightField, config: Config) -> Result<Simplifier<'a>, Error> {
        if !(0.0..=1.0).contains(&config.emphasis) {
            return Err(Error::UnsupportedConfig(format!(
                "emphasis {} outside [0, 1]",
                config.emphasis
            )));
        }
        if !(0.0..=1.0).contains(&config.qual_thresh) {
            return Err(Error::UnsupportedConfig(format!(
                "qual_thresh {} outside [0, 1]",
                config.qual_thresh
            )));
        }
        if config.emphasis > 0.0 && !hf.has_texture() {
            return Err(Error::UnsupportedConfig(
                "emphasis > 0 requires a texture".to_string(),
            ));
        }
        if config.parallel_insert || config.multinsert {
            return Err(Error::UnsupportedConfig(
                "parallel insertion is not implemented; the loop is serial".to_string(),
            ));
        }
        if config.area_thresh < 0.0 {
            return Err(Error::UnsupportedConfig(
                "area_thresh must be non-negative".to_string(),
            ));
        }
        let (w, h) = (hf.width(), hf.height());
        if w < 2 || h < 2 {
            return Err(Error::UnsupportedConfig(format!(
                "grid {}x{} is too small to triangulate",
                w, h
            )));
        }

        let sub = Subdivision::new(
            vec2(0.0, 0.0),
            vec2((w - 1) as f64, 0.0),
            vec2((w - 1) as f64, (h - 1) as f64),
            vec2(0.0, (h - 1) as f64),
            !config.datadep,
        );
        let heap = CandidateHeap::new(2 * w * h);
        let mut used = UsedMap::for_field(hf);
        for &(x, y) in &[(0, 0), (w - 1, 0), (w - 1, h - 1), (0, h - 1)] {
            used.set(x as i32, y as i32);
        }

        let mut s = Simplifier {
            hf,
            sub,
            heap,
            used,
            config,
            stats: ScanStats::default(),
            inserted: 0,
        };
        let initial: Vec<FaceId> = s.sub.faces().iter().map(|(fid, _)| fid).collect();
        for fid in initial {
            s.rescan_face(fid);
        }
        Ok(s)
    }

    pub fn subdivision(&self) -> &Subdivision {
        &self.sub
    }

    pub fn heightfield(&self) -> &HeightField {
        self.hf
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    /// Points inserted beyond the four corners.
    pub fn inserted(&self) -> usize {
        self.inserted
    }

    pub fn used(&self) -> &UsedMap {
        &self.used
    }

    pub fn bounds(&self) -> Bounds {
        self.hf.bounds()
    }

    /// Worst candidate error currently pending, if any.
    pub fn top_error(&self) -> Option<f64> {
        self.heap.top().map(|n| n.val)
    }

    /// Pop the worst triangle and insert its candidate as a new vertex,
    /// rescanning the affected region. Returns the first new edge (its
    /// origin is the new vertex), or `HeapEmpty` when nothing is left.
    ///
    /// A candidate that turns out to duplicate a vertex is marked used
    /// and skipped, and the popped triangle rescanned for its next
    /// candidate; refinement then retries with the new heap top.
    pub fn select_new_point(&mut self) -> Result<EdgeRef, Error> {
        loop {
            let node = match self.heap.extract(self.sub.faces_mut()) {
                Some(n) => n,
                None => return Err(Error::HeapEmpty),
            };
            let fid = node.face;
            let (cx, cy) = self.sub.face(fid).candidate();
            let hint = self.sub.face(fid).anchor();
            debug!("insert ({}, {}), candidate error {}", cx, cy, node.val);

            match self
                .sub
                .insert_site(&mut self.heap, vec2(cx as f64, cy as f64), Some(hint))
            {
                Ok(spoke) => {
                    self.used.set(cx, cy);
                    if self.config.datadep {
                        self.propagate_swaps(spoke);
                    }
                    self.rescan_around(spoke);
                    self.inserted += 1;
                    return Ok(spoke);
                }
                Err(Error::DuplicateSite(..)) => {
                    debug!("candidate ({}, {}) already a vertex, skipping", cx, cy);
                    self.used.set(cx, cy);
                    self.rescan_face(fid);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Insert up to `limit` new vertices, stopping early when the
    /// configured vertex budget is exhausted, the worst candidate error
    /// falls below the configured threshold, or the heap runs dry.
    /// Returns the number actually inserted.
    pub fn select_new_points(&mut self, limit: usize) -> Result<usize, Error> {
        let mut count = 0;
        while count < limit && self.inserted < self.config.limit {
            match self.heap.top() {
                None => break,
                Some(n) if n.val < self.config.thresh => break,
                Some(_) => {}
            }
            match self.select_new_point() {
                Ok(_) => count += 1,
                Err(Error::HeapEmpty) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(count)
    }

    /// Scan-convert one face and (re)key its heap entry.
    fn rescan_face(&mut self, fid: FaceId) {
        if let HeapState::InHeap(slot) = self.sub.face(fid).heap_state() {
            self.heap.kill(self.sub.faces_mut(), slot);
            self.sub
                .faces_mut()
                .get_mut(fid)
                .set_heap_state(HeapState::NotInHeap);
        }
        let (p, q, r) = self.sub.tri_points(fid);
        let mut fit = FitPlane::new(self.hf, self.config.emphasis, p, q, r);
        {
            let mut ctx = ScanContext::new(
                self.hf,
                &self.used,
                self.config.criterion,
                self.config.emphasis,
                self.config.area_thresh,
                &mut self.stats,
            );
            scan::scan_triangle(&mut ctx, p, q, r, None, &mut fit);
        }
        self.apply_fit(fid, &fit);
    }

    /// Record a completed fit on its face: aggregate error, candidate,
    /// and a heap entry keyed on the candidate error. Exactly-fit and
    /// empty triangles stay out of the heap.
    fn apply_fit(&mut self, fid: FaceId, fit: &FitPlane) {
        let tri = self.sub.faces_mut().get_mut(fid);
        debug_assert!(!matches!(tri.heap_state(), HeapState::InHeap(_)));
        tri.set_err(fit.err);
        match fit.cand {
            Some((cx, cy)) => {
                tri.set_candidate(cx, cy);
                self.heap.insert(self.sub.faces_mut(), fid, fit.cerr);
            }
            None => tri.set_heap_state(HeapState::NotInHeap),
        }
    }

    /// Scan every still-unscanned face incident to the new vertex.
    fn rescan_around(&mut self, spoke: EdgeRef) {
        for s in self.sub.spokes(spoke) {
            if let Some(fid) = self.sub.lface(s) {
                if self.sub.face(fid).heap_state() == HeapState::Unscanned {
                    self.rescan_face(fid);
                }
            }
        }
    }

    /// A fit mirroring the current state of a face: planes recomputed,
    /// and when the face has already been scanned, its accumulated
    /// error adopted and the fit marked final.
    fn fit_of(&self, fid: FaceId) -> FitPlane {
        let (p, q, r) = self.sub.tri_points(fid);
        let mut fit = FitPlane::new(self.hf, self.config.emphasis, p, q, r);
        let tri = self.sub.face(fid);
        if tri.heap_state() != HeapState::Unscanned {
            let (cx, cy) = tri.candidate();
            if cx >= 0 {
                fit.cand = Some((cx, cy));
            }
            fit.err = tri.err();
            fit.done = true;
        }
        fit
    }

    /// Swap cost of one fit: data error blended against the sliver
    /// penalty.
    fn swap_cost(&self, fit: &FitPlane) -> f64 {
        (1.0 - self.config.qual_thresh) * fit.err
            + self.config.qual_thresh * self.config.alpha * (1.0 - fit.quality)
    }

    fn combine(&self, c1: f64, c2: f64) -> f64 {
        match self.config.criterion {
            Criterion::MaxInf => c1.max(c2),
            _ => c1 + c2,
        }
    }

    /// Data-dependent swap test for one interior edge. Scans the four
    /// sub-triangles cut by both diagonals of the surrounding
    /// quadrilateral, so that a single pass yields the error of the
    /// current and the alternate triangulation. Swaps and returns true
    /// when the alternate costs strictly less.
    fn check_swap(&mut self, e: EdgeRef) -> bool {
        if !self.sub.is_interior(e) || !self.sub.is_interior(e.sym()) {
            return false;
        }
        let o = self.sub.org(e);
        let d = self.sub.dest(e);
        let l = self.sub.dest(self.sub.lnext(e));
        let r = self.sub.dest(self.sub.oprev(e));

        // the swap is only legal when the quadrilateral o,r,d,l is
        // strictly convex: both alternate triangles must come out ccw
        if tri_area(o, r, l) <= AREA_EPS || tri_area(r, d, l) <= AREA_EPS {
            return false;
        }
        let m = match seg_intersection(o, d, r, l) {
            Some(m) => m,
            None => return false,
        };

        let fu1_id = self.sub.lface(e).expect("interior edge has a left face");
        let fu2_id = self
            .sub
            .lface(e.sym())
            .expect("interior edge has a right face");
        let mut fu1 = self.fit_of(fu1_id);
        let mut fu2 = self.fit_of(fu2_id);
        let mut fv1 = FitPlane::new(self.hf, self.config.emphasis, o, r, l);
        let mut fv2 = FitPlane::new(self.hf, self.config.emphasis, r, d, l);

        {
            let mut ctx = ScanContext::new(
                self.hf,
                &self.used,
                self.config.criterion,
                self.config.emphasis,
                self.config.area_thresh,
                &mut self.stats,
            );
            // each sub-triangle pairs the current plane covering it with
            // the alternate plane covering it
            scan::scan_triangle(&mut ctx, o, r, m, Some(&mut fu2), &mut fv1);
            scan::scan_triangle(&mut ctx, r, d, m, Some(&mut fu2), &mut fv2);
            scan::scan_triangle(&mut ctx, d, l, m, Some(&mut fu1), &mut fv2);
            scan::scan_triangle(&mut ctx, l, o, m, Some(&mut fu1), &mut fv1);
        }

        let (before, after) = if self.config.criterion == Criterion::Abn {
            let shape = |a: &FitPlane, b: &FitPlane| {
                self.config.qual_thresh
                    * self.config.alpha
                    * ((1.0 - a.quality) + (1.0 - b.quality))
            };
            (
                (1.0 - self.config.qual_thresh) * angle_between_normals(&fu1.z, &fu2.z)
                    + shape(&fu1, &fu2),
                (1.0 - self.config.qual_thresh) * angle_between_normals(&fv1.z, &fv2.z)
                    + shape(&fv1, &fv2),
            )
        } else {
            (
                self.combine(self.swap_cost(&fu1), self.swap_cost(&fu2)),
                self.combine(self.swap_cost(&fv1), self.swap_cost(&fv2)),
            )
        };

        if before - after <= SWAP_HYSTERESIS * (1.0 + before.abs()) {
            // keep the diagonal; the sweeps above completed the fits of
            // any faces that had not been scanned yet
            if !fu1.done {
                self.apply_fit(fu1_id, &fu1);
            }
            if !fu2.done {
                self.apply_fit(fu2_id, &fu2);
            }
            return false;
        }

        debug!(
            "swap ({:.0},{:.0})-({:.0},{:.0}) for ({:.0},{:.0})-({:.0},{:.0}): {} -> {}",
            o.x, o.y, d.x, d.y, r.x, r.y, l.x, l.y, before, after
        );
        let (f1, f2) = self.sub.swap_edge(&mut self.heap, e);
        self.apply_fit(f1, &fv1);
        self.apply_fit(f2, &fv2);
        true
    }

    /// After an insertion, test the edges opposite the new vertex and
    /// keep propagating outward from every performed swap until no swap
    /// improves the metric.
    fn propagate_swaps(&mut self, spoke: EdgeRef) {
        let mut suspects: Vec<EdgeRef> = self
            .sub
            .spokes(spoke)
            .iter()
            .map(|&s| self.sub.lnext(s))
            .collect();
        while let Some(e) = suspects.pop() {
            if self.check_swap(e) {
                // the quadrilateral's outer edges become suspect
                for &d in &[e, e.sym()] {
                    let l1 = self.sub.lnext(d);
                    suspects.push(l1);
                    suspects.push(self.sub.lnext(l1));
                }
            }
        }
    }

    /// Exact rms and maximum absolute error of the current mesh against
    /// the field, by sweeping every face. No-data samples are skipped.
    pub fn field_errors(&self) -> (f64, f64) {
        let mut sum = 0.0;
        let mut count = 0u64;
        let mut max = 0.0f64;
        for (fid, _) in self.sub.faces().iter() {
            let (p, q, r) = self.sub.tri_points(fid);
            let plane = FitPlane::new(self.hf, 0.0, p, q, r).z;
            scan::for_each_sample(p, q, r, |x, y| {
                if self.hf.is_no_data(x, y) {
                    return;
                }
                let diff = self.hf.sample(x, y) as f64 - plane.eval_int(x, y);
                sum += diff * diff;
                max = max.max(diff.abs());
                count += 1;
            });
        }
        let rms = if count > 0 {
            (sum / count as f64).sqrt()
        } else {
            0.0
        };
        (rms, max)
    }

    /// Cheap rms estimate from the per-face error sums; meaningful when
    /// the criterion is `Sum2`.
    pub fn rms_error_estimate(&self) -> f64 {
        let sum: f64 = self.sub.faces().iter().map(|(_, t)| t.err().max(0.0)).sum();
        (sum / (self.hf.width() * self.hf.height()) as f64).sqrt()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::heightfield::HeightField;
    use crate::quadedge::in_circle;

    fn field_from(w: usize, h: usize, f: impl Fn(usize, usize) -> u16) -> HeightField {
        let z = (0..w * h).map(|i| f(i % w, i / w)).collect();
        HeightField::new(w, h, z, None)
    }

    fn check_invariants(s: &Simplifier) {
        let (v, e, f) = s.subdivision().counts();
        assert_eq!(v + f, e + 1, "Euler invariant violated");
        for (fid, _) in s.subdivision().faces().iter() {
            let (p, q, r) = s.subdivision().tri_points(fid);
            assert!(tri_area(p, q, r) > 0.0, "face not ccw");
        }
    }

    #[test]
    fn flat_field_has_nothing_to_refine() {
        let hf = field_from(16, 16, |_, _| 100);
        let mut s = Simplifier::new(&hf, Config::default()).unwrap();
        match s.select_new_point() {
            Err(Error::HeapEmpty) => {}
            other => panic!("expected HeapEmpty, got {:?}", other),
        }
        let (v, _, f) = s.subdivision().counts();
        assert_eq!((v, f), (4, 2));
    }

    #[test]
    fn planar_ramp_fits_with_two_triangles() {
        let hf = field_from(32, 32, |x, y| (x + y) as u16);
        let mut s = Simplifier::new(&hf, Config::default()).unwrap();
        assert_eq!(s.select_new_points(100).unwrap(), 0);
        let (v, _, f) = s.subdivision().counts();
        assert_eq!((v, f), (4, 2));
        let (rms, max) = s.field_errors();
        assert!(rms < 1e-9 && max < 1e-9);
    }

    #[test]
    fn spike_is_inserted_first() {
        let hf = field_from(32, 32, |x, y| if (x, y) == (16, 16) { 1000 } else { 0 });
        let mut s = Simplifier::new(&hf, Config::default()).unwrap();
        assert_eq!(s.top_error(), Some(1000.0));
        assert_eq!(s.select_new_points(1).unwrap(), 1);
        assert!(s.used().get(16, 16));
        let (v, _, f) = s.subdivision().counts();
        assert_eq!((v, f), (5, 4));
        check_invariants(&s);
    }

    #[test]
    fn threshold_stops_refinement() {
        let hf = field_from(32, 32, |x, y| if (x, y) == (16, 16) { 1000 } else { 0 });
        let config = Config {
            thresh: 2000.0,
            ..Config::default()
        };
        let mut s = Simplifier::new(&hf, config).unwrap();
        assert_eq!(s.select_new_points(10).unwrap(), 0);
        assert_eq!(s.inserted(), 0);
    }

    #[test]
    fn pyramid_apex_among_first_insertions() {
        let apex = |x: i64, y: i64| 100 - (x - 16).abs().max((y - 16).abs());
        let hf = field_from(32, 32, |x, y| apex(x as i64, y as i64) as u16);
        let config = Config {
            criterion: Criterion::MaxInf,
            limit: 16,
            ..Config::default()
        };
        let mut s = Simplifier::new(&hf, config).unwrap();
        assert_eq!(s.select_new_points(5).unwrap(), 5);
        assert!(s.used().get(16, 16), "apex not among the first five");
        check_invariants(&s);
    }

    #[test]
    fn delaunay_refinement_keeps_delaunay_property() {
        let hf = field_from(24, 24, |x, y| ((x * 7 + y * 13) % 31) as u16);
        let mut s = Simplifier::new(&hf, Config::default()).unwrap();
        s.select_new_points(12).unwrap();
        check_invariants(&s);
        let sub = s.subdivision();
        for e in sub.edges() {
            for &d in &[e, e.sym()] {
                if !sub.is_interior(d) || !sub.is_interior(d.sym()) {
                    continue;
                }
                let o = sub.org(d);
                let de = sub.dest(d);
                let l = sub.dest(sub.lnext(d));
                let r = sub.dest(sub.oprev(d));
                assert!(!in_circle(o, de, l, r));
            }
        }
    }

    #[test]
    fn refinement_reduces_error() {
        let hf = field_from(32, 32, |x, y| {
            (((x as f64 / 5.0).sin() + (y as f64 / 7.0).cos() + 2.0) * 40.0) as u16
        });
        let mut s = Simplifier::new(&hf, Config::default()).unwrap();
        let (rms0, _) = s.field_errors();
        s.select_new_points(30).unwrap();
        let (rms1, _) = s.field_errors();
        assert!(rms1 < rms0, "rms {} not below {}", rms1, rms0);
        check_invariants(&s);
    }

    #[test]
    fn ridge_swap_picks_aligned_diagonal() {
        // ridge along the anti-diagonal x + y = 4: the initial diagonal
        // (0,0)-(4,4) crosses it and must be swapped
        let hf = field_from(5, 5, |x, y| (20 - 2 * (x as i64 + y as i64 - 4).abs()) as u16);
        let config = Config {
            datadep: true,
            qual_thresh: 0.5,
            alpha: 0.5,
            ..Config::default()
        };
        let mut s = Simplifier::new(&hf, config).unwrap();
        let diag = s
            .sub
            .edges()
            .find(|&e| s.sub.is_interior(e) && s.sub.is_interior(e.sym()))
            .unwrap();
        assert!(s.check_swap(diag), "crossing diagonal must swap");
        let (o, d) = (s.sub.org(diag), s.sub.dest(diag));
        assert_eq!(o.x + o.y, 4.0);
        assert_eq!(d.x + d.y, 4.0);
        check_invariants(&s);

        // mirrored field: ridge along x = y, the diagonal already fits
        let hf2 = field_from(5, 5, |x, y| (20 - 2 * (x as i64 - y as i64).abs()) as u16);
        let config2 = Config {
            datadep: true,
            qual_thresh: 0.5,
            alpha: 0.5,
            ..Config::default()
        };
        let mut s2 = Simplifier::new(&hf2, config2).unwrap();
        let diag2 = s2
            .sub
            .edges()
            .find(|&e| s2.sub.is_interior(e) && s2.sub.is_interior(e.sym()))
            .unwrap();
        assert!(!s2.check_swap(diag2), "aligned diagonal must stay");
    }

    #[test]
    fn datadep_run_maintains_invariants() {
        let hf = field_from(16, 16, |x, y| {
            (30 - (x as i64 + y as i64 - 15).abs() * 2).max(0) as u16
        });
        let config = Config {
            datadep: true,
            qual_thresh: 0.5,
            alpha: 0.5,
            criterion: Criterion::Sum2,
            ..Config::default()
        };
        let mut s = Simplifier::new(&hf, config).unwrap();
        let (rms0, _) = s.field_errors();
        s.select_new_points(10).unwrap();
        let (rms1, _) = s.field_errors();
        assert!(rms1 <= rms0);
        check_invariants(&s);
    }

    #[test]
    fn rejects_unsupported_configs() {
        let hf = field_from(8, 8, |_, _| 0);
        for config in vec![
            Config {
                emphasis: 1.5,
                ..Config::default()
            },
            Config {
                emphasis: 0.5,
                ..Config::default()
            },
            Config {
                parallel_insert: true,
                ..Config::default()
            },
            Config {
                multinsert: true,
                ..Config::default()
            },
            Config {
                qual_thresh: -0.1,
                ..Config::default()
            },
        ] {
            match Simplifier::new(&hf, config) {
                Err(Error::UnsupportedConfig(_)) => {}
                other => panic!("expected config rejection, got {:?}", other.is_ok()),
            }
        }
    }
}
