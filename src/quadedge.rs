//! Quad-edge planar subdivision after Guibas and Stolfi.
//!
//! The subdivision is a cyclic graph, so edges live in an arena of
//! quad-edge records and refer to each other by stable index rather than
//! by owning pointer. A directed edge is a record index plus a rotation
//! in 0..4: slots 0 and 2 are the primal edge and its reverse, 1 and 3
//! the duals. `rot`, `sym` and `inv_rot` are pure index arithmetic;
//! `onext` and everything derived from it go through the arena.
//!
//! In a triangulation the topology looks like this:
//!
//! ```text
//!                 Dest
//!                  @
//!        Lnext   * * *   Rprev
//!      Dprev --*   *   *-- Dnext
//!            *     *     *
//!          @    Sym|e      @
//!            *     *     *
//!      Lprev --*   *   *-- Rnext
//!        Onext   * * *   Oprev
//!                  @
//!                 Org
//! ```

use std::collections::HashSet;

use log::trace;

use crate::common::*;
use crate::geom::{tri_area, Aabb};
use crate::heap::CandidateHeap;
use crate::Error;

/// A directed edge: arena index of its quad-edge record plus a rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeRef(u32);

impl EdgeRef {
    fn new(qe: u32, num: u32) -> EdgeRef {
        EdgeRef(qe << 2 | num)
    }

    fn qe(self) -> usize {
        (self.0 >> 2) as usize
    }

    fn num(self) -> usize {
        (self.0 & 3) as usize
    }

    /// The dual edge, directed from right face to left face.
    pub fn rot(self) -> EdgeRef {
        EdgeRef(self.0 & !3 | (self.0 + 1) & 3)
    }

    /// The dual edge, directed from left face to right face.
    pub fn inv_rot(self) -> EdgeRef {
        EdgeRef(self.0 & !3 | (self.0 + 3) & 3)
    }

    /// The same undirected edge, traversed the other way.
    pub fn sym(self) -> EdgeRef {
        EdgeRef(self.0 & !3 | (self.0 + 2) & 3)
    }
}

/// Stable handle to a live triangle of the subdivision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FaceId(u32);

/// Where a triangle's candidate currently lives relative to the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapState {
    /// Freshly created, not yet scan-converted.
    Unscanned,
    /// Scanned; its candidate sits at this heap slot.
    InHeap(usize),
    /// Scanned but contributing no candidate (exactly fit, empty, or
    /// degenerate), or extracted from the heap.
    NotInHeap,
}

/// An interior face. The anchor is any one of the three bounding directed
/// edges; the vertices are `org(anchor)`, `dest(anchor)`,
/// `dest(lnext(anchor))` in ccw order.
#[derive(Debug, Clone)]
pub struct Triangle {
    anchor: EdgeRef,
    cand: (i32, i32),
    err: f64,
    heap: HeapState,
}

impl Triangle {
    pub(crate) fn new(anchor: EdgeRef) -> Triangle {
        Triangle {
            anchor,
            cand: (-1, -1),
            err: 0.0,
            heap: HeapState::Unscanned,
        }
    }

    pub fn anchor(&self) -> EdgeRef {
        self.anchor
    }

    /// The proposed insertion point, meaningful only while `InHeap`.
    pub fn candidate(&self) -> (i32, i32) {
        self.cand
    }

    /// Aggregate error over the triangle under the configured criterion.
    pub fn err(&self) -> f64 {
        self.err
    }

    pub fn heap_state(&self) -> HeapState {
        self.heap
    }

    pub(crate) fn set_candidate(&mut self, x: i32, y: i32) {
        self.cand = (x, y);
    }

    pub(crate) fn set_err(&mut self, err: f64) {
        self.err = err;
    }

    pub(crate) fn set_heap_state(&mut self, state: HeapState) {
        self.heap = state;
    }
}

/// Slab of live triangles, indexed by `FaceId` with slot reuse.
pub struct FaceSlab {
    slots: Vec<Option<Triangle>>,
    free: Vec<u32>,
}

impl FaceSlab {
    pub(crate) fn new() -> FaceSlab {
        FaceSlab {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    pub(crate) fn alloc(&mut self, tri: Triangle) -> FaceId {
        match self.free.pop() {
            Some(i) => {
                self.slots[i as usize] = Some(tri);
                FaceId(i)
            }
            None => {
                self.slots.push(Some(tri));
                FaceId((self.slots.len() - 1) as u32)
            }
        }
    }

    pub(crate) fn release(&mut self, f: FaceId) {
        let slot = self.slots[f.0 as usize].take();
        debug_assert!(slot.is_some(), "double release of face");
        self.free.push(f.0);
    }

    pub fn get(&self, f: FaceId) -> &Triangle {
        self.slots[f.0 as usize]
            .as_ref()
            .expect("stale face reference")
    }

    pub(crate) fn get_mut(&mut self, f: FaceId) -> &mut Triangle {
        self.slots[f.0 as usize]
            .as_mut()
            .expect("stale face reference")
    }

    pub fn iter(&self) -> impl Iterator<Item = (FaceId, &Triangle)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|t| (FaceId(i as u32), t)))
    }

    pub fn live(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

struct QuadEdgeRec {
    next: [EdgeRef; 4],
    org: [DVec2; 4],
    lface: [Option<FaceId>; 4],
}

/// The dynamic triangulation over the grid rectangle.
///
/// Initialized from the four corner points as two triangles sharing a
/// diagonal; grows only by site insertion and edge swap. When
/// `delaunay` is set, insertions restore the Delaunay condition by
/// suspect-edge flipping; otherwise edge shape is left to the caller
/// (data-dependent swapping).
pub struct Subdivision {
    recs: Vec<Option<QuadEdgeRec>>,
    free_recs: Vec<u32>,
    faces: FaceSlab,
    starting_edge: EdgeRef,
    domain: Aabb,
    delaunay: bool,
}

/// In-circle predicate: true iff `d` lies strictly inside the circle
/// through `a`, `b`, `c` (given ccw).
pub fn in_circle(a: DVec2, b: DVec2, c: DVec2, d: DVec2) -> bool {
    (a.x * a.x + a.y * a.y) * tri_area(b, c, d)
        - (b.x * b.x + b.y * b.y) * tri_area(a, c, d)
        + (c.x * c.x + c.y * c.y) * tri_area(a, b, d)
        - (d.x * d.x + d.y * d.y) * tri_area(a, b, c)
        > 0.0
}

fn near(a: DVec2, b: DVec2) -> bool {
    (a - b).norm_squared() < EPS * EPS
}

impl Subdivision {
    /// Cover the quadrilateral a,b,c,d (ccw) with two triangles sharing
    /// the diagonal c->a.
    pub fn new(a: DVec2, b: DVec2, c: DVec2, d: DVec2, delaunay: bool) -> Subdivision {
        let mut sub = Subdivision {
            recs: Vec::new(),
            free_recs: Vec::new(),
            faces: FaceSlab::new(),
            starting_edge: EdgeRef(0),
            domain: Aabb::new(
                vec2(a.x.min(b.x).min(c.x).min(d.x), a.y.min(b.y).min(c.y).min(d.y)),
                vec2(a.x.max(b.x).max(c.x).max(d.x), a.y.max(b.y).max(c.y).max(d.y)),
            ),
            delaunay,
        };

        let ea = sub.make_edge();
        sub.set_end_points(ea, a, b);
        let eb = sub.make_edge();
        sub.splice(ea.sym(), eb);
        sub.set_end_points(eb, b, c);
        let ec = sub.make_edge();
        sub.splice(eb.sym(), ec);
        sub.set_end_points(ec, c, d);
        let ed = sub.make_edge();
        sub.splice(ec.sym(), ed);
        sub.set_end_points(ed, d, a);
        sub.splice(ed.sym(), ea);
        let diag = sub.connect(eb, ea);

        sub.make_face(ea);
        sub.make_face(diag.sym());
        sub.starting_edge = ea;
        sub
    }

    fn rec(&self, e: EdgeRef) -> &QuadEdgeRec {
        self.recs[e.qe()].as_ref().expect("stale edge reference")
    }

    fn rec_mut(&mut self, e: EdgeRef) -> &mut QuadEdgeRec {
        self.recs[e.qe()].as_mut().expect("stale edge reference")
    }

    // ---- edge algebra through the arena ----

    /// Next ccw edge around the origin.
    pub fn onext(&self, e: EdgeRef) -> EdgeRef {
        self.rec(e).next[e.num()]
    }

    fn set_onext(&mut self, e: EdgeRef, n: EdgeRef) {
        self.rec_mut(e).next[e.num()] = n;
    }

    /// Next cw edge around the origin.
    pub fn oprev(&self, e: EdgeRef) -> EdgeRef {
        self.onext(e.rot()).rot()
    }

    /// Next ccw edge into the destination.
    pub fn dnext(&self, e: EdgeRef) -> EdgeRef {
        self.onext(e.sym()).sym()
    }

    /// Next cw edge into the destination.
    pub fn dprev(&self, e: EdgeRef) -> EdgeRef {
        self.onext(e.inv_rot()).inv_rot()
    }

    /// Next ccw edge around the left face, following `e`.
    pub fn lnext(&self, e: EdgeRef) -> EdgeRef {
        self.onext(e.inv_rot()).rot()
    }

    /// Previous ccw edge around the left face.
    pub fn lprev(&self, e: EdgeRef) -> EdgeRef {
        self.onext(e).sym()
    }

    /// Next ccw edge around the right face, following `e`.
    pub fn rnext(&self, e: EdgeRef) -> EdgeRef {
        self.onext(e.rot()).inv_rot()
    }

    /// Previous ccw edge around the right face.
    pub fn rprev(&self, e: EdgeRef) -> EdgeRef {
        self.onext(e.sym())
    }

    pub fn org(&self, e: EdgeRef) -> DVec2 {
        self.rec(e).org[e.num()]
    }

    pub fn dest(&self, e: EdgeRef) -> DVec2 {
        self.org(e.sym())
    }

    fn set_end_points(&mut self, e: EdgeRef, org: DVec2, dest: DVec2) {
        let r = self.rec_mut(e);
        r.org[e.num()] = org;
        r.org[e.sym().num()] = dest;
    }

    pub fn lface(&self, e: EdgeRef) -> Option<FaceId> {
        self.rec(e).lface[e.num()]
    }

    fn set_lface(&mut self, e: EdgeRef, f: Option<FaceId>) {
        self.rec_mut(e).lface[e.num()] = f;
    }

    // ---- topological operators ----

    /// A fresh edge, isolated: both endpoints unconnected, its dual a
    /// one-edge loop.
    fn make_edge(&mut self) -> EdgeRef {
        let qe = match self.free_recs.pop() {
            Some(i) => i,
            None => {
                self.recs.push(None);
                (self.recs.len() - 1) as u32
            }
        };
        let e = |num| EdgeRef::new(qe, num);
        self.recs[qe as usize] = Some(QuadEdgeRec {
            next: [e(0), e(3), e(2), e(1)],
            org: [vec2(0.0, 0.0); 4],
            lface: [None; 4],
        });
        e(0)
    }

    /// The Guibas–Stolfi splice: exchange the onext rings at the origins
    /// of `a` and `b`, and simultaneously at their duals. The single
    /// primitive from which all connection and disconnection is built.
    fn splice(&mut self, a: EdgeRef, b: EdgeRef) {
        let alpha = self.onext(a).rot();
        let beta = self.onext(b).rot();

        let t1 = self.onext(b);
        let t2 = self.onext(a);
        let t3 = self.onext(beta);
        let t4 = self.onext(alpha);

        self.set_onext(a, t1);
        self.set_onext(b, t2);
        self.set_onext(alpha, t3);
        self.set_onext(beta, t4);
    }

    /// A new edge from `dest(a)` to `org(b)`, spliced into both rings.
    fn connect(&mut self, a: EdgeRef, b: EdgeRef) -> EdgeRef {
        let e = self.make_edge();
        self.set_end_points(e, self.dest(a), self.org(b));
        let an = self.lnext(a);
        self.splice(e, an);
        self.splice(e.sym(), b);
        e
    }

    /// Disconnect `e` from the subdivision and free its record. Any
    /// faces on either side must have been dissolved already.
    fn delete_edge(&mut self, e: EdgeRef) {
        debug_assert!(self.lface(e).is_none() && self.lface(e.sym()).is_none());
        if self.starting_edge.qe() == e.qe() {
            self.starting_edge = self.oprev(e);
        }
        let op = self.oprev(e);
        self.splice(e, op);
        let ops = self.oprev(e.sym());
        self.splice(e.sym(), ops);
        self.recs[e.qe()] = None;
        self.free_recs.push(e.qe() as u32);
    }

    /// Rotate `e` inside the quadrilateral of its two adjacent
    /// triangles, dissolving them and rebuilding the two triangles of
    /// the other diagonal. Returns the new faces (left of `e`, left of
    /// `sym(e)`).
    pub fn swap_edge(&mut self, heap: &mut CandidateHeap, e: EdgeRef) -> (FaceId, FaceId) {
        self.dissolve_lface(heap, e);
        self.dissolve_lface(heap, e.sym());

        let a = self.oprev(e);
        let b = self.oprev(e.sym());
        self.splice(e, a);
        self.splice(e.sym(), b);
        let an = self.lnext(a);
        self.splice(e, an);
        let bn = self.lnext(b);
        self.splice(e.sym(), bn);
        self.set_end_points(e, self.dest(a), self.dest(b));

        let f1 = self.make_face(e);
        let f2 = self.make_face(e.sym());
        (f1, f2)
    }

    // ---- faces ----

    /// Create a triangle anchored at `e` and point the three edges of
    /// its left cycle at it.
    fn make_face(&mut self, e: EdgeRef) -> FaceId {
        let fid = self.faces.alloc(Triangle::new(e));
        let mut c = e;
        loop {
            self.set_lface(c, Some(fid));
            c = self.lnext(c);
            if c == e {
                break;
            }
        }
        debug_assert_eq!(self.lnext(self.lnext(self.lnext(e))), e);
        fid
    }

    /// Destroy a face: null its cycle's left-face pointers, remove its
    /// pending heap entry if any, release the slot.
    fn dissolve_face(&mut self, heap: &mut CandidateHeap, fid: FaceId) {
        let anchor = self.faces.get(fid).anchor();
        let mut c = anchor;
        loop {
            self.set_lface(c, None);
            c = self.lnext(c);
            if c == anchor {
                break;
            }
        }
        if let HeapState::InHeap(slot) = self.faces.get(fid).heap_state() {
            heap.kill(&mut self.faces, slot);
        }
        self.faces.release(fid);
    }

    fn dissolve_lface(&mut self, heap: &mut CandidateHeap, e: EdgeRef) {
        if let Some(fid) = self.lface(e) {
            self.dissolve_face(heap, fid);
        }
    }

    /// True iff the left face of `e` is a triangle of the subdivision
    /// (rather than the outer region, whose cycle walks the whole
    /// perimeter).
    pub fn is_interior(&self, e: EdgeRef) -> bool {
        self.lnext(self.lnext(self.lnext(e))) == e
    }

    pub fn faces(&self) -> &FaceSlab {
        &self.faces
    }

    pub(crate) fn faces_mut(&mut self) -> &mut FaceSlab {
        &mut self.faces
    }

    pub fn face(&self, fid: FaceId) -> &Triangle {
        self.faces.get(fid)
    }

    /// The three vertices of a face, ccw.
    pub fn tri_points(&self, fid: FaceId) -> (DVec2, DVec2, DVec2) {
        let a = self.faces.get(fid).anchor();
        (self.org(a), self.dest(a), self.dest(self.lnext(a)))
    }

    /// The spokes out of `org(e)`, in onext order starting at `e`.
    pub fn spokes(&self, e: EdgeRef) -> Vec<EdgeRef> {
        let mut out = vec![e];
        let mut s = self.onext(e);
        while s != e {
            out.push(s);
            s = self.onext(s);
        }
        out
    }

    // ---- predicates ----

    fn right_of(&self, x: DVec2, e: EdgeRef) -> bool {
        tri_area(x, self.dest(e), self.org(e)) > 0.0
    }

    fn left_of(&self, x: DVec2, e: EdgeRef) -> bool {
        tri_area(x, self.org(e), self.dest(e)) > 0.0
    }

    fn on_edge(&self, x: DVec2, e: EdgeRef) -> bool {
        let org = self.org(e);
        let dest = self.dest(e);
        let t1 = (x - org).norm();
        let t2 = (x - dest).norm();
        if t1 < EPS || t2 < EPS {
            return true;
        }
        let t3 = (dest - org).norm();
        if t1 > t3 || t2 > t3 {
            return false;
        }
        tri_area(org, dest, x).abs() / t3 < EPS
    }

    // ---- point location ----

    /// Walk from `hint` toward `x`, returning an edge of the triangle
    /// containing `x` (or an edge `x` lies on). Fails fast when `x` is
    /// outside the grid rectangle.
    pub fn locate(&self, x: DVec2, hint: EdgeRef) -> Result<EdgeRef, Error> {
        if !self.domain.contains(x) {
            return Err(Error::PointOutsideDomain(x.x, x.y));
        }
        let mut e = hint;
        // each step moves strictly closer to the containing triangle;
        // the cap only trips on corrupted topology
        let cap = 8 * self.recs.len() + 64;
        for _ in 0..cap {
            if near(x, self.org(e)) || near(x, self.dest(e)) || self.on_edge(x, e) {
                return Ok(e);
            }
            if self.right_of(x, e) {
                e = e.sym();
            } else if !self.left_of(x, self.onext(e)) {
                e = self.onext(e);
            } else if !self.left_of(x, self.dprev(e)) {
                e = self.dprev(e);
            } else {
                return Ok(e);
            }
        }
        Err(Error::Topology("locate walk failed to terminate"))
    }

    /// A reasonable seed for `locate` when the caller has no better hint.
    pub fn starting_edge(&self) -> EdgeRef {
        self.starting_edge
    }

    // ---- site insertion ----

    /// Insert a new vertex at `x`, splitting the containing triangle
    /// (or the triangles flanking the containing edge). Returns the
    /// first new edge, with `x` as its origin. In Delaunay mode the
    /// suspect edges opposite the new vertex are swapped while they
    /// violate the in-circle condition.
    ///
    /// Faces destroyed along the way have their heap entries killed;
    /// every face incident to the new vertex afterwards is fresh and
    /// unscanned except those rebuilt by Delaunay swaps, which are also
    /// fresh. Fails with `DuplicateSite` (subdivision untouched) when
    /// `x` coincides with an existing vertex.
    pub fn insert_site(
        &mut self,
        heap: &mut CandidateHeap,
        x: DVec2,
        hint: Option<EdgeRef>,
    ) -> Result<EdgeRef, Error> {
        let mut e = self.locate(x, hint.unwrap_or(self.starting_edge))?;
        if near(x, self.org(e)) || near(x, self.dest(e)) {
            return Err(Error::DuplicateSite(x.x, x.y));
        }
        let first = if self.on_edge(x, e) {
            trace!("site ({}, {}) splits an edge", x.x, x.y);
            if self.lface(e).is_none() {
                e = e.sym();
            }
            if self.lface(e.sym()).is_none() {
                // a perimeter edge has only one flanking triangle; the
                // generic fan-out would walk into the outer face
                self.split_perimeter_edge(heap, e, x)
            } else {
                self.dissolve_lface(heap, e);
                self.dissolve_lface(heap, e.sym());
                e = self.oprev(e);
                let doomed = self.onext(e);
                self.delete_edge(doomed);
                self.fan_out(e, x)
            }
        } else {
            self.dissolve_lface(heap, e);
            self.fan_out(e, x)
        };
        self.starting_edge = first;
        let spoke0 = first.sym();

        if self.delaunay {
            self.restore_delaunay(heap, spoke0, x);
        }

        // rebuild the faces around the new vertex
        let mut s = spoke0;
        loop {
            if self.lface(s).is_none() && self.is_interior(s) {
                self.make_face(s);
            }
            s = self.onext(s);
            if s == spoke0 {
                break;
            }
        }
        Ok(spoke0)
    }

    /// Connect `x` to every vertex of the polygon whose boundary edge
    /// `e` has the (faceless) cavity on its left. Returns the first new
    /// edge, from `org(e)` to `x`.
    fn fan_out(&mut self, mut e: EdgeRef, x: DVec2) -> EdgeRef {
        let first = self.make_edge();
        self.set_end_points(first, self.org(e), x);
        self.splice(first, e);
        let mut base = first;
        loop {
            base = self.connect(e, base.sym());
            e = self.oprev(base);
            if self.lnext(e) == first {
                break;
            }
        }
        first
    }

    /// Split the perimeter edge `e` (interior face on its left) at `x`:
    /// the edge is replaced by two perimeter edges meeting at `x`, and
    /// `x` is connected to the apex of the flanking triangle.
    fn split_perimeter_edge(&mut self, heap: &mut CandidateHeap, e: EdgeRef, x: DVec2) -> EdgeRef {
        let a = self.org(e);
        let f = self.lnext(e);
        let g = self.lnext(f);
        debug_assert_eq!(self.lnext(g), e);
        self.dissolve_lface(heap, e);
        let anchor = self.oprev(e);
        self.delete_edge(e);

        let e1 = self.make_edge();
        self.set_end_points(e1, a, x);
        self.splice(e1, anchor);
        let e2 = self.connect(e1, f);
        self.connect(f, e2);
        e1
    }

    /// Flip the suspect edges around the freshly inserted `x` (the
    /// origin of `spoke0`) while they fail the in-circle test.
    fn restore_delaunay(&mut self, heap: &mut CandidateHeap, spoke0: EdgeRef, x: DVec2) {
        let mut suspects: Vec<EdgeRef> = self
            .spokes(spoke0)
            .iter()
            .map(|&s| self.lnext(s))
            .collect();
        while let Some(e) = suspects.pop() {
            if !self.is_interior(e) || !self.is_interior(e.sym()) {
                continue;
            }
            let far = self.dest(self.oprev(e));
            if self.right_of(far, e) && in_circle(self.org(e), far, self.dest(e), x) {
                self.swap_edge(heap, e);
                // e is now a spoke of x; the opposite edges of the two
                // new triangles become suspect
                suspects.push(self.lnext(self.lnext(e)));
                suspects.push(self.lnext(e.sym()));
            }
        }
    }

    // ---- census ----

    /// Vertex, undirected-edge, and interior-face counts. For any valid
    /// state, V − E + F = 1 (the outer face is not counted).
    pub fn counts(&self) -> (usize, usize, usize) {
        let mut verts: HashSet<(i64, i64)> = HashSet::new();
        let mut edges = 0;
        for (qe, rec) in self.recs.iter().enumerate() {
            if rec.is_none() {
                continue;
            }
            edges += 1;
            for &num in &[0u32, 2u32] {
                let p = self.org(EdgeRef::new(qe as u32, num));
                verts.insert((p.x.round() as i64, p.y.round() as i64));
            }
        }
        (verts.len(), edges, self.faces.live())
    }

    /// One representative directed edge per live undirected edge.
    pub fn edges(&self) -> impl Iterator<Item = EdgeRef> + '_ {
        self.recs
            .iter()
            .enumerate()
            .filter_map(|(qe, r)| r.as_ref().map(|_| EdgeRef::new(qe as u32, 0)))
    }
}
