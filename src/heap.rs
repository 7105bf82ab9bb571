//! Binary max-heap of per-triangle candidates.
//!
//! Each node pairs a candidate error with the face proposing it; the
//! face carries its own slot index back, and every swap inside the heap
//! updates both sides so that `face.heap_state()` always names the slot
//! actually holding it. Capacity is fixed up front at the maximum
//! triangle count, so refinement never reallocates.

use crate::quadedge::{FaceId, FaceSlab, HeapState};

#[derive(Debug, Clone, Copy)]
pub struct HeapNode {
    pub val: f64,
    pub face: FaceId,
}

pub struct CandidateHeap {
    node: Vec<HeapNode>,
}

impl CandidateHeap {
    pub fn new(capacity: usize) -> CandidateHeap {
        CandidateHeap {
            node: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node.is_empty()
    }

    pub fn top(&self) -> Option<&HeapNode> {
        self.node.first()
    }

    fn parent(i: usize) -> usize {
        (i - 1) / 2
    }

    fn point_back(&self, faces: &mut FaceSlab, i: usize) {
        faces
            .get_mut(self.node[i].face)
            .set_heap_state(HeapState::InHeap(i));
    }

    fn swap_nodes(&mut self, faces: &mut FaceSlab, i: usize, j: usize) {
        self.node.swap(i, j);
        self.point_back(faces, i);
        self.point_back(faces, j);
    }

    fn upheap(&mut self, faces: &mut FaceSlab, mut i: usize) {
        while i > 0 && self.node[i].val > self.node[Self::parent(i)].val {
            let p = Self::parent(i);
            self.swap_nodes(faces, i, p);
            i = p;
        }
    }

    fn downheap(&mut self, faces: &mut FaceSlab, mut i: usize) {
        loop {
            let mut largest = i;
            let l = 2 * i + 1;
            let r = 2 * i + 2;
            if l < self.node.len() && self.node[l].val > self.node[largest].val {
                largest = l;
            }
            if r < self.node.len() && self.node[r].val > self.node[largest].val {
                largest = r;
            }
            if largest == i {
                return;
            }
            self.swap_nodes(faces, i, largest);
            i = largest;
        }
    }

    /// Append and sift up; the face is marked `InHeap`.
    pub fn insert(&mut self, faces: &mut FaceSlab, face: FaceId, val: f64) {
        self.node.push(HeapNode { val, face });
        let i = self.node.len() - 1;
        self.point_back(faces, i);
        self.upheap(faces, i);
    }

    /// Remove and return the top entry; its face becomes `NotInHeap`.
    pub fn extract(&mut self, faces: &mut FaceSlab) -> Option<HeapNode> {
        if self.node.is_empty() {
            return None;
        }
        let last = self.node.len() - 1;
        self.node.swap(0, last);
        let out = self.node.pop().unwrap();
        if !self.node.is_empty() {
            self.point_back(faces, 0);
            self.downheap(faces, 0);
        }
        faces
            .get_mut(out.face)
            .set_heap_state(HeapState::NotInHeap);
        Some(out)
    }

    /// Re-key the entry at `slot` and sift it to its place.
    pub fn update(&mut self, faces: &mut FaceSlab, slot: usize, val: f64) {
        self.node[slot].val = val;
        if slot > 0 && self.node[slot].val > self.node[Self::parent(slot)].val {
            self.upheap(faces, slot);
        } else {
            self.downheap(faces, slot);
        }
    }

    /// Drop the entry at `slot`, used when its triangle is destroyed.
    /// The dying face itself is left untouched; only the entry moved
    /// into the vacated slot has its back-pointer repaired.
    pub fn kill(&mut self, faces: &mut FaceSlab, slot: usize) {
        let last = self.node.len() - 1;
        if slot == last {
            self.node.pop();
            return;
        }
        self.node.swap(slot, last);
        self.node.pop();
        self.point_back(faces, slot);
        if slot > 0 && self.node[slot].val > self.node[Self::parent(slot)].val {
            self.upheap(faces, slot);
        } else {
            self.downheap(faces, slot);
        }
    }

    /// Check the heap ordering and back-pointer invariants; test support.
    #[cfg(test)]
    fn check(&self, faces: &FaceSlab) {
        for i in 0..self.node.len() {
            if i > 0 {
                assert!(self.node[Self::parent(i)].val >= self.node[i].val);
            }
            assert_eq!(
                faces.get(self.node[i].face).heap_state(),
                HeapState::InHeap(i)
            );
        }
    }
}
