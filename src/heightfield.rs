//! Grid-sampled height fields and their per-sample bookkeeping.
//!
//! A `HeightField` stores the terrain being approximated and never changes
//! after construction; the simplifier only reads from it. The `UsedMap`
//! tracks which samples already coincide with a vertex of the
//! approximation (and which samples carry no data at all).

use itertools::{Itertools, MinMaxResult};

use crate::common::*;
use crate::geom::{Aabb, Bounds};

/// Elevation value marking a sample with no data. Such samples are never
/// scanned and never become candidates.
pub const NO_DATA: u16 = 65535;

/// Per-sample RGB color, three reals in [0, 1] per sample.
pub struct Texture {
    width: usize,
    height: usize,
    data: Vec<[f64; 3]>,
}

impl Texture {
    pub fn new(width: usize, height: usize, data: Vec<[f64; 3]>) -> Texture {
        assert_eq!(data.len(), width * height);
        Texture {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    fn at(&self, x: usize, y: usize) -> [f64; 3] {
        self.data[y * self.width + x]
    }
}

/// A read-only H×W grid of 16-bit elevations, with an optional color
/// texture of identical dimensions.
pub struct HeightField {
    width: usize,
    height: usize,
    z: Vec<u16>,
    zmin: f64,
    zmax: f64,
    tex: Option<Texture>,
}

impl HeightField {
    /// Build a field from row-major samples. `z.len()` must equal
    /// `width * height`, and the texture (when present) must match the
    /// grid dimensions; the loaders in [`crate::io`] validate both before
    /// calling this.
    pub fn new(width: usize, height: usize, z: Vec<u16>, tex: Option<Texture>) -> HeightField {
        assert_eq!(z.len(), width * height);
        if let Some(t) = &tex {
            assert_eq!((t.width(), t.height()), (width, height));
        }
        let (zmin, zmax) = match z.iter().filter(|&&v| v != NO_DATA).minmax() {
            MinMaxResult::NoElements => (0.0, 0.0),
            MinMaxResult::OneElement(&v) => (v as f64, v as f64),
            MinMaxResult::MinMax(&lo, &hi) => (lo as f64, hi as f64),
        };
        HeightField {
            width,
            height,
            z,
            zmin,
            zmax,
            tex,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn zmin(&self) -> f64 {
        self.zmin
    }

    pub fn zmax(&self) -> f64 {
        self.zmax
    }

    pub fn has_texture(&self) -> bool {
        self.tex.is_some()
    }

    fn in_range(&self, x: i32, y: i32) -> bool {
        x >= 0 && (x as usize) < self.width && y >= 0 && (y as usize) < self.height
    }

    /// Raw sample, including the no-data sentinel. Panics out of range.
    pub fn sample(&self, x: i32, y: i32) -> u16 {
        self.z[y as usize * self.width + x as usize]
    }

    pub fn is_no_data(&self, x: i32, y: i32) -> bool {
        self.sample(x, y) == NO_DATA
    }

    /// Elevation at an integer sample; the minimum elevation out of range.
    pub fn eval(&self, x: i32, y: i32) -> f64 {
        if self.in_range(x, y) {
            self.sample(x, y) as f64
        } else {
            self.zmin
        }
    }

    /// Elevation at a grid point carried as a real (vertex positions).
    pub fn eval_at(&self, p: DVec2) -> f64 {
        self.eval(p.x as i32, p.y as i32)
    }

    /// Bilinear elevation at a fractional position, or `None` when any
    /// contributing corner is a no-data sample.
    pub fn eval_interp(&self, x: f64, y: f64) -> Option<f64> {
        let (c, w) = self.corners(x, y);
        let mut z = 0.0;
        for i in 0..4 {
            if w[i] == 0.0 {
                continue;
            }
            let v = self.z[c[i]];
            if v == NO_DATA {
                return None;
            }
            z += w[i] * v as f64;
        }
        Some(z)
    }

    /// Color at an integer sample; black out of range or without a texture.
    pub fn color(&self, x: i32, y: i32) -> (f64, f64, f64) {
        match &self.tex {
            Some(t) if self.in_range(x, y) => {
                let [r, g, b] = t.at(x as usize, y as usize);
                (r, g, b)
            }
            _ => (0.0, 0.0, 0.0),
        }
    }

    pub fn color_at(&self, p: DVec2) -> (f64, f64, f64) {
        self.color(p.x as i32, p.y as i32)
    }

    /// Bilinear color at a fractional position.
    pub fn color_interp(&self, x: f64, y: f64) -> (f64, f64, f64) {
        let t = match &self.tex {
            Some(t) => t,
            None => return (0.0, 0.0, 0.0),
        };
        let (c, w) = self.corners(x, y);
        let mut rgb = [0.0; 3];
        for i in 0..4 {
            if w[i] == 0.0 {
                continue;
            }
            let px = t.data[c[i]];
            for k in 0..3 {
                rgb[k] += w[i] * px[k];
            }
        }
        (rgb[0], rgb[1], rgb[2])
    }

    /// The grid rectangle [0, W-1] × [0, H-1].
    pub fn domain(&self) -> Aabb {
        Aabb::new(
            vec2(0.0, 0.0),
            vec2((self.width - 1) as f64, (self.height - 1) as f64),
        )
    }

    pub fn bounds(&self) -> Bounds {
        Bounds {
            min: vec3(0.0, 0.0, self.zmin),
            max: vec3(
                (self.width - 1) as f64,
                (self.height - 1) as f64,
                self.zmax,
            ),
        }
    }

    /// Indices and weights of the four bilinear corners around (x, y),
    /// with coordinates clamped into the grid.
    fn corners(&self, x: f64, y: f64) -> ([usize; 4], [f64; 4]) {
        let xc = x.max(0.0).min((self.width - 1) as f64);
        let yc = y.max(0.0).min((self.height - 1) as f64);
        let x0 = xc.floor() as usize;
        let y0 = yc.floor() as usize;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let fx = xc - x0 as f64;
        let fy = yc - y0 as f64;
        (
            [
                y0 * self.width + x0,
                y0 * self.width + x1,
                y1 * self.width + x0,
                y1 * self.width + x1,
            ],
            [
                (1.0 - fx) * (1.0 - fy),
                fx * (1.0 - fy),
                (1.0 - fx) * fy,
                fx * fy,
            ],
        )
    }
}

/// W×H byte grid marking samples that coincide with a subdivision vertex
/// (exactly fit) or that carry no data; neither is ever scanned again.
pub struct UsedMap {
    width: usize,
    height: usize,
    cells: Vec<u8>,
}

impl UsedMap {
    /// Fresh map with the no-data samples of `hf` pre-marked.
    pub fn for_field(hf: &HeightField) -> UsedMap {
        let cells = hf.z.iter().map(|&v| (v == NO_DATA) as u8).collect();
        UsedMap {
            width: hf.width,
            height: hf.height,
            cells,
        }
    }

    pub fn get(&self, x: i32, y: i32) -> bool {
        self.cells[y as usize * self.width + x as usize] != 0
    }

    pub fn set(&mut self, x: i32, y: i32) {
        self.cells[y as usize * self.width + x as usize] = 1;
    }

    /// Interpolated used test for the supersampled scan: a fractional
    /// position counts as used only when every corner with nonzero
    /// bilinear weight is used.
    pub fn is_used_interp(&self, x: f64, y: f64) -> bool {
        let xc = x.max(0.0).min((self.width - 1) as f64);
        let yc = y.max(0.0).min((self.height - 1) as f64);
        let x0 = xc.floor() as usize;
        let y0 = yc.floor() as usize;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let fx = xc - x0 as f64;
        let fy = yc - y0 as f64;
        let corners = [(x0, y0), (x1, y0), (x0, y1), (x1, y1)];
        let weights = [
            (1.0 - fx) * (1.0 - fy),
            fx * (1.0 - fy),
            (1.0 - fx) * fy,
            fx * fy,
        ];
        corners
            .iter()
            .zip(weights.iter())
            .filter(|(_, &w)| w > 0.0)
            .all(|(&(cx, cy), _)| self.cells[cy * self.width + cx] != 0)
    }

    /// Count of used cells, no-data cells included.
    pub fn count(&self) -> usize {
        self.cells.iter().filter(|&&c| c != 0).count()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn ramp(w: usize, h: usize) -> HeightField {
        let z = (0..w * h)
            .map(|i| ((i % w) + (i / w)) as u16)
            .collect::<Vec<_>>();
        HeightField::new(w, h, z, None)
    }

    #[test]
    fn range_cache_skips_sentinel() {
        let mut z = vec![5u16; 16];
        z[3] = NO_DATA;
        z[7] = 9;
        z[9] = 2;
        let hf = HeightField::new(4, 4, z, None);
        assert_approx_eq!(hf.zmin(), 2.0);
        assert_approx_eq!(hf.zmax(), 9.0);
    }

    #[test]
    fn eval_out_of_range_clamps_to_min() {
        let hf = ramp(4, 4);
        assert_approx_eq!(hf.eval(-1, 0), hf.zmin());
        assert_approx_eq!(hf.eval(0, 7), hf.zmin());
        assert_approx_eq!(hf.eval(3, 2), 5.0);
    }

    #[test]
    fn bilinear_on_ramp() {
        let hf = ramp(8, 8);
        // z = x + y is reproduced exactly by bilinear interpolation
        assert_approx_eq!(hf.eval_interp(2.5, 3.25).unwrap(), 5.75);
        assert_approx_eq!(hf.eval_interp(0.0, 0.0).unwrap(), 0.0);
        assert_approx_eq!(hf.eval_interp(7.0, 7.0).unwrap(), 14.0);
    }

    #[test]
    fn bilinear_refuses_no_data() {
        let mut z = vec![10u16; 16];
        z[5] = NO_DATA; // (1, 1)
        let hf = HeightField::new(4, 4, z, None);
        assert!(hf.eval_interp(1.5, 1.0).is_none());
        assert!(hf.eval_interp(0.5, 0.5).is_none());
        // far corner untouched by the sentinel
        assert_approx_eq!(hf.eval_interp(2.5, 2.5).unwrap(), 10.0);
        // integer position away from the hole
        assert_approx_eq!(hf.eval_interp(3.0, 3.0).unwrap(), 10.0);
    }

    #[test]
    fn used_map_marks_no_data() {
        let mut z = vec![1u16; 9];
        z[4] = NO_DATA;
        let hf = HeightField::new(3, 3, z, None);
        let mut used = UsedMap::for_field(&hf);
        assert!(used.get(1, 1));
        assert!(!used.get(0, 0));
        used.set(0, 0);
        assert!(used.get(0, 0));
        assert_eq!(used.count(), 2);
    }

    #[test]
    fn used_interp_needs_all_corners() {
        let hf = ramp(3, 3);
        let mut used = UsedMap::for_field(&hf);
        used.set(0, 0);
        used.set(1, 0);
        assert!(used.is_used_interp(0.5, 0.0));
        assert!(!used.is_used_interp(0.5, 0.5));
        assert!(used.is_used_interp(1.0, 0.0));
        assert!(!used.is_used_interp(1.5, 0.0));
    }

    #[test]
    fn color_defaults_to_black() {
        let hf = ramp(3, 3);
        assert_eq!(hf.color(1, 1), (0.0, 0.0, 0.0));
        let tex = Texture::new(2, 2, vec![[0.5, 0.25, 1.0]; 4]);
        let hf = HeightField::new(2, 2, vec![0, 1, 2, 3], Some(tex));
        assert_eq!(hf.color(1, 0), (0.5, 0.25, 1.0));
        let (r, g, b) = hf.color_interp(0.5, 0.5);
        assert_approx_eq!(r, 0.5);
        assert_approx_eq!(g, 0.25);
        assert_approx_eq!(b, 1.0);
    }
}
