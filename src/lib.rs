mod common;
pub mod geom;
pub mod heap;
pub mod heightfield;
pub mod io;
pub mod mesh;
pub mod quadedge;
pub mod scan;
pub mod simplify;

pub use heightfield::{HeightField, Texture, UsedMap, NO_DATA};
pub use mesh::{MeshTriangle, SvgOptions};
pub use quadedge::{EdgeRef, FaceId, Subdivision};
pub use scan::{Criterion, FitPlane, ScanStats};
pub use simplify::{Config, Simplifier};

use thiserror::Error;

/// Failures of the core refinement machinery. Input decoding failures live
/// in [`io::LoadError`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// `locate` was handed a query outside the grid rectangle.
    #[error("point ({0}, {1}) lies outside the subdivision domain")]
    PointOutsideDomain(f64, f64),

    /// `insert_site` was asked to insert a point that coincides with an
    /// existing vertex. Recoverable: the caller marks the sample used.
    #[error("site ({0}, {1}) coincides with an existing vertex")]
    DuplicateSite(f64, f64),

    /// The candidate heap has nothing left to refine.
    #[error("candidate heap is empty")]
    HeapEmpty,

    /// A configuration combination the implementation does not support.
    #[error("unsupported configuration: {0}")]
    UnsupportedConfig(String),

    /// The subdivision violated one of its structural invariants.
    #[error("topology invariant violated: {0}")]
    Topology(&'static str),
}
