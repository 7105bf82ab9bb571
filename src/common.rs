pub use nalgebra as na;
pub use nalgebra_glm as glm;

pub use glm::{vec2, vec3, DVec2, DVec3};

pub(crate) const EPS: f64 = 1e-5;
pub(crate) const AREA_EPS: f64 = 1e-5;
