pub mod bvh;
pub mod geometry;
pub mod obj;
mod util;

pub use bvh::{BuildSettings, Bvh, BvhTriangle, HitResult, SplitPolicy};
pub use geometry::Ray;
pub use util::Stats;
