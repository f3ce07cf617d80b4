//! GPU-facing subsystems: the vertex arena that aggregates column meshes,
//! the per-column residency record it tracks, the frustum culler, and the
//! presenter that drives all three once per frame (see DESIGN.md).

pub mod arena;
pub mod column;
pub mod frustum;
pub mod presenter;

pub use arena::{ArenaLayout, CompactionPlan, ColumnMove, UpsertOutcome, VertexArena};
pub use column::ColumnMesh;
pub use frustum::{extract_planes, intersects_aabb, Frustum, Plane};
pub use presenter::{PresentOutcome, Presenter};
