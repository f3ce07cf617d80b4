//! World-space types and the subsystems that operate on them: chunk storage,
//! the terrain generator boundary, and the chunk streamer (see DESIGN.md for
//! what was dropped and why: ECS loader components, persistence, lighting,
//! the old `flurry`-backed map).

pub mod chunk;
pub mod generator;
pub mod spline;
pub mod store;
pub mod streamer;

pub use chunk::{ChunkPos, ColumnPos, LocalPos};
pub use generator::TerrainGenerator;
pub use store::ChunkStore;
pub use streamer::ChunkStreamer;
