//! Voxel world engine core: chunk storage, streaming, greedy meshing, and
//! the GPU vertex arena that aggregates meshed columns for rendering.
//!
//! This crate is a library only; the host application owns the window,
//! input, HUD, player physics, and terrain noise functions, talking to a
//! [`World`] handle through the surface documented on that type.

pub mod aabb;
pub mod block;
pub mod config;
pub mod error;
pub mod mesh;
pub mod render;
pub mod world;

mod handle;
pub use handle::World;

pub mod math {
    pub use nalgebra::{Matrix3, Matrix4, Point1, Point2, Point3, Vector2, Vector3, Vector4};
}

pub mod prelude {
    pub type Result<T, E = anyhow::Error> = std::result::Result<T, E>;
    pub use anyhow::{anyhow, bail};

    pub use nalgebra::{point, vector};
}
