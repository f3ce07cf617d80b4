use thiserror::Error;

/// Errors that cross the public boundary of the core. Everything else internal
/// (registry loading, config parsing) stays as plain `anyhow::Error` the way
/// the rest of this crate already handles recoverable, local fallibility.
///
/// Per-chunk generator panics are not a `WorldError` variant: the streamer
/// catches them, logs, clears the coordinate from its pending set, and lets
/// the next spiral pass retry (see `world::streamer`), matching the "no
/// propagation to the main thread beyond a log line" failure semantics.
/// `GpuInit` is the one boundary failure this crate treats as fatal, since
/// it can only happen once, at `World::new`.
#[derive(Error, Debug)]
pub enum WorldError {
    #[error("failed to initialize GPU resources: {0}")]
    GpuInit(#[source] anyhow::Error),
}

pub type Result<T, E = anyhow::Error> = std::result::Result<T, E>;
