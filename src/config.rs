use serde::{Deserialize, Serialize};
use std::io::Read;

use crate::error::Result;

const RENDER_RADIUS_RANGE: std::ops::RangeInclusive<u32> = 5..=50;
const EVICT_MARGIN_DEFAULT: u32 = 2;

/// Tunables for the streaming/meshing/arena subsystems. Constructed with
/// [`Config::new`] (reference defaults) or loaded from JSON the same way
/// `world::registry::load_registry` loads its manifest. Out-of-range values are
/// clamped, never rejected, consistent with this crate's "never panic on a
/// recoverable condition" error-handling stance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    render_radius: u32,
    evict_margin: u32,
    max_pending_jobs: usize,
    max_jobs_per_call: usize,
    arena_initial_bytes: usize,
    arena_max_bytes: usize,
    compact_interval_frames: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            render_radius: 16,
            evict_margin: EVICT_MARGIN_DEFAULT,
            max_pending_jobs: 16384,
            max_jobs_per_call: 2048,
            arena_initial_bytes: 256 * 1024 * 1024,
            arena_max_bytes: 512 * 1024 * 1024,
            compact_interval_frames: 2000,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_str(s: &str) -> Result<Self> {
        let mut cfg: Config = serde_json::from_str(s)?;
        cfg.clamp_all();
        Ok(cfg)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut cfg: Config = serde_json::from_reader(reader)?;
        cfg.clamp_all();
        Ok(cfg)
    }

    fn clamp_all(&mut self) {
        let clamped = self
            .render_radius
            .clamp(*RENDER_RADIUS_RANGE.start(), *RENDER_RADIUS_RANGE.end());
        if clamped != self.render_radius {
            log::warn!(
                "render_radius {} out of range, clamped to {}",
                self.render_radius,
                clamped
            );
            self.render_radius = clamped;
        }

        if self.max_jobs_per_call == 0 {
            log::warn!("max_jobs_per_call was 0, clamped to 1");
            self.max_jobs_per_call = 1;
        }
        if self.max_pending_jobs == 0 {
            log::warn!("max_pending_jobs was 0, clamped to 1");
            self.max_pending_jobs = 1;
        }
        if self.arena_max_bytes < self.arena_initial_bytes {
            log::warn!(
                "arena_max_bytes {} smaller than arena_initial_bytes {}, raising max to match",
                self.arena_max_bytes,
                self.arena_initial_bytes
            );
            self.arena_max_bytes = self.arena_initial_bytes;
        }
    }

    pub fn render_radius(&self) -> u32 {
        self.render_radius
    }

    pub fn set_render_radius(&mut self, radius: u32) {
        self.render_radius = radius.clamp(*RENDER_RADIUS_RANGE.start(), *RENDER_RADIUS_RANGE.end());
    }

    pub fn chunk_evict_radius(&self) -> u32 {
        self.render_radius + self.evict_margin
    }

    pub fn set_evict_margin(&mut self, margin: u32) {
        self.evict_margin = margin;
    }

    pub fn max_pending_jobs(&self) -> usize {
        self.max_pending_jobs
    }

    pub fn max_jobs_per_call(&self) -> usize {
        self.max_jobs_per_call
    }

    pub fn arena_initial_bytes(&self) -> usize {
        self.arena_initial_bytes
    }

    pub fn arena_max_bytes(&self) -> usize {
        self.arena_max_bytes
    }

    pub fn compact_interval_frames(&self) -> u64 {
        self.compact_interval_frames
    }
}
