//! The Chunk Streamer: keeps a radius around the player populated by
//! enqueuing generation jobs in spiral order and evicting chunks that fall
//! outside an eviction radius. Generation runs on dedicated `std::thread`
//! worker loops over bounded `crossbeam_channel`s owned by the streamer
//! itself, with a dedup set so a chunk already pending isn't enqueued twice.
//! Spiral-order enumeration walks rings outward by Chebyshev distance so the
//! nearest unresident chunks are generated first.

use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::world::chunk::{Chunk, ChunkPos, ColumnPos, CHUNK_HEIGHT, SECTION_LENGTH};
use crate::world::generator::TerrainGenerator;
use crate::world::store::ChunkStore;

/// Hard cap on jobs enqueued by a single `stream_around_async` call,
/// independent of `Config::max_jobs_per_call` so a streamer built without a
/// `Config` in hand (e.g. in tests) still has a sane default.
const DEFAULT_MAX_JOBS_PER_CALL: usize = 2048;

struct PendingSet {
    coords: Mutex<HashSet<ChunkPos>>,
}

impl PendingSet {
    fn new() -> Self {
        PendingSet {
            coords: Mutex::new(HashSet::new()),
        }
    }

    /// Returns `true` if `pos` was newly inserted (i.e. this caller now owns
    /// submitting the job).
    fn try_insert(&self, pos: ChunkPos) -> bool {
        self.coords.lock().insert(pos)
    }

    fn remove(&self, pos: ChunkPos) {
        self.coords.lock().remove(&pos);
    }

    fn contains(&self, pos: ChunkPos) -> bool {
        self.coords.lock().contains(&pos)
    }
}

/// Enumerates `(cx, cz)` offsets in rings of increasing Chebyshev distance,
/// nearest ring first; within a ring, the four sides are walked clockwise
/// starting at the lower-left corner. Distance 0 yields just the origin.
fn spiral_offsets(max_radius: i32) -> Vec<(i32, i32)> {
    let mut out = Vec::new();
    out.push((0, 0));
    for r in 1..=max_radius {
        // left edge, bottom to top
        for dz in -r..=r {
            out.push((-r, dz));
        }
        // top edge, left to right (excluding the corner already emitted)
        for dx in (-r + 1)..=r {
            out.push((dx, r));
        }
        // right edge, top to bottom (excluding the corner already emitted)
        for dz in (-r..r).rev() {
            out.push((r, dz));
        }
        // bottom edge, right to left (excluding both corners already emitted)
        for dx in ((-r + 1)..r).rev() {
            out.push((dx, -r));
        }
    }
    out
}

struct HeightCache {
    heights: RwLock<HashMap<ColumnPos, i32>>,
}

impl HeightCache {
    fn new() -> Self {
        HeightCache {
            heights: RwLock::new(HashMap::new()),
        }
    }

    /// A `Chunk` here is the full 256-tall, 16-section volume
    /// (`world::store::world_to_chunk` always maps to `cy == 0`), so the
    /// vertical sweep has exactly one chunk per column regardless of
    /// `height_at`: dividing by `CHUNK_HEIGHT` rather than `SECTION_LENGTH`
    /// keeps `max_chunk_y` at `0` instead of spuriously generating and
    /// meshing several phantom `cy > 0` chunks that all alias the same
    /// `cy == 0` content.
    fn max_chunk_y(&self, generator: &dyn TerrainGenerator, col: ColumnPos) -> i32 {
        if let Some(&h) = self.heights.read().get(&col) {
            return h;
        }
        let [wx, _, wz] = [col.cx * SECTION_LENGTH as i32, 0, col.cz * SECTION_LENGTH as i32];
        let height = generator.height_at(wx, wz);
        let chunk_y = (height / CHUNK_HEIGHT as i32).max(0);
        self.heights.write().insert(col, chunk_y);
        chunk_y
    }

    fn prune_outside(&self, cx: i32, cz: i32, r: i32) {
        let r_sq = (r as i64) * (r as i64);
        self.heights.write().retain(|col, _| {
            let dx = (col.cx - cx) as i64;
            let dz = (col.cz - cz) as i64;
            dx * dx + dz * dz <= r_sq
        });
    }
}

enum Job {
    Generate(ChunkPos),
    Shutdown,
}

/// Owns a pool of generation worker threads and drives spiral-order
/// enqueueing. One instance per `World`; its threads are joined on `close`.
pub struct ChunkStreamer {
    store: Arc<ChunkStore>,
    generator: Arc<dyn TerrainGenerator>,
    pending: Arc<PendingSet>,
    heights: Arc<HeightCache>,
    job_tx: crossbeam_channel::Sender<Job>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
    max_jobs_per_call: usize,
}

impl ChunkStreamer {
    /// Spawns `num_workers` generation threads (reference: `NumCPU`) pulling
    /// from a job queue bounded at `max_pending_jobs`.
    pub fn new(
        store: Arc<ChunkStore>,
        generator: Arc<dyn TerrainGenerator>,
        num_workers: usize,
        max_pending_jobs: usize,
        max_jobs_per_call: usize,
    ) -> Self {
        let (job_tx, job_rx) = crossbeam_channel::bounded::<Job>(max_pending_jobs.max(1));
        let pending = Arc::new(PendingSet::new());
        let heights = Arc::new(HeightCache::new());

        let mut workers = Vec::with_capacity(num_workers);
        for worker_id in 0..num_workers.max(1) {
            let job_rx = job_rx.clone();
            let store = Arc::clone(&store);
            let generator = Arc::clone(&generator);
            let pending = Arc::clone(&pending);
            let handle = std::thread::Builder::new()
                .name(format!("chunk-gen-{}", worker_id))
                .spawn(move || generation_worker_loop(job_rx, store, generator, pending))
                .expect("failed to spawn chunk generation worker thread");
            workers.push(handle);
        }

        ChunkStreamer {
            store,
            generator,
            pending,
            heights,
            job_tx,
            workers: Mutex::new(workers),
            closed: AtomicBool::new(false),
            max_jobs_per_call,
        }
    }

    fn player_chunk(x: f64, z: f64) -> (i32, i32) {
        (
            (x / SECTION_LENGTH as f64).floor() as i32,
            (z / SECTION_LENGTH as f64).floor() as i32,
        )
    }

    /// Non-blocking: enqueues at most `max_jobs_per_call` generation jobs
    /// this invocation, nearest-chunk-first. Safe to call once per frame.
    pub fn stream_around_async(&self, x: f64, z: f64, radius: i32) {
        if self.closed.load(Ordering::Relaxed) {
            return;
        }
        let (pcx, pcz) = Self::player_chunk(x, z);
        let mut submitted = 0usize;

        'outer: for (dx, dz) in spiral_offsets(radius) {
            let col = ColumnPos {
                cx: pcx + dx,
                cz: pcz + dz,
            };
            let max_cy = self.heights.max_chunk_y(&*self.generator, col);
            for cy in 0..=max_cy {
                if submitted >= self.max_jobs_per_call {
                    break 'outer;
                }
                let pos = col.chunk(cy);
                if self.store.is_resident(pos) {
                    continue;
                }
                if !self.pending.try_insert(pos) {
                    continue;
                }
                match self.job_tx.try_send(Job::Generate(pos)) {
                    Ok(()) => submitted += 1,
                    Err(_) => {
                        // queue full: drop back out of pending, the next
                        // spiral will naturally revisit this coordinate.
                        self.pending.remove(pos);
                    }
                }
            }
        }
    }

    /// Blocks until every chunk in `{(cx,cz,cy) : dx^2+dz^2 <= radius^2}` is
    /// resident. Used by tests and player spawn.
    pub fn stream_around_sync(&self, x: f64, z: f64, radius: i32) {
        let (pcx, pcz) = Self::player_chunk(x, z);
        loop {
            self.stream_around_async(x, z, radius);

            let mut all_resident = true;
            'check: for (dx, dz) in spiral_offsets(radius) {
                let col = ColumnPos {
                    cx: pcx + dx,
                    cz: pcz + dz,
                };
                let max_cy = self.heights.max_chunk_y(&*self.generator, col);
                for cy in 0..=max_cy {
                    if !self.store.is_resident(col.chunk(cy)) {
                        all_resident = false;
                        break 'check;
                    }
                }
            }

            if all_resident {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    /// Delegates to the Store and prunes the height cache; intended to run
    /// on the main thread roughly once per second.
    pub fn evict_outside(&self, x: f64, z: f64, radius: i32) -> usize {
        let (pcx, pcz) = Self::player_chunk(x, z);
        let removed = self.store.evict_outside(pcx, pcz, radius);
        self.heights.prune_outside(pcx, pcz, radius);
        removed
    }

    /// Idempotent shutdown: closes the job queue and joins worker threads.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let workers = {
            let mut guard = self.workers.lock();
            std::mem::take(&mut *guard)
        };
        for _ in &workers {
            let _ = self.job_tx.send(Job::Shutdown);
        }
        for handle in workers {
            let _ = handle.join();
        }
    }
}

impl Drop for ChunkStreamer {
    fn drop(&mut self) {
        self.close();
    }
}

fn generation_worker_loop(
    job_rx: crossbeam_channel::Receiver<Job>,
    store: Arc<ChunkStore>,
    generator: Arc<dyn TerrainGenerator>,
    pending: Arc<PendingSet>,
) {
    while let Ok(job) = job_rx.recv() {
        let pos = match job {
            Job::Generate(pos) => pos,
            Job::Shutdown => break,
        };

        let mut chunk = Chunk::new_empty(pos);
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            generator.populate_chunk(&mut chunk);
        }));

        match result {
            Ok(()) => {
                store.install(Arc::new(chunk));
            }
            Err(_) => {
                log::warn!("terrain generator panicked for chunk {:?}; will retry", pos);
            }
        }
        pending.remove(pos);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockId;
    use crate::world::chunk::LocalPos;

    struct FlatGenerator;

    impl TerrainGenerator for FlatGenerator {
        fn height_at(&self, _wx: i32, _wz: i32) -> i32 {
            64
        }

        fn populate_chunk(&self, chunk: &mut Chunk) {
            for x in 0..16u8 {
                for z in 0..16u8 {
                    chunk.set_block(LocalPos { x, y: 0, z }, BlockId(1));
                }
            }
            chunk.mark_dirty();
        }
    }

    #[test]
    fn spiral_offsets_radius_zero_is_origin_only() {
        assert_eq!(spiral_offsets(0), vec![(0, 0)]);
    }

    #[test]
    fn spiral_offsets_covers_full_chebyshev_disc() {
        let offsets = spiral_offsets(2);
        let mut expected: Vec<(i32, i32)> = Vec::new();
        for dx in -2..=2 {
            for dz in -2..=2 {
                expected.push((dx, dz));
            }
        }
        assert_eq!(offsets.len(), expected.len());
        for point in expected {
            assert!(offsets.contains(&point), "missing {:?}", point);
        }
    }

    #[test]
    fn stream_around_sync_populates_full_radius() {
        let store = Arc::new(ChunkStore::new());
        let generator: Arc<dyn TerrainGenerator> = Arc::new(FlatGenerator);
        let streamer = ChunkStreamer::new(Arc::clone(&store), generator, 4, 16384, 2048);

        streamer.stream_around_sync(0.0, 0.0, 3);

        for dx in -3..=3 {
            for dz in -3..=3 {
                if dx * dx + dz * dz > 9 {
                    continue;
                }
                assert!(store.is_resident(ChunkPos {
                    cx: dx,
                    cy: 0,
                    cz: dz,
                }));
            }
        }
        streamer.close();
    }

    #[test]
    fn close_is_idempotent() {
        let store = Arc::new(ChunkStore::new());
        let generator: Arc<dyn TerrainGenerator> = Arc::new(FlatGenerator);
        let streamer = ChunkStreamer::new(store, generator, 2, 64, 64);
        streamer.close();
        streamer.close();
    }
}
