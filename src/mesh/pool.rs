//! The Mesh Worker Pool: a dedicated thread pool that runs the Greedy Mesher
//! off the main thread and returns packed-vertex results over a bounded
//! channel. `NumCPU - 1` workers drain a bounded job queue, each with its own
//! `JoinHandle`, and a dedicated result channel is drained by the main
//! thread, using the same `std::thread` + `crossbeam_channel` worker-loop
//! idiom `world::streamer` uses for chunk generation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::block::BlockRegistry;
use crate::mesh::mesher::mesh_chunk;
use crate::mesh::vertex::PackedVertex;
use crate::world::chunk::{Chunk, ChunkPos};
use crate::world::store::ChunkStore;

/// A chunk ready to be remeshed. `chunk` is the Arc the store currently
/// holds for `pos`; workers only read it, per §5's reader/writer discipline.
pub struct MeshJob {
    pub pos: ChunkPos,
    pub chunk: Arc<Chunk>,
}

/// A completed mesh, keyed by the chunk it was built from.
pub struct MeshResult {
    pub pos: ChunkPos,
    pub vertices: Vec<PackedVertex>,
}

enum Job {
    Mesh(ChunkPos, Arc<Chunk>),
    Shutdown,
}

/// Owns `NumCPU - 1`-ish worker threads (the caller picks the count) pulling
/// from a bounded job queue (reference: 200) and a result channel the main
/// thread drains once per frame.
pub struct MeshWorkerPool {
    job_tx: crossbeam_channel::Sender<Job>,
    result_rx: crossbeam_channel::Receiver<MeshResult>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl MeshWorkerPool {
    pub fn new(
        store: Arc<ChunkStore>,
        registry: Arc<BlockRegistry>,
        num_workers: usize,
        max_pending_jobs: usize,
    ) -> Self {
        let (job_tx, job_rx) = crossbeam_channel::bounded::<Job>(max_pending_jobs.max(1));
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<MeshResult>();

        let mut workers = Vec::with_capacity(num_workers.max(1));
        for worker_id in 0..num_workers.max(1) {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let store = Arc::clone(&store);
            let registry = Arc::clone(&registry);
            let handle = std::thread::Builder::new()
                .name(format!("chunk-mesh-{}", worker_id))
                .spawn(move || mesh_worker_loop(job_rx, result_tx, store, registry))
                .expect("failed to spawn chunk mesh worker thread");
            workers.push(handle);
        }

        MeshWorkerPool {
            job_tx,
            result_rx,
            workers: Mutex::new(workers),
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueues `job` and, on success, marks its chunk clean so the caller's
    /// dirty scan does not dispatch it again before the result lands.
    /// Returns `false` (chunk left dirty, untouched) if the queue is full;
    /// the caller's next dirty scan will retry it.
    pub fn dispatch(&self, job: MeshJob) -> bool {
        if self.closed.load(Ordering::Relaxed) {
            return false;
        }
        match self.job_tx.try_send(Job::Mesh(job.pos, Arc::clone(&job.chunk))) {
            Ok(()) => {
                job.chunk.clear_dirty();
                true
            }
            Err(_) => false,
        }
    }

    /// Non-blocking drain of completed results, applied by the caller to
    /// Column Meshes. Bounded per call so a slow frame cannot be forced to
    /// drain an unbounded backlog in one go.
    pub fn drain_results(&self, max: usize) -> Vec<MeshResult> {
        let mut out = Vec::new();
        while out.len() < max {
            match self.result_rx.try_recv() {
                Ok(result) => out.push(result),
                Err(_) => break,
            }
        }
        out
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

impl Drop for MeshWorkerPool {
    fn drop(&mut self) {
        self.close();
    }
}

/// Meshing is total and cannot fail, so unlike the generation worker loop
/// this one does not wrap the call in `catch_unwind`: a panic here is a
/// mesher bug, not an expected failure mode to isolate.
fn mesh_worker_loop(
    job_rx: crossbeam_channel::Receiver<Job>,
    result_tx: crossbeam_channel::Sender<MeshResult>,
    store: Arc<ChunkStore>,
    registry: Arc<BlockRegistry>,
) {
    while let Ok(job) = job_rx.recv() {
        let (pos, chunk) = match job {
            Job::Mesh(pos, chunk) => (pos, chunk),
            Job::Shutdown => break,
        };

        let vertices = mesh_chunk(&chunk, pos, &store, &registry);
        if result_tx.send(MeshResult { pos, vertices }).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockId, BlockProperties, FaceLayers};
    use crate::world::chunk::LocalPos;

    fn stone_registry() -> (Arc<BlockRegistry>, BlockId) {
        let mut registry = BlockRegistry::new();
        let stone = registry.register(
            "stone",
            BlockProperties {
                solid: true,
                textures: FaceLayers::uniform(1),
                tint: None,
                elements: None,
            },
        );
        (Arc::new(registry), stone)
    }

    #[test]
    fn dispatch_marks_chunk_clean_and_delivers_a_result() {
        let store = Arc::new(ChunkStore::new());
        let (registry, stone) = stone_registry();
        let pool = MeshWorkerPool::new(Arc::clone(&store), registry, 1, 16);

        let pos = ChunkPos { cx: 0, cy: 0, cz: 0 };
        let chunk = store.get(pos, true).unwrap();
        chunk.set_block(LocalPos { x: 0, y: 64, z: 0 }, stone);
        assert!(chunk.is_dirty());

        assert!(pool.dispatch(MeshJob { pos, chunk: Arc::clone(&chunk) }));
        assert!(!chunk.is_dirty());

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        let mut results = Vec::new();
        while results.is_empty() && std::time::Instant::now() < deadline {
            results = pool.drain_results(16);
            if results.is_empty() {
                std::thread::sleep(std::time::Duration::from_millis(5));
            }
        }

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].pos, pos);
        assert_eq!(results[0].vertices.len(), 36);
        pool.close();
    }

    #[test]
    fn close_is_idempotent() {
        let store = Arc::new(ChunkStore::new());
        let (registry, _) = stone_registry();
        let pool = MeshWorkerPool::new(store, registry, 1, 16);
        pool.close();
        pool.close();
    }
}
