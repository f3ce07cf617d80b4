//! The public `World` handle: the single type a host application talks to,
//! wiring together the Chunk Store, Chunk Streamer, Mesh Worker Pool, GPU
//! Vertex Arena, and Mesh Presenter into one struct owning every subsystem,
//! constructed once at startup, with per-frame methods the host's main loop
//! calls. Exposes exactly the query/streaming/render surface a host needs:
//! no window, input, or HUD state, since those stay with the host.

use std::sync::Arc;

use glium::backend::Facade;
use glium::Surface;

use crate::block::{BlockId, BlockRegistry};
use crate::config::Config;
use crate::error::Result;
use crate::math::Matrix4;
use crate::mesh::pool::MeshWorkerPool;
use crate::render::arena::VertexArena;
use crate::render::presenter::{PresentOutcome, Presenter};
use crate::world::generator::TerrainGenerator;
use crate::world::store::ChunkStore;
use crate::world::streamer::ChunkStreamer;

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .saturating_sub(1)
        .max(1)
}

/// Owns every engine-core subsystem and exposes the query/streaming/render
/// surface a host application needs. One instance per running game.
pub struct World {
    store: Arc<ChunkStore>,
    streamer: ChunkStreamer,
    mesh_pool: Arc<MeshWorkerPool>,
    registry: Arc<BlockRegistry>,
    arena: VertexArena,
    presenter: Presenter,
    config: Config,
}

impl World {
    /// Constructs a fresh world: an empty Chunk Store, a Chunk Streamer and
    /// Mesh Worker Pool sized off available parallelism, and a GPU Vertex
    /// Arena sized per `config`. GPU-resource creation failure at Arena
    /// initialization is fatal and is propagated here rather than deferred
    /// to first use.
    pub fn new<F: Facade>(
        facade: &F,
        config: Config,
        registry: Arc<BlockRegistry>,
        generator: Arc<dyn TerrainGenerator>,
    ) -> Result<Self> {
        let store = Arc::new(ChunkStore::new());
        let workers = default_worker_count();

        let streamer = ChunkStreamer::new(
            Arc::clone(&store),
            generator,
            workers,
            config.max_pending_jobs(),
            config.max_jobs_per_call(),
        );
        let mesh_pool = Arc::new(MeshWorkerPool::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            workers,
            config.max_pending_jobs(),
        ));
        let arena = VertexArena::new(
            facade,
            config.arena_initial_bytes(),
            config.arena_max_bytes(),
            config.compact_interval_frames(),
        )?;

        Ok(World {
            store,
            streamer,
            mesh_pool,
            registry,
            arena,
            presenter: Presenter::new(),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &BlockRegistry {
        &self.registry
    }

    pub fn get_block(&self, x: i32, y: i32, z: i32) -> BlockId {
        self.store.get_block(x, y, z)
    }

    pub fn set_block(&self, x: i32, y: i32, z: i32, id: BlockId) {
        self.store.set_block(x, y, z, id)
    }

    /// The modification counter the Chunk Store bumps on every structural
    /// change (chunk install/evict), for callers that want to detect "did
    /// anything change since I last checked" without diffing state.
    pub fn mod_count(&self) -> u64 {
        self.store.mod_count()
    }

    /// Non-blocking: enqueues generation jobs for unresident chunks within
    /// `config.render_radius()` of `(x, z)`, nearest first. Safe to call
    /// once per frame.
    pub fn stream_around_async(&self, x: f64, z: f64) {
        self.streamer.stream_around_async(x, z, self.config.render_radius() as i32);
    }

    /// Blocks until every chunk within `config.render_radius()` of `(x, z)`
    /// is resident. Intended for player spawn, not per-frame use.
    pub fn stream_around_sync(&self, x: f64, z: f64) {
        self.streamer.stream_around_sync(x, z, self.config.render_radius() as i32);
    }

    /// Evicts chunks outside `config.chunk_evict_radius()` of `(x, z)`.
    /// Intended to run roughly once per second, not every frame.
    pub fn evict_outside(&self, x: f64, z: f64) -> usize {
        self.streamer.evict_outside(x, z, self.config.chunk_evict_radius() as i32)
    }

    /// Runs one full frame of the Mesh Presenter's pipeline and issues the
    /// resulting draw calls: dispatch dirty chunks within render radius,
    /// drain and apply finished mesh results, cull against `view_proj`,
    /// flush/compact the Arena, then draw the merged visible ranges.
    #[allow(clippy::too_many_arguments)]
    pub fn render<F, S>(
        &mut self,
        facade: &F,
        target: &mut S,
        program: &glium::Program,
        uniforms: &impl glium::uniforms::Uniforms,
        player_x: f64,
        player_z: f64,
        view_proj: &Matrix4<f32>,
        wireframe: bool,
    ) -> Result<PresentOutcome>
    where
        F: Facade,
        S: Surface,
    {
        let outcome = self.presenter.present(
            &self.store,
            &self.mesh_pool,
            self.arena.layout_mut(),
            player_x,
            player_z,
            self.config.render_radius() as i32,
            view_proj,
        );

        let ranges = self.presenter.flush_and_draw_ranges(&mut self.arena, facade)?;

        let draw_params = glium::DrawParameters {
            depth: glium::Depth {
                test: glium::DepthTest::IfLess,
                write: true,
                ..Default::default()
            },
            // Emitted quads wind CCW-front, so back faces (the ones to
            // discard) are clockwise (see DESIGN.md).
            backface_culling: glium::draw_parameters::BackfaceCullingMode::CullClockwise,
            polygon_mode: if wireframe {
                glium::draw_parameters::PolygonMode::Line
            } else {
                glium::draw_parameters::PolygonMode::Fill
            },
            ..Default::default()
        };

        self.arena.draw_ranges(target, program, uniforms, &draw_params, &ranges)?;

        Ok(outcome)
    }

    /// Idempotent shutdown: closes the streamer and mesh pool's worker
    /// threads. Safe to call more than once, and called automatically on
    /// drop.
    pub fn close(&self) {
        self.streamer.close();
        self.mesh_pool.close();
    }
}

impl Drop for World {
    fn drop(&mut self) {
        self.close();
    }
}
