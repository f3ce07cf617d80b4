//! The Mesh Presenter: the per-frame driver that ties the Chunk Store, the
//! Mesh Worker Pool, the GPU Vertex Arena, and the Frustum Culler together
//! into a nine-step sequence: query the nearby chunk set, dispatch mesh jobs
//! for dirty chunks, drain and apply completed results, cull against the
//! current view-projection matrix, stamp visibility, flush, compact, compute
//! draw ranges, and draw. Modeled as plain struct fields on `Presenter`
//! rather than a staged system/resource graph (see DESIGN.md).
//!
//! Steps 1-6 (query, dispatch, drain, cull, stamp) only ever touch
//! [`crate::render::arena::ArenaLayout`], the pure half of the Arena, so
//! [`Presenter::present`] takes that rather than the full `glium`-backed
//! [`crate::render::arena::VertexArena`] and is exercisable without a GPU
//! context. Steps 7-8 (flush/compact/merge) do need the backing buffer and
//! live in [`Presenter::flush_and_draw_ranges`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::math::Matrix4;
use crate::mesh::pool::{MeshJob, MeshWorkerPool};
use crate::mesh::vertex::ArenaVertex;
use crate::render::arena::{ArenaLayout, VertexArena};
use crate::render::frustum::{extract_planes, intersects_aabb};
use crate::world::chunk::{Chunk, ChunkPos, CHUNK_HEIGHT, SECTION_LENGTH};
use crate::world::store::ChunkStore;

const DEFAULT_THROTTLE: Duration = Duration::from_millis(200);
/// Bounds how many mesh results a single frame applies, so a backlog built
/// up during a slow frame cannot force an unbounded amount of Arena work
/// into one frame either.
const DEFAULT_MAX_RESULTS_PER_FRAME: usize = 4096;
/// Small inflation applied to a column's XZ-footprint-by-full-height AABB
/// before the frustum test, so a column whose near face exactly touches a
/// frustum plane is not flickered out by floating-point noise.
const COLUMN_AABB_MARGIN: f32 = 0.5;

fn column_aabb(cx: i32, cz: i32) -> crate::aabb::Aabb {
    use nalgebra::point;
    let len = SECTION_LENGTH as f32;
    let x0 = cx as f32 * len - COLUMN_AABB_MARGIN;
    let z0 = cz as f32 * len - COLUMN_AABB_MARGIN;
    crate::aabb::Aabb::new(
        point![x0, -COLUMN_AABB_MARGIN, z0],
        point![
            x0 + len + 2.0 * COLUMN_AABB_MARGIN,
            CHUNK_HEIGHT as f32 + COLUMN_AABB_MARGIN,
            z0 + len + 2.0 * COLUMN_AABB_MARGIN
        ],
    )
}

/// The outcome of one `Presenter::present` call, for callers/tests that
/// want visibility into what happened this frame without re-deriving it
/// from Arena/Store state.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PresentOutcome {
    pub frame: u64,
    pub meshes_dispatched: usize,
    pub results_applied: usize,
    pub visible_columns: usize,
}

/// Per-frame state the Presenter needs to carry across calls: the frame
/// counter, the cached nearby-chunk query (reused whenever `(pcx, pcz,
/// r_max)` is unchanged from the last call), and the throttle clock for the
/// mesh-dispatch timer.
pub struct Presenter {
    frame: u64,
    last_query: Option<(i32, i32, i32)>,
    cached_nearby: Vec<(ChunkPos, Arc<Chunk>)>,
    last_player_chunk: Option<(i32, i32)>,
    last_mesh_dispatch: Instant,
    throttle: Duration,
    max_results_per_frame: usize,
}

impl Presenter {
    pub fn new() -> Self {
        Presenter {
            frame: 0,
            last_query: None,
            cached_nearby: Vec::new(),
            last_player_chunk: None,
            last_mesh_dispatch: Instant::now(),
            throttle: DEFAULT_THROTTLE,
            max_results_per_frame: DEFAULT_MAX_RESULTS_PER_FRAME,
        }
    }

    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    fn player_chunk(x: f64, z: f64) -> (i32, i32) {
        (
            (x / SECTION_LENGTH as f64).floor() as i32,
            (z / SECTION_LENGTH as f64).floor() as i32,
        )
    }

    /// The nearby chunk set, cached across calls that repeat the same
    /// `(pcx, pcz, r_max)` query.
    fn nearby(&mut self, store: &ChunkStore, pcx: i32, pcz: i32, r_max: i32) -> &[(ChunkPos, Arc<Chunk>)] {
        let key = (pcx, pcz, r_max);
        if self.last_query != Some(key) {
            self.cached_nearby = store.chunks_in_xz_radius(pcx, pcz, r_max);
            self.last_query = Some(key);
        }
        &self.cached_nearby
    }

    /// Advances the frame counter, dispatches mesh jobs for dirty chunks in
    /// range, drains and applies completed results into the Arena layout,
    /// culls nearby columns against the given `projection * view` matrix, and
    /// stamps `visible_frame` on the survivors. Flushing, compacting, and
    /// drawing are [`Self::flush_and_draw_ranges`]'s job, since those need
    /// the `glium`-backed buffer this method does not touch.
    pub fn present(
        &mut self,
        store: &ChunkStore,
        mesh_pool: &MeshWorkerPool,
        layout: &mut ArenaLayout,
        player_x: f64,
        player_z: f64,
        r_max: i32,
        view_proj: &Matrix4<f32>,
    ) -> PresentOutcome {
        // Advance the frame counter.
        self.frame += 1;
        let frame = self.frame;

        let (pcx, pcz) = Self::player_chunk(player_x, player_z);
        let crossed_chunk = self.last_player_chunk != Some((pcx, pcz));
        self.last_player_chunk = Some((pcx, pcz));

        let nearby = self.nearby(store, pcx, pcz, r_max);
        let any_dirty = nearby.iter().any(|(_, chunk)| chunk.is_dirty());

        // Dispatch mesh jobs for dirty chunks if something changed or the
        // throttle window elapsed.
        let throttled_due = self.last_mesh_dispatch.elapsed() >= self.throttle;
        let mut meshes_dispatched = 0;
        if any_dirty || crossed_chunk || throttled_due {
            for (pos, chunk) in nearby.iter() {
                if chunk.is_dirty() {
                    let dispatched = mesh_pool.dispatch(MeshJob {
                        pos: *pos,
                        chunk: Arc::clone(chunk),
                    });
                    if dispatched {
                        meshes_dispatched += 1;
                    }
                }
            }
            self.last_mesh_dispatch = Instant::now();
        }

        // Drain results and apply them to the Arena. Stale results for
        // chunks evicted since they were dispatched are silently dropped.
        let mut results_applied = 0;
        for result in mesh_pool.drain_results(self.max_results_per_frame) {
            if !store.is_resident(result.pos) {
                continue;
            }
            let vertices: Vec<ArenaVertex> = result.vertices.into_iter().map(ArenaVertex::from).collect();
            layout.upsert_column(result.pos.cx, result.pos.cz, vertices);
            results_applied += 1;
        }

        // Step 5: the unique (cx, cz) columns among the frustum-visible
        // chunks in the nearby set.
        let frustum = extract_planes(view_proj);
        let mut visible_keys: Vec<(i32, i32)> = Vec::new();
        for (pos, _chunk) in nearby.iter() {
            let key = (pos.cx, pos.cz);
            if visible_keys.contains(&key) {
                continue;
            }
            if intersects_aabb(&column_aabb(pos.cx, pos.cz), &frustum) {
                visible_keys.push(key);
            }
        }

        // Step 6: stamp visible_frame on every column the cull pass kept.
        for &(cx, cz) in &visible_keys {
            layout.stamp_visible(cx, cz, frame);
        }

        PresentOutcome {
            frame,
            meshes_dispatched,
            results_applied,
            visible_columns: visible_keys.len(),
        }
    }

    /// Flushes pending writes, maybe compacts, then computes the merged
    /// draw-range list and stamps `drawn_frame`. Split from [`Self::present`]
    /// because this needs a real `glium::backend::Facade`; the actual draw
    /// call is left to the caller via [`VertexArena::draw_ranges`], since a
    /// `Presenter` has no `glium::Program`/uniforms of its own.
    pub fn flush_and_draw_ranges<F: glium::backend::Facade>(
        &self,
        arena: &mut VertexArena,
        facade: &F,
    ) -> crate::error::Result<Vec<(usize, usize)>> {
        arena.flush(facade)?;
        arena.maybe_compact(facade, self.frame)?;
        Ok(arena.layout_mut().present_draw_ranges(self.frame))
    }
}

impl Default for Presenter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockProperties, BlockRegistry, FaceLayers};
    use nalgebra::{point, Isometry3, Perspective3, Point3, Vector3 as V3};

    fn view_proj(eye: Point3<f32>, target: Point3<f32>) -> Matrix4<f32> {
        let view = Isometry3::look_at_rh(&eye, &target, &V3::y()).to_homogeneous();
        let proj = Perspective3::new(16.0 / 9.0, std::f32::consts::FRAC_PI_2, 0.1, 2000.0).to_homogeneous();
        proj * view
    }

    fn setup() -> (Arc<ChunkStore>, Arc<MeshWorkerPool>) {
        let store = Arc::new(ChunkStore::new());
        let mut registry = BlockRegistry::new();
        registry.register(
            "stone",
            BlockProperties {
                solid: true,
                textures: FaceLayers::uniform(0),
                tint: None,
                elements: None,
            },
        );
        let pool = Arc::new(MeshWorkerPool::new(Arc::clone(&store), Arc::new(registry), 1, 64));
        (store, pool)
    }

    #[test]
    fn present_dispatches_mesh_for_a_freshly_dirtied_chunk_in_range() {
        let (store, pool) = setup();
        store.set_block(0, 64, 0, crate::block::BlockId(1));

        let mut layout = ArenaLayout::new(4096, 4096 * 1024);
        let clip = view_proj(point![-5.0, 64.0, 0.0], point![1.0 - 5.0, 64.0, 0.0]);

        let mut presenter = Presenter::new();
        let outcome = presenter.present(&store, &pool, &mut layout, 0.0, 0.0, 2, &clip);
        assert_eq!(outcome.meshes_dispatched, 1);
        assert_eq!(outcome.frame, 1);
        pool.close();
    }

    #[test]
    fn present_drains_a_completed_mesh_result_into_the_layout() {
        let (store, pool) = setup();
        store.set_block(0, 64, 0, crate::block::BlockId(1));

        let mut layout = ArenaLayout::new(4096, 4096 * 1024);
        let clip = view_proj(point![-5.0, 64.0, 0.0], point![1.0 - 5.0, 64.0, 0.0]);
        let mut presenter = Presenter::new();

        presenter.present(&store, &pool, &mut layout, 0.0, 0.0, 2, &clip);

        let deadline = Instant::now() + Duration::from_secs(2);
        while layout.column(0, 0).map_or(true, |c| !c.is_resident()) && Instant::now() < deadline {
            let outcome = presenter.present(&store, &pool, &mut layout, 0.0, 0.0, 2, &clip);
            if outcome.results_applied == 0 {
                std::thread::sleep(Duration::from_millis(5));
            }
        }

        let column = layout.column(0, 0).expect("column (0,0) should have a record by now");
        assert!(column.is_resident());
        assert!(!layout.is_dirty(0, 0));
        pool.close();
    }

    #[test]
    fn present_stamps_visible_frame_only_for_columns_inside_the_frustum() {
        let (store, pool) = setup();
        // Two columns: one straight ahead, one far behind the camera.
        store.set_block(0, 64, 0, crate::block::BlockId(1));
        store.set_block(0, 64, -2000, crate::block::BlockId(1));

        let mut layout = ArenaLayout::new(4096, 4096 * 1024);
        let clip = view_proj(point![-5.0, 64.0, 0.0], point![1.0 - 5.0, 64.0, 0.0]);
        let mut presenter = Presenter::new();

        presenter.present(&store, &pool, &mut layout, 0.0, 0.0, 130, &clip);

        let near = layout.column(0, 0).expect("near column should get a bookkeeping record");
        assert_eq!(near.visible_frame, 1);
        let far = layout.column(0, -125).map(|c| c.visible_frame).unwrap_or(0);
        assert_ne!(far, 1);
        pool.close();
    }
}
