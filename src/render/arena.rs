//! The GPU Vertex Arena: a single growable vertex buffer that aggregates
//! every column's mesh, grown by doubling, compacted when fragmentation
//! crosses a threshold. Unlike a scheme that allocates one independent
//! `glium::VertexBuffer` per chunk, every column's vertices share one
//! buffer, addressed by byte range, so a full-frame draw can merge adjacent
//! columns into a single draw call instead of one per chunk.
//! It is split into [`ArenaLayout`] (pure offset/fragmentation bookkeeping,
//! fully unit-testable without a GPU context) and [`VertexArena`] (the
//! `glium`-backed wrapper that actually owns the buffer), matching this
//! codebase's existing preference for keeping GPU calls at the edges and
//! plain data structures doing the real logic (see `world::store`'s
//! separation of the lock-protected index from `Chunk` itself).

use std::collections::HashMap;

use glium::backend::Facade;
use glium::index::{NoIndices, PrimitiveType};
use glium::{Surface, VertexBuffer};

use crate::error::Result;
use crate::mesh::vertex::{ArenaVertex, ARENA_VERTEX_STRIDE};
use crate::render::column::ColumnMesh;

const DEFAULT_MAX_BYTES: usize = 512 * 1024 * 1024;
const DEFAULT_COMPACT_INTERVAL_FRAMES: u64 = 2000;

struct PendingWrite {
    first_vertex: usize,
    data: Vec<ArenaVertex>,
}

pub enum UpsertOutcome {
    Resident { first_vertex: i64, vertex_count: usize },
    Refused,
}

/// One live resident-column relocation performed by a compaction pass.
pub struct ColumnMove {
    pub cx: i32,
    pub cz: i32,
    pub old_first_vertex: usize,
    pub vertex_count: usize,
    pub new_first_vertex: usize,
}

pub struct CompactionPlan {
    pub new_capacity_bytes: usize,
    pub moves: Vec<ColumnMove>,
}

/// Pure bookkeeping: capacity/occupancy/fragmentation counters and the
/// resident-column index, with no knowledge of `glium` or a GPU context.
/// Offsets are tracked in vertices; callers convert to bytes via
/// [`ARENA_VERTEX_STRIDE`].
pub struct ArenaLayout {
    capacity_bytes: usize,
    max_bytes: usize,
    occupied_bytes: usize,
    fragmented_bytes: usize,
    columns: HashMap<(i32, i32), ColumnMesh>,
    resident_order: Vec<(i32, i32)>,
    pending: Vec<PendingWrite>,
    last_compaction_frame: u64,
    /// `max(C/4, fragment_floor_bytes)` is the fragmentation threshold.
    /// Defaults to 10 MiB; overridable so tests don't need to churn
    /// multi-megabyte payloads to exercise compaction.
    fragment_floor_bytes: usize,
    /// Minimum frames between compactions, from `Config::compact_interval_frames`.
    compact_interval_frames: u64,
}

const DEFAULT_FRAGMENT_FLOOR_BYTES: usize = 10 * 1024 * 1024;

impl ArenaLayout {
    pub fn new(initial_bytes: usize, max_bytes: usize) -> Self {
        Self::with_fragment_floor(initial_bytes, max_bytes, DEFAULT_FRAGMENT_FLOOR_BYTES)
    }

    pub fn with_fragment_floor(initial_bytes: usize, max_bytes: usize, fragment_floor_bytes: usize) -> Self {
        ArenaLayout {
            capacity_bytes: initial_bytes,
            max_bytes,
            occupied_bytes: 0,
            fragmented_bytes: 0,
            columns: HashMap::new(),
            resident_order: Vec::new(),
            pending: Vec::new(),
            last_compaction_frame: 0,
            fragment_floor_bytes,
            compact_interval_frames: DEFAULT_COMPACT_INTERVAL_FRAMES,
        }
    }

    /// Overrides the default compaction-interval threshold, mirroring
    /// [`Self::with_fragment_floor`]'s role for the fragmentation threshold.
    /// `VertexArena::new` calls this with the configured
    /// `Config::compact_interval_frames` value.
    pub fn with_compact_interval_frames(mut self, frames: u64) -> Self {
        self.compact_interval_frames = frames;
        self
    }

    pub fn capacity_bytes(&self) -> usize {
        self.capacity_bytes
    }

    pub fn occupied_bytes(&self) -> usize {
        self.occupied_bytes
    }

    pub fn fragmented_bytes(&self) -> usize {
        self.fragmented_bytes
    }

    pub fn column(&self, cx: i32, cz: i32) -> Option<&ColumnMesh> {
        self.columns.get(&(cx, cz))
    }

    /// A column with no record at all is exactly as dirty as a freshly
    /// constructed one (`ColumnMesh::new`'s default): it has never been
    /// uploaded, so its aggregated vertex data cannot yet reflect its
    /// chunk. Used by the Presenter's dirty-chunk scan and residency checks.
    pub fn is_dirty(&self, cx: i32, cz: i32) -> bool {
        self.columns.get(&(cx, cz)).map_or(true, |c| c.dirty)
    }

    /// Stamps `visible_frame` for a column the Frustum Culler found visible
    /// this frame, creating its bookkeeping
    /// record if this is the column's first frame (not-yet-resident
    /// columns can still be "visible" in the geometric sense before their
    /// first mesh result lands).
    pub fn stamp_visible(&mut self, cx: i32, cz: i32, frame: u64) {
        self.columns
            .entry((cx, cz))
            .or_insert_with(|| ColumnMesh::new(cx, cz))
            .visible_frame = frame;
    }

    /// The draw list the Presenter hands to the GPU layer, built purely
    /// from the layout's bookkeeping (no `glium` dependency, so this is
    /// exercised directly by unit tests). Visits resident columns in ascending
    /// `first_vertex` order, selects those visible and not yet drawn this
    /// frame, merges contiguous byte ranges, and stamps `drawn_frame` on
    /// every column it selects.
    pub fn present_draw_ranges(&mut self, frame: u64) -> Vec<(usize, usize)> {
        let mut selected: Vec<(i32, i32)> = Vec::new();
        for key in &self.resident_order {
            let column = &self.columns[key];
            if column.visible_frame == frame && column.drawn_frame < frame && !column.dirty && column.is_resident() {
                selected.push(*key);
            }
        }

        let ranges: Vec<(usize, usize)> = selected
            .iter()
            .map(|key| {
                let column = &self.columns[key];
                (column.first_vertex as usize, column.vertex_count)
            })
            .collect();

        for key in &selected {
            self.columns.get_mut(key).expect("selected key must exist").drawn_frame = frame;
        }

        merge_ranges(&ranges)
    }

    /// Resident columns in ascending `first_vertex` order.
    pub fn resident_columns(&self) -> impl Iterator<Item = &ColumnMesh> {
        self.resident_order.iter().map(move |key| &self.columns[key])
    }

    /// Doubles `capacity_bytes` until it covers `needed`, capped at
    /// `max_bytes`. Returns `false` (capacity left unchanged) if even the
    /// cap cannot satisfy `needed`.
    fn ensure_capacity(&mut self, needed: usize) -> bool {
        if needed <= self.capacity_bytes {
            return true;
        }
        let mut candidate = self.capacity_bytes.max(1);
        while candidate < needed && candidate < self.max_bytes {
            candidate *= 2;
        }
        let candidate = candidate.min(self.max_bytes);
        if candidate < needed {
            return false;
        }
        self.capacity_bytes = candidate;
        true
    }

    /// Upserts a column's aggregated vertex data. Mutates the pending write
    /// queue; the caller (`VertexArena::flush`) is responsible for actually
    /// pushing those bytes to the GPU.
    pub fn upsert_column(&mut self, cx: i32, cz: i32, vertices: Vec<ArenaVertex>) -> UpsertOutcome {
        let new_count = vertices.len();
        let mut column = self.columns.remove(&(cx, cz)).unwrap_or_else(|| ColumnMesh::new(cx, cz));

        if !column.is_resident() || column.vertex_count != new_count {
            let needed = self.occupied_bytes + new_count * ARENA_VERTEX_STRIDE;
            if needed > self.capacity_bytes && !self.ensure_capacity(needed) {
                self.columns.insert((cx, cz), column);
                return UpsertOutcome::Refused;
            }

            if column.is_resident() {
                self.fragmented_bytes += column.vertex_count * ARENA_VERTEX_STRIDE;
                self.resident_order.retain(|key| *key != (cx, cz));
            }

            let first_vertex = self.occupied_bytes / ARENA_VERTEX_STRIDE;
            self.pending.push(PendingWrite {
                first_vertex,
                data: vertices,
            });
            self.occupied_bytes += new_count * ARENA_VERTEX_STRIDE;

            column.first_vertex = first_vertex as i64;
            column.vertex_count = new_count;
            self.resident_order.push((cx, cz));
        } else {
            self.pending.push(PendingWrite {
                first_vertex: column.first_vertex as usize,
                data: vertices,
            });
        }

        column.dirty = false;
        let outcome = UpsertOutcome::Resident {
            first_vertex: column.first_vertex,
            vertex_count: column.vertex_count,
        };
        self.columns.insert((cx, cz), column);
        outcome
    }

    /// Drains the pending-write queue for the GPU layer to apply, keyed by
    /// vertex offset.
    fn take_pending(&mut self) -> Vec<(usize, Vec<ArenaVertex>)> {
        std::mem::take(&mut self.pending)
            .into_iter()
            .map(|w| (w.first_vertex, w.data))
            .collect()
    }

    fn should_compact(&self, current_frame: u64) -> bool {
        let threshold = (self.capacity_bytes / 4).max(self.fragment_floor_bytes);
        self.fragmented_bytes > threshold
            && current_frame.saturating_sub(self.last_compaction_frame) >= self.compact_interval_frames
    }

    /// Plans a compaction if fragmentation and elapsed-frame thresholds are
    /// both crossed, updating every resident column's `first_vertex` and
    /// resetting fragmentation/occupancy bookkeeping in the same step. The
    /// caller performs the actual GPU-side byte copies described by the
    /// returned plan.
    pub fn maybe_compact(&mut self, current_frame: u64) -> Option<CompactionPlan> {
        if !self.should_compact(current_frame) {
            return None;
        }

        let live_bytes: usize = self
            .resident_order
            .iter()
            .map(|key| self.columns[key].vertex_count * ARENA_VERTEX_STRIDE)
            .sum();
        let target = (live_bytes * 3 / 2).min(self.max_bytes).max(self.capacity_bytes);

        let mut moves = Vec::with_capacity(self.resident_order.len());
        let mut cursor_vertices = 0usize;
        for key in &self.resident_order {
            let column = self.columns.get_mut(key).expect("resident_order key must exist");
            let vertex_count = column.vertex_count;
            let old_first_vertex = column.first_vertex as usize;
            moves.push(ColumnMove {
                cx: key.0,
                cz: key.1,
                old_first_vertex,
                vertex_count,
                new_first_vertex: cursor_vertices,
            });
            column.first_vertex = cursor_vertices as i64;
            cursor_vertices += vertex_count;
        }

        self.capacity_bytes = target;
        self.occupied_bytes = cursor_vertices * ARENA_VERTEX_STRIDE;
        self.fragmented_bytes = 0;
        self.last_compaction_frame = current_frame;

        Some(CompactionPlan {
            new_capacity_bytes: target,
            moves,
        })
    }
}

/// The `glium`-backed arena: [`ArenaLayout`]'s bookkeeping plus the actual
/// vertex buffer and the draw call that consumes it.
pub struct VertexArena {
    layout: ArenaLayout,
    buffer: VertexBuffer<ArenaVertex>,
}

impl VertexArena {
    pub fn new<F: Facade>(
        facade: &F,
        initial_bytes: usize,
        max_bytes: usize,
        compact_interval_frames: u64,
    ) -> Result<Self> {
        let capacity_vertices = (initial_bytes / ARENA_VERTEX_STRIDE).max(1);
        let buffer = VertexBuffer::empty_dynamic(facade, capacity_vertices)
            .map_err(|e| crate::error::WorldError::GpuInit(anyhow::anyhow!(e)))?;
        Ok(VertexArena {
            layout: ArenaLayout::new(initial_bytes, max_bytes).with_compact_interval_frames(compact_interval_frames),
            buffer,
        })
    }

    pub fn layout(&self) -> &ArenaLayout {
        &self.layout
    }

    /// Delegates to the pure layout. The backing buffer is grown lazily in
    /// [`Self::flush`] rather than here, so a frame that calls
    /// `upsert_column` many times only reallocates once.
    pub fn upsert_column(&mut self, cx: i32, cz: i32, vertices: Vec<ArenaVertex>) -> UpsertOutcome {
        self.layout.upsert_column(cx, cz, vertices)
    }

    /// Grows the backing buffer to match `layout.capacity_bytes()` if it
    /// grew since the last flush, preserving the occupied prefix. Must run
    /// before writing pending ranges.
    fn sync_buffer_capacity<F: Facade>(&mut self, facade: &F) -> Result<()> {
        let capacity_vertices = (self.layout.capacity_bytes() / ARENA_VERTEX_STRIDE).max(1);
        if capacity_vertices <= self.buffer.len() {
            return Ok(());
        }
        let occupied_vertices = self.layout.occupied_bytes() / ARENA_VERTEX_STRIDE;
        let new_buffer = VertexBuffer::empty_dynamic(facade, capacity_vertices)
            .map_err(|e| crate::error::WorldError::GpuInit(anyhow::anyhow!(e)))?;
        if occupied_vertices > 0 {
            let old_slice = self.buffer.slice(0..occupied_vertices).expect("prefix within old buffer");
            let prefix: Vec<ArenaVertex> = old_slice.read().map_err(|e| crate::error::WorldError::GpuInit(anyhow::anyhow!(e)))?;
            new_buffer
                .slice(0..occupied_vertices)
                .expect("prefix within new buffer")
                .write(&prefix);
        }
        log::info!(
            "vertex arena grown to {} bytes ({} vertices)",
            self.layout.capacity_bytes(),
            capacity_vertices
        );
        self.buffer = new_buffer;
        Ok(())
    }

    /// Grows the buffer if `upsert_column` calls since the last flush
    /// required more capacity, then applies every pending write. `glium`'s
    /// safe `Buffer::slice().write()` stands in for an unsynchronized,
    /// invalidate-range mapped update: the writer already guarantees no
    /// overlapping range is read or written twice within one flush.
    pub fn flush<F: Facade>(&mut self, facade: &F) -> Result<()> {
        self.sync_buffer_capacity(facade)?;
        for (first_vertex, data) in self.layout.take_pending() {
            if data.is_empty() {
                continue;
            }
            let end = first_vertex + data.len();
            let slice = self
                .buffer
                .slice(first_vertex..end)
                .expect("pending write range within capacity after sync_buffer_capacity");
            slice.write(&data);
        }
        Ok(())
    }

    /// Asks the pure layout whether fragmentation and elapsed frames
    /// justify compaction, and if so performs the buffer-to-buffer copy.
    pub fn maybe_compact<F: Facade>(&mut self, facade: &F, current_frame: u64) -> Result<()> {
        let plan = match self.layout.maybe_compact(current_frame) {
            Some(plan) => plan,
            None => return Ok(()),
        };

        let capacity_vertices = (plan.new_capacity_bytes / ARENA_VERTEX_STRIDE).max(1);
        let new_buffer = VertexBuffer::empty_dynamic(facade, capacity_vertices)
            .map_err(|e| crate::error::WorldError::GpuInit(anyhow::anyhow!(e)))?;

        for mv in &plan.moves {
            if mv.vertex_count == 0 {
                continue;
            }
            let old_slice = self
                .buffer
                .slice(mv.old_first_vertex..mv.old_first_vertex + mv.vertex_count)
                .expect("compaction source range within old buffer");
            let data: Vec<ArenaVertex> = old_slice.read().map_err(|e| crate::error::WorldError::GpuInit(anyhow::anyhow!(e)))?;
            new_buffer
                .slice(mv.new_first_vertex..mv.new_first_vertex + mv.vertex_count)
                .expect("compaction destination range within new buffer")
                .write(&data);
        }

        log::info!(
            "vertex arena compacted: {} columns relocated, new capacity {} bytes",
            plan.moves.len(),
            plan.new_capacity_bytes
        );
        self.buffer = new_buffer;
        Ok(())
    }

    /// Merges consecutive `(first_vertex, vertex_count)` ranges among
    /// `visible_columns` and issues one draw call per merged range. `glium`
    /// has no safe binding to `glMultiDrawArrays`, so a true single
    /// multi-draw is approximated here by as few draws as the merged ranges
    /// allow (recorded as a documented deviation in DESIGN.md).
    pub fn draw<S: Surface>(
        &self,
        target: &mut S,
        program: &glium::Program,
        uniforms: &impl glium::uniforms::Uniforms,
        draw_params: &glium::DrawParameters,
        visible_columns: &[(i32, i32)],
    ) -> Result<()> {
        let mut ranges: Vec<(usize, usize)> = visible_columns
            .iter()
            .filter_map(|key| self.layout.column(key.0, key.1))
            .filter(|col| col.is_resident())
            .map(|col| (col.first_vertex as usize, col.vertex_count))
            .collect();
        ranges.sort_unstable_by_key(|(first, _)| *first);

        let merged = merge_ranges(&ranges);
        self.draw_ranges(target, program, uniforms, draw_params, &merged)
    }

    /// Same GPU glue as [`Self::draw`], but takes already-merged
    /// `(first_vertex, count)` ranges — the shape [`ArenaLayout::present_draw_ranges`]
    /// produces. This is what the Presenter calls once per frame, since it
    /// has already done the visibility/dedup bookkeeping the plain `draw`
    /// convenience method recomputes from scratch.
    pub fn draw_ranges<S: Surface>(
        &self,
        target: &mut S,
        program: &glium::Program,
        uniforms: &impl glium::uniforms::Uniforms,
        draw_params: &glium::DrawParameters,
        ranges: &[(usize, usize)],
    ) -> Result<()> {
        for &(first, count) in ranges {
            if count == 0 {
                continue;
            }
            let slice = self
                .buffer
                .slice(first..first + count)
                .expect("draw range within buffer capacity");
            target
                .draw(slice, NoIndices(PrimitiveType::TrianglesList), program, uniforms, draw_params)
                .map_err(|e| crate::error::WorldError::GpuInit(anyhow::anyhow!(e)))?;
        }
        Ok(())
    }

    pub fn layout_mut(&mut self) -> &mut ArenaLayout {
        &mut self.layout
    }
}

/// Merges `(first_vertex, count)` ranges where one begins exactly where the
/// previous ends.
pub fn merge_ranges(ranges: &[(usize, usize)]) -> Vec<(usize, usize)> {
    let mut out: Vec<(usize, usize)> = Vec::new();
    for &(first, count) in ranges {
        if let Some(last) = out.last_mut() {
            if last.0 + last.1 == first {
                last.1 += count;
                continue;
            }
        }
        out.push((first, count));
    }
    out
}
