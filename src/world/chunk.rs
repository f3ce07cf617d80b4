//! Chunks: 16x256x16 block volumes built from 16 lazily-allocated 16^3
//! sections, using a `ChunkData<T> { Homogeneous(T), Array(..) }`-style
//! representation applied per-section, with no write-queue synchronization:
//! mutation is direct and unsynchronized (see DESIGN.md).

use std::cell::UnsafeCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::block::{BlockId, AIR_BLOCK};

pub const SECTION_LENGTH: usize = 16;
pub const SECTION_VOLUME: usize = SECTION_LENGTH * SECTION_LENGTH * SECTION_LENGTH;
pub const CHUNK_SECTIONS: usize = 16;
pub const CHUNK_HEIGHT: usize = SECTION_LENGTH * CHUNK_SECTIONS;

/// Integer chunk coordinate. Kept 3D (`cy` almost always `0` for this 256-tall
/// world) to leave room for future vertical world expansion; `cy`
/// is not currently used by anything but is part of the public type.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ChunkPos {
    pub cx: i32,
    pub cy: i32,
    pub cz: i32,
}

impl ChunkPos {
    pub fn column(self) -> ColumnPos {
        ColumnPos {
            cx: self.cx,
            cz: self.cz,
        }
    }

    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> ChunkPos {
        ChunkPos {
            cx: self.cx + dx,
            cy: self.cy + dy,
            cz: self.cz + dz,
        }
    }

    pub fn origin(self) -> [i32; 3] {
        [
            self.cx * SECTION_LENGTH as i32,
            self.cy * CHUNK_HEIGHT as i32,
            self.cz * SECTION_LENGTH as i32,
        ]
    }
}

/// The `(cx, cz)`-indexed vertical stack of chunks; the unit of GPU residency.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ColumnPos {
    pub cx: i32,
    pub cz: i32,
}

impl ColumnPos {
    pub fn chunk(self, cy: i32) -> ChunkPos {
        ChunkPos {
            cx: self.cx,
            cy,
            cz: self.cz,
        }
    }

    pub fn distance_sq(self, other: ColumnPos) -> i64 {
        let dx = (self.cx - other.cx) as i64;
        let dz = (self.cz - other.cz) as i64;
        dx * dx + dz * dz
    }
}

/// Local (in-chunk) block coordinate: `x, z in 0..16`, `y in 0..256`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LocalPos {
    pub x: u8,
    pub y: u16,
    pub z: u8,
}

impl LocalPos {
    pub fn in_bounds(self) -> bool {
        (self.x as usize) < SECTION_LENGTH
            && (self.y as usize) < CHUNK_HEIGHT
            && (self.z as usize) < SECTION_LENGTH
    }

    fn section_index(self) -> usize {
        self.y as usize / SECTION_LENGTH
    }

    fn index_in_section(self) -> usize {
        // XZY order.
        let ly = self.y as usize % SECTION_LENGTH;
        SECTION_LENGTH * SECTION_LENGTH * self.x as usize + SECTION_LENGTH * self.z as usize + ly
    }
}

#[derive(Clone, Debug)]
enum SectionStorage {
    Homogeneous(BlockId),
    Array(Box<[BlockId; SECTION_VOLUME]>),
}

#[derive(Clone, Debug)]
struct Section {
    storage: SectionStorage,
    non_air: u16,
}

impl Section {
    fn new_homogeneous(id: BlockId) -> Self {
        Section {
            storage: SectionStorage::Homogeneous(id),
            non_air: if id == AIR_BLOCK { 0 } else { SECTION_VOLUME as u16 },
        }
    }

    fn get(&self, index: usize) -> BlockId {
        match &self.storage {
            SectionStorage::Homogeneous(id) => *id,
            SectionStorage::Array(arr) => arr[index],
        }
    }

    fn set(&mut self, index: usize, id: BlockId) {
        match &mut self.storage {
            SectionStorage::Homogeneous(existing) if *existing == id => {}
            SectionStorage::Homogeneous(existing) => {
                let filled = *existing;
                let mut arr = Box::new([filled; SECTION_VOLUME]);
                arr[index] = id;
                self.non_air = if id == AIR_BLOCK {
                    SECTION_VOLUME as u16 - if filled == AIR_BLOCK { 0 } else { 1 }
                } else if filled == AIR_BLOCK {
                    1
                } else {
                    SECTION_VOLUME as u16
                };
                self.storage = SectionStorage::Array(arr);
            }
            SectionStorage::Array(arr) => {
                let old = arr[index];
                if old == id {
                    return;
                }
                arr[index] = id;
                match (old == AIR_BLOCK, id == AIR_BLOCK) {
                    (true, false) => self.non_air += 1,
                    (false, true) => self.non_air -= 1,
                    _ => {}
                }
            }
        }
    }
}

/// A 16x256x16 block volume. Mutations are synchronous and unsynchronized:
/// in-flight mesh workers may read stale data rather than block on a
/// per-chunk lock (DESIGN.md). Section storage sits behind `UnsafeCell` so
/// that unsynchronized mutation is expressed as interior mutability through
/// `&self` rather than as a raw pointer cast that manufactures a `&mut`
/// aliasing a concurrently-held `&` (the latter is immediate UB regardless
/// of whether the racing read is "stale" in the sense the spec sanctions).
pub struct Chunk {
    pos: ChunkPos,
    sections: [UnsafeCell<Option<Section>>; CHUNK_SECTIONS],
    dirty: AtomicBool,
}

/// SAFETY: `Chunk` is shared across threads only as `Arc<Chunk>`, and by
/// construction (§5, DESIGN.md) only the main thread ever calls
/// `set_block`/`touches_xz_edge`'s caller-side mutation — every other
/// thread (mesh workers) only calls `get_block`. `UnsafeCell` itself is
/// never `Sync`; this crate's single-writer discipline is what makes
/// sharing it across threads sound in practice, which `Sync` cannot be
/// derived automatically for.
unsafe impl Sync for Chunk {}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("pos", &self.pos)
            .field("dirty", &self.is_dirty())
            .finish_non_exhaustive()
    }
}

impl Chunk {
    pub fn new_empty(pos: ChunkPos) -> Self {
        Chunk {
            pos,
            sections: Default::default(),
            dirty: AtomicBool::new(true),
        }
    }

    pub fn pos(&self) -> ChunkPos {
        self.pos
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Relaxed)
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Relaxed);
    }

    /// Clears the dirty flag; called by the caller applying a completed mesh
    /// job, immediately before dispatch, per the mesh-worker-pool contract in
    /// `mesh::pool` ("a chunk dispatched into the pool is immediately marked
    /// clean").
    pub fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::Relaxed);
    }

    pub fn get_block(&self, local: LocalPos) -> BlockId {
        if !local.in_bounds() {
            return AIR_BLOCK;
        }
        // SAFETY: short-lived shared read of the section cell. `set_block`
        // is the only writer and is main-thread-only by convention (see the
        // `Sync` impl above), so this never observes a torn write.
        match unsafe { &*self.sections[local.section_index()].get() } {
            None => AIR_BLOCK,
            Some(section) => section.get(local.index_in_section()),
        }
    }

    /// Sets a block, lazily allocating the owning section on first non-air
    /// write and releasing it once its non-air count returns to zero. Always
    /// marks the chunk dirty, per spec ("every mutating write"); edge-face
    /// neighbor-dirtying is the Chunk Store's responsibility, since it needs
    /// to look the neighbor chunk up (see `world::store::ChunkStore::set_block`).
    ///
    /// Takes `&self`, not `&mut self`: the chunk is shared behind `Arc`, and
    /// this is the one piece of unsynchronized interior mutation §5 sanctions
    /// (main-thread writes racing mesh-worker reads of neighbor chunks).
    pub fn set_block(&self, local: LocalPos, id: BlockId) {
        assert!(local.in_bounds(), "set_block out of chunk bounds: {:?}", local);

        // SAFETY: short-lived exclusive access to one section cell. Callers
        // outside the main thread never call `set_block` (see the `Sync`
        // impl above), so no concurrent reader or writer observes this
        // pointer's target mid-mutation.
        let slot = unsafe { &mut *self.sections[local.section_index()].get() };
        if slot.is_none() {
            if id == AIR_BLOCK {
                return;
            }
            *slot = Some(Section::new_homogeneous(AIR_BLOCK));
        }

        let section = slot.as_mut().unwrap();
        section.set(local.index_in_section(), id);
        if section.non_air == 0 {
            *slot = None;
        }

        self.dirty.store(true, Ordering::Relaxed);
    }

    /// `true` if the local coordinate lies on one of the chunk's four
    /// vertical (X/Z) faces, i.e. an edit here can affect a neighbor chunk's
    /// mesh. Y has no neighbor chunk in this single-section-stack world.
    pub fn touches_xz_edge(local: LocalPos) -> (Option<i32>, Option<i32>) {
        let dx = match local.x as usize {
            0 => Some(-1),
            n if n == SECTION_LENGTH - 1 => Some(1),
            _ => None,
        };
        let dz = match local.z as usize {
            0 => Some(-1),
            n if n == SECTION_LENGTH - 1 => Some(1),
            _ => None,
        };
        (dx, dz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(x: u8, y: u16, z: u8) -> LocalPos {
        LocalPos { x, y, z }
    }

    #[test]
    fn fresh_chunk_is_all_air() {
        let chunk = Chunk::new_empty(ChunkPos { cx: 0, cy: 0, cz: 0 });
        assert_eq!(chunk.get_block(pos(0, 0, 0)), AIR_BLOCK);
        assert_eq!(chunk.get_block(pos(15, 255, 15)), AIR_BLOCK);
    }

    #[test]
    fn set_then_get_round_trips() {
        let chunk = Chunk::new_empty(ChunkPos { cx: 0, cy: 0, cz: 0 });
        let stone = BlockId(1);
        chunk.set_block(pos(3, 64, 9), stone);
        assert_eq!(chunk.get_block(pos(3, 64, 9)), stone);
        assert_eq!(chunk.get_block(pos(3, 65, 9)), AIR_BLOCK);
    }

    #[test]
    fn section_released_when_emptied() {
        let chunk = Chunk::new_empty(ChunkPos { cx: 0, cy: 0, cz: 0 });
        chunk.set_block(pos(0, 64, 0), BlockId(1));
        assert!(unsafe { &*chunk.sections[4].get() }.is_some());
        chunk.set_block(pos(0, 64, 0), AIR_BLOCK);
        assert!(unsafe { &*chunk.sections[4].get() }.is_none());
    }

    #[test]
    fn out_of_bounds_read_is_air() {
        let chunk = Chunk::new_empty(ChunkPos { cx: 0, cy: 0, cz: 0 });
        assert_eq!(chunk.get_block(pos(16, 0, 0)), AIR_BLOCK);
    }

    #[test]
    fn edge_detection() {
        assert_eq!(Chunk::touches_xz_edge(pos(0, 0, 5)), (Some(-1), None));
        assert_eq!(Chunk::touches_xz_edge(pos(15, 0, 5)), (Some(1), None));
        assert_eq!(Chunk::touches_xz_edge(pos(5, 0, 0)), (None, Some(-1)));
        assert_eq!(Chunk::touches_xz_edge(pos(5, 0, 5)), (None, None));
    }

    #[test]
    fn set_block_marks_dirty() {
        let chunk = Chunk::new_empty(ChunkPos { cx: 0, cy: 0, cz: 0 });
        chunk.clear_dirty();
        assert!(!chunk.is_dirty());
        chunk.set_block(pos(1, 1, 1), BlockId(1));
        assert!(chunk.is_dirty());
    }
}
