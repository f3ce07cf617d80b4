//! The Chunk Store: concurrent spatial index of loaded chunks, plus a
//! per-column index for radius queries. Backed by
//! `parking_lot::RwLock<HashMap<..>>`, with `get`'s insert path using
//! double-checked locking so two racing generation workers can't both win an
//! insert for the same coordinate (see DESIGN.md).

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::block::{BlockId, AIR_BLOCK};
use crate::world::chunk::{Chunk, ChunkPos, ColumnPos, LocalPos, SECTION_LENGTH};

struct StoreInner {
    chunks: HashMap<ChunkPos, Arc<Chunk>>,
    columns: HashMap<ColumnPos, Vec<ChunkPos>>,
}

pub struct ChunkStore {
    inner: RwLock<StoreInner>,
    mod_count: AtomicU64,
}

fn world_to_chunk(wx: i32, wy: i32, wz: i32) -> (ChunkPos, LocalPos) {
    let cx = wx.div_euclid(SECTION_LENGTH as i32);
    let cz = wz.div_euclid(SECTION_LENGTH as i32);
    let lx = wx.rem_euclid(SECTION_LENGTH as i32) as u8;
    let lz = wz.rem_euclid(SECTION_LENGTH as i32) as u8;
    (
        ChunkPos { cx, cy: 0, cz },
        LocalPos {
            x: lx,
            y: wy.max(0) as u16,
            z: lz,
        },
    )
}

impl ChunkStore {
    pub fn new() -> Self {
        ChunkStore {
            inner: RwLock::new(StoreInner {
                chunks: HashMap::new(),
                columns: HashMap::new(),
            }),
            mod_count: AtomicU64::new(0),
        }
    }

    pub fn mod_count(&self) -> u64 {
        self.mod_count.load(Ordering::Relaxed)
    }

    /// Looks up a chunk, optionally installing an empty one if absent.
    /// Installation re-checks for a concurrently-installed chunk under the
    /// exclusive lock before inserting, so a read-unlock-then-write-
    /// unconditionally race can't silently lose a concurrent insert.
    pub fn get(&self, pos: ChunkPos, create: bool) -> Option<Arc<Chunk>> {
        if let Some(chunk) = self.inner.read().chunks.get(&pos) {
            return Some(Arc::clone(chunk));
        }

        if !create {
            return None;
        }

        let mut guard = self.inner.write();
        if let Some(chunk) = guard.chunks.get(&pos) {
            return Some(Arc::clone(chunk));
        }

        let chunk = Arc::new(Chunk::new_empty(pos));
        guard.chunks.insert(pos, Arc::clone(&chunk));
        guard.columns.entry(pos.column()).or_default().push(pos);
        self.mod_count.fetch_add(1, Ordering::Relaxed);
        Some(chunk)
    }

    /// Installs a chunk that was already constructed elsewhere (e.g. by a
    /// generation worker). A no-op if another worker installed the same
    /// coordinate first; returns the chunk that ended up resident.
    pub fn install(&self, chunk: Arc<Chunk>) -> Arc<Chunk> {
        let pos = chunk.pos();
        let mut guard = self.inner.write();
        if let Some(existing) = guard.chunks.get(&pos) {
            return Arc::clone(existing);
        }
        guard.chunks.insert(pos, Arc::clone(&chunk));
        guard.columns.entry(pos.column()).or_default().push(pos);
        self.mod_count.fetch_add(1, Ordering::Relaxed);
        chunk
    }

    pub fn get_block(&self, wx: i32, wy: i32, wz: i32) -> BlockId {
        let (chunk_pos, local) = world_to_chunk(wx, wy, wz);
        match self.get(chunk_pos, false) {
            None => AIR_BLOCK,
            Some(chunk) => chunk.get_block(local),
        }
    }

    /// Sets a block, creating the owning chunk if needed and dirtying any
    /// resident neighbor whose shared face the edit touches.
    pub fn set_block(&self, wx: i32, wy: i32, wz: i32, id: BlockId) {
        let (chunk_pos, local) = world_to_chunk(wx, wy, wz);
        let chunk = self.get(chunk_pos, true).expect("get(create=true) always returns Some");

        chunk.set_block(local, id);

        let (dx, dz) = Chunk::touches_xz_edge(local);
        if let Some(dx) = dx {
            if let Some(neighbor) = self.get(chunk_pos.offset(dx, 0, 0), false) {
                neighbor.mark_dirty();
            }
        }
        if let Some(dz) = dz {
            if let Some(neighbor) = self.get(chunk_pos.offset(0, 0, dz), false) {
                neighbor.mark_dirty();
            }
        }
    }

    /// All resident chunks whose column lies within `r` of `(cx, cz)`
    /// (`dx^2 + dz^2 <= r^2`), using the column index so cost scales with the
    /// result size rather than total chunk count.
    pub fn chunks_in_xz_radius(&self, cx: i32, cz: i32, r: i32) -> Vec<(ChunkPos, Arc<Chunk>)> {
        let guard = self.inner.read();
        let r_sq = (r as i64) * (r as i64);
        let mut out = Vec::new();
        for dx in -r..=r {
            for dz in -r..=r {
                if (dx as i64) * (dx as i64) + (dz as i64) * (dz as i64) > r_sq {
                    continue;
                }
                let col = ColumnPos { cx: cx + dx, cz: cz + dz };
                if let Some(positions) = guard.columns.get(&col) {
                    for &pos in positions {
                        if let Some(chunk) = guard.chunks.get(&pos) {
                            out.push((pos, Arc::clone(chunk)));
                        }
                    }
                }
            }
        }
        out
    }

    /// Removes every chunk whose column lies outside `r` of `(cx, cz)`.
    /// Returns the number of chunks removed.
    pub fn evict_outside(&self, cx: i32, cz: i32, r: i32) -> usize {
        let mut guard = self.inner.write();
        let r_sq = (r as i64) * (r as i64);
        let to_remove: Vec<ChunkPos> = guard
            .chunks
            .keys()
            .copied()
            .filter(|pos| {
                let dx = (pos.cx - cx) as i64;
                let dz = (pos.cz - cz) as i64;
                dx * dx + dz * dz > r_sq
            })
            .collect();

        for pos in &to_remove {
            guard.chunks.remove(pos);
            if let Some(col) = guard.columns.get_mut(&pos.column()) {
                col.retain(|p| p != pos);
                if col.is_empty() {
                    guard.columns.remove(&pos.column());
                }
            }
        }

        if !to_remove.is_empty() {
            self.mod_count.fetch_add(1, Ordering::Relaxed);
        }
        to_remove.len()
    }

    pub fn is_resident(&self, pos: ChunkPos) -> bool {
        self.inner.read().chunks.contains_key(&pos)
    }
}

impl Default for ChunkStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_with_create_installs_once() {
        let store = ChunkStore::new();
        let pos = ChunkPos { cx: 0, cy: 0, cz: 0 };
        let a = store.get(pos, true).unwrap();
        let b = store.get(pos, true).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn set_and_get_block_round_trip() {
        let store = ChunkStore::new();
        store.set_block(5, 64, 5, BlockId(7));
        assert_eq!(store.get_block(5, 64, 5), BlockId(7));
        assert_eq!(store.get_block(5, 65, 5), AIR_BLOCK);
    }

    #[test]
    fn edge_write_dirties_resident_neighbor() {
        let store = ChunkStore::new();
        // Force the neighbor chunk to exist first.
        let neighbor = store.get(ChunkPos { cx: 1, cy: 0, cz: 0 }, true).unwrap();
        neighbor.clear_dirty();
        assert!(!neighbor.is_dirty());

        // x = 15 is the local edge of chunk (0,0,0) facing chunk (1,0,0).
        store.set_block(15, 64, 0, BlockId(1));
        assert!(neighbor.is_dirty());
    }

    #[test]
    fn chunks_in_xz_radius_matches_distance() {
        let store = ChunkStore::new();
        for cx in -2..=2 {
            for cz in -2..=2 {
                store.get(ChunkPos { cx, cy: 0, cz }, true);
            }
        }
        let found = store.chunks_in_xz_radius(0, 0, 1);
        // radius 1 under dx^2+dz^2<=1 includes the 5-cell plus shape
        assert_eq!(found.len(), 5);
    }

    #[test]
    fn evict_outside_removes_far_chunks() {
        let store = ChunkStore::new();
        store.get(ChunkPos { cx: 0, cy: 0, cz: 0 }, true);
        store.get(ChunkPos { cx: 10, cy: 0, cz: 10 }, true);
        let removed = store.evict_outside(0, 0, 3);
        assert_eq!(removed, 1);
        assert!(store.is_resident(ChunkPos { cx: 0, cy: 0, cz: 0 }));
        assert!(!store.is_resident(ChunkPos { cx: 10, cy: 0, cz: 10 }));
    }
}
