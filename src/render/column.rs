//! The Column Mesh record: per-`(cx,cz)` bookkeeping for where a column's
//! aggregated vertex data lives inside the GPU Vertex Arena, and the
//! frame-counter state the Presenter uses to deduplicate uploads and draws.
//! Columns share one arena buffer rather than each owning an independent
//! `glium::VertexBuffer`, so this record tracks a byte range into that
//! shared buffer instead of a handle to its own.

/// Sentinel `first_vertex` meaning "never uploaded."
pub const NOT_RESIDENT: i64 = -1;

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnMesh {
    pub cx: i32,
    pub cz: i32,
    pub first_vertex: i64,
    pub vertex_count: usize,
    pub dirty: bool,
    pub visible_frame: u64,
    pub drawn_frame: u64,
}

impl ColumnMesh {
    pub fn new(cx: i32, cz: i32) -> Self {
        ColumnMesh {
            cx,
            cz,
            first_vertex: NOT_RESIDENT,
            vertex_count: 0,
            dirty: true,
            visible_frame: 0,
            drawn_frame: 0,
        }
    }

    pub fn is_resident(&self) -> bool {
        self.first_vertex >= 0
    }

    pub fn first_byte(&self, stride: usize) -> usize {
        debug_assert!(self.is_resident());
        self.first_vertex as usize * stride
    }

    pub fn byte_len(&self, stride: usize) -> usize {
        self.vertex_count * stride
    }
}
