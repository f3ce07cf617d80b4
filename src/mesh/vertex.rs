//! The packed vertex format and its GPU-attribute-friendly expansion:
//! position, face normal, brightness, and texture layer bit-packed into two
//! 32-bit words rather than a wider float-per-field layout.

use crate::block::Face;

/// Two 32-bit words encoding position, face normal, brightness, texture
/// layer, and tint, as emitted by the Greedy Mesher.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PackedVertex {
    pub word1: u32,
    pub word2: u32,
}

pub const NO_TINT: u16 = 0xFFFF;

impl PackedVertex {
    /// `x`/`z` range `0..=16` (greedy rectangles may touch the chunk's far
    /// edge), `y` ranges `0..=256`.
    pub fn pack(x: u16, y: u16, z: u16, face: Face, texture_layer: u16, tint: u16) -> Self {
        debug_assert!(x <= 16, "x coordinate {} exceeds 5-bit packing", x);
        debug_assert!(y <= 256, "y coordinate {} exceeds 9-bit packing", y);
        debug_assert!(z <= 16, "z coordinate {} exceeds 5-bit packing", z);

        let mut word1: u32 = 0;
        word1 |= (x as u32) & 0x1F;
        word1 |= ((y as u32) & 0x1FF) << 5;
        word1 |= ((z as u32) & 0x1F) << 14;
        word1 |= (face.normal_index() & 0x7) << 19;
        word1 |= (face.brightness() as u32) << 22;

        let mut word2: u32 = 0;
        word2 |= (texture_layer as u32) & 0xFFFF;
        word2 |= (tint as u32) << 16;

        PackedVertex { word1, word2 }
    }

    pub fn x(&self) -> u16 {
        (self.word1 & 0x1F) as u16
    }

    pub fn y(&self) -> u16 {
        ((self.word1 >> 5) & 0x1FF) as u16
    }

    pub fn z(&self) -> u16 {
        ((self.word1 >> 14) & 0x1F) as u16
    }

    pub fn normal_index(&self) -> u32 {
        (self.word1 >> 19) & 0x7
    }

    pub fn brightness(&self) -> u8 {
        ((self.word1 >> 22) & 0xFF) as u8
    }

    pub fn texture_layer(&self) -> u16 {
        (self.word2 & 0xFFFF) as u16
    }

    pub fn tint(&self) -> u16 {
        ((self.word2 >> 16) & 0xFFFF) as u16
    }
}

/// The Arena's GPU-attribute layout: six 16-bit shorts, 12 bytes per vertex.
/// Attribute 0 (`position`) is three signed shorts; attribute 1 is three
/// unsigned shorts (`normal_brightness`, `texture_layer`, `tint`).
#[derive(Copy, Clone, Debug, PartialEq)]
#[repr(C)]
pub struct ArenaVertex {
    pub position: [i16; 3],
    pub normal_brightness: u16,
    pub texture_layer: u16,
    pub tint: u16,
}

glium::implement_vertex!(ArenaVertex, position, normal_brightness, texture_layer, tint);

pub const ARENA_VERTEX_STRIDE: usize = std::mem::size_of::<ArenaVertex>();

impl From<PackedVertex> for ArenaVertex {
    fn from(v: PackedVertex) -> Self {
        let normal_brightness = (v.normal_index() as u16) << 8 | v.brightness() as u16;
        ArenaVertex {
            position: [v.x() as i16, v.y() as i16, v.z() as i16],
            normal_brightness,
            texture_layer: v.texture_layer(),
            tint: v.tint(),
        }
    }
}
