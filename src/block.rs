//! Block identifiers, faces, and the registry mapping ids to renderable
//! properties. Grounded on `world/registry.rs`'s name-map/entries/JSON-manifest
//! shape, narrowed to what the mesher actually needs: a texture layer per
//! face, a solid/transparent flag, an optional tint, and an optional list of
//! sub-voxel elements for blocks the greedy mesher must skip.

use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;

use crate::error::Result;

/// Dense, append-only block identifier. `0` is reserved for air.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Default, PartialOrd, Ord)]
pub struct BlockId(pub u16);

pub const AIR_BLOCK: BlockId = BlockId(0);

/// One of the six axial faces of a block. The discriminant is exactly the
/// `normal_index` bit field value from the packed vertex format.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum Face {
    PlusX = 0,
    MinusX = 1,
    PlusY = 2,
    MinusY = 3,
    PlusZ = 4,
    MinusZ = 5,
}

pub const ALL_FACES: [Face; 6] = [
    Face::PlusX,
    Face::MinusX,
    Face::PlusY,
    Face::MinusY,
    Face::PlusZ,
    Face::MinusZ,
];

impl Face {
    pub fn normal_index(self) -> u32 {
        self as u32
    }

    pub fn normal(self) -> [i32; 3] {
        match self {
            Face::PlusX => [1, 0, 0],
            Face::MinusX => [-1, 0, 0],
            Face::PlusY => [0, 1, 0],
            Face::MinusY => [0, -1, 0],
            Face::PlusZ => [0, 0, 1],
            Face::MinusZ => [0, 0, -1],
        }
    }

    /// Fixed brightness per face, per spec: no ambient occlusion sampling.
    pub fn brightness(self) -> u8 {
        match self {
            Face::PlusY => 255,
            Face::MinusY => 128,
            _ => 204,
        }
    }

    pub fn opposite(self) -> Face {
        match self {
            Face::PlusX => Face::MinusX,
            Face::MinusX => Face::PlusX,
            Face::PlusY => Face::MinusY,
            Face::MinusY => Face::PlusY,
            Face::PlusZ => Face::MinusZ,
            Face::MinusZ => Face::PlusZ,
        }
    }
}

/// Per-face data needed by the mesher: which texture array layer to sample.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FaceLayers {
    pub layers: [u16; 6],
}

impl FaceLayers {
    pub fn uniform(layer: u16) -> Self {
        FaceLayers { layers: [layer; 6] }
    }

    pub fn get(&self, face: Face) -> u16 {
        self.layers[face as usize]
    }
}

/// RGB565-packed tint; `None` means "no tint" (0xFFFF, multiply by white).
pub type Tint = Option<u16>;

pub fn pack_rgb565(r: u8, g: u8, b: u8) -> u16 {
    let r = (r as u16 >> 3) & 0x1F;
    let g = (g as u16 >> 2) & 0x3F;
    let b = (b as u16 >> 3) & 0x1F;
    (r << 11) | (g << 5) | b
}

pub const NO_TINT: u16 = 0xFFFF;

/// A sub-voxel cuboid that a complex (non-greedy) block is built from, e.g. a
/// slab occupying only the bottom half of its block's cube. Coordinates are
/// fractions of one block, `0.0..=1.0`.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockElement {
    pub min: [f32; 3],
    pub max: [f32; 3],
    pub faces: FaceLayers,
    pub tint: Tint,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BlockProperties {
    pub solid: bool,
    pub textures: FaceLayers,
    pub tint: Tint,
    /// `Some` marks this block as "complex": skipped during greedy merging
    /// and emitted by the second, per-element pass instead (see
    /// `mesh::mesher`).
    pub elements: Option<Vec<BlockElement>>,
}

impl BlockProperties {
    pub fn is_complex(&self) -> bool {
        self.elements.is_some()
    }
}

fn air_properties() -> BlockProperties {
    BlockProperties {
        solid: false,
        textures: FaceLayers::default(),
        tint: None,
        elements: None,
    }
}

#[derive(Clone, Debug, Default)]
pub struct BlockRegistry {
    name_map: HashMap<String, BlockId>,
    entries: Vec<BlockProperties>,
}

impl BlockRegistry {
    pub fn new() -> Self {
        let mut reg = BlockRegistry {
            name_map: HashMap::new(),
            entries: Vec::new(),
        };
        reg.register("air", air_properties());
        reg
    }

    /// Appends a new block and returns its freshly assigned id. Registration
    /// is append-only: ids are never reused or renumbered.
    pub fn register(&mut self, name: &str, properties: BlockProperties) -> BlockId {
        let id = BlockId(self.entries.len() as u16);
        self.name_map.insert(name.to_owned(), id);
        self.entries.push(properties);
        id
    }

    /// Looks a block up by name. Panics if the name was never registered,
    /// matching this codebase's existing registry-lookup idiom of treating an
    /// unknown block name at startup as a configuration bug, not a recoverable
    /// runtime condition.
    pub fn lookup(&self, name: &str) -> BlockId {
        self.name_map[name]
    }

    pub fn try_lookup(&self, name: &str) -> Option<BlockId> {
        self.name_map.get(name).copied()
    }

    pub fn get(&self, id: BlockId) -> &BlockProperties {
        &self.entries[id.0 as usize]
    }

    pub fn is_solid(&self, id: BlockId) -> bool {
        id != AIR_BLOCK && self.get(id).solid
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ManifestElement {
    min: [f32; 3],
    max: [f32; 3],
    #[serde(default)]
    textures: [u16; 6],
    #[serde(default)]
    tint: Option<[u8; 3]>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ManifestBlock {
    name: String,
    #[serde(default)]
    solid: bool,
    #[serde(default)]
    textures: [u16; 6],
    #[serde(default)]
    tint: Option<[u8; 3]>,
    #[serde(default)]
    elements: Option<Vec<ManifestElement>>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RegistryManifest {
    blocks: Vec<ManifestBlock>,
}

/// Loads a block registry from a JSON manifest, in the shape
/// `{"blocks": [{"name": "...", "solid": true, "textures": [..6 layer
/// indices..]}, ...]}`. Mirrors `world::registry::load_registry`'s
/// `serde_json::from_reader` pattern; air is always id 0 and is not listed in
/// the manifest.
pub fn load_registry<R: Read>(reader: R) -> Result<BlockRegistry> {
    let manifest: RegistryManifest = serde_json::from_reader(reader)?;
    let mut registry = BlockRegistry::new();

    for block in manifest.blocks {
        let tint = block.tint.map(|[r, g, b]| pack_rgb565(r, g, b));
        let elements = block.elements.map(|elems| {
            elems
                .into_iter()
                .map(|e| BlockElement {
                    min: e.min,
                    max: e.max,
                    faces: FaceLayers { layers: e.textures },
                    tint: e.tint.map(|[r, g, b]| pack_rgb565(r, g, b)),
                })
                .collect()
        });

        registry.register(
            &block.name,
            BlockProperties {
                solid: block.solid,
                textures: FaceLayers { layers: block.textures },
                tint,
                elements,
            },
        );
    }

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn air_is_block_zero_and_not_solid() {
        let reg = BlockRegistry::new();
        assert_eq!(reg.lookup("air"), AIR_BLOCK);
        assert!(!reg.is_solid(AIR_BLOCK));
    }

    #[test]
    fn register_assigns_increasing_ids() {
        let mut reg = BlockRegistry::new();
        let stone = reg.register(
            "stone",
            BlockProperties {
                solid: true,
                textures: FaceLayers::uniform(1),
                tint: None,
                elements: None,
            },
        );
        let dirt = reg.register(
            "dirt",
            BlockProperties {
                solid: true,
                textures: FaceLayers::uniform(2),
                tint: None,
                elements: None,
            },
        );
        assert_eq!(stone, BlockId(1));
        assert_eq!(dirt, BlockId(2));
        assert!(reg.is_solid(stone));
    }

    #[test]
    fn load_registry_from_json() {
        let json = r#"{
            "blocks": [
                {"name": "stone", "solid": true, "textures": [1,1,1,1,1,1]},
                {"name": "grass", "solid": true, "textures": [2,2,3,4,2,2], "tint": [80, 180, 60]}
            ]
        }"#;
        let reg = load_registry(json.as_bytes()).unwrap();
        assert_eq!(reg.lookup("stone"), BlockId(1));
        let grass = reg.get(reg.lookup("grass"));
        assert_eq!(grass.textures.get(Face::MinusY), 4);
        assert!(grass.tint.is_some());
    }
}
