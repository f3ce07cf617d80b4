//! The terrain generator boundary. The core only ever talks to a
//! `dyn TerrainGenerator`; `ExampleTerrainGenerator` is a concrete,
//! deterministic implementation: an Fbm noise stack, a seeding scheme keyed
//! off world seed and column position, and layered stone/dirt/grass/sand/
//! water surface terrain spanning the chunk's full height.

use noise::{Fbm, MultiFractal, NoiseFn, OpenSimplex, Seedable};
use std::sync::Arc;

use crate::block::{BlockId, AIR_BLOCK};
use crate::world::chunk::{Chunk, LocalPos, CHUNK_HEIGHT, SECTION_LENGTH};
use crate::world::spline::{Spline, SplinePoint};

const SEA_LEVEL: i32 = 64;

/// External collaborator interface: a pure, deterministic function from chunk
/// coordinate to populated chunk. The core never inspects how this is
/// implemented.
pub trait TerrainGenerator: Send + Sync {
    /// Maximum world-Y at which this generator may place solid blocks at the
    /// given world-space column. Used by the streamer to bound its vertical
    /// sweep.
    fn height_at(&self, wx: i32, wz: i32) -> i32;

    /// Fills `chunk` in place. Must be deterministic in `(seed, chunk.pos())`
    /// and must not mutate any hidden state visible to a later call. Must
    /// leave the chunk's dirty flag set (fresh chunks already start dirty).
    fn populate_chunk(&self, chunk: &mut Chunk);
}

struct NoiseSampler<F> {
    noise: F,
    scale: f32,
}

impl<F: Seedable> NoiseSampler<F> {
    fn seeded(seed: u64, noise: F, scale: f32) -> Self {
        NoiseSampler {
            noise: noise.set_seed(seed as u32),
            scale,
        }
    }
}

impl<F: NoiseFn<[f64; 2]>> NoiseSampler<F> {
    fn sample2(&self, x: f32, z: f32) -> f32 {
        self.noise.get([(x * self.scale) as f64, (z * self.scale) as f64]) as f32
    }
}

impl<F: NoiseFn<[f64; 3]>> NoiseSampler<F> {
    fn sample3(&self, x: f32, y: f32, z: f32) -> f32 {
        self.noise
            .get([(x * self.scale) as f64, (y * self.scale) as f64, (z * self.scale) as f64]) as f32
    }
}

/// A deterministic, seeded terrain generator: Fbm-noise heightmap shaped by a
/// spline, OpenSimplex cave carving below the surface, and simple
/// stone/dirt/grass/sand/water layering. Nothing else in the core depends on
/// it; a host can supply its own `TerrainGenerator` instead.
pub struct ExampleTerrainGenerator {
    seed: u64,
    shaping_curve: Spline,
    stone: BlockId,
    dirt: BlockId,
    grass: BlockId,
    sand: BlockId,
    water: BlockId,
}

impl ExampleTerrainGenerator {
    pub fn new(seed: u64, stone: BlockId, dirt: BlockId, grass: BlockId, sand: BlockId, water: BlockId) -> Arc<Self> {
        Arc::new(ExampleTerrainGenerator {
            seed,
            shaping_curve: Spline::default()
                .with_point(SplinePoint { start: -1.0, height: -10.0 })
                .with_point(SplinePoint { start: 0.2, height: 20.0 })
                .with_point(SplinePoint { start: 0.6, height: 40.0 })
                .with_point(SplinePoint { start: 1.0, height: 100.0 }),
            stone,
            dirt,
            grass,
            sand,
            water,
        })
    }

    fn height_noise(&self) -> NoiseSampler<Fbm> {
        NoiseSampler::seeded(self.seed, Fbm::new().set_octaves(4), 0.004)
    }

    fn surface_height(&self, wx: i32, wz: i32) -> i32 {
        let noise = self.height_noise();
        let raw = noise.sample2(wx as f32, wz as f32);
        self.shaping_curve.sample(raw).floor() as i32 + SEA_LEVEL
    }

    fn cave_noises(&self) -> (NoiseSampler<OpenSimplex>, NoiseSampler<OpenSimplex>) {
        (
            NoiseSampler::seeded(self.seed, OpenSimplex::new(), 0.015),
            NoiseSampler::seeded(self.seed.wrapping_add(3), OpenSimplex::new(), 0.015),
        )
    }

    fn is_cave(open: &NoiseSampler<OpenSimplex>, stringy: &NoiseSampler<OpenSimplex>, wx: i32, wy: i32, wz: i32, surface: i32) -> bool {
        let distance = wy - surface;
        if distance >= -20 {
            return false;
        }
        let d1 = open.sample3(wx as f32, wy as f32, wz as f32);
        let d2 = stringy.sample3(wx as f32, wy as f32, wz as f32);
        d1.abs() < 0.05 && d2.abs() < 0.05
    }
}

impl TerrainGenerator for ExampleTerrainGenerator {
    fn height_at(&self, wx: i32, wz: i32) -> i32 {
        self.surface_height(wx, wz)
    }

    fn populate_chunk(&self, chunk: &mut Chunk) {
        let pos = chunk.pos();
        let [base_x, _base_y, base_z] = pos.origin();
        let (open, stringy) = self.cave_noises();

        for x in 0..SECTION_LENGTH {
            for z in 0..SECTION_LENGTH {
                let wx = base_x + x as i32;
                let wz = base_z + z as i32;
                let surface = self.surface_height(wx, wz);

                for y in 0..CHUNK_HEIGHT {
                    let wy = y as i32;
                    if wy > surface.max(SEA_LEVEL) {
                        continue; // leave air
                    }

                    let depth = surface - wy;
                    let block = if Self::is_cave(&open, &stringy, wx, wy, wz, surface) {
                        AIR_BLOCK
                    } else if depth < 0 {
                        self.water
                    } else if depth == 0 {
                        if surface <= SEA_LEVEL + 1 {
                            self.sand
                        } else {
                            self.grass
                        }
                    } else if depth <= 3 {
                        self.dirt
                    } else {
                        self.stone
                    };

                    if block != AIR_BLOCK {
                        chunk.set_block(
                            LocalPos {
                                x: x as u8,
                                y: y as u16,
                                z: z as u8,
                            },
                            block,
                        );
                    }
                }
            }
        }

        chunk.mark_dirty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::chunk::ChunkPos;

    fn gen() -> Arc<ExampleTerrainGenerator> {
        ExampleTerrainGenerator::new(42, BlockId(1), BlockId(2), BlockId(3), BlockId(4), BlockId(5))
    }

    #[test]
    fn populate_is_deterministic() {
        let gen = gen();
        let pos = ChunkPos { cx: 3, cy: 0, cz: -2 };
        let mut a = Chunk::new_empty(pos);
        let mut b = Chunk::new_empty(pos);
        gen.populate_chunk(&mut a);
        gen.populate_chunk(&mut b);
        for x in 0..16u8 {
            for z in 0..16u8 {
                for y in 0..256u16 {
                    let p = LocalPos { x, y, z };
                    assert_eq!(a.get_block(p), b.get_block(p));
                }
            }
        }
    }

    #[test]
    fn surface_height_is_deterministic() {
        let gen = gen();
        assert_eq!(gen.height_at(100, -50), gen.height_at(100, -50));
    }
}
