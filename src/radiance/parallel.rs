use rayon::prelude::*;

use super::*;

/// Rows handed to one worker at a time.
const BAND_HEIGHT: usize = 8;
/// Width of the tiles a band is walked in, so neighboring probes share
/// cached rows of the level above.
const TILE_WIDTH: u32 = 8;

/// Splits the output into bands of rows and computes them on the rayon
/// pool. Every worker writes only its own band.
#[derive(Debug, Clone, Default)]
pub struct ParallelPass {
    fast_math: FastMath,
}

impl ParallelPass {
    pub fn new(fast_math: FastMath) -> Self {
        Self { fast_math }
    }
}

impl CascadePass for ParallelPass {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Parallel
    }
    fn run_pass(&self, pass: &Pass, far: &RasterBuffer, output: &mut RasterBuffer) {
        if output.is_empty() {
            return;
        }
        let width = output.width();
        output
            .pixels_mut()
            .par_chunks_mut(width as usize * BAND_HEIGHT)
            .enumerate()
            .for_each(|(band, pixels)| {
                let top = (band * BAND_HEIGHT) as u32;
                let rows = (pixels.len() / width as usize) as u32;
                for left in (0..width).step_by(TILE_WIDTH as usize) {
                    let right = (left + TILE_WIDTH).min(width);
                    for y in 0..rows {
                        for x in left..right {
                            pixels[(x + y * width) as usize] = compute_radiance(
                                pass,
                                far,
                                UVec2::new(x, top + y),
                                &self.fast_math,
                            );
                        }
                    }
                }
            });
    }
}
