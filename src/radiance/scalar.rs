use super::*;

/// One pixel at a time on the calling thread, with exact math. The other
/// strategies are checked against this one.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScalarPass;

impl CascadePass for ScalarPass {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Scalar
    }
    fn run_pass(&self, pass: &Pass, far: &RasterBuffer, output: &mut RasterBuffer) {
        for y in 0..output.height() {
            for x in 0..output.width() {
                let pixel = UVec2::new(x, y);
                output.set(pixel, compute_radiance(pass, far, pixel, &FastMath::Exact));
            }
        }
    }
}
