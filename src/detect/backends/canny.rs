use crate::buffer::{EdgeMap, IntensityBuffer};
use crate::detect::backend::{prepare_io, EdgeBackend};
use crate::detect::gradient::{compute_gradients, GradientScratch};
use crate::detect::params::DetectorParams;
use crate::FrameError;

/// Marks a weak candidate during hysteresis. Never survives into the output.
const WEAK: u8 = 1;

/// tan(22.5°) in 1.15 fixed point.
const TAN_22_5_Q15: i64 = 13573;

/// Canny-style detector: gradients, non-maximum suppression, double threshold
/// and hysteresis. Thin (one pixel wide) binary edges.
#[derive(Clone, Debug, Default)]
pub struct CannyBackend {
    params: DetectorParams,
}

impl CannyBackend {
    pub fn new(params: DetectorParams) -> Self {
        Self { params }
    }
}

impl EdgeBackend for CannyBackend {
    fn name(&self) -> &'static str {
        "canny"
    }

    fn detect(
        &mut self,
        input: &IntensityBuffer,
        output: &mut EdgeMap,
        scratch: &mut GradientScratch,
    ) -> Result<(), FrameError> {
        prepare_io(input, output, scratch)?;
        compute_gradients(input, self.params.kernel, scratch);

        let magnitude = self.params.magnitude;
        for ((s, &gx), &gy) in scratch
            .strength
            .iter_mut()
            .zip(&scratch.gx)
            .zip(&scratch.gy)
        {
            *s = magnitude.strength(gx, gy);
        }

        let w = input.width as usize;
        let h = input.height as usize;
        let low = magnitude.level(self.params.low_threshold);
        let high = magnitude.level(self.params.high_threshold);
        suppress_non_maxima(scratch, output.as_mut_slice(), w, h, low, high);
        hysteresis(output.as_mut_slice(), &mut scratch.stack, w, h);
        Ok(())
    }
}

/// Keep local maxima along the gradient direction, classified as strong or weak.
fn suppress_non_maxima(
    scratch: &mut GradientScratch,
    out: &mut [u8],
    w: usize,
    h: usize,
    low: u32,
    high: u32,
) {
    let strength = &scratch.strength;
    let stack = &mut scratch.stack;
    stack.clear();

    for y in 0..h {
        let up = y.saturating_sub(1);
        let down = (y + 1).min(h - 1);
        for x in 0..w {
            let i = y * w + x;
            let s = strength[i];
            if s < low {
                out[i] = EdgeMap::BACKGROUND;
                continue;
            }
            let left = x.saturating_sub(1);
            let right = (x + 1).min(w - 1);

            let gx = scratch.gx[i] as i64;
            let gy = scratch.gy[i] as i64;
            let ax = gx.abs();
            let ay = gy.abs() << 15;
            let tan22 = ax * TAN_22_5_Q15;
            let tan67 = tan22 + (ax << 16);

            // Neighbours on either side along the gradient. The first must be
            // strictly smaller so a plateau keeps exactly one pixel. A neighbour
            // clamped onto the pixel itself never blocks it.
            let (a, b) = if ay < tan22 {
                (y * w + left, y * w + right)
            } else if ay > tan67 {
                (up * w + x, down * w + x)
            } else if (gx < 0) == (gy < 0) {
                (up * w + left, down * w + right)
            } else {
                (up * w + right, down * w + left)
            };

            out[i] = if (a == i || s > strength[a]) && (b == i || s >= strength[b]) {
                if s >= high {
                    stack.push(i);
                    EdgeMap::EDGE
                } else {
                    WEAK
                }
            } else {
                EdgeMap::BACKGROUND
            };
        }
    }
}

/// Promote weak pixels 8-connected to a strong one; drop the rest.
///
/// `stack` holds the strong seeds on entry.
fn hysteresis(out: &mut [u8], stack: &mut Vec<usize>, w: usize, h: usize) {
    while let Some(i) = stack.pop() {
        let x = i % w;
        let y = i / w;
        for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
            for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                let n = ny * w + nx;
                if out[n] == WEAK {
                    out[n] = EdgeMap::EDGE;
                    stack.push(n);
                }
            }
        }
    }
    for v in out.iter_mut() {
        if *v == WEAK {
            *v = EdgeMap::BACKGROUND;
        }
    }
}
