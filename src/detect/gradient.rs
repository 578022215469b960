//! Separable 3x3 gradients with clamp-to-edge borders.
//!
//! Pass 1 walks rows and produces, per pixel, the horizontal derivative
//! `I[x+1] - I[x-1]` and the horizontal smoothing `a*I[x-1] + b*I[x] + a*I[x+1]`.
//! Pass 2 walks columns: `gx` smooths the derivative vertically and `gy`
//! differentiates the smoothing vertically. Out-of-range neighbours replicate
//! the nearest valid pixel, so a flat frame has zero gradient everywhere,
//! including the border.

use crate::buffer::IntensityBuffer;
use crate::detect::params::GradientKernel;

/// Per-pixel gradient storage, sized by the frame arena.
#[derive(Debug, Default)]
pub struct GradientScratch {
    dx: Vec<i32>,
    smooth: Vec<i32>,
    pub(crate) gx: Vec<i32>,
    pub(crate) gy: Vec<i32>,
    pub(crate) strength: Vec<u32>,
    pub(crate) stack: Vec<usize>,
}

impl GradientScratch {
    /// Size for `len` pixels. Returns true when storage was rebuilt.
    pub fn ensure_len(&mut self, len: usize) -> bool {
        if self.gx.len() == len {
            return false;
        }
        for plane in [&mut self.dx, &mut self.smooth, &mut self.gx, &mut self.gy] {
            plane.clear();
            plane.resize(len, 0);
        }
        self.strength.clear();
        self.strength.resize(len, 0);
        // Each pixel is pushed at most once during hysteresis.
        self.stack.clear();
        self.stack.reserve(len);
        true
    }

    pub fn gx(&self) -> &[i32] {
        &self.gx
    }

    pub fn gy(&self) -> &[i32] {
        &self.gy
    }

    pub(crate) fn release(&mut self) {
        *self = Self::default();
    }
}

/// Fill `scratch.gx` / `scratch.gy` for `input`.
///
/// The caller has validated `input` and sized `scratch` to it.
pub(crate) fn compute_gradients(
    input: &IntensityBuffer,
    kernel: GradientKernel,
    scratch: &mut GradientScratch,
) {
    let w = input.width as usize;
    let h = input.height as usize;
    let (outer, center) = kernel.smoothing();
    let src = input.as_slice();
    let GradientScratch {
        dx,
        smooth,
        gx,
        gy,
        ..
    } = scratch;

    for ((row, dx_row), sm_row) in src
        .chunks_exact(w)
        .zip(dx.chunks_exact_mut(w))
        .zip(smooth.chunks_exact_mut(w))
    {
        for x in 0..w {
            let left = row[x.saturating_sub(1)] as i32;
            let mid = row[x] as i32;
            let right = row[(x + 1).min(w - 1)] as i32;
            dx_row[x] = right - left;
            sm_row[x] = outer * (left + right) + center * mid;
        }
    }

    for y in 0..h {
        let up = y.saturating_sub(1) * w;
        let here = y * w;
        let down = (y + 1).min(h - 1) * w;
        for x in 0..w {
            gx[here + x] = outer * (dx[up + x] + dx[down + x]) + center * dx[here + x];
            gy[here + x] = smooth[down + x] - smooth[up + x];
        }
    }
}
