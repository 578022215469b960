use crate::buffer::{EdgeMap, IntensityBuffer};
use crate::detect::backend::{prepare_io, EdgeBackend};
use crate::detect::gradient::{compute_gradients, GradientScratch};
use crate::detect::params::DetectorParams;
use crate::FrameError;

/// Gradient magnitude + single threshold. Produces a binary map.
#[derive(Clone, Debug, Default)]
pub struct SobelBackend {
    params: DetectorParams,
}

impl SobelBackend {
    pub fn new(params: DetectorParams) -> Self {
        Self { params }
    }
}

impl EdgeBackend for SobelBackend {
    fn name(&self) -> &'static str {
        "sobel"
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
        let level = magnitude.level(self.params.threshold);
        for ((out, &gx), &gy) in output
            .as_mut_slice()
            .iter_mut()
            .zip(&scratch.gx)
            .zip(&scratch.gy)
        {
            *out = if magnitude.strength(gx, gy) >= level {
                EdgeMap::EDGE
            } else {
                EdgeMap::BACKGROUND
            };
        }
        Ok(())
    }
}
