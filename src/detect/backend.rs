use crate::buffer::{EdgeMap, IntensityBuffer};
use crate::detect::gradient::GradientScratch;
use crate::FrameError;

/// Edge detector backend.
///
/// Backends run on the processing lane only. `output` and `scratch` come from the
/// frame arena and are reused across frames, so implementations must size them
/// with `ensure_dimensions` / `ensure_len` (no-ops while the frame size is
/// unchanged) and must not allocate per pixel.
pub trait EdgeBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Compute the edge map of `input` into `output`.
    ///
    /// Fails with `FrameError::Dimension` when `input` is zero-sized or its
    /// length disagrees with its width and height.
    fn detect(
        &mut self,
        input: &IntensityBuffer,
        output: &mut EdgeMap,
        scratch: &mut GradientScratch,
    ) -> Result<(), FrameError>;
}

/// Shared prologue: validate the input and size the output and scratch to it.
pub(crate) fn prepare_io(
    input: &IntensityBuffer,
    output: &mut EdgeMap,
    scratch: &mut GradientScratch,
) -> Result<(), FrameError> {
    input.check_dimensions()?;
    output.ensure_dimensions(input.width, input.height);
    scratch.ensure_len(input.as_slice().len());
    Ok(())
}
