mod backend;
mod backends;
mod gradient;
mod params;
mod registry;

pub use backend::EdgeBackend;
pub use backends::{CannyBackend, SobelBackend};
pub use gradient::GradientScratch;
pub use params::{
    DetectorParams, GradientKernel, Magnitude, DEFAULT_HIGH_THRESHOLD, DEFAULT_LOW_THRESHOLD,
    DEFAULT_THRESHOLD,
};
pub use registry::BackendRegistry;
