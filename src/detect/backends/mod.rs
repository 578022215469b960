pub mod canny;
pub mod sobel;

pub use canny::CannyBackend;
pub use sobel::SobelBackend;
