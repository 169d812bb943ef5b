pub mod config;
pub mod edges;
pub mod filters;
pub mod pipeline;
pub mod utils;

pub use config::{ContrastEstimator, EdgeDetectionConfig, LaplacianFilter, TrackbarPositions};
pub use pipeline::EdgeDetector;
pub use utils::{ChannelKind, PixelColor};
