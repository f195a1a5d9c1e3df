pub mod aggregator;
pub mod aggressor;
pub mod alloc;
pub mod bucket;
pub mod bucketizer;
pub mod footprint;
pub mod resampler;
pub mod session;
pub mod volume;

pub use aggregator::*;
pub use aggressor::*;
pub use alloc::*;
pub use bucket::*;
pub use bucketizer::*;
pub use footprint::*;
pub use resampler::*;
pub use session::*;
pub use volume::*;
