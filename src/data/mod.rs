pub mod candle;
pub mod tick;

pub use candle::*;
pub use tick::*;
