pub mod lookback;
pub mod range;
