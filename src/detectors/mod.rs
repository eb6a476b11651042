//! Market-structure classifiers
//!
//! Each classifier looks only at the trailing edge of a series and answers for
//! the most recent candle.
//!
//! # Classifiers
//!
//! - **Bias**: mean-close trend filter for the higher timeframes
//! - **Liquidity sweep**: wick through recent extremes that closes back inside
//! - **Break of structure**: close beyond the recent swing high/low
//! - **Order block**: reaction zone from a coherent sweep + break pair

pub mod helpers;

/// Generate `with_defaults()` -> `Self::default()` for multiple detector types.
macro_rules! impl_with_defaults {
  ($($detector:ty),* $(,)?) => {
    $(impl $detector {
      pub fn with_defaults() -> Self { Self::default() }
    })*
  };
}

pub mod bias;
pub mod order_block;
pub mod structure;
pub mod sweep;

// Re-export all detectors for convenience
pub use bias::*;
pub use helpers::*;
pub use order_block::*;
pub use structure::*;
pub use sweep::*;
