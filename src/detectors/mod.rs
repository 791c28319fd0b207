//! Chart formation matchers
//!
//! Each matcher turns the swing extrema of a [`PriceSeries`](crate::extrema::PriceSeries)
//! into de-duplicated [`PotentialPattern`](crate::PotentialPattern)s ordered
//! by completion.
//!
//! # Formations
//!
//! - **Triangles**: Ascending (flat resistance, rising support) and
//!   Descending (flat support, falling resistance)
//! - **Wedge**: Falling wedge over a sliding window
//! - **Reversal bottoms**: Double Bottom, Inverse Head & Shoulders

pub mod helpers;

/// Generate `with_defaults()` -> `Self::default()` for multiple matcher types.
macro_rules! impl_with_defaults {
  ($($detector:ty),* $(,)?) => {
    $(impl $detector {
      pub fn with_defaults() -> Self { Self::default() }
    })*
  };
}

pub mod double_bottom;
pub mod head_shoulders;
pub mod triangle;
pub mod wedge;

// Re-export all matchers for convenience
pub use double_bottom::*;
pub use head_shoulders::*;
pub use triangle::*;
pub use wedge::*;
