//! Wyckoff accumulation event detection
//!
//! A single forward pass over the series, each event gated on the ones found
//! before it:
//!
//! - **Anchor**: SC (climactic volume) or LowPoint1 (same low, no surge)
//! - **Range**: AR, ST
//! - **Phase C**: Spring, Test
//! - **Confirmation**: LPS, SOS

pub mod events;
pub mod helpers;
pub mod volume;

pub use events::*;
pub use volume::average_volume;
