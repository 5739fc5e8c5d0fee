/// Cooperative cancellation.
pub mod cancel;
/// Frame, rate and geometry primitives.
pub mod core;
/// Crate error type.
pub mod error;
/// Hashing and fixed-point helpers.
pub mod math;
/// Seeded draws and value ranges.
pub mod random;
