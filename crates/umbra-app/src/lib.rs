//! Umbra viewer: a window presenting the deferred renderer's lit output.

pub mod clock;
pub mod demo;
pub mod platform;
pub mod viewer;
