//! Built-in transport implementations.
//!
//! The session layer itself is transport-agnostic; this module hosts the
//! implementations shipped with the crate. Currently that is the in-process
//! [`loopback`] hub (feature `transport-loopback`, enabled by default), which
//! simulates a shared nearby radio for tests and local development.

#[cfg(feature = "transport-loopback")]
pub mod loopback;

#[cfg(feature = "transport-loopback")]
pub use loopback::{LoopbackHub, LoopbackTransport};
