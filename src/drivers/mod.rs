//! Concrete `Driver` implementations.
//!
//! `generic` drives any `Connection` variant using the transport that
//! matches it (subprocess, TCP, serial); `mock` is a canned driver used by
//! tests and by `Dummy` measurements.

pub mod generic;
pub mod mock;
