//! Utilities shared by the binaries.

pub mod bootstrap;
