//! # Platform Ports
//!
//! Building blocks for implementing [`crate::port::Rtos`] on a platform.
//! `cortex_m4` supplies the clock and yield primitives of a Cortex-M4 port;
//! `host` (feature `std`) is a complete port on std threads.

pub mod cortex_m4;

#[cfg(any(test, feature = "std"))]
pub mod host;
