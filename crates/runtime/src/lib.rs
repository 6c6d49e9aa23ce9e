//! Freestanding runtime glue around the table allocator.
//!
//! This crate ties the `allocator`, `uart` and `vga-text` crates together
//! for a program running without an operating system:
//!
//! - [`console`] holds the output sink behind `print!`/`println!`.
//! - [`log`] provides leveled, colored log macros on top of the console.
//! - [`heap`] wraps the allocator in a spin lock and implements
//!   [`GlobalAlloc`](core::alloc::GlobalAlloc).
//! - [`boot`] turns the memory layout reported by the loader into the heap
//!   region.
//! - [`error`] renders fatal errors with their cause chain.
//!
//! With the `global-allocator` feature, `heap::HEAP` becomes the Rust
//! global allocator.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod ansi;
pub mod boot;
pub mod console;
pub mod error;
pub mod heap;
pub mod log;

#[cfg(test)]
mod testing;
