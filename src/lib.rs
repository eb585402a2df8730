//! Fragforge - fragmented MP4 inspection and rewriting
//!
//! This library crate exposes the command implementations for integration
//! testing. The codec itself lives in `fragforge-media`.

pub mod config;
pub mod inspect;
pub mod rewrite;
