#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

/// Retrieval of source data by URL
pub mod fetch;

/// Tile sources
pub mod tiles;
