#![doc = include_str!("../README.md")]

mod error;
pub mod memfd;
pub mod region;

pub use error::RegionError;
pub use memfd::MemfdRegion;
pub use region::{HeapRegion, Region};
