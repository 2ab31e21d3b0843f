//! Track Resolution
//!
//! Resolves an opaque track identifier to a playable stream URL plus
//! metadata, and memoizes the result for the session.

mod cache;
mod client;
mod types;

pub(crate) use cache::TrackCache;
pub use client::{parse_resolution, ResolveError, ResolverClient};
pub use types::*;
