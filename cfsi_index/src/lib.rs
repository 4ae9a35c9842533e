//! Archive indexing for the CFSI catalog.
//!
//! This crate turns the Sentinel-2 object-store hierarchy into catalog
//! state: [`parse_tile_metadata`] reads per-tile `metadata.xml` manifests,
//! [`S2Indexer`] crawls configured prefixes with a bounded worker pool and
//! writes granule documents, and the [`MaskIndexer`] / [`MosaicIndexer`]
//! sinks register locally produced rasters so the mosaic stage can find
//! them.

mod indexer;
mod mask_index;
mod metadata;
mod mosaic_index;
mod s2;

pub use indexer::*;
pub use mask_index::*;
pub use metadata::*;
pub use mosaic_index::*;
pub use s2::*;
