//! Core building blocks for the CFSI pipeline.
//!
//! This crate carries everything the indexing, masking and mosaicking crates
//! share: the eo3-shaped [`DatasetDoc`] data model, the typed [`CfsiError`]
//! kinds, the YAML [`config`] layer, the pluggable collaborator traits
//! ([`BlobStoreTrait`], [`CatalogTrait`], [`RasterIoTrait`]) with their
//! built-in implementations, and the [`OutputPlanner`] that decides where
//! derived rasters land on disk.

mod blob;
mod catalog;
pub mod config;
mod error;
mod paths;
mod raster;
mod types;
mod uri;

pub use blob::*;
pub use catalog::*;
pub use error::*;
pub use paths::*;
pub use raster::*;
pub use types::*;
pub use uri::*;
