//! Raster access behind a pluggable interface.
//!
//! The pipeline reads bands, reprojects them onto a target grid and writes
//! tagged GeoTIFFs through [`RasterIoTrait`]. The built-in [`GtiffRasterIo`]
//! covers everything the pipeline itself produces: uncompressed baseline
//! GeoTIFF encode/decode, nearest-neighbor resampling between grids of one
//! CRS, and external `.ovr` overviews. Decoding JPEG 2000 source bands or
//! warping across CRS boundaries is the injected production collaborator's
//! job.

mod geotiff;
mod reproject;
mod traits;
mod types;

pub use geotiff::GtiffRasterIo;
pub use reproject::resample_nearest;
pub use traits::*;
pub use types::*;
