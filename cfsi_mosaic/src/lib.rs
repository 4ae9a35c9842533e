//! Cloudless mosaic compositing.
//!
//! Joins mask datasets with their surface-reflectance siblings, blanks
//! non-clear pixels and reduces the remaining time stack into a
//! most-recent-clear composite per band, with optional recency bands
//! recording which capture date supplied each pixel. The result is written
//! as one multi-band GeoTIFF with external overviews and indexed back into
//! the catalog.

mod compositor;
mod predicate;
mod reduce;

pub use compositor::*;
pub use predicate::*;
pub use reduce::*;
