//! Catalog product names.
//!
//! The pipeline only ever deals with a closed set of products: the two
//! indexed granule levels, the two mask products derived from L1C granules,
//! and the mosaics derived from those masks.

use crate::{CfsiError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ProductName {
	/// Top-of-atmosphere Sentinel-2 granules indexed from the L1C bucket.
	S2Level1cGranule,
	/// Surface-reflectance granules indexed from the L2A bucket.
	S2Sen2corGranule,
	/// Cloud and shadow masks produced by the s2cloudless backend.
	S2Level1cS2cloudless,
	/// Classified masks produced by the Fmask backend.
	S2Level1cFmask,
	/// Cloudless composites built from s2cloudless masks.
	S2cloudlessMosaic,
	/// Cloudless composites built from Fmask masks.
	FmaskMosaic,
}

impl ProductName {
	pub fn as_str(&self) -> &'static str {
		use ProductName::*;
		match self {
			S2Level1cGranule => "s2_level1c_granule",
			S2Sen2corGranule => "s2_sen2cor_granule",
			S2Level1cS2cloudless => "s2_level1c_s2cloudless",
			S2Level1cFmask => "s2_level1c_fmask",
			S2cloudlessMosaic => "s2_level1c_s2cloudless_mosaic",
			FmaskMosaic => "s2_level1c_fmask_mosaic",
		}
	}

	/// Whether this product holds per-tile cloud/shadow masks.
	pub fn is_mask(&self) -> bool {
		matches!(self, ProductName::S2Level1cS2cloudless | ProductName::S2Level1cFmask)
	}

	/// The mosaic product derived from this mask product, if any.
	pub fn mosaic(&self) -> Option<ProductName> {
		match self {
			ProductName::S2Level1cS2cloudless => Some(ProductName::S2cloudlessMosaic),
			ProductName::S2Level1cFmask => Some(ProductName::FmaskMosaic),
			_ => None,
		}
	}
}

impl fmt::Display for ProductName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for ProductName {
	type Err = CfsiError;

	fn from_str(value: &str) -> Result<Self> {
		use ProductName::*;
		Ok(match value {
			"s2_level1c_granule" => S2Level1cGranule,
			"s2_sen2cor_granule" => S2Sen2corGranule,
			"s2_level1c_s2cloudless" => S2Level1cS2cloudless,
			"s2_level1c_fmask" => S2Level1cFmask,
			"s2_level1c_s2cloudless_mosaic" => S2cloudlessMosaic,
			"s2_level1c_fmask_mosaic" => FmaskMosaic,
			_ => return Err(CfsiError::ConfigInvalid(format!("unknown product name '{value}'"))),
		})
	}
}

impl TryFrom<String> for ProductName {
	type Error = CfsiError;

	fn try_from(value: String) -> Result<Self> {
		value.parse()
	}
}

impl From<ProductName> for String {
	fn from(value: ProductName) -> Self {
		value.as_str().to_string()
	}
}
