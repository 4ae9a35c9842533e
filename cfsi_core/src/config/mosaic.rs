use crate::{CfsiError, ProductName, Result};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MosaicConfig {
	/// Mask products to composite.
	#[serde(default)]
	pub products: Vec<ProductName>,

	/// End dates as `YYYY-MM-DD`, or the literal `today`.
	#[serde(default = "default_dates")]
	pub dates: Vec<String>,

	/// Window length in days, counted back from each end date.
	#[serde(default = "default_range")]
	pub range: i64,

	/// Surface-reflectance bands carried into the composite.
	#[serde(default = "default_output_bands")]
	pub output_bands: Vec<String>,

	/// Recency band mode: 0 = none, 1 = one shared band, 2 = one per band.
	#[serde(default = "default_recentness")]
	pub recentness: u8,
}

impl Default for MosaicConfig {
	fn default() -> Self {
		MosaicConfig {
			products: Vec::new(),
			dates: default_dates(),
			range: default_range(),
			output_bands: default_output_bands(),
			recentness: default_recentness(),
		}
	}
}

impl MosaicConfig {
	pub fn validate(&self) -> Result<()> {
		for product in &self.products {
			if !product.is_mask() {
				return Err(CfsiError::ConfigInvalid(format!(
					"mosaic.products entry '{product}' is not a mask product"
				)));
			}
		}
		for date in &self.dates {
			resolve_date(date)?;
		}
		if self.range <= 0 {
			return Err(CfsiError::ConfigInvalid(format!("mosaic.range {} must be positive", self.range)));
		}
		if self.recentness > 2 {
			return Err(CfsiError::ConfigInvalid(format!(
				"mosaic.recentness {} not in {{0, 1, 2}}",
				self.recentness
			)));
		}
		if self.output_bands.is_empty() {
			return Err(CfsiError::ConfigInvalid("mosaic.output_bands is empty".to_string()));
		}
		Ok(())
	}
}

/// Resolves a configured date token; `today` means the current UTC date.
pub fn resolve_date(token: &str) -> Result<NaiveDate> {
	if token == "today" {
		return Ok(Utc::now().date_naive());
	}
	NaiveDate::parse_from_str(token, "%Y-%m-%d")
		.map_err(|err| CfsiError::ConfigInvalid(format!("mosaic date '{token}': {err}")))
}

fn default_dates() -> Vec<String> {
	vec!["today".to_string()]
}

fn default_range() -> i64 {
	30
}

fn default_output_bands() -> Vec<String> {
	["B02", "B03", "B04", "B08"].iter().map(|band| (*band).to_string()).collect()
}

fn default_recentness() -> u8 {
	1
}
