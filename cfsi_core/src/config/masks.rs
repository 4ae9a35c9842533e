use super::index::default_true;
use crate::{CfsiError, Result};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MasksConfig {
	/// Granules whose metadata cloud percentage exceeds this are skipped.
	#[serde(default = "default_max_cloud")]
	pub max_cloud_threshold: f64,

	/// Granules whose metadata cloud percentage falls below this are skipped.
	#[serde(default = "default_min_cloud")]
	pub min_cloud_threshold: f64,

	/// Write an RGB reference raster next to each generated mask.
	#[serde(default)]
	pub write_rgb: bool,

	/// Write the full 13-band L1C stack next to each generated mask.
	#[serde(default)]
	pub write_l1c: bool,

	/// Bucket to copy finished masks into; requires a writable blob store.
	/// Unset means masks stay on the local filesystem only.
	#[serde(default)]
	pub write_through: Option<String>,

	#[serde(default)]
	pub s2cloudless_masks: S2cloudlessConfig,

	#[serde(default)]
	pub fmask_masks: FmaskConfig,
}

impl Default for MasksConfig {
	fn default() -> Self {
		MasksConfig {
			max_cloud_threshold: default_max_cloud(),
			min_cloud_threshold: default_min_cloud(),
			write_rgb: false,
			write_l1c: false,
			write_through: None,
			s2cloudless_masks: S2cloudlessConfig::default(),
			fmask_masks: FmaskConfig::default(),
		}
	}
}

impl MasksConfig {
	pub fn validate(&self) -> Result<()> {
		for (name, value) in [
			("max_cloud_threshold", self.max_cloud_threshold),
			("min_cloud_threshold", self.min_cloud_threshold),
		] {
			if !(0.0..=100.0).contains(&value) {
				return Err(CfsiError::ConfigInvalid(format!("masks.{name} {value} not in [0, 100]")));
			}
		}
		if self.min_cloud_threshold > self.max_cloud_threshold {
			return Err(CfsiError::ConfigInvalid(
				"masks.min_cloud_threshold exceeds masks.max_cloud_threshold".to_string(),
			));
		}
		self.s2cloudless_masks.validate()
	}
}

/// Direction of increasing image rows relative to projected north. The
/// shadow projection's row-sign convention is inconsistent in the field, so
/// instead of hard-wiring one direction it is configurable and both are
/// covered by tests.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RowDirection {
	/// Row 0 is the northern edge; row indices grow southward.
	#[default]
	NorthUp,
	/// Row 0 is the southern edge; row indices grow northward.
	SouthUp,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct S2cloudlessConfig {
	#[serde(default = "default_true")]
	pub generate: bool,

	/// Upper bound on masks generated per run; clamped to the candidate
	/// count at run time.
	#[serde(default = "default_max_iterations")]
	pub max_iterations: usize,

	/// Probability threshold handed to the cloud detector.
	#[serde(default = "default_cloud_threshold")]
	pub cloud_threshold: f64,

	/// Pixel distance over which clouds are projected to find shadows.
	#[serde(default = "default_projection_distance")]
	pub cloud_projection_distance: f64,

	/// Maximum normalized B08 value for a pixel to count as dark.
	#[serde(default = "default_dark_pixel_threshold")]
	pub dark_pixel_threshold: f64,

	/// Assemble the band stack from a locally cached `.SAFE` bundle instead
	/// of reading measurements through the catalog.
	#[serde(default)]
	pub cache: bool,

	#[serde(default)]
	pub row_direction: RowDirection,

	/// External command implementing the cloud detector; receives the band
	/// stack on a temp file and returns the mask (see `cfsi_mask::detector`).
	#[serde(default)]
	pub detector_command: Option<PathBuf>,
}

impl Default for S2cloudlessConfig {
	fn default() -> Self {
		S2cloudlessConfig {
			generate: true,
			max_iterations: default_max_iterations(),
			cloud_threshold: default_cloud_threshold(),
			cloud_projection_distance: default_projection_distance(),
			dark_pixel_threshold: default_dark_pixel_threshold(),
			cache: false,
			row_direction: RowDirection::NorthUp,
			detector_command: None,
		}
	}
}

impl S2cloudlessConfig {
	fn validate(&self) -> Result<()> {
		if !(0.0..=1.0).contains(&self.cloud_threshold) {
			return Err(CfsiError::ConfigInvalid(format!(
				"masks.s2cloudless_masks.cloud_threshold {} not in [0, 1]",
				self.cloud_threshold
			)));
		}
		if self.cloud_projection_distance < 0.0 {
			return Err(CfsiError::ConfigInvalid(
				"masks.s2cloudless_masks.cloud_projection_distance is negative".to_string(),
			));
		}
		Ok(())
	}
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FmaskConfig {
	#[serde(default)]
	pub generate: bool,

	#[serde(default = "default_max_iterations")]
	pub max_iterations: usize,

	/// External Fmask command; receives the staged granule directory and the
	/// output path.
	#[serde(default)]
	pub command: Option<PathBuf>,
}

impl Default for FmaskConfig {
	fn default() -> Self {
		FmaskConfig {
			generate: false,
			max_iterations: default_max_iterations(),
			command: None,
		}
	}
}

fn default_max_cloud() -> f64 {
	94.0
}

fn default_min_cloud() -> f64 {
	1.0
}

fn default_max_iterations() -> usize {
	10
}

fn default_cloud_threshold() -> f64 {
	0.3
}

fn default_projection_distance() -> f64 {
	30.0
}

fn default_dark_pixel_threshold() -> f64 {
	0.15
}
