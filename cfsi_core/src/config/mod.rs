//! Typed pipeline configuration.
//!
//! The configuration is one YAML document parsed once at startup. Every
//! section is optional and falls back to defaults; anything missing,
//! ill-typed or out of range is reported as [`CfsiError::ConfigInvalid`]
//! before any work starts.
//!
//! ## YAML shape
//!
//! ```yaml
//! catalog:
//!   path: /output/cfsi-catalog.sqlite   # optional
//!
//! index:
//!   s2_index:
//!     s3_buckets: [sentinel-s2-l1c, sentinel-s2-l2a]
//!     grids: [35PPM]
//!     years: [2020]
//!     months: [9, 10]
//!
//! masks:
//!   max_cloud_threshold: 94.0
//!   min_cloud_threshold: 1.0
//!   s2cloudless_masks:
//!     generate: true
//!     max_iterations: 10
//!     cloud_threshold: 0.3
//!     cloud_projection_distance: 30.0
//!     dark_pixel_threshold: 0.15
//!     cache: false
//!
//! mosaic:
//!   products: [s2_level1c_s2cloudless]
//!   dates: [today]
//!   range: 30
//!   output_bands: [B02, B03, B04, B08]
//!   recentness: 1
//! ```

use crate::{CfsiError, Result};
use serde::Deserialize;
use std::env;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

mod index;
mod masks;
mod mosaic;

pub use index::*;
pub use masks::*;
pub use mosaic::*;

/// Environment variable naming the container-local config file.
pub const ENV_CONFIG_CONTAINER: &str = "CFSI_CONFIG_CONTAINER";
/// Fallback environment variable naming the host config file.
pub const ENV_CONFIG_HOST: &str = "CFSI_CONFIG_HOST";

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
	#[serde(default)]
	pub catalog: CatalogConfig,

	#[serde(default)]
	pub index: IndexConfig,

	#[serde(default)]
	pub masks: MasksConfig,

	#[serde(default)]
	pub mosaic: MosaicConfig,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CatalogConfig {
	/// Location of the SQLite catalog; defaults to
	/// `<outputRoot>/cfsi-catalog.sqlite`.
	#[serde(default)]
	pub path: Option<PathBuf>,
}

impl Config {
	/// Parse a YAML config from any `Read` implementor.
	pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
		let config: Config =
			serde_yaml_ng::from_reader(reader).map_err(|err| CfsiError::ConfigInvalid(err.to_string()))?;
		config.validate()?;
		Ok(config)
	}

	/// Parse a YAML config from a string slice.
	pub fn from_string(text: &str) -> Result<Self> {
		let config: Config = serde_yaml_ng::from_str(text).map_err(|err| CfsiError::ConfigInvalid(err.to_string()))?;
		config.validate()?;
		Ok(config)
	}

	pub fn from_path(path: &Path) -> Result<Self> {
		let file = File::open(path)
			.map_err(|err| CfsiError::ConfigInvalid(format!("cannot open config file {}: {err}", path.display())))?;
		Self::from_reader(BufReader::new(file))
	}

	/// Resolves the config file location from the environment: the
	/// container-local variable wins, the host variable is the fallback.
	pub fn from_env() -> Result<Self> {
		let path = match env::var(ENV_CONFIG_CONTAINER) {
			Ok(value) => PathBuf::from(value),
			Err(_) => {
				log::warn!("{ENV_CONFIG_CONTAINER} not set, falling back to {ENV_CONFIG_HOST}");
				PathBuf::from(env::var(ENV_CONFIG_HOST).map_err(|_| {
					CfsiError::ConfigInvalid(format!("neither {ENV_CONFIG_CONTAINER} nor {ENV_CONFIG_HOST} is set"))
				})?)
			}
		};
		Self::from_path(&path)
	}

	fn validate(&self) -> Result<()> {
		self.index.validate()?;
		self.masks.validate()?;
		self.mosaic.validate()?;
		Ok(())
	}
}
