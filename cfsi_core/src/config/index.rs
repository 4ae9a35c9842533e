use crate::{CfsiError, L1C_BUCKET, L2A_BUCKET, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct IndexConfig {
	#[serde(default)]
	pub s2_index: S2IndexConfig,
}

impl IndexConfig {
	pub fn validate(&self) -> Result<()> {
		self.s2_index.validate()
	}
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct S2IndexConfig {
	/// Buckets to crawl; the bucket decides the indexed product.
	#[serde(default = "default_buckets")]
	pub s3_buckets: Vec<String>,

	/// MGRS grid identifiers, e.g. `35PPM`.
	#[serde(default)]
	pub grids: Vec<String>,

	#[serde(default)]
	pub years: Vec<u16>,

	#[serde(default)]
	pub months: Vec<u8>,

	/// Crawl worker count; 0 means `min(cpus, 8)`.
	#[serde(default)]
	pub workers: usize,

	/// Keep the historical B10 exclusion in the L2A band table. Whether the
	/// exclusion is a domain invariant or an artifact of certain sen2cor
	/// versions is unresolved, so it stays switchable.
	#[serde(default = "default_true")]
	pub exclude_l2a_b10: bool,
}

impl Default for S2IndexConfig {
	fn default() -> Self {
		S2IndexConfig {
			s3_buckets: default_buckets(),
			grids: Vec::new(),
			years: Vec::new(),
			months: Vec::new(),
			workers: 0,
			exclude_l2a_b10: true,
		}
	}
}

impl S2IndexConfig {
	pub fn validate(&self) -> Result<()> {
		for bucket in &self.s3_buckets {
			if bucket != L1C_BUCKET && bucket != L2A_BUCKET {
				return Err(CfsiError::ConfigInvalid(format!(
					"unknown bucket '{bucket}', expected '{L1C_BUCKET}' or '{L2A_BUCKET}'"
				)));
			}
		}
		for grid in &self.grids {
			if grid.len() < 4 || !grid[..2].chars().all(|c| c.is_ascii_digit()) {
				return Err(CfsiError::ConfigInvalid(format!("'{grid}' is not an MGRS identifier")));
			}
		}
		for month in &self.months {
			if !(1..=12).contains(month) {
				return Err(CfsiError::ConfigInvalid(format!("month {month} out of range")));
			}
		}
		Ok(())
	}
}

fn default_buckets() -> Vec<String> {
	vec![L1C_BUCKET.to_string(), L2A_BUCKET.to_string()]
}

pub(super) fn default_true() -> bool {
	true
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_buckets_cover_both_levels() {
		let config = S2IndexConfig::default();
		assert_eq!(config.s3_buckets, vec![L1C_BUCKET, L2A_BUCKET]);
		assert!(config.exclude_l2a_b10);
	}

	#[test]
	fn rejects_bad_grid() {
		let config = S2IndexConfig {
			grids: vec!["PM35".to_string()],
			..S2IndexConfig::default()
		};
		assert!(config.validate().is_err());
	}

	#[test]
	fn rejects_bad_month() {
		let config = S2IndexConfig {
			months: vec![13],
			..S2IndexConfig::default()
		};
		assert!(config.validate().is_err());
	}
}
