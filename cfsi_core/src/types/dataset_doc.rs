//! The eo3 dataset document, the unit of catalog state.
//!
//! # Overview
//!
//! Every indexed granule, generated mask and written mosaic is represented by
//! one [`DatasetDoc`]. Identity is content-derived: the id is the MD5 of the
//! canonical dataset URI, so the same URI always maps to the same document
//! and deduplication needs no extra bookkeeping.
//!
//! The serialized shape follows the open-data-cube eo3 convention: `$schema`,
//! a nested `product.name`, `grids` with `default` always present, and
//! `measurements` whose paths are absolute URIs (`s3://` or `file://`).

use super::{DEFAULT_GRID, GridSpec, ProductName};
use crate::{CfsiError, Result, dataset_id_from_uri};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The `$schema` value of every document this pipeline writes.
pub const EO3_SCHEMA: &str = "https://schemas.opendatacube.org/dataset";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDoc {
	/// MD5 of the canonical dataset URI, hex-encoded.
	pub id: String,
	#[serde(rename = "$schema")]
	pub schema: String,
	pub product: ProductRef,
	/// CRS code, e.g. `EPSG:32635`.
	pub crs: String,
	pub grids: BTreeMap<String, GridSpec>,
	pub measurements: BTreeMap<String, Measurement>,
	/// Dataset root URI.
	pub uri: String,
	pub properties: DocProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRef {
	pub name: ProductName,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
	/// Absolute URI of the band file.
	pub path: String,
	/// Grid name in `DatasetDoc::grids`; measurements on the default grid
	/// may omit it.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub grid: Option<String>,
	/// 1-based band index inside a multi-band file.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub band: Option<usize>,
}

impl Measurement {
	pub fn new(path: String) -> Measurement {
		Measurement {
			path,
			grid: None,
			band: None,
		}
	}

	pub fn with_grid(mut self, grid: &str) -> Measurement {
		self.grid = Some(grid.to_string());
		self
	}

	pub fn with_band(mut self, band: usize) -> Measurement {
		self.band = Some(band);
		self
	}
}

/// Flat property block carried by every document. Keys keep the eo3/odc
/// spelling so the documents stay readable by existing tooling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocProperties {
	pub tile_id: String,
	pub datetime: DateTime<Utc>,
	#[serde(rename = "eo:instrument")]
	pub instrument: String,
	#[serde(rename = "eo:platform")]
	pub platform: String,
	#[serde(rename = "odc:file_format")]
	pub file_format: String,
	#[serde(rename = "odc:region_code", default, skip_serializing_if = "Option::is_none")]
	pub region_code: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub mean_sun_zenith: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub mean_sun_azimuth: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cloudy_pixel_percentage: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub s3_key: Option<String>,
	/// Id of the matching L2A dataset; set on mask documents.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub l2a_dataset_id: Option<String>,
	/// Mask product a mosaic was built from; set on mosaic documents.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub mask_name: Option<String>,
}

impl DocProperties {
	/// Properties shared by every Sentinel-2 derived document.
	pub fn new(tile_id: String, datetime: DateTime<Utc>, file_format: &str) -> DocProperties {
		DocProperties {
			tile_id,
			datetime,
			instrument: "MSI".to_string(),
			platform: "SENTINEL-2".to_string(),
			file_format: file_format.to_string(),
			region_code: None,
			mean_sun_zenith: None,
			mean_sun_azimuth: None,
			cloudy_pixel_percentage: None,
			s3_key: None,
			l2a_dataset_id: None,
			mask_name: None,
		}
	}
}

impl DatasetDoc {
	/// Creates a document for `uri`, deriving the id from the URI.
	pub fn new(
		product: ProductName,
		uri: String,
		crs: String,
		grids: BTreeMap<String, GridSpec>,
		measurements: BTreeMap<String, Measurement>,
		properties: DocProperties,
	) -> DatasetDoc {
		DatasetDoc {
			id: dataset_id_from_uri(&uri),
			schema: EO3_SCHEMA.to_string(),
			product: ProductRef { name: product },
			crs,
			grids,
			measurements,
			uri,
			properties,
		}
	}

	pub fn product_name(&self) -> ProductName {
		self.product.name
	}

	pub fn datetime(&self) -> DateTime<Utc> {
		self.properties.datetime
	}

	/// The canonical 10 m grid.
	pub fn default_grid(&self) -> Result<&GridSpec> {
		self
			.grids
			.get(DEFAULT_GRID)
			.ok_or_else(|| CfsiError::MalformedMetadata(format!("dataset {} has no default grid", self.id)))
	}

	/// Grid of a measurement, falling back to the default grid.
	pub fn measurement_grid(&self, measurement: &Measurement) -> Result<&GridSpec> {
		match &measurement.grid {
			Some(name) => self
				.grids
				.get(name)
				.ok_or_else(|| CfsiError::MalformedMetadata(format!("dataset {} has no grid '{name}'", self.id))),
			None => self.default_grid(),
		}
	}

	/// Checks the structural invariants every catalog write must satisfy:
	/// the id matches the URI, `grids.default` exists and all measurement
	/// paths are absolute URIs.
	pub fn validate(&self) -> Result<()> {
		if self.id != dataset_id_from_uri(&self.uri) {
			return Err(CfsiError::MalformedMetadata(format!(
				"dataset id {} does not match uri {}",
				self.id, self.uri
			)));
		}
		if !self.grids.contains_key(DEFAULT_GRID) {
			return Err(CfsiError::MalformedMetadata(format!(
				"dataset {} is missing the default grid",
				self.id
			)));
		}
		for (name, measurement) in &self.measurements {
			if !measurement.path.contains("://") {
				return Err(CfsiError::MalformedMetadata(format!(
					"measurement '{name}' of dataset {} has relative path '{}'",
					self.id, measurement.path
				)));
			}
			self.measurement_grid(measurement)?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	pub fn test_doc() -> DatasetDoc {
		let uri = "s3://sentinel-s2-l1c/tiles/35/P/PM/2020/10/2/0".to_string();
		let mut grids = BTreeMap::new();
		grids.insert(
			DEFAULT_GRID.to_string(),
			GridSpec::from_geoposition(10980, 10980, 600000.0, 1000020.0, 10.0, -10.0),
		);
		let mut measurements = BTreeMap::new();
		measurements.insert("B02".to_string(), Measurement::new(format!("{uri}/B02.jp2")));
		let mut properties = DocProperties::new(
			"L1C_T35PPM_A027723_20201002T084052".to_string(),
			"2020-10-02T08:48:04Z".parse().unwrap(),
			"JPEG2000",
		);
		properties.region_code = Some("35PPM".to_string());
		properties.cloudy_pixel_percentage = Some(4.5);
		DatasetDoc::new(
			ProductName::S2Level1cGranule,
			uri,
			"EPSG:32635".to_string(),
			grids,
			measurements,
			properties,
		)
	}

	#[test]
	fn id_is_md5_of_uri() {
		let doc = test_doc();
		assert_eq!(doc.id, dataset_id_from_uri(&doc.uri));
		assert_eq!(doc.id.len(), 32);
	}

	#[test]
	fn validate_accepts_well_formed_doc() {
		test_doc().validate().unwrap();
	}

	#[test]
	fn validate_rejects_relative_measurement_path() {
		let mut doc = test_doc();
		doc
			.measurements
			.insert("B03".to_string(), Measurement::new("B03.jp2".to_string()));
		assert!(doc.validate().is_err());
	}

	#[test]
	fn validate_rejects_missing_default_grid() {
		let mut doc = test_doc();
		doc.grids.remove(DEFAULT_GRID);
		assert!(doc.validate().is_err());
	}

	#[test]
	fn serde_round_trip_keeps_eo3_shape() {
		let doc = test_doc();
		let json = serde_json::to_value(&doc).unwrap();
		assert_eq!(json["$schema"], EO3_SCHEMA);
		assert_eq!(json["product"]["name"], "s2_level1c_granule");
		assert_eq!(json["properties"]["odc:region_code"], "35PPM");
		assert_eq!(json["properties"]["eo:instrument"], "MSI");
		let back: DatasetDoc = serde_json::from_value(json).unwrap();
		assert_eq!(back, doc);
	}
}
