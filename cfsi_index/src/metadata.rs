//! Per-tile `metadata.xml` parsing.
//!
//! # Overview
//!
//! Every granule in the archive carries a `metadata.xml` manifest. This
//! module extracts the handful of elements the pipeline needs into a
//! transient [`TileMeta`]: identity, sensing time, CRS, mean sun angles, the
//! metadata cloud percentage and the three resolution grids. Anything
//! missing or non-numeric is a [`CfsiError::MalformedMetadata`] and the tile
//! is skipped by the caller.

use cfsi_core::{CfsiError, DEFAULT_GRID, GridSpec, Result};
use chrono::{DateTime, Utc};
use roxmltree::{Document, Node};
use std::collections::BTreeMap;

/// The three native Sentinel-2 grid resolutions in meters.
pub const GRID_RESOLUTIONS: [u16; 3] = [10, 20, 60];

/// Parsed tile manifest. Transient: never stored, only folded into
/// [`cfsi_core::DatasetDoc`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct TileMeta {
	pub tile_id: String,
	pub sensing_time: DateTime<Utc>,
	/// Normalized to uppercase, e.g. `EPSG:32635`.
	pub crs_code: String,
	pub sun_zenith: f64,
	pub sun_azimuth: f64,
	pub cloudy_pixel_percentage: f64,
	/// Grids keyed by resolution in meters (10, 20, 60).
	pub grids: BTreeMap<u16, GridSpec>,
}

impl TileMeta {
	/// The canonical 10 m grid.
	pub fn grid_10m(&self) -> &GridSpec {
		&self.grids[&10]
	}

	/// Grids keyed the way dataset documents expect them: `default` for
	/// 10 m, `20m` and `60m` for the rest.
	pub fn doc_grids(&self) -> BTreeMap<String, GridSpec> {
		self
			.grids
			.iter()
			.map(|(resolution, grid)| {
				let name = match resolution {
					10 => DEFAULT_GRID.to_string(),
					other => format!("{other}m"),
				};
				(name, grid.clone())
			})
			.collect()
	}
}

fn malformed(message: impl Into<String>) -> CfsiError {
	CfsiError::MalformedMetadata(message.into())
}

fn find_text<'a>(root: Node<'a, 'a>, tag: &str) -> Result<&'a str> {
	root
		.descendants()
		.find(|node| node.has_tag_name(tag))
		.and_then(|node| node.text())
		.ok_or_else(|| malformed(format!("missing element {tag}")))
}

fn find_f64(root: Node<'_, '_>, tag: &str) -> Result<f64> {
	let text = find_text(root, tag)?;
	text
		.trim()
		.parse()
		.map_err(|_| malformed(format!("element {tag} is not numeric: '{text}'")))
}

/// Text of `child` below the element `parent[@resolution=resolution]`.
fn resolution_text<'a>(root: Node<'a, 'a>, parent: &str, resolution: u16, child: &str) -> Result<&'a str> {
	root
		.descendants()
		.find(|node| node.has_tag_name(parent) && node.attribute("resolution") == Some(&resolution.to_string()[..]))
		.and_then(|node| {
			node
				.children()
				.find(|inner| inner.has_tag_name(child))
				.and_then(|inner| inner.text())
		})
		.ok_or_else(|| malformed(format!("missing {parent}[@resolution='{resolution}']/{child}")))
}

fn resolution_f64(root: Node<'_, '_>, parent: &str, resolution: u16, child: &str) -> Result<f64> {
	let text = resolution_text(root, parent, resolution, child)?;
	text
		.trim()
		.parse()
		.map_err(|_| malformed(format!("{parent}/{child} at {resolution}m is not numeric: '{text}'")))
}

/// Parses a `metadata.xml` byte buffer into a [`TileMeta`].
pub fn parse_tile_metadata(bytes: &[u8]) -> Result<TileMeta> {
	let text = std::str::from_utf8(bytes).map_err(|err| malformed(format!("not utf-8: {err}")))?;
	let document = Document::parse(text).map_err(|err| malformed(format!("not well-formed xml: {err}")))?;
	let root = document.root_element();

	let sensing_text = find_text(root, "SENSING_TIME")?;
	let sensing_time = DateTime::parse_from_rfc3339(sensing_text)
		.map_err(|err| malformed(format!("bad SENSING_TIME '{sensing_text}': {err}")))?
		.with_timezone(&Utc);

	let mut grids = BTreeMap::new();
	for resolution in GRID_RESOLUTIONS {
		let nrows = resolution_f64(root, "Size", resolution, "NROWS")? as usize;
		let ncols = resolution_f64(root, "Size", resolution, "NCOLS")? as usize;
		let ulx = resolution_f64(root, "Geoposition", resolution, "ULX")?;
		let uly = resolution_f64(root, "Geoposition", resolution, "ULY")?;
		let xdim = resolution_f64(root, "Geoposition", resolution, "XDIM")?;
		let ydim = resolution_f64(root, "Geoposition", resolution, "YDIM")?;
		grids.insert(resolution, GridSpec::from_geoposition(nrows, ncols, ulx, uly, xdim, ydim));
	}

	Ok(TileMeta {
		tile_id: find_text(root, "TILE_ID")?.to_string(),
		sensing_time,
		crs_code: find_text(root, "HORIZONTAL_CS_CODE")?.to_uppercase(),
		sun_zenith: find_f64(root, "ZENITH_ANGLE")?,
		sun_azimuth: find_f64(root, "AZIMUTH_ANGLE")?,
		cloudy_pixel_percentage: find_f64(root, "CLOUDY_PIXEL_PERCENTAGE")?,
		grids,
	})
}
