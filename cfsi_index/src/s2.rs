//! Sentinel-2 band tables and per-bucket document layout.

use cfsi_core::{CfsiError, L1C_BUCKET, L2A_BUCKET, Measurement, ProductName, Result};
use std::collections::BTreeMap;

/// L1C bands at their native resolutions, `<band>_<resolution>`.
pub const L1C_MEASUREMENTS: [&str; 13] = [
	"B01_60m", "B02_10m", "B03_10m", "B04_10m", "B05_20m", "B06_20m", "B07_20m", "B08_10m", "B09_60m", "B8A_20m",
	"B10_60m", "B11_20m", "B12_20m",
];

/// Resampled variants plus the scene classification layer that exist only
/// at level 2A.
pub const L2A_EXTRA_MEASUREMENTS: [&str; 15] = [
	"B02_20m", "B02_60m", "B03_20m", "B03_60m", "B04_20m", "B04_60m", "B05_60m", "B06_60m", "B07_60m", "B08_20m",
	"B08_60m", "B8A_60m", "B11_60m", "B12_60m", "SCL_20m",
];

/// The complete L2A band table. B10 never makes it through atmospheric
/// correction; the exclusion is kept switchable because its status for some
/// sen2cor versions is unresolved.
pub fn l2a_measurements(exclude_b10: bool) -> Vec<&'static str> {
	L2A_EXTRA_MEASUREMENTS
		.iter()
		.chain(L1C_MEASUREMENTS.iter())
		.copied()
		.filter(|measurement| !(exclude_b10 && *measurement == "B10_60m"))
		.collect()
}

/// Product a bucket's granules are indexed under.
pub fn product_for_bucket(bucket: &str) -> Result<ProductName> {
	match bucket {
		L1C_BUCKET => Ok(ProductName::S2Level1cGranule),
		L2A_BUCKET => Ok(ProductName::S2Sen2corGranule),
		other => Err(CfsiError::InvalidUri(format!("no product for bucket '{other}'"))),
	}
}

/// Grid name for a `<band>_<resolution>` measurement.
fn grid_for(measurement: &str) -> &'static str {
	if measurement.ends_with("_10m") {
		"default"
	} else if measurement.ends_with("_60m") {
		"60m"
	} else {
		"20m"
	}
}

/// Builds the measurement table of a granule document. L1C measurements are
/// keyed by bare band name (`B02`), L2A ones keep the resolution suffix;
/// every path is the absolute JP2 URI below the dataset root.
pub fn build_measurements(bucket: &str, dataset_uri: &str, exclude_b10: bool) -> Result<BTreeMap<String, Measurement>> {
	let table: Vec<&str> = match bucket {
		L1C_BUCKET => L1C_MEASUREMENTS.to_vec(),
		L2A_BUCKET => l2a_measurements(exclude_b10),
		other => return Err(CfsiError::InvalidUri(format!("no band table for bucket '{other}'"))),
	};

	let mut measurements = BTreeMap::new();
	for entry in table {
		let (name, file_name) = match bucket {
			// native bands live in flat files named by band alone
			L1C_BUCKET => {
				let band = entry.split('_').next().unwrap();
				(band, band)
			}
			_ => (entry, entry),
		};
		measurements.insert(
			name.to_string(),
			Measurement::new(format!("{dataset_uri}/{file_name}.jp2")).with_grid(grid_for(entry)),
		);
	}
	Ok(measurements)
}
