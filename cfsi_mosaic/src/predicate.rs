//! Per-product clear-pixel predicates.
//!
//! s2cloudless masks are two binary rasters (anything flagged in either
//! blocks the pixel); Fmask encodes classes in one raster where clear land,
//! water and snow count as usable.

use cfsi_core::{CfsiError, ProductName, Result};
use ndarray::Array2;
use std::collections::BTreeMap;

/// Measurement names a mask product contributes to the stack.
pub fn mask_measurements(product: ProductName) -> Result<&'static [&'static str]> {
	match product {
		ProductName::S2Level1cS2cloudless => Ok(&["cloud_mask", "shadow_mask"]),
		ProductName::S2Level1cFmask => Ok(&["fmask"]),
		other => Err(CfsiError::ConfigInvalid(format!("'{other}' is not a mask product"))),
	}
}

/// Boolean clear mask for one time slice given its mask measurements.
pub fn clear_mask(product: ProductName, masks: &BTreeMap<String, Array2<f64>>) -> Result<Array2<bool>> {
	let get = |name: &str| {
		masks
			.get(name)
			.ok_or_else(|| CfsiError::CatalogNotFound(format!("mask measurement '{name}' missing from slice")))
	};
	match product {
		ProductName::S2Level1cS2cloudless => {
			let clouds = get("cloud_mask")?;
			let shadows = get("shadow_mask")?;
			if clouds.dim() != shadows.dim() {
				return Err(CfsiError::RasterIoFailed("cloud and shadow masks differ in shape".to_string()));
			}
			let mut clear = Array2::from_elem(clouds.dim(), false);
			ndarray::Zip::from(&mut clear)
				.and(clouds)
				.and(shadows)
				.for_each(|clear, &cloud, &shadow| {
					*clear = cloud == 0.0 && shadow == 0.0;
				});
			Ok(clear)
		}
		ProductName::S2Level1cFmask => {
			let fmask = get("fmask")?;
			Ok(fmask.mapv(|value| value == 1.0 || value == 4.0 || value == 5.0))
		}
		other => Err(CfsiError::ConfigInvalid(format!("'{other}' is not a mask product"))),
	}
}
