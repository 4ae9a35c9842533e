//! Cloud-shadow projection.
//!
//! # Overview
//!
//! Shadows are found by shifting the cloud mask along the mean sun azimuth
//! and keeping shifted-cloud pixels that are both cloud-free and dark in the
//! near infrared. The shifted mask is padded with [`SHIFT_BORDER`] so that
//! "outside the image" can never match the shadow-candidate value 1.
//!
//! The sign of the row displacement relative to image rows depends on the
//! raster's row direction, a convention this code refuses to guess:
//! [`RowDirection`] flips the whole displacement vector and both settings
//! are exercised by tests.

use cfsi_core::config::RowDirection;
use ndarray::Array2;

/// Pad value for pixels shifted in from outside the image. Distinct from
/// both mask values so border pixels never become shadow candidates.
pub const SHIFT_BORDER: u8 = 2;

/// Pixel displacement of the shadow search, `(rows, cols)`.
///
/// `dx = round(cos(azimuth) * distance)` and `dy = round(sin(azimuth) *
/// distance)`; `row_direction` decides how that vector maps onto image
/// indices.
pub fn shadow_shift(azimuth_degrees: f64, distance: f64, row_direction: RowDirection) -> (isize, isize) {
	let azimuth = azimuth_degrees.to_radians();
	let dx = (azimuth.cos() * distance).round() as isize;
	let dy = (azimuth.sin() * distance).round() as isize;
	match row_direction {
		RowDirection::NorthUp => (-dy, dx),
		RowDirection::SouthUp => (dy, -dx),
	}
}

/// Translates `mask` by `(shift_rows, shift_cols)`: the value at `(r, c)`
/// moves to `(r + shift_rows, c + shift_cols)`; vacated pixels become
/// [`SHIFT_BORDER`].
pub fn shift_mask(mask: &Array2<u8>, shift_rows: isize, shift_cols: isize) -> Array2<u8> {
	let (nrows, ncols) = mask.dim();
	let mut shifted = Array2::from_elem((nrows, ncols), SHIFT_BORDER);
	for row in 0..nrows {
		let source_row = row as isize - shift_rows;
		if source_row < 0 || source_row >= nrows as isize {
			continue;
		}
		for col in 0..ncols {
			let source_col = col as isize - shift_cols;
			if source_col < 0 || source_col >= ncols as isize {
				continue;
			}
			shifted[[row, col]] = mask[[source_row as usize, source_col as usize]];
		}
	}
	shifted
}

/// Binary shadow mask: pixels that are clear, hit by the projected cloud
/// mask and dark in the near infrared.
pub fn project_shadows(
	clouds: &Array2<u8>,
	nir: &Array2<f64>,
	azimuth_degrees: f64,
	distance: f64,
	dark_pixel_threshold: f64,
	row_direction: RowDirection,
) -> Array2<u8> {
	let (shift_rows, shift_cols) = shadow_shift(azimuth_degrees, distance, row_direction);
	log::debug!(
		"mean sun azimuth {azimuth_degrees:.2}, shifting cloud mask by {shift_rows} rows, {shift_cols} cols"
	);
	let shifted = shift_mask(clouds, shift_rows, shift_cols);

	let mut shadows = Array2::zeros(clouds.dim());
	ndarray::Zip::from(&mut shadows)
		.and(clouds)
		.and(&shifted)
		.and(nir)
		.for_each(|shadow, &cloud, &moved, &nir_value| {
			if cloud == 0 && moved == 1 && nir_value <= dark_pixel_threshold {
				*shadow = 1;
			}
		});
	shadows
}
