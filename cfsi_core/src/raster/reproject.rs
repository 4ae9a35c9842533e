//! Nearest-neighbor resampling between affine grids of one CRS.

use crate::{GridSpec, Result};
use ndarray::Array2;

/// Resamples `source` from `source_grid` onto `target_grid`. Every target
/// pixel takes the value of the source pixel whose center is nearest to its
/// own center; target pixels falling outside the source get `nodata`.
pub fn resample_nearest(
	source: &Array2<f64>,
	source_grid: &GridSpec,
	target_grid: &GridSpec,
	nodata: f64,
) -> Result<Array2<f64>> {
	let (nrows, ncols) = (target_grid.nrows(), target_grid.ncols());
	let mut target = Array2::from_elem((nrows, ncols), nodata);

	for row in 0..nrows {
		for col in 0..ncols {
			let (x, y) = target_grid.pixel_center(row as f64, col as f64);
			let (source_row, source_col) = source_grid.locate(x, y)?;
			let source_row = source_row.round();
			let source_col = source_col.round();
			if source_row < 0.0 || source_col < 0.0 {
				continue;
			}
			let (source_row, source_col) = (source_row as usize, source_col as usize);
			if source_row < source.nrows() && source_col < source.ncols() {
				target[[row, col]] = source[[source_row, source_col]];
			}
		}
	}

	Ok(target)
}
