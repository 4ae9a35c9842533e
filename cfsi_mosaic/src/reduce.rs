//! Most-recent-clear time-stack reduction.

use cfsi_core::{CfsiError, Result};
use chrono::NaiveDate;
use ndarray::Array2;

/// Days between the Unix epoch and `date`, the value stored in recency
/// bands.
pub fn days_since_epoch(date: NaiveDate) -> u16 {
	let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
	date.signed_duration_since(epoch).num_days().max(0) as u16
}

/// Result of reducing one band's time stack.
#[derive(Debug, Clone, PartialEq)]
pub struct ReducedBand {
	pub values: Array2<u16>,
	/// Days-since-epoch of the slice that supplied each pixel, when
	/// requested.
	pub recency: Option<Array2<u16>>,
}

/// Reduces time slices (oldest first, nodata 0) into a most-recent-clear
/// composite: the newest slice seeds the output and older slices only fill
/// pixels that are still nodata. The recency band starts at the newest
/// slice's date and follows every fill attempt, so unfilled pixels end up
/// carrying the oldest date.
pub fn reduce_time_stack(slices: &[(NaiveDate, Array2<u16>)], with_recency: bool) -> Result<ReducedBand> {
	let (latest_date, latest) = slices
		.last()
		.ok_or_else(|| CfsiError::RasterIoFailed("cannot reduce an empty time stack".to_string()))?;

	let mut values = latest.clone();
	let mut recency = with_recency.then(|| Array2::from_elem(latest.dim(), days_since_epoch(*latest_date)));

	for (date, slice) in slices.iter().rev().skip(1) {
		if slice.dim() != values.dim() {
			return Err(CfsiError::RasterIoFailed(format!(
				"slice of {date} has shape {:?}, expected {:?}",
				slice.dim(),
				values.dim()
			)));
		}
		let nodata_pixels = values.iter().filter(|value| **value == 0).count();
		log::debug!("filling {nodata_pixels} nodata pixels from {date}");
		if nodata_pixels == 0 {
			break;
		}

		// recency marks the fill attempt before the fill itself, so pixels
		// this slice cannot fill either end up with an older slice's date
		let slice_days = days_since_epoch(*date);
		if let Some(recency) = recency.as_mut() {
			ndarray::Zip::from(recency).and(&values).for_each(|recency_value, &value| {
				if value == 0 {
					*recency_value = slice_days;
				}
			});
		}
		ndarray::Zip::from(&mut values).and(slice).for_each(|value, &candidate| {
			if *value == 0 {
				*value = candidate;
			}
		});
	}

	Ok(ReducedBand { values, recency })
}
