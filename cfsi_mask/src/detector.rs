//! The injected cloud-detector seam.
//!
//! # Overview
//!
//! The pipeline treats cloud detection as an opaque pure function over the
//! 13-band stack: `bands[H, W, 13] -> mask[H, W]` under a probability
//! threshold. [`CommandCloudDetector`] bridges to an external executable the
//! way the original deployment invoked its classifier, and
//! [`FnCloudDetector`] wraps a closure for tests. Whatever the source, the
//! returned mask is validated for shape before it is trusted.
//!
//! ## Hand-over format
//!
//! The band stack is written to a temp file as little-endian `f64` prefixed
//! by three little-endian `u64` values (rows, cols, bands). The command is
//! invoked as `<command> <input> <output> <threshold>` and must write
//! `rows * cols` bytes of 0/1 mask to the output path.

use cfsi_core::{CfsiError, Result};
use byteorder::{LE, WriteBytesExt};
use ndarray::{Array2, Array3};
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

/// Shared handle to a cloud detector.
pub type CloudDetector = Arc<dyn CloudDetectorTrait>;

pub trait CloudDetectorTrait: Send + Sync {
	/// Binary cloud mask (1 = cloud, 0 = clear) for a `[H, W, 13]` stack of
	/// normalized reflectances.
	fn detect(&self, bands: &Array3<f64>, threshold: f64) -> Result<Array2<u8>>;
}

/// Checks that a detector output matches the input stack.
pub fn validate_mask(bands: &Array3<f64>, mask: &Array2<u8>) -> Result<()> {
	let (nrows, ncols, _) = bands.dim();
	if mask.dim() != (nrows, ncols) {
		return Err(CfsiError::CloudDetectorFailed(format!(
			"detector returned shape {:?}, expected ({nrows}, {ncols})",
			mask.dim()
		)));
	}
	Ok(())
}

/// Closure-backed detector for tests and dry runs.
pub struct FnCloudDetector {
	function: Box<dyn Fn(&Array3<f64>, f64) -> Array2<u8> + Send + Sync>,
}

impl FnCloudDetector {
	pub fn new(function: impl Fn(&Array3<f64>, f64) -> Array2<u8> + Send + Sync + 'static) -> FnCloudDetector {
		FnCloudDetector {
			function: Box::new(function),
		}
	}

	/// Detector that marks pixels whose first band exceeds the threshold.
	/// Only useful for exercising the pipeline.
	pub fn band_threshold() -> FnCloudDetector {
		FnCloudDetector::new(|bands, threshold| {
			let (nrows, ncols, _) = bands.dim();
			Array2::from_shape_fn((nrows, ncols), |(row, col)| u8::from(bands[[row, col, 0]] > threshold))
		})
	}
}

impl CloudDetectorTrait for FnCloudDetector {
	fn detect(&self, bands: &Array3<f64>, threshold: f64) -> Result<Array2<u8>> {
		let mask = (self.function)(bands, threshold);
		validate_mask(bands, &mask)?;
		Ok(mask)
	}
}

/// Detector implemented by an external command.
pub struct CommandCloudDetector {
	command: PathBuf,
}

impl CommandCloudDetector {
	pub fn new(command: impl Into<PathBuf>) -> CommandCloudDetector {
		CommandCloudDetector { command: command.into() }
	}

	fn encode_stack(bands: &Array3<f64>) -> Vec<u8> {
		let (nrows, ncols, nbands) = bands.dim();
		let mut buffer = Vec::with_capacity(24 + bands.len() * 8);
		buffer.write_u64::<LE>(nrows as u64).unwrap();
		buffer.write_u64::<LE>(ncols as u64).unwrap();
		buffer.write_u64::<LE>(nbands as u64).unwrap();
		for value in bands {
			buffer.write_f64::<LE>(*value).unwrap();
		}
		buffer
	}
}

impl CloudDetectorTrait for CommandCloudDetector {
	fn detect(&self, bands: &Array3<f64>, threshold: f64) -> Result<Array2<u8>> {
		let failed = |message: String| CfsiError::CloudDetectorFailed(message);

		let directory = tempdir().map_err(|err| failed(format!("cannot create temp dir: {err}")))?;
		let input = directory.join("bands.le64");
		let output = directory.join("mask.u8");
		std::fs::write(&input, Self::encode_stack(bands)).map_err(|err| failed(err.to_string()))?;

		let status = Command::new(&self.command)
			.arg(&input)
			.arg(&output)
			.arg(threshold.to_string())
			.status()
			.map_err(|err| failed(format!("cannot run {}: {err}", self.command.display())))?;
		if !status.success() {
			return Err(failed(format!("{} exited with {status}", self.command.display())));
		}

		let bytes = std::fs::read(&output).map_err(|err| failed(format!("no detector output: {err}")))?;
		let (nrows, ncols, _) = bands.dim();
		let mask = Array2::from_shape_vec((nrows, ncols), bytes)
			.map_err(|err| failed(format!("detector output has wrong size: {err}")))?;
		let _ = std::fs::remove_dir_all(&directory);
		validate_mask(bands, &mask)?;
		Ok(mask)
	}
}

/// Fresh private temp directory below the system temp dir.
fn tempdir() -> std::io::Result<PathBuf> {
	use std::sync::atomic::{AtomicU64, Ordering};
	static COUNTER: AtomicU64 = AtomicU64::new(0);
	let directory = std::env::temp_dir().join(format!(
		"cfsi-detector-{}-{}",
		std::process::id(),
		COUNTER.fetch_add(1, Ordering::Relaxed)
	));
	std::fs::create_dir_all(&directory)?;
	Ok(directory)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fn_detector_validates_shape() {
		let bands = Array3::zeros((4, 5, 13));
		let good = FnCloudDetector::band_threshold();
		assert_eq!(good.detect(&bands, 0.3).unwrap().dim(), (4, 5));

		let bad = FnCloudDetector::new(|_, _| Array2::zeros((2, 2)));
		assert!(matches!(
			bad.detect(&bands, 0.3),
			Err(CfsiError::CloudDetectorFailed(_))
		));
	}

	#[test]
	fn band_threshold_marks_bright_pixels() {
		let mut bands = Array3::zeros((2, 2, 13));
		bands[[0, 1, 0]] = 0.9;
		let mask = FnCloudDetector::band_threshold().detect(&bands, 0.3).unwrap();
		assert_eq!(mask[[0, 1]], 1);
		assert_eq!(mask[[0, 0]], 0);
	}

	#[test]
	fn stack_encoding_has_header_and_samples() {
		let bands = Array3::from_elem((2, 3, 13), 0.5);
		let encoded = CommandCloudDetector::encode_stack(&bands);
		assert_eq!(encoded.len(), 24 + 2 * 3 * 13 * 8);
		assert_eq!(&encoded[0..8], &2u64.to_le_bytes());
		assert_eq!(&encoded[8..16], &3u64.to_le_bytes());
		assert_eq!(&encoded[16..24], &13u64.to_le_bytes());
	}

	#[test]
	fn missing_command_is_a_detector_failure() {
		let detector = CommandCloudDetector::new("/no/such/binary");
		let bands = Array3::zeros((2, 2, 13));
		assert!(matches!(
			detector.detect(&bands, 0.3),
			Err(CfsiError::CloudDetectorFailed(_))
		));
	}
}
