use crate::Runtime;
use cfsi_core::{CfsiError, DatasetDoc, Result};
use cfsi_mask::{
	CommandCloudDetector, CommandFmaskRoutine, FmaskBackend, MaskBackend, MaskDriver, S2cloudlessBackend,
};
use std::sync::Arc;

/// Backends enabled by the configuration, with their external model
/// commands wired in. An enabled backend without its command is a
/// configuration error.
pub fn configured_backends(runtime: &Runtime) -> Result<Vec<Box<dyn MaskBackend>>> {
	let masks = &runtime.config.masks;
	let mut backends: Vec<Box<dyn MaskBackend>> = Vec::new();

	if masks.s2cloudless_masks.generate {
		let command = masks.s2cloudless_masks.detector_command.as_ref().ok_or_else(|| {
			CfsiError::ConfigInvalid(
				"masks.s2cloudless_masks.detector_command must be set to generate s2cloudless masks".to_string(),
			)
		})?;
		backends.push(Box::new(S2cloudlessBackend::new(
			runtime.blob.clone(),
			runtime.raster.clone(),
			runtime.planner.clone(),
			Arc::new(CommandCloudDetector::new(command.clone())),
			masks.s2cloudless_masks.clone(),
		)));
	}
	if masks.fmask_masks.generate {
		let command = masks.fmask_masks.command.as_ref().ok_or_else(|| {
			CfsiError::ConfigInvalid("masks.fmask_masks.command must be set to generate fmask masks".to_string())
		})?;
		backends.push(Box::new(FmaskBackend::new(
			runtime.blob.clone(),
			runtime.planner.clone(),
			Arc::new(CommandFmaskRoutine::new(command.clone())),
			masks.fmask_masks.clone(),
		)));
	}
	Ok(backends)
}

/// Runs every given backend through the shared driver.
pub async fn run_mask(runtime: &Runtime, backends: &[Box<dyn MaskBackend>]) -> Result<Vec<DatasetDoc>> {
	let driver = MaskDriver::new(
		runtime.catalog.clone(),
		runtime.planner.clone(),
		runtime.raster.clone(),
		runtime.blob.clone(),
		runtime.config.masks.clone(),
	);
	let cancel = runtime.cancel_receiver();
	let mut indexed = Vec::new();
	for backend in backends {
		indexed.extend(driver.run(backend.as_ref(), &cancel).await?);
	}
	Ok(indexed)
}
