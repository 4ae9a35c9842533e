use crate::Runtime;
use cfsi_core::Result;
use cfsi_mosaic::{MosaicCreator, MosaicOutput};

/// Builds one mosaic per configured `(product, date)` pair. Per-mosaic
/// failures (an empty window among them) are absorbed and summarized.
pub async fn run_mosaic(runtime: &Runtime) -> Result<Vec<MosaicOutput>> {
	let mosaic_config = &runtime.config.mosaic;
	let mut outputs = Vec::new();
	let mut failed = 0;

	for product in &mosaic_config.products {
		for date_token in &mosaic_config.dates {
			if runtime.is_cancelled() {
				log::info!("mosaic creation cancelled");
				return Ok(outputs);
			}
			let creator = MosaicCreator::new(
				runtime.catalog.clone(),
				runtime.raster.clone(),
				runtime.planner.clone(),
				mosaic_config.clone(),
				*product,
				date_token,
			)?;
			match creator.create().await {
				Ok(output) => outputs.push(output),
				Err(err) => {
					log::error!("mosaic for {product} at {date_token} failed: {err}");
					failed += 1;
				}
			}
		}
	}

	log::info!("mosaic run finished: {} written, {failed} failed", outputs.len());
	Ok(outputs)
}
