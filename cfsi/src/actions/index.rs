use crate::Runtime;
use cfsi_core::Result;
use cfsi_index::{CrawlSummary, S2Indexer};

/// Crawls the configured prefixes into the catalog.
pub async fn run_index(runtime: &Runtime) -> Result<CrawlSummary> {
	let indexer = S2Indexer::new(
		runtime.blob.clone(),
		runtime.catalog.clone(),
		runtime.config.index.s2_index.clone(),
	);
	indexer.run(&runtime.cancel_receiver()).await
}
