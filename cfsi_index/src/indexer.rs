//! Archive crawler.
//!
//! # Overview
//!
//! A single lister walks the configured prefixes and feeds `metadata.xml`
//! keys into a bounded queue; a pool of workers drains it, parses manifests
//! and upserts granule documents. Termination is by channel close, a stalled
//! queue turns into graceful shutdown via a poll timeout, and a cancellation
//! watch is checked between tiles. Per-tile failures are absorbed and
//! counted; only cancellation stops the run early.

use crate::{build_measurements, parse_tile_metadata, product_for_bucket};
use cfsi_core::{
	BlobStore, BlobStoreTrait as _, Catalog, CatalogTrait as _, CfsiError, DatasetDoc, DocProperties, GetOptions,
	Result, canonical_dataset_uri, config::S2IndexConfig, dataset_id_from_uri, region_code_from_uri, s3_key_from_uri,
	upsert, with_retry,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

/// Idle poll timeout after which a worker treats the queue as stalled.
pub const QUEUE_POLL_TIMEOUT: Duration = Duration::from_secs(60);

const RETRY_ATTEMPTS: usize = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
const QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlSummary {
	/// `metadata.xml` keys seen by the lister.
	pub listed: usize,
	/// Documents newly added or updated.
	pub indexed: usize,
	/// Keys whose id already existed.
	pub skipped: usize,
	/// Keys dropped after absorbing a per-tile error.
	pub failed: usize,
}

impl CrawlSummary {
	fn absorb(&mut self, other: CrawlSummary) {
		self.listed += other.listed;
		self.indexed += other.indexed;
		self.skipped += other.skipped;
		self.failed += other.failed;
	}
}

/// Outcome of indexing one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
	Indexed,
	AlreadyIndexed,
}

pub struct S2Indexer {
	blob: BlobStore,
	catalog: Catalog,
	config: S2IndexConfig,
}

impl S2Indexer {
	pub fn new(blob: BlobStore, catalog: Catalog, config: S2IndexConfig) -> S2Indexer {
		S2Indexer { blob, catalog, config }
	}

	/// Listing prefixes for every `(grid, year, month)` triple:
	/// `tiles/<zone>/<band>/<square>/<year>/<month>`.
	pub fn generate_prefixes(&self) -> Vec<String> {
		let mut prefixes = Vec::new();
		for grid in &self.config.grids {
			let zone = &grid[0..2];
			let band = &grid[2..3];
			let square = &grid[3..];
			for year in &self.config.years {
				for month in &self.config.months {
					prefixes.push(format!("tiles/{zone}/{band}/{square}/{year}/{month}"));
				}
			}
		}
		prefixes
	}

	fn worker_count(&self) -> usize {
		match self.config.workers {
			0 => num_cpus::get().min(8),
			configured => configured,
		}
	}

	/// Crawls every configured bucket. Returns the merged summary.
	pub async fn run(&self, cancel: &watch::Receiver<bool>) -> Result<CrawlSummary> {
		let mut summary = CrawlSummary::default();
		for bucket in self.config.s3_buckets.clone() {
			summary.absorb(self.index_bucket(&bucket, cancel).await?);
		}
		log::info!(
			"index run finished: {} listed, {} indexed, {} skipped, {} failed",
			summary.listed,
			summary.indexed,
			summary.skipped,
			summary.failed
		);
		Ok(summary)
	}

	async fn index_bucket(&self, bucket: &str, cancel: &watch::Receiver<bool>) -> Result<CrawlSummary> {
		let (sender, receiver) = mpsc::channel::<String>(QUEUE_CAPACITY);
		let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
		let totals = Arc::new(Mutex::new(CrawlSummary::default()));

		let mut workers = Vec::new();
		for _ in 0..self.worker_count() {
			let receiver = receiver.clone();
			let totals = totals.clone();
			let cancel = cancel.clone();
			let bucket = bucket.to_string();
			let indexer = self.clone_handles();
			workers.push(tokio::spawn(async move {
				let mut local = CrawlSummary::default();
				loop {
					if *cancel.borrow() {
						break;
					}
					let key = {
						let mut receiver = receiver.lock().await;
						match timeout(QUEUE_POLL_TIMEOUT, receiver.recv()).await {
							// closed channel or stalled queue both end the worker
							Ok(Some(key)) => key,
							Ok(None) => break,
							Err(_) => {
								log::warn!("queue idle for {QUEUE_POLL_TIMEOUT:?}, worker shutting down");
								break;
							}
						}
					};
					match indexer.index_key(&bucket, &key).await {
						Ok(IndexOutcome::Indexed) => local.indexed += 1,
						Ok(IndexOutcome::AlreadyIndexed) => local.skipped += 1,
						Err(CfsiError::Cancelled) => break,
						Err(err) => {
							log::warn!("skipping {bucket}/{key}: {err}");
							local.failed += 1;
						}
					}
				}
				totals.lock().unwrap().absorb(local);
			}));
		}

		// single lister feeds the queue; dropping the sender closes it
		let mut listed = 0;
		'listing: for prefix in self.generate_prefixes() {
			if *cancel.borrow() {
				break;
			}
			let entries = self.blob.list(bucket, &prefix, true).await?;
			for entry in entries {
				if !entry.key.ends_with("metadata.xml") {
					continue;
				}
				listed += 1;
				if sender.send(entry.key).await.is_err() {
					break 'listing;
				}
			}
		}
		drop(sender);

		for worker in workers {
			worker
				.await
				.map_err(|err| CfsiError::CatalogFailed(format!("index worker panicked: {err}")))?;
		}

		let mut summary = *totals.lock().unwrap();
		summary.listed = listed;
		log::info!(
			"finished indexing {listed} {bucket} tiles ({} new, {} known, {} failed)",
			summary.indexed,
			summary.skipped,
			summary.failed
		);
		Ok(summary)
	}

	fn clone_handles(&self) -> S2Indexer {
		S2Indexer {
			blob: self.blob.clone(),
			catalog: self.catalog.clone(),
			config: self.config.clone(),
		}
	}

	/// Indexes one `metadata.xml` key: short-circuits on a known id, fetches
	/// and parses the manifest, then upserts the granule document.
	pub async fn index_key(&self, bucket: &str, key: &str) -> Result<IndexOutcome> {
		let uri = canonical_dataset_uri(bucket, key);
		let id = dataset_id_from_uri(&uri);
		if self.catalog.exists(&id).await? {
			log::debug!("{uri} already indexed");
			return Ok(IndexOutcome::AlreadyIndexed);
		}

		let options = GetOptions {
			requester_pays: true,
			no_cache: true,
		};
		let bytes = with_retry(RETRY_ATTEMPTS, RETRY_BASE_DELAY, || {
			self.blob.get(bucket, key, &options)
		})
		.await?;

		let meta = parse_tile_metadata(&bytes)?;
		let doc = self.build_granule_doc(bucket, &uri, &meta)?;
		log::info!("indexing {uri}");
		upsert(self.catalog.as_ref(), &doc).await?;
		Ok(IndexOutcome::Indexed)
	}

	fn build_granule_doc(&self, bucket: &str, uri: &str, meta: &crate::TileMeta) -> Result<DatasetDoc> {
		let mut properties = DocProperties::new(meta.tile_id.clone(), meta.sensing_time, "JPEG2000");
		properties.region_code = Some(region_code_from_uri(uri)?);
		properties.mean_sun_zenith = Some(meta.sun_zenith);
		properties.mean_sun_azimuth = Some(meta.sun_azimuth);
		properties.cloudy_pixel_percentage = Some(meta.cloudy_pixel_percentage);
		properties.s3_key = Some(s3_key_from_uri(uri)?);

		Ok(DatasetDoc::new(
			product_for_bucket(bucket)?,
			uri.to_string(),
			meta.crs_code.clone(),
			meta.doc_grids(),
			build_measurements(bucket, uri, self.config.exclude_l2a_b10)?,
			properties,
		))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::metadata::tests::sample_metadata_xml;
	use cfsi_core::{
		BlobStoreTrait as _, CatalogTrait as _, FsBlobStore, L1C_BUCKET, L2A_BUCKET, MemoryCatalog, ProductName,
		SearchQuery,
	};
	use std::sync::Arc;

	fn config() -> S2IndexConfig {
		S2IndexConfig {
			grids: vec!["35PPM".to_string()],
			years: vec![2020],
			months: vec![9, 10],
			workers: 2,
			..S2IndexConfig::default()
		}
	}

	async fn seeded_store(temp: &assert_fs::TempDir) -> Arc<FsBlobStore> {
		let store = Arc::new(FsBlobStore::new(temp.path()));
		for bucket in [L1C_BUCKET, L2A_BUCKET] {
			for day in [2, 7] {
				store
					.put(
						bucket,
						&format!("tiles/35/P/PM/2020/10/{day}/0/metadata.xml"),
						sample_metadata_xml().as_bytes(),
					)
					.await
					.unwrap();
				store
					.put(bucket, &format!("tiles/35/P/PM/2020/10/{day}/0/B02.jp2"), b"not-a-band")
					.await
					.unwrap();
			}
		}
		store
	}

	#[test]
	fn prefixes_follow_the_tile_hierarchy() {
		let indexer = S2Indexer::new(
			Arc::new(FsBlobStore::new("/nonexistent")),
			Arc::new(MemoryCatalog::new()),
			config(),
		);
		assert_eq!(
			indexer.generate_prefixes(),
			vec!["tiles/35/P/PM/2020/9", "tiles/35/P/PM/2020/10"]
		);
	}

	#[tokio::test]
	async fn crawl_indexes_both_buckets() -> Result<()> {
		let temp = assert_fs::TempDir::new().unwrap();
		let store = seeded_store(&temp).await;
		let catalog = Arc::new(MemoryCatalog::new());
		let indexer = S2Indexer::new(store, catalog.clone(), config());

		let (_cancel_tx, cancel_rx) = watch::channel(false);
		let summary = indexer.run(&cancel_rx).await?;
		assert_eq!(summary.listed, 4);
		assert_eq!(summary.indexed, 4);
		assert_eq!(summary.failed, 0);

		let l1c = catalog
			.search(&SearchQuery::product(ProductName::S2Level1cGranule))
			.await?;
		assert_eq!(l1c.len(), 2);
		let doc = &l1c[0];
		doc.validate()?;
		assert_eq!(doc.properties.region_code.as_deref(), Some("35PPM"));
		assert_eq!(doc.measurements.len(), 13);

		let l2a = catalog
			.search(&SearchQuery::product(ProductName::S2Sen2corGranule))
			.await?;
		assert_eq!(l2a.len(), 2);
		assert_eq!(l2a[0].measurements.len(), 27);
		Ok(())
	}

	#[tokio::test]
	async fn second_crawl_is_a_no_op() -> Result<()> {
		let temp = assert_fs::TempDir::new().unwrap();
		let store = seeded_store(&temp).await;
		let catalog = Arc::new(MemoryCatalog::new());
		let indexer = S2Indexer::new(store, catalog.clone(), config());
		let (_cancel_tx, cancel_rx) = watch::channel(false);

		let first = indexer.run(&cancel_rx).await?;
		assert_eq!(first.indexed, 4);

		let second = indexer.run(&cancel_rx).await?;
		assert_eq!(second.indexed, 0);
		assert_eq!(second.skipped, 4);
		assert_eq!(catalog.len(), 4);
		Ok(())
	}

	#[tokio::test]
	async fn malformed_manifest_is_absorbed() -> Result<()> {
		let temp = assert_fs::TempDir::new().unwrap();
		let store = Arc::new(FsBlobStore::new(temp.path()));
		store
			.put(L1C_BUCKET, "tiles/35/P/PM/2020/10/2/0/metadata.xml", b"<broken")
			.await?;
		store
			.put(
				L1C_BUCKET,
				"tiles/35/P/PM/2020/10/7/0/metadata.xml",
				sample_metadata_xml().as_bytes(),
			)
			.await?;

		let catalog = Arc::new(MemoryCatalog::new());
		let mut cfg = config();
		cfg.s3_buckets = vec![L1C_BUCKET.to_string()];
		let indexer = S2Indexer::new(store, catalog.clone(), cfg);
		let (_cancel_tx, cancel_rx) = watch::channel(false);

		let summary = indexer.run(&cancel_rx).await?;
		assert_eq!(summary.indexed, 1);
		assert_eq!(summary.failed, 1);
		assert_eq!(catalog.len(), 1);
		Ok(())
	}

	#[tokio::test]
	async fn cancellation_stops_the_lister() -> Result<()> {
		let temp = assert_fs::TempDir::new().unwrap();
		let store = seeded_store(&temp).await;
		let catalog = Arc::new(MemoryCatalog::new());
		let indexer = S2Indexer::new(store, catalog.clone(), config());

		let (cancel_tx, cancel_rx) = watch::channel(true);
		let summary = indexer.run(&cancel_rx).await?;
		assert_eq!(summary.indexed, 0);
		assert!(catalog.is_empty());
		drop(cancel_tx);
		Ok(())
	}
}
