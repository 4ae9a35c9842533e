//! Pluggable object-store access.
//!
//! # Overview
//!
//! The pipeline never talks to an SDK directly; it goes through
//! [`BlobStoreTrait`]. Two implementations ship with the crate:
//! [`FsBlobStore`] mirrors the bucket hierarchy on a local directory tree and
//! is what the tests run against, [`HttpBlobStore`] speaks the S3 REST
//! protocol (with requester-pays headers) over plain HTTP(S). Authenticated
//! request signing is the deployment's concern and plugs in behind the same
//! trait.

mod fs;
mod http;

pub use fs::FsBlobStore;
pub use http::{DEFAULT_REGION, HttpBlobStore};

use crate::{CfsiError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Shared handle to a blob store implementation.
pub type BlobStore = Arc<dyn BlobStoreTrait>;

/// One listed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
	pub key: String,
	pub size: u64,
}

/// Per-request options for `get`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetOptions {
	/// Send `x-amz-request-payer: requester`.
	pub requester_pays: bool,
	/// Ask intermediate caches to revalidate.
	pub no_cache: bool,
}

impl GetOptions {
	pub fn requester_pays() -> GetOptions {
		GetOptions {
			requester_pays: true,
			no_cache: false,
		}
	}
}

#[async_trait]
pub trait BlobStoreTrait: Send + Sync {
	/// Lists all objects under `prefix`. Implementations handle pagination
	/// internally; ordering follows the store's native key order.
	async fn list(&self, bucket: &str, prefix: &str, requester_pays: bool) -> Result<Vec<ObjectEntry>>;

	/// Fetches one object completely.
	async fn get(&self, bucket: &str, key: &str, options: &GetOptions) -> Result<Vec<u8>>;

	/// Writes one object. Only supported by stores the pipeline owns;
	/// read-only stores return [`CfsiError::Unsupported`].
	async fn put(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<()>;
}

/// Retries `operation` on transient failures with exponential backoff.
/// Non-transient errors and exhausted attempts propagate unchanged.
pub async fn with_retry<T, F, Fut>(attempts: usize, base_delay: Duration, mut operation: F) -> Result<T>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T>>,
{
	let mut delay = base_delay;
	let mut last_error = CfsiError::BlobTransient("no attempts made".to_string());
	for attempt in 1..=attempts.max(1) {
		match operation().await {
			Ok(value) => return Ok(value),
			Err(err) if err.is_transient() && attempt < attempts => {
				log::warn!("transient failure (attempt {attempt}/{attempts}): {err}, retrying in {delay:?}");
				tokio::time::sleep(delay).await;
				delay *= 2;
				last_error = err;
			}
			Err(err) => return Err(err),
		}
	}
	Err(last_error)
}
