//! Pluggable dataset catalog.
//!
//! # Overview
//!
//! The catalog owns [`DatasetDoc`] identity. `add` refuses to replace an
//! existing id with different content ([`CfsiError::DocumentMismatch`]);
//! callers that want last-writer-wins semantics go through [`upsert`], which
//! falls back to `update`. Search results are ordered by `(datetime, id)` so
//! ties in the mosaic reduction break deterministically.
//!
//! Two implementations ship with the crate: [`MemoryCatalog`] for tests and
//! [`SqliteCatalog`] backed by a pooled SQLite database.

mod memory;
mod sqlite;

pub use memory::MemoryCatalog;
pub use sqlite::SqliteCatalog;

use crate::{CfsiError, DatasetDoc, ProductName, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Shared handle to a catalog implementation.
pub type Catalog = Arc<dyn CatalogTrait>;

#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
	pub product: Option<ProductName>,
	pub uri: Option<String>,
	/// Inclusive `datetime` range.
	pub time: Option<(DateTime<Utc>, DateTime<Utc>)>,
	pub limit: Option<usize>,
}

impl SearchQuery {
	pub fn product(product: ProductName) -> SearchQuery {
		SearchQuery {
			product: Some(product),
			..SearchQuery::default()
		}
	}

	pub fn with_uri(mut self, uri: &str) -> SearchQuery {
		self.uri = Some(uri.to_string());
		self
	}

	pub fn with_time(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> SearchQuery {
		self.time = Some((start, end));
		self
	}

	pub fn with_limit(mut self, limit: usize) -> SearchQuery {
		self.limit = Some(limit);
		self
	}

	/// Whether `doc` satisfies every set filter.
	pub fn matches(&self, doc: &DatasetDoc) -> bool {
		if let Some(product) = self.product {
			if doc.product_name() != product {
				return false;
			}
		}
		if let Some(uri) = &self.uri {
			if &doc.uri != uri {
				return false;
			}
		}
		if let Some((start, end)) = self.time {
			let datetime = doc.datetime();
			if datetime < start || datetime > end {
				return false;
			}
		}
		true
	}
}

#[async_trait]
pub trait CatalogTrait: Send + Sync {
	async fn get(&self, id: &str) -> Result<Option<DatasetDoc>>;

	async fn exists(&self, id: &str) -> Result<bool> {
		Ok(self.get(id).await?.is_some())
	}

	/// Matching documents ordered by `(datetime, id)`.
	async fn search(&self, query: &SearchQuery) -> Result<Vec<DatasetDoc>>;

	/// Inserts a new document. Adding an identical document again is a
	/// no-op; the same id with different content is a `DocumentMismatch`.
	async fn add(&self, doc: &DatasetDoc) -> Result<()>;

	/// Replaces an existing document (any field may change).
	async fn update(&self, doc: &DatasetDoc) -> Result<()>;
}

/// `add`, falling back to `update` on a document mismatch.
pub async fn upsert(catalog: &dyn CatalogTrait, doc: &DatasetDoc) -> Result<()> {
	match catalog.add(doc).await {
		Err(CfsiError::DocumentMismatch(id)) => {
			log::debug!("document mismatch for {id}, updating");
			catalog.update(doc).await
		}
		other => other,
	}
}

/// Finds the single dataset with the given product and URI, the way mask
/// documents are paired with their L2A sibling.
pub async fn find_by_uri(catalog: &dyn CatalogTrait, product: ProductName, uri: &str) -> Result<DatasetDoc> {
	let query = SearchQuery::product(product).with_uri(uri).with_limit(1);
	catalog
		.search(&query)
		.await?
		.into_iter()
		.next()
		.ok_or_else(|| CfsiError::CatalogNotFound(format!("no {product} dataset at {uri}")))
}

/// Orders and truncates raw search hits; shared by implementations.
fn finish_search(mut docs: Vec<DatasetDoc>, limit: Option<usize>) -> Vec<DatasetDoc> {
	docs.sort_by(|a, b| (a.datetime(), &a.id).cmp(&(b.datetime(), &b.id)));
	if let Some(limit) = limit {
		docs.truncate(limit);
	}
	docs
}
