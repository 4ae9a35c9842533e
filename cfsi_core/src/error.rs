//! Typed error kinds shared across the pipeline.
//!
//! Each variant carries its own propagation policy: transient object-store
//! failures are retried with backoff, per-tile failures are absorbed and
//! counted by the drivers, `ConfigInvalid` is fatal at startup and
//! `DocumentMismatch` is handled locally by falling back to an update.

use chrono::NaiveDate;
use thiserror::Error;

/// Result alias used throughout the CFSI crates.
pub type Result<T> = std::result::Result<T, CfsiError>;

#[derive(Debug, Error)]
pub enum CfsiError {
	/// A `metadata.xml` document is missing a required element or holds a
	/// non-numeric value. The affected tile is skipped.
	#[error("malformed metadata: {0}")]
	MalformedMetadata(String),

	/// The requested object does not exist in the store.
	#[error("object not found: s3://{bucket}/{key}")]
	BlobNotFound { bucket: String, key: String },

	/// A retryable object-store failure (timeouts, 5xx, connection resets).
	#[error("transient object store failure: {0}")]
	BlobTransient(String),

	/// A dataset lookup came back empty where a document was required.
	#[error("dataset not found in catalog: {0}")]
	CatalogNotFound(String),

	/// `add` was called for an id that already exists with different
	/// content. Callers retry with `update`.
	#[error("document mismatch for dataset id {0}")]
	DocumentMismatch(String),

	/// The catalog backend itself failed (connection, SQL, serialization).
	#[error("catalog failure: {0}")]
	CatalogFailed(String),

	/// The injected cloud detector returned an error or a malformed mask.
	#[error("cloud detector failed: {0}")]
	CloudDetectorFailed(String),

	/// Raster decode, reprojection or write failure.
	#[error("raster i/o failed: {0}")]
	RasterIoFailed(String),

	/// Configuration is missing, unreadable or violates a constraint.
	/// Fatal at startup.
	#[error("invalid configuration: {0}")]
	ConfigInvalid(String),

	/// The mosaic window matched no mask datasets.
	#[error("no {product} masks found between {start} and {end}")]
	NoMasks {
		product: String,
		start: NaiveDate,
		end: NaiveDate,
	},

	/// A dataset URI does not follow the expected S2 bucket layout.
	#[error("invalid dataset uri: {0}")]
	InvalidUri(String),

	/// The operation is not offered by this collaborator implementation.
	#[error("unsupported operation: {0}")]
	Unsupported(String),

	/// Cooperative shutdown; never logged as an error.
	#[error("operation cancelled")]
	Cancelled,

	#[error(transparent)]
	Io(#[from] std::io::Error),
}

impl CfsiError {
	/// Whether a bounded retry may succeed.
	pub fn is_transient(&self) -> bool {
		matches!(self, CfsiError::BlobTransient(_))
	}
}
