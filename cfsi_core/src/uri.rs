//! Canonical dataset URIs and the S2 bucket layout.
//!
//! Dataset URIs follow the archive hierarchy
//! `s3://<bucket>/tiles/<zone>/<band>/<square>/<year>/<month>/<day>/<takeIndex>`.
//! The region code is the concatenation of the three MGRS path segments and
//! the s3 key is the URI path without the bucket.

use crate::{CfsiError, Result};

/// Bucket holding top-of-atmosphere (L1C) granules.
pub const L1C_BUCKET: &str = "sentinel-s2-l1c";
/// Bucket holding surface-reflectance (L2A) granules.
pub const L2A_BUCKET: &str = "sentinel-s2-l2a";

/// Content-derived dataset id: hex-encoded MD5 of the canonical URI.
pub fn dataset_id_from_uri(uri: &str) -> String {
	format!("{:x}", md5::compute(uri.as_bytes()))
}

/// Canonical dataset URI for an object key: the bucket plus the key's
/// parent, so all objects of one granule share a URI.
pub fn canonical_dataset_uri(bucket: &str, key: &str) -> String {
	let parent = match key.rfind('/') {
		Some(position) => &key[..position],
		None => key,
	};
	format!("s3://{bucket}/{parent}")
}

/// Splits `s3://bucket/key` into bucket and key.
pub fn parse_s3_uri(uri: &str) -> Result<(&str, &str)> {
	let rest = uri
		.strip_prefix("s3://")
		.ok_or_else(|| CfsiError::InvalidUri(uri.to_string()))?;
	let (bucket, key) = rest
		.split_once('/')
		.ok_or_else(|| CfsiError::InvalidUri(uri.to_string()))?;
	if bucket.is_empty() || key.is_empty() {
		return Err(CfsiError::InvalidUri(uri.to_string()));
	}
	Ok((bucket, key))
}

/// Swaps the L1C and L2A bucket names in a dataset URI, mapping a granule to
/// its sibling at the other processing level.
pub fn swap_bucket_names(uri: &str) -> Result<String> {
	if uri.contains(L1C_BUCKET) {
		Ok(uri.replace(L1C_BUCKET, L2A_BUCKET))
	} else if uri.contains(L2A_BUCKET) {
		Ok(uri.replace(L2A_BUCKET, L1C_BUCKET))
	} else {
		Err(CfsiError::InvalidUri(format!("uri '{uri}' names neither S2 bucket")))
	}
}

/// Region code of a dataset URI: `<zone><band><square>`, e.g. `35PPM`.
pub fn region_code_from_uri(uri: &str) -> Result<String> {
	let (_, key) = parse_s3_uri(uri)?;
	let segments: Vec<&str> = key.split('/').collect();
	if segments.len() < 4 || segments[0] != "tiles" {
		return Err(CfsiError::InvalidUri(format!("uri '{uri}' is not a tile uri")));
	}
	Ok(format!("{}{}{}", segments[1], segments[2], segments[3]))
}

/// Object key of a dataset URI, without the bucket.
pub fn s3_key_from_uri(uri: &str) -> Result<String> {
	let (_, key) = parse_s3_uri(uri)?;
	Ok(key.to_string())
}
