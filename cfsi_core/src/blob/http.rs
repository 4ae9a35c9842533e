//! S3 REST blob store over HTTP(S).
//!
//! Talks directly to the bucket endpoints
//! (`https://<bucket>.s3.<region>.amazonaws.com`) using the V2 list protocol
//! and plain object GETs. Requester-pays is handled transparently via the
//! `x-amz-request-payer` header on both listing and fetching.

use super::{BlobStoreTrait, GetOptions, ObjectEntry};
use crate::{CfsiError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Region the Sentinel-2 archive lives in.
pub const DEFAULT_REGION: &str = "eu-central-1";

const REQUEST_PAYER_HEADER: &str = "x-amz-request-payer";

#[derive(Debug)]
pub struct HttpBlobStore {
	client: Client,
	region: String,
}

impl HttpBlobStore {
	pub fn new(region: &str) -> Result<HttpBlobStore> {
		let client = Client::builder()
			.tcp_keepalive(Duration::from_secs(600))
			.timeout(Duration::from_secs(120))
			.build()
			.map_err(|err| CfsiError::BlobTransient(err.to_string()))?;
		Ok(HttpBlobStore {
			client,
			region: region.to_string(),
		})
	}

	fn endpoint(&self, bucket: &str) -> String {
		format!("https://{bucket}.s3.{}.amazonaws.com", self.region)
	}

	/// One page of the V2 list protocol. Returns the entries plus the
	/// continuation token when the listing is truncated.
	async fn list_page(
		&self,
		bucket: &str,
		prefix: &str,
		continuation: Option<&str>,
		requester_pays: bool,
	) -> Result<(Vec<ObjectEntry>, Option<String>)> {
		let mut request = self
			.client
			.get(self.endpoint(bucket))
			.query(&[("list-type", "2"), ("prefix", prefix)]);
		if let Some(token) = continuation {
			request = request.query(&[("continuation-token", token)]);
		}
		if requester_pays {
			request = request.header(REQUEST_PAYER_HEADER, "requester");
		}

		let response = request
			.send()
			.await
			.map_err(|err| CfsiError::BlobTransient(err.to_string()))?;
		if !response.status().is_success() {
			return Err(CfsiError::BlobTransient(format!(
				"list of s3://{bucket}/{prefix} returned {}",
				response.status()
			)));
		}
		let body = response
			.text()
			.await
			.map_err(|err| CfsiError::BlobTransient(err.to_string()))?;
		parse_list_response(&body)
	}
}

/// Parses a `ListBucketResult` XML body.
fn parse_list_response(body: &str) -> Result<(Vec<ObjectEntry>, Option<String>)> {
	let document =
		roxmltree::Document::parse(body).map_err(|err| CfsiError::BlobTransient(format!("bad list response: {err}")))?;
	let root = document.root_element();

	let mut entries = Vec::new();
	for contents in root.children().filter(|node| node.has_tag_name("Contents")) {
		let key = contents
			.children()
			.find(|node| node.has_tag_name("Key"))
			.and_then(|node| node.text())
			.ok_or_else(|| CfsiError::BlobTransient("list entry without Key".to_string()))?;
		let size = contents
			.children()
			.find(|node| node.has_tag_name("Size"))
			.and_then(|node| node.text())
			.and_then(|text| text.parse().ok())
			.unwrap_or(0);
		entries.push(ObjectEntry {
			key: key.to_string(),
			size,
		});
	}

	let truncated = root
		.children()
		.find(|node| node.has_tag_name("IsTruncated"))
		.and_then(|node| node.text())
		.is_some_and(|text| text == "true");
	let continuation = if truncated {
		root
			.children()
			.find(|node| node.has_tag_name("NextContinuationToken"))
			.and_then(|node| node.text())
			.map(|text| text.to_string())
	} else {
		None
	};

	Ok((entries, continuation))
}

#[async_trait]
impl BlobStoreTrait for HttpBlobStore {
	async fn list(&self, bucket: &str, prefix: &str, requester_pays: bool) -> Result<Vec<ObjectEntry>> {
		let mut entries = Vec::new();
		let mut continuation: Option<String> = None;
		loop {
			let (page, next) = self
				.list_page(bucket, prefix, continuation.as_deref(), requester_pays)
				.await?;
			entries.extend(page);
			match next {
				Some(token) => continuation = Some(token),
				None => break,
			}
		}
		Ok(entries)
	}

	async fn get(&self, bucket: &str, key: &str, options: &GetOptions) -> Result<Vec<u8>> {
		let mut request = self.client.get(format!("{}/{key}", self.endpoint(bucket)));
		if options.requester_pays {
			request = request.header(REQUEST_PAYER_HEADER, "requester");
		}
		if options.no_cache {
			request = request.header("cache-control", "no-cache");
		}

		let response = request
			.send()
			.await
			.map_err(|err| CfsiError::BlobTransient(err.to_string()))?;
		match response.status() {
			StatusCode::NOT_FOUND => Err(CfsiError::BlobNotFound {
				bucket: bucket.to_string(),
				key: key.to_string(),
			}),
			status if status.is_success() => {
				let bytes = response
					.bytes()
					.await
					.map_err(|err| CfsiError::BlobTransient(err.to_string()))?;
				Ok(bytes.to_vec())
			}
			status => Err(CfsiError::BlobTransient(format!(
				"get of s3://{bucket}/{key} returned {status}"
			))),
		}
	}

	async fn put(&self, bucket: &str, key: &str, _bytes: &[u8]) -> Result<()> {
		Err(CfsiError::Unsupported(format!(
			"http blob store is read-only, cannot write s3://{bucket}/{key}"
		)))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parse_list_page_with_continuation() {
		let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
	<Name>sentinel-s2-l1c</Name>
	<Prefix>tiles/35/P/PM/2020/10</Prefix>
	<IsTruncated>true</IsTruncated>
	<NextContinuationToken>token-123</NextContinuationToken>
	<Contents>
		<Key>tiles/35/P/PM/2020/10/2/0/metadata.xml</Key>
		<Size>54321</Size>
	</Contents>
	<Contents>
		<Key>tiles/35/P/PM/2020/10/2/0/B02.jp2</Key>
		<Size>100</Size>
	</Contents>
</ListBucketResult>"#;
		let (entries, continuation) = parse_list_response(body).unwrap();
		assert_eq!(entries.len(), 2);
		assert_eq!(entries[0].key, "tiles/35/P/PM/2020/10/2/0/metadata.xml");
		assert_eq!(entries[0].size, 54321);
		assert_eq!(continuation.as_deref(), Some("token-123"));
	}

	#[test]
	fn parse_final_list_page() {
		let body = r#"<ListBucketResult><IsTruncated>false</IsTruncated></ListBucketResult>"#;
		let (entries, continuation) = parse_list_response(body).unwrap();
		assert!(entries.is_empty());
		assert!(continuation.is_none());
	}

	#[test]
	fn endpoint_includes_region() {
		let store = HttpBlobStore::new(DEFAULT_REGION).unwrap();
		assert_eq!(
			store.endpoint("sentinel-s2-l1c"),
			"https://sentinel-s2-l1c.s3.eu-central-1.amazonaws.com"
		);
	}
}
