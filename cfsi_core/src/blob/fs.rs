//! Directory-tree blob store.
//!
//! Buckets are top-level directories under a common root and keys are
//! relative paths below them. Used for tests and for workflows that stage a
//! subset of the archive locally.

use super::{BlobStoreTrait, GetOptions, ObjectEntry};
use crate::{CfsiError, Result};
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct FsBlobStore {
	root: PathBuf,
}

impl FsBlobStore {
	pub fn new(root: impl Into<PathBuf>) -> FsBlobStore {
		FsBlobStore { root: root.into() }
	}

	fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
		self.root.join(bucket).join(key)
	}
}

fn collect(directory: &Path, bucket_root: &Path, entries: &mut Vec<ObjectEntry>) -> Result<()> {
	if !directory.exists() {
		return Ok(());
	}
	for entry in fs::read_dir(directory)? {
		let entry = entry?;
		let path = entry.path();
		if path.is_dir() {
			collect(&path, bucket_root, entries)?;
		} else {
			let key = path
				.strip_prefix(bucket_root)
				.map_err(|err| CfsiError::InvalidUri(err.to_string()))?
				.to_string_lossy()
				.replace('\\', "/");
			entries.push(ObjectEntry {
				key,
				size: entry.metadata()?.len(),
			});
		}
	}
	Ok(())
}

#[async_trait]
impl BlobStoreTrait for FsBlobStore {
	async fn list(&self, bucket: &str, prefix: &str, _requester_pays: bool) -> Result<Vec<ObjectEntry>> {
		let bucket_root = self.root.join(bucket);
		let mut entries = Vec::new();
		collect(&bucket_root, &bucket_root, &mut entries)?;
		entries.retain(|entry| entry.key.starts_with(prefix));
		entries.sort_by(|a, b| a.key.cmp(&b.key));
		Ok(entries)
	}

	async fn get(&self, bucket: &str, key: &str, _options: &GetOptions) -> Result<Vec<u8>> {
		let path = self.object_path(bucket, key);
		fs::read(&path).map_err(|err| {
			if err.kind() == std::io::ErrorKind::NotFound {
				CfsiError::BlobNotFound {
					bucket: bucket.to_string(),
					key: key.to_string(),
				}
			} else {
				CfsiError::Io(err)
			}
		})
	}

	async fn put(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<()> {
		let path = self.object_path(bucket, key);
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)?;
		}
		// temp + rename so readers never observe a partial object
		let temporary = path.with_extension("part");
		fs::write(&temporary, bytes)?;
		fs::rename(&temporary, &path)?;
		Ok(())
	}
}
