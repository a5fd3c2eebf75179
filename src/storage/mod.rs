// cryoforge search: federated STAC catalog search over partitioned storage
// Copyright 2025 cryoforge Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Catalog roots and existence probes.
//!
//! A [`CatalogRoot`] is where the partitioned catalog lives: an S3 prefix
//! (`s3://bucket/prefix`) or a directory on the local filesystem. Paths under
//! the root carry two renderings: the location string used in query globs and
//! the object key used to probe the store.
//!
//! # Example
//!
//! ```no_run
//! use cryoforge_search::storage::{CatalogRoot, ExistenceProbe, ObjectStoreProbe, StoreOptions};
//!
//! # async fn example() -> cryoforge_search::error::Result<()> {
//! let root = CatalogRoot::parse("s3://its-live-data/test-space/stac/geoparquet/latlon")?;
//! let options = StoreOptions::builder().anonymous(true).region("us-west-2").build();
//! let probe = ObjectStoreProbe::for_root(&root, &options)?;
//!
//! let path = root.child(&["sentinel2", "N60W040"]);
//! println!("{} exists: {}", path.location, probe.exists(&path).await?);
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::path::Path;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use typed_builder::TypedBuilder;
use url::Url;

/// Where catalog objects are stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    S3 { bucket: String },
    Local { dir: PathBuf },
}

/// Root location of a partitioned catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRoot {
    location: String,
    backend: Backend,
    prefix: Path,
}

impl CatalogRoot {
    /// Parses `s3://bucket/prefix`, `file:///abs/dir`, or a bare filesystem
    /// path. Any other URL scheme is rejected.
    pub fn parse(root: &str) -> Result<Self> {
        let root = root.trim();
        if root.is_empty() {
            return Err(Error::UnsupportedStorageScheme(String::new()));
        }

        let Some((scheme, _)) = root.split_once("://") else {
            return Ok(Self::local(PathBuf::from(root)));
        };

        match scheme.to_ascii_lowercase().as_str() {
            "s3" | "s3a" => {
                let url = Url::parse(root)?;
                let bucket = url
                    .host_str()
                    .filter(|h| !h.is_empty())
                    .ok_or(Error::InvalidUrl(url::ParseError::EmptyHost))?
                    .to_string();
                let key = url.path().trim_matches('/');
                let location = if key.is_empty() {
                    format!("s3://{bucket}")
                } else {
                    format!("s3://{bucket}/{key}")
                };
                Ok(CatalogRoot {
                    location,
                    prefix: Path::from(key),
                    backend: Backend::S3 { bucket },
                })
            }
            "file" => {
                let url = Url::parse(root)?;
                let dir = url
                    .to_file_path()
                    .map_err(|_| Error::UnsupportedStorageScheme(root.to_string()))?;
                Ok(Self::local(dir))
            }
            other => Err(Error::UnsupportedStorageScheme(other.to_string())),
        }
    }

    fn local(dir: PathBuf) -> Self {
        let text = dir.to_string_lossy();
        let trimmed = text.trim_end_matches('/');
        let location = if trimmed.is_empty() {
            "/".to_string()
        } else {
            trimmed.to_string()
        };
        CatalogRoot {
            location,
            backend: Backend::Local { dir },
            // Local stores are opened at the root directory itself.
            prefix: Path::default(),
        }
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// The root as it appears in query globs.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Path of `segments` joined below the root.
    pub fn child(&self, segments: &[&str]) -> CatalogPath {
        let mut location = self.location.clone();
        let mut key = self.prefix.clone();
        for segment in segments {
            if !location.ends_with('/') {
                location.push('/');
            }
            location.push_str(segment);
            key = key.child(*segment);
        }
        CatalogPath { location, key }
    }

    /// Recursive glob over every file with `extension` below the root.
    pub fn glob(&self, extension: &str) -> String {
        self.child(&[]).glob(extension)
    }
}

impl fmt::Display for CatalogRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.location)
    }
}

/// A path below a catalog root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogPath {
    /// Rendering used in query globs, e.g. `s3://bucket/prefix/sentinel2/N60W040`.
    pub location: String,
    /// Key of the path inside the object store.
    pub key: Path,
}

impl CatalogPath {
    /// `<location>/**/*.<extension>`
    pub fn glob(&self, extension: &str) -> String {
        let base = self.location.trim_end_matches('/');
        format!("{base}/**/*.{}", extension.trim_start_matches('.'))
    }
}

/// Connection options for object stores.
#[derive(Clone, Debug, Default, TypedBuilder)]
pub struct StoreOptions {
    /// Send unsigned requests (public buckets).
    #[builder(default)]
    pub anonymous: bool,
    #[builder(default, setter(into, strip_option))]
    pub region: Option<String>,
    /// Custom endpoint, e.g. an S3-compatible server.
    #[builder(default, setter(into, strip_option))]
    pub endpoint: Option<String>,
}

/// Opens the object store holding `root`.
///
/// S3 credentials come from the standard `AWS_*` environment variables unless
/// `options.anonymous` is set.
pub fn open_store(root: &CatalogRoot, options: &StoreOptions) -> Result<Arc<dyn ObjectStore>> {
    match &root.backend {
        Backend::S3 { bucket } => {
            let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
            if options.anonymous {
                builder = builder.with_skip_signature(true);
            }
            if let Some(region) = &options.region {
                builder = builder.with_region(region);
            }
            if let Some(endpoint) = &options.endpoint {
                builder = builder
                    .with_endpoint(endpoint)
                    .with_allow_http(endpoint.starts_with("http://"));
            }
            log::debug!("opening s3 store for bucket {bucket}");
            Ok(Arc::new(builder.build()?))
        }
        Backend::Local { dir } => {
            log::debug!("opening local store at {}", dir.display());
            Ok(Arc::new(LocalFileSystem::new_with_prefix(dir)?))
        }
    }
}

/// Checks whether a catalog path holds any data.
#[async_trait]
pub trait ExistenceProbe: Send + Sync {
    /// True when at least one object exists below `path`.
    async fn exists(&self, path: &CatalogPath) -> Result<bool>;
}

/// [`ExistenceProbe`] over any [`ObjectStore`], listing the path's prefix
/// and stopping at the first object.
#[derive(Debug, Clone)]
pub struct ObjectStoreProbe {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreProbe {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn for_root(root: &CatalogRoot, options: &StoreOptions) -> Result<Self> {
        Ok(Self::new(open_store(root, options)?))
    }
}

#[async_trait]
impl ExistenceProbe for ObjectStoreProbe {
    async fn exists(&self, path: &CatalogPath) -> Result<bool> {
        let mut listing = self.store.list(Some(&path.key));
        match listing.next().await {
            Some(Ok(_)) => Ok(true),
            Some(Err(object_store::Error::NotFound { .. })) | None => Ok(false),
            Some(Err(e)) => Err(Error::existence_check(path.location.clone(), e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::PutPayload;
    use object_store::memory::InMemory;

    #[test]
    fn test_parse_s3_root() {
        let root = CatalogRoot::parse("s3://its-live-data/test-space/stac/latlon/").unwrap();
        assert_eq!(root.location(), "s3://its-live-data/test-space/stac/latlon");
        assert_eq!(
            root.backend(),
            &Backend::S3 {
                bucket: "its-live-data".into()
            }
        );

        let path = root.child(&["sentinel2", "N60W040"]);
        assert_eq!(
            path.location,
            "s3://its-live-data/test-space/stac/latlon/sentinel2/N60W040"
        );
        assert_eq!(path.key.as_ref(), "test-space/stac/latlon/sentinel2/N60W040");
        assert_eq!(
            path.glob("parquet"),
            "s3://its-live-data/test-space/stac/latlon/sentinel2/N60W040/**/*.parquet"
        );
    }

    #[test]
    fn test_parse_bucket_only_root() {
        let root = CatalogRoot::parse("s3://bucket").unwrap();
        let path = root.child(&["622236750694711295"]);
        assert_eq!(path.location, "s3://bucket/622236750694711295");
        assert_eq!(path.key.as_ref(), "622236750694711295");
        assert_eq!(root.glob(".parquet"), "s3://bucket/**/*.parquet");
    }

    #[test]
    fn test_parse_local_roots() {
        let root = CatalogRoot::parse("/data/catalog/").unwrap();
        assert_eq!(root.location(), "/data/catalog");
        assert_eq!(
            root.backend(),
            &Backend::Local {
                dir: PathBuf::from("/data/catalog/")
            }
        );
        let path = root.child(&["landsatOLI", "S70E170"]);
        assert_eq!(path.location, "/data/catalog/landsatOLI/S70E170");
        assert_eq!(path.key.as_ref(), "landsatOLI/S70E170");

        let root = CatalogRoot::parse("file:///data/catalog").unwrap();
        assert_eq!(root.location(), "/data/catalog");

        let root = CatalogRoot::parse("catalog").unwrap();
        assert_eq!(root.child(&["h"]).location, "catalog/h");
    }

    #[test]
    fn test_unsupported_schemes() {
        for bad in ["gs://bucket/x", "https://example.com/catalog", "az://c/p", ""] {
            let err = CatalogRoot::parse(bad).unwrap_err();
            assert!(
                matches!(err, Error::UnsupportedStorageScheme(_)),
                "{bad:?}: {err}"
            );
            assert!(err.is_fatal());
        }
    }

    #[tokio::test]
    async fn test_probe_lists_prefix() {
        let store = Arc::new(InMemory::new());
        store
            .put(
                &Path::from("cat/sentinel2/N60W040/2020/items.parquet"),
                PutPayload::from_static(b"PAR1"),
            )
            .await
            .unwrap();
        let probe = ObjectStoreProbe::new(store);
        let root = CatalogRoot::parse("s3://bucket/cat").unwrap();

        assert!(probe.exists(&root.child(&["sentinel2", "N60W040"])).await.unwrap());
        assert!(probe.exists(&root.child(&["sentinel2"])).await.unwrap());
        assert!(!probe.exists(&root.child(&["sentinel1", "N60W040"])).await.unwrap());
        // Prefixes match whole path segments only.
        assert!(!probe.exists(&root.child(&["sentinel2", "N60W04"])).await.unwrap());
    }
}
