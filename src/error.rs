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

//! Error definitions for partition planning and federated search.
//!
//! Errors fall into two groups. Fatal errors describe bad caller input
//! (an unrepairable geometry, an option this crate does not implement, a
//! malformed filter) and abort a search before any I/O is issued. Recoverable
//! errors come from I/O against a single partition; the federator logs them,
//! counts them in [`Diagnostics`](crate::federation::Diagnostics) and keeps
//! going with the remaining partitions.

use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Input geometry is invalid and could not be repaired.
    #[error("invalid geometry: {0}")]
    Geometry(String),

    #[error("unsupported partition scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("unsupported search engine '{0}'; expected one of: structured, sql")]
    UnsupportedEngine(String),

    #[error("unsupported storage scheme '{0}'; expected s3:// or a local path")]
    UnsupportedStorageScheme(String),

    #[error("unsupported filter operator '{0}'")]
    UnsupportedOperator(String),

    #[error("invalid filter expression: {0}")]
    InvalidFilter(String),

    #[error("invalid datetime range: {0}")]
    InvalidDatetime(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A single partition glob failed while being queried.
    #[error("query against '{glob}' failed: {message}")]
    PartitionQuery { glob: String, message: String },

    /// An existence probe for a candidate path failed.
    #[error("existence check for '{path}' failed: {message}")]
    ExistenceCheck { path: String, message: String },

    #[error("{what} timed out after {after:?}")]
    Timeout { what: String, after: Duration },

    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl Error {
    /// Returns true when the error must abort the whole search.
    ///
    /// Only caller-input errors are fatal; anything produced by talking to
    /// storage or to an engine is scoped to one partition.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Geometry(_)
                | Error::UnsupportedScheme(_)
                | Error::UnsupportedEngine(_)
                | Error::UnsupportedStorageScheme(_)
                | Error::UnsupportedOperator(_)
                | Error::InvalidFilter(_)
                | Error::InvalidDatetime(_)
                | Error::InvalidConfig(_)
                | Error::InvalidUrl(_)
        )
    }

    pub(crate) fn partition_query(glob: impl Into<String>, message: impl ToString) -> Self {
        Error::PartitionQuery {
            glob: glob.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn existence_check(path: impl Into<String>, message: impl ToString) -> Self {
        Error::ExistenceCheck {
            path: path.into(),
            message: message.to_string(),
        }
    }
}
