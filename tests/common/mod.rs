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

//! Shared helpers for integration tests: an in-memory catalog, scripted
//! engines and probes, and a canned HTTP server.

#![allow(dead_code)]

use async_trait::async_trait;
use cryoforge_search::engine::{QueryEngine, SearchParams};
use cryoforge_search::error::{Error, Result};
use cryoforge_search::storage::{CatalogPath, CatalogRoot, ExistenceProbe, ObjectStoreProbe};
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub const ROOT: &str = "s3://its-live-data/test-space/stac/geoparquet/latlon";

pub fn latlon_root() -> CatalogRoot {
    CatalogRoot::parse(ROOT).unwrap()
}

/// Glob for `<mission>/<tile>` under [`ROOT`].
pub fn glob(mission: &str, tile: &str) -> String {
    format!("{ROOT}/{mission}/{tile}/**/*.parquet")
}

/// Probe over an in-memory store holding one parquet file per
/// `<mission>/<tile>` pair.
pub async fn seeded_probe(pairs: &[(&str, &str)]) -> ObjectStoreProbe {
    let store = Arc::new(InMemory::new());
    for (mission, tile) in pairs {
        let key = format!(
            "test-space/stac/geoparquet/latlon/{mission}/{tile}/{tile}_0000.parquet"
        );
        store
            .put(&Path::from(key), PutPayload::from_static(b"PAR1"))
            .await
            .unwrap();
    }
    ObjectStoreProbe::new(store)
}

/// Probe that counts calls and delegates to an inner probe.
pub struct CountingProbe<P> {
    pub inner: P,
    pub calls: AtomicUsize,
}

impl<P> CountingProbe<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<P: ExistenceProbe> ExistenceProbe for CountingProbe<P> {
    async fn exists(&self, path: &CatalogPath) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.exists(path).await
    }
}

/// Probe failing for paths containing any of the given fragments.
pub struct FailingProbe<P> {
    pub inner: P,
    pub failing: Vec<String>,
}

#[async_trait]
impl<P: ExistenceProbe> ExistenceProbe for FailingProbe<P> {
    async fn exists(&self, path: &CatalogPath) -> Result<bool> {
        if self.failing.iter().any(|f| path.location.contains(f)) {
            return Err(Error::ExistenceCheck {
                path: path.location.clone(),
                message: "connection reset by peer".into(),
            });
        }
        self.inner.exists(path).await
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Engine answering from a glob-keyed script.
#[derive(Default)]
pub struct ScriptedEngine {
    responses: HashMap<String, Vec<String>>,
    failing: HashSet<String>,
    hanging: HashSet<String>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hrefs(mut self, glob: String, hrefs: &[&str]) -> Self {
        self.responses
            .insert(glob, hrefs.iter().map(|h| h.to_string()).collect());
        self
    }

    pub fn failing(mut self, glob: String) -> Self {
        self.failing.insert(glob);
        self
    }

    pub fn hanging(mut self, glob: String) -> Self {
        self.hanging.insert(glob);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Globs queried so far, sorted.
    pub fn seen(&self) -> Vec<String> {
        let mut seen = self.seen.lock().unwrap().clone();
        seen.sort();
        seen
    }
}

#[async_trait]
impl QueryEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn query(&self, glob: &str, _params: &SearchParams) -> Result<BTreeSet<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(glob.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.hanging.contains(glob) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.failing.contains(glob) {
            return Err(Error::PartitionQuery {
                glob: glob.to_string(),
                message: "corrupt parquet footer".into(),
            });
        }
        Ok(self
            .responses
            .get(glob)
            .map(|hrefs| hrefs.iter().cloned().collect())
            .unwrap_or_default())
    }
}

/// Serves one canned JSON response per connection, in order. `pages` gets the
/// server's base url (with trailing slash) so responses can link back to it.
/// Returns the base url and the raw requests received.
pub async fn serve_json_pages<F>(pages: F) -> (String, Arc<Mutex<Vec<String>>>)
where
    F: FnOnce(&str) -> Vec<Value>,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}/", listener.local_addr().unwrap());
    let pages = pages(&base);
    let requests = Arc::new(Mutex::new(Vec::new()));
    let seen = requests.clone();

    tokio::spawn(async move {
        for page in pages {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            seen.lock().unwrap().push(request);

            let body = page.to_string();
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/geo+json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        }
    });

    (base, requests)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
        let length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if buf.len() >= end + 4 + length {
            break;
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
