use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use phage_import_core::{ReferenceEntry, ReferenceSets};
use serde::{Deserialize, Serialize};

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// External source for `retrieve` ticket fields and known-value sets.
pub trait ReferenceCatalog: Send + Sync {
    /// # Errors
    /// Returns an error when the catalog cannot be queried.
    fn lookup(&self, phage_id: &str) -> Result<Option<ReferenceEntry>>;

    /// # Errors
    /// Returns an error when the catalog cannot be queried.
    fn reference_sets(&self) -> Result<ReferenceSets>;
}

/// Catalog with no entries; every `retrieve` field fails to resolve.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyCatalog;

impl ReferenceCatalog for EmptyCatalog {
    fn lookup(&self, _phage_id: &str) -> Result<Option<ReferenceEntry>> {
        Ok(None)
    }

    fn reference_sets(&self) -> Result<ReferenceSets> {
        Ok(ReferenceSets::default())
    }
}

/// On-disk catalog document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogFile {
    #[serde(default)]
    pub phages: BTreeMap<String, ReferenceEntry>,
    #[serde(default)]
    pub reference_sets: ReferenceSets,
}

/// Catalog loaded once from a JSON file.
///
/// Entry values are folded into the known-value sets.
#[derive(Debug, Clone, Default)]
pub struct JsonFileCatalog {
    document: CatalogFile,
}

impl JsonFileCatalog {
    #[must_use]
    pub fn new(document: CatalogFile) -> Self {
        Self { document }
    }

    /// # Errors
    /// Returns an error when the file cannot be read or is not a catalog document.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog {}", path.display()))?;
        let document = serde_json::from_str::<CatalogFile>(&raw)
            .with_context(|| format!("failed to parse catalog {}", path.display()))?;
        Ok(Self::new(document))
    }
}

impl ReferenceCatalog for JsonFileCatalog {
    fn lookup(&self, phage_id: &str) -> Result<Option<ReferenceEntry>> {
        Ok(self.document.phages.get(phage_id).cloned())
    }

    fn reference_sets(&self) -> Result<ReferenceSets> {
        let mut sets = self.document.reference_sets.clone();
        for entry in self.document.phages.values() {
            sets.host_genera.extend(entry.host_genus.iter().cloned());
            sets.clusters.extend(entry.cluster.iter().cloned());
            sets.subclusters.extend(entry.subcluster.iter().cloned());
        }
        Ok(sets)
    }
}

/// Catalog served over HTTP as `GET {base}/phages/{id}` and
/// `GET {base}/reference-sets`.
#[derive(Debug, Clone)]
pub struct HttpCatalog {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpCatalog {
    /// Build the client and confirm the endpoint answers.
    ///
    /// # Errors
    /// Returns an error when the reference-set endpoint is unreachable.
    pub fn connect(base_url: &str) -> Result<Self> {
        let agent = ureq::AgentBuilder::new().timeout(HTTP_TIMEOUT).build();
        let catalog = Self { base_url: base_url.trim_end_matches('/').to_string(), agent };
        catalog
            .reference_sets()
            .with_context(|| format!("reference catalog {base_url} is unreachable"))?;
        Ok(catalog)
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let url = format!("{}/{path}", self.base_url);
        match self.agent.get(&url).call() {
            Ok(response) => response
                .into_json::<T>()
                .map(Some)
                .with_context(|| format!("failed to decode catalog response from {url}")),
            Err(ureq::Error::Status(404, _)) => Ok(None),
            Err(ureq::Error::Status(code, _)) => {
                Err(anyhow!("catalog request {url} returned HTTP {code}"))
            }
            Err(err) => Err(err).with_context(|| format!("catalog request {url} failed")),
        }
    }
}

impl ReferenceCatalog for HttpCatalog {
    fn lookup(&self, phage_id: &str) -> Result<Option<ReferenceEntry>> {
        self.get_json(&format!("phages/{phage_id}"))
    }

    fn reference_sets(&self) -> Result<ReferenceSets> {
        Ok(self.get_json("reference-sets")?.unwrap_or_default())
    }
}
