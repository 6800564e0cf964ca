//! Lazy resolution of named resources from loose files and archives.
//!
//! Game data spreads resources over many nested archives with many to
//! many relationships between names and containers. Sources are
//! registered without opening them and only expanded once a request
//! actually needs their entries.
use std::{
    fs,
    path::{Path, PathBuf},
};

use indexmap::{IndexMap, IndexSet};
use log::{info, warn};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("error reading source data")]
    Io(#[from] std::io::Error),

    #[error("error decoding container data")]
    Decode(#[from] Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no source found for resource {name:?}")]
    NotFound { name: String },
}

/// A source of named entries like an archive or a loose file.
///
/// Implementations handle decompression and entry decoding, so the
/// resolver itself never depends on any particular container codec.
pub trait EntrySource {
    /// Read and expand all named entries of this source.
    fn read_entries(&mut self) -> Result<Vec<SourceEntry>, SourceError>;
}

pub struct SourceEntry {
    pub name: String,
    pub data: EntryData,
}

pub enum EntryData {
    /// Leaf resource bytes ready for decoding.
    Resource(Vec<u8>),
    /// A nested container expanded on demand.
    Container(Box<dyn EntrySource>),
}

/// An [EntrySource] over a loose file read on demand.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl EntrySource for FileSource {
    fn read_entries(&mut self) -> Result<Vec<SourceEntry>, SourceError> {
        let data = fs::read(&self.path)?;
        Ok(vec![SourceEntry {
            name: resource_name(&self.path),
            data: EntryData::Resource(data),
        }])
    }
}

/// Demand driven lookup of resources by name over registered sources.
///
/// Sources stay unopened until a request needs them. Loaded resources
/// and the set of opened archives are memoized, so repeated requests
/// never expand the same source twice. Registration order decides which
/// source wins when several provide the same name.
#[derive(Default)]
pub struct ResourceResolver {
    /// Loaded resource bytes by name.
    loaded: IndexMap<String, Vec<u8>>,
    /// Unopened sources holding exactly one known resource each.
    pending_files: IndexMap<String, Box<dyn EntrySource>>,
    /// Unopened sources that may hold many resources.
    pending_archives: IndexMap<String, Box<dyn EntrySource>>,
    /// Names of archives that were already expanded.
    opened: IndexSet<String>,
}

impl ResourceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a loose file as a single resource source without reading it.
    ///
    /// The resource name is the file name up to the first `.`, so
    /// `c2240.chrbnd.dcx` registers as `c2240`.
    pub fn register_file(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let name = resource_name(path);
        self.pending_files
            .entry(name)
            .or_insert_with(|| Box::new(FileSource::new(path)));
    }

    /// Register an archive that may contain many named resources
    /// without opening it.
    pub fn register_archive(&mut self, name: impl Into<String>, source: Box<dyn EntrySource>) {
        let name = name.into();
        if self.opened.contains(&name) {
            return;
        }
        self.pending_archives.entry(name).or_insert(source);
    }

    /// Find the resource `name`, opening as few sources as possible.
    ///
    /// Sources are tried in order: already loaded resources, single
    /// resource sources with an exactly matching name, archives whose
    /// name is a prefix of the request and finally every remaining
    /// unopened archive.
    #[tracing::instrument(skip_all)]
    pub fn resolve(&mut self, name: &str) -> Result<&[u8], ResolveError> {
        if !self.loaded.contains_key(name) {
            self.load_pending(name);
        }
        self.loaded
            .get(name)
            .map(|data| data.as_slice())
            .ok_or_else(|| ResolveError::NotFound {
                name: name.to_string(),
            })
    }

    fn load_pending(&mut self, name: &str) {
        if let Some(source) = self.pending_files.shift_remove(name) {
            self.open_source(name, source);
            if self.loaded.contains_key(name) {
                return;
            }
        }

        // Archives expand breadth first. Nested containers registered
        // while opening are candidates for later iterations.
        loop {
            let Some(archive_name) = self
                .pending_archives
                .keys()
                .find(|archive| name.starts_with(archive.as_str()))
                .cloned()
            else {
                break;
            };
            if let Some(source) = self.pending_archives.shift_remove(&archive_name) {
                self.open_source(&archive_name, source);
            }
            if self.loaded.contains_key(name) {
                return;
            }
        }

        if self.pending_archives.is_empty() {
            return;
        }
        info!("Opening all remaining archives to find {name:?}.");
        while let Some((archive_name, source)) = self.pending_archives.shift_remove_index(0) {
            self.open_source(&archive_name, source);
            if self.loaded.contains_key(name) {
                return;
            }
        }
    }

    fn open_source(&mut self, source_name: &str, mut source: Box<dyn EntrySource>) {
        self.opened.insert(source_name.to_string());
        match source.read_entries() {
            Ok(entries) => {
                for entry in entries {
                    match entry.data {
                        EntryData::Resource(data) => {
                            // The first source to provide a name wins.
                            self.loaded.entry(entry.name).or_insert(data);
                        }
                        EntryData::Container(inner) => {
                            self.register_archive(entry.name, inner);
                        }
                    }
                }
            }
            Err(e) => {
                warn!("Error reading source {source_name:?}: {e}");
            }
        }
    }
}

fn resource_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    name.split('.').next().unwrap_or_default().to_string()
}
