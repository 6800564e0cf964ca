//! A library for locating resources in FromSoftware game archives.
//!
//! Game data ships as nested binder archives with many to many
//! relationships between resource names and containers. A shared
//! texture archive serves many models and one archive can hold dozens
//! of named sub resources. souls_binder classifies payloads by their
//! magic and version tag bytes and resolves named resources on demand
//! without decoding any payload itself. Entry and decompression codecs
//! are supplied by the caller through the
//! [EntrySource](crate::resolve::EntrySource) trait.
//!
//! # Getting Started
//! ```rust no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use souls_binder::resolve::ResourceResolver;
//!
//! let mut resolver = ResourceResolver::new();
//! // Registration never opens or decompresses anything.
//! resolver.register_file("map/m10_00_00_00/m10_00_eyes.tpf.dcx");
//!
//! let data = resolver.resolve("m10_00_eyes")?;
//! println!("{}", data.len());
//! # Ok(())
//! # }
//! ```
pub mod resolve;
pub mod settings;
pub mod sniff;
