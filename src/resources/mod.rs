//! Static resource subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     ResourceConfig (archives, loose roots)
//!     → scan.rs (walk directories, list archive entries)
//!     → normalize.rs (strip root, percent-decode, expand aliases)
//!     → index.rs (alias → ResourceLocation, loose beats archive)
//!
//! Per request:
//!     request path
//!     → index.rs (exact / longest-prefix lookup, no I/O)
//!     → manager.rs (loose store, then archive store)
//!     → resource.rs (lazy metadata + bytes)
//!     → cache.rs (optional fronting byte cache)
//!
//! Module resolution:
//!     resource name → resolver.rs → index.rs → parent resolver
//! ```
//!
//! # Design Decisions
//! - The index is built once and never mutated, so reads need no locks
//! - Metadata is computed lazily; startup cost is one scan, not one stat per entry
//! - Store failures are errors, never silent misses

pub mod cache;
pub mod error;
pub mod index;
pub mod location;
pub mod manager;
pub mod normalize;
pub mod resolver;
pub mod resource;
pub mod scan;

pub use cache::{CachedResource, ResourceCache};
pub use error::{ResourceError, ScanError};
pub use index::ResourceIndex;
pub use location::{Archive, Locator, Origin, ResourceLocation};
pub use manager::{ArchiveManager, LooseFileManager, ManagerChain, ResourceManager};
pub use normalize::PathNormalizer;
pub use resolver::{ModuleResolver, ResolveResource};
pub use resource::{Resource, ResourceMeta};
pub use scan::{scan, ScanResult};
