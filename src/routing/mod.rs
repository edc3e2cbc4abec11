//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → router.rs (degenerate path? exact index hit?)
//!     → matcher.rs (longest static prefix, dynamic carve-out)
//!     → resources::ManagerChain (only for prefix matches)
//!     → Return: FastPath(resource), SlowPath or NotFound
//!
//! Route Compilation (at startup):
//!     ResourceConfig.static_prefixes
//!     → Compile PrefixMatcher (segment-prefix set)
//!     → Freeze as immutable Router
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route
//! - Longest prefix wins

pub mod matcher;
pub mod router;

pub use matcher::{PrefixMatch, PrefixMatcher};
pub use router::{Route, Router};
