//! Fuzzy entity resolution over a record store that only supports exact-token filters.
//!
//! Free-text queries ("Stanford Real Estate, Bondi") are normalized into tokens,
//! planned into OR'ed filter groups the store understands, and the oversized
//! candidate pool it returns is scored and ranked in memory. Contacts are scored
//! together with their affiliated organization, fetched by a bounded fan-out that
//! tolerates per-candidate failures.

pub mod composite;
pub mod config;
pub mod error;
pub mod remote;
pub mod resolver;
pub mod search;
pub mod store;
pub mod tracing;
pub mod types;

pub use composite::{CompositeResolver, gather};
pub use config::ResolverConfig;
pub use error::{ConfigError, RemoteError, ResolveError};
pub use remote::{CallFailure, RemoteCaller};
pub use resolver::{ContactMatches, EntityResolver, OrganizationMatches};
pub use search::{ContactQuery, OrganizationQuery, ScoredCandidate};
pub use store::{MemoryStore, RecordStore};
pub use types::{Candidate, CompositeCandidate, Contact, EntityKind, Organization, RawRecord};
