//! # fable-core
//!
//! Foundation layer for the Fable interactive-narrative engine:
//!
//! - **Branded IDs** — newtype wrappers so document kinds cannot be mixed up
//! - **Error taxonomy** — fatal turn failures with phase context and
//!   retryability classification
//! - **Documents** — versioned, content-hashed document envelopes with
//!   forward-compatible `custom` buckets, plus the repository contract
//! - **Cache** — injected TTL + LRU cache provider
//! - **Metrics** — fire-and-forget sink trait with noop and in-memory impls
//! - **Logging** — one-shot tracing initialization

#![deny(unsafe_code)]

pub mod cache;
pub mod documents;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod memory;
pub mod metrics;

pub use cache::{CacheExt, CacheProvider, MemoryCache};
pub use documents::{
    AdventureDoc, AdventureStartDoc, CoreContract, DocRepository, InjectionDirective,
    InjectionMapDoc, NpcDoc, PlayerProfile, RepoError, RulesetDoc, ScaleBounds, SessionDoc,
    VersionedDoc, WorldDoc, content_hash_bytes, content_hash_of,
};
pub use errors::{DocKind, TurnError, TurnPhase, TurnResult};
pub use ids::{
    AdventureId, NpcId, RulesetId, ScenarioId, SceneId, SessionId, TurnId, WorldId,
};
pub use logging::{LoggingConfig, init_logging};
pub use memory::MemoryRepository;
pub use metrics::{Labels, MemoryMetrics, MetricsSink, NoopMetrics, labels};
