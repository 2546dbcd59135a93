//! Passage retrieval against the external semantic index

pub mod circuit_breaker;
pub mod engine;
pub mod index;
pub mod rerank;

pub use circuit_breaker::{BreakerState, CircuitBreaker, CircuitBreakerConfig};
pub use engine::{DegradedReason, RetrievalConfig, RetrievalEngine, RetrievalOutcome};
pub use index::{
    HttpSemanticIndex, InMemoryIndex, IndexClientConfig, IndexError, IndexHit, IndexQuery,
    IndexedPassage, SemanticIndex,
};
pub use rerank::RerankWeights;
