//! Retrieval-augmented context assembly and citation bookkeeping.
//!
//! [`RetrievalEngine`] indexes a branch's documents, pulls the most relevant
//! fragments under an API-call and token budget, and tracks a stable
//! URL-to-citation-index map. [`renumber_citations`] compacts the numbering
//! of a generated report into a dense `1..N` sequence afterwards.

pub mod chunk;
pub mod citations;
pub mod collab;
pub mod context;
pub mod engine;
pub mod error;
pub mod index;
pub mod parse;
pub mod queries;
pub mod renumber;
pub mod tokens;

pub use chunk::chunk_documents;
pub use citations::{CitationEntry, CitationMap};
pub use collab::{ChatMessage, ChatRole, Completer, Embedder};
pub use context::{build_contexts, truncate_contexts, ContextSet, TruncationOutcome};
pub use engine::{
    verify_coverage, CoverageReport, Retrieval, RetrievalEngine, RetrievalRequest,
    VerificationOutcome,
};
pub use error::RetrievalError;
pub use index::VectorIndex;
pub use parse::{parse_list, strip_code_fences, Confidence, Parsed};
pub use queries::{fallback_queries, focus_areas, generate_adaptive_queries};
pub use renumber::{renumber_citations, RenumberOutcome, Renumbered};
pub use tokens::estimate_tokens;
