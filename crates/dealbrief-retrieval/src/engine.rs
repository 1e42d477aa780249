//! The branch RAG loop.
//!
//! 1. Chunk and embed every document into a [`VectorIndex`].
//! 2. Seed the collected set with all news and job documents.
//! 3. Search the initial queries, then adaptively generated ones, until the
//!    search-call budget (`max_iterations * queries_per_batch`) is spent.
//! 4. Optionally ask the completion service for gaps and search once more.
//!
//! Hits are deduplicated by origin URL and each new URL gets its citation
//! index the first time it is collected.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use dealbrief_core::{BranchKind, RetrievalConfig, SourceDocument};

use crate::chunk::chunk_documents;
use crate::citations::CitationMap;
use crate::collab::{ChatMessage, Completer, Embedder};
use crate::error::RetrievalError;
use crate::index::VectorIndex;
use crate::queries::generate_adaptive_queries;
use crate::tokens::estimate_tokens;

/// Results per search issued by a coverage verification round.
const VERIFICATION_DOCS_PER_QUERY: usize = 3;
/// Characters of each collected document shown to verification prompts.
const VERIFICATION_EXCERPT_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    pub branch: BranchKind,
    pub company_name: String,
    pub documents: Vec<SourceDocument>,
    /// Focus-area queries searched before any adaptive ones.
    pub queries: Vec<String>,
    /// Gap-check prompt; `{context}` is replaced by document excerpts.
    pub verification_prompt: Option<String>,
}

/// Outcome of one retrieval: what was collected and how it is cited.
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub branch: BranchKind,
    pub documents: Vec<SourceDocument>,
    pub citations: CitationMap,
    pub search_calls: usize,
    /// Set when the token allowance stopped collection early.
    pub budget_exhausted: bool,
    index: VectorIndex,
    seen: HashSet<String>,
    collected_tokens: usize,
}

impl Retrieval {
    fn collect(&mut self, doc: &SourceDocument) -> bool {
        if self.seen.contains(doc.url()) {
            return false;
        }
        self.seen.insert(doc.url().to_string());
        self.citations.assign(&doc.meta);
        self.documents.push(doc.clone());
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoverageReport {
    pub coverage: BTreeMap<String, bool>,
    pub missing: Vec<String>,
    pub ratio: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VerificationOutcome {
    pub rounds: usize,
    pub coverage_ratio: f64,
    pub added: usize,
}

fn excerpts(docs: &[SourceDocument]) -> String {
    docs.iter()
        .map(|d| {
            let head: String = d.content.chars().take(VERIFICATION_EXCERPT_CHARS).collect();
            format!("{head}...")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Ask the completion service which `required` sections the documents
/// cover. A failed call reports every section missing.
pub async fn verify_coverage(
    completer: &dyn Completer,
    docs: &[SourceDocument],
    required: &[String],
) -> CoverageReport {
    let sections = required
        .iter()
        .map(|s| format!("- {s}"))
        .collect::<Vec<_>>()
        .join("\n");
    let messages = [
        ChatMessage::developer(
            "You are a content coverage analyst. Assess whether each required section \
             is adequately covered by the provided content.",
        ),
        ChatMessage::user(format!(
            "Determine which of the required sections for a sales-focused report are \
             adequately covered.\n\nCompany Information:\n{}\n\nRequired Sections:\n{sections}\n\n\
             For each section, respond with either \"covered\" or \"missing\" in a simple format:\n\
             section_name: covered/missing\n\nOnly include the status lines, nothing else.",
            excerpts(docs)
        )),
    ];

    let response = match completer.complete(&messages).await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "coverage verification call failed");
            return CoverageReport {
                coverage: BTreeMap::new(),
                missing: required.to_vec(),
                ratio: 0.0,
            };
        }
    };

    let mut coverage = BTreeMap::new();
    let mut missing = Vec::new();
    for line in response.lines() {
        let Some((section, status)) = line.split_once(':') else {
            continue;
        };
        let section = section.trim().trim_start_matches("- ").to_string();
        if section.is_empty() {
            continue;
        }
        let covered = status.trim().eq_ignore_ascii_case("covered");
        if !covered {
            missing.push(section.clone());
        }
        coverage.insert(section, covered);
    }

    let covered = coverage.values().filter(|c| **c).count();
    #[allow(clippy::cast_precision_loss)]
    let ratio = if required.is_empty() {
        1.0
    } else {
        covered as f64 / required.len() as f64
    };
    CoverageReport {
        coverage,
        missing,
        ratio,
    }
}

#[derive(Clone)]
pub struct RetrievalEngine {
    config: RetrievalConfig,
    embedder: Arc<dyn Embedder>,
    completer: Arc<dyn Completer>,
}

impl RetrievalEngine {
    #[must_use]
    pub fn new(
        config: RetrievalConfig,
        embedder: Arc<dyn Embedder>,
        completer: Arc<dyn Completer>,
    ) -> Self {
        Self {
            config,
            embedder,
            completer,
        }
    }

    #[must_use]
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    async fn build_index(&self, docs: &[SourceDocument]) -> Result<VectorIndex, RetrievalError> {
        let chunks = chunk_documents(docs, self.config.chunk_size(), self.config.chunk_overlap);
        if chunks.is_empty() {
            return Ok(VectorIndex::default());
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self
            .embedder
            .embed(&texts)
            .await
            .map_err(RetrievalError::Embedding)?;
        VectorIndex::build(chunks, vectors)
    }

    /// One similarity search, counted against the call budget. `None` when
    /// the budget is spent or the query could not be embedded.
    async fn search(
        &self,
        retrieval: &mut Retrieval,
        query: &str,
        k: usize,
    ) -> Option<Vec<SourceDocument>> {
        if retrieval.search_calls >= self.config.max_search_calls() {
            return None;
        }
        retrieval.search_calls += 1;
        match self.embedder.embed(&[query.to_string()]).await {
            Ok(mut vectors) if !vectors.is_empty() => {
                let vector = vectors.swap_remove(0);
                Some(retrieval.index.search(&vector, k).into_iter().cloned().collect())
            }
            Ok(_) => {
                tracing::warn!(branch = %retrieval.branch, query, "empty query embedding, skipping");
                Some(Vec::new())
            }
            Err(e) => {
                tracing::warn!(branch = %retrieval.branch, query, error = %e, "search failed, skipping query");
                Some(Vec::new())
            }
        }
    }

    /// Run `queries` until the call or token budget is spent. Returns the
    /// number of new documents collected.
    async fn run_queries(&self, retrieval: &mut Retrieval, queries: &[String]) -> usize {
        let allowance = self.config.context_allowance();
        let mut added = 0;
        for query in queries {
            if retrieval.budget_exhausted {
                break;
            }
            let Some(hits) = self.search(retrieval, query, self.config.docs_per_query).await else {
                break;
            };
            for hit in &hits {
                let tokens = estimate_tokens(&hit.content);
                if retrieval.collected_tokens + tokens > allowance {
                    tracing::warn!(
                        branch = %retrieval.branch,
                        collected_tokens = retrieval.collected_tokens,
                        allowance,
                        "token allowance reached, stopping collection"
                    );
                    retrieval.budget_exhausted = true;
                    break;
                }
                if retrieval.collect(hit) {
                    retrieval.collected_tokens += tokens;
                    added += 1;
                }
            }
        }
        added
    }

    /// Collect the most relevant fragments of `request.documents`.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError`] only when the documents cannot be indexed.
    /// Failed searches and failed completion calls are skipped.
    pub async fn retrieve(&self, request: RetrievalRequest) -> Result<Retrieval, RetrievalError> {
        let documents: Vec<SourceDocument> = request
            .documents
            .into_iter()
            .filter(|d| !d.content.trim().is_empty())
            .collect();
        let index = self.build_index(&documents).await?;

        let mut retrieval = Retrieval {
            branch: request.branch,
            documents: Vec::new(),
            citations: CitationMap::new(),
            search_calls: 0,
            budget_exhausted: false,
            index,
            seen: HashSet::new(),
            collected_tokens: 0,
        };

        for doc in documents.iter().filter(|d| d.kind().is_time_sensitive()) {
            retrieval.collect(doc);
        }

        let initial = self.run_queries(&mut retrieval, &request.queries).await;

        let mut adaptive = 0;
        if retrieval.search_calls < self.config.max_search_calls() && !retrieval.budget_exhausted {
            let queries = generate_adaptive_queries(
                self.completer.as_ref(),
                &retrieval.documents,
                self.config.queries_per_batch,
                request.branch,
                &request.company_name,
            )
            .await;
            adaptive = self.run_queries(&mut retrieval, &queries).await;
        }

        if let Some(prompt) = &request.verification_prompt {
            self.fill_gaps(&mut retrieval, prompt).await;
        }

        tracing::info!(
            branch = %request.branch,
            collected = retrieval.documents.len(),
            from_initial = initial,
            from_adaptive = adaptive,
            search_calls = retrieval.search_calls,
            citations = retrieval.citations.len(),
            "retrieval complete"
        );
        Ok(retrieval)
    }

    async fn fill_gaps(&self, retrieval: &mut Retrieval, prompt: &str) {
        let messages = [
            ChatMessage::developer(
                "You are a content completeness validator responsible for identifying \
                 missing information in business research.",
            ),
            ChatMessage::user(prompt.replace("{context}", &excerpts(&retrieval.documents))),
        ];
        let missing = match self.completer.complete(&messages).await {
            Ok(answer) => answer.trim().to_string(),
            Err(e) => {
                tracing::warn!(branch = %retrieval.branch, error = %e, "gap verification failed, continuing");
                return;
            }
        };
        if missing.is_empty() || missing == "COMPLETE" {
            return;
        }
        let query = format!("Find information about: {missing}");
        if let Some(hits) = self.search(retrieval, &query, self.config.docs_per_query).await {
            for hit in &hits {
                retrieval.collect(hit);
            }
        }
    }

    /// Extra retrieval rounds for sections the collected set does not yet
    /// cover, stopping once coverage reaches the configured threshold.
    pub async fn apply_verification(
        &self,
        retrieval: &mut Retrieval,
        required_sections: &[String],
    ) -> VerificationOutcome {
        let mut outcome = VerificationOutcome {
            rounds: 0,
            coverage_ratio: 0.0,
            added: 0,
        };
        for _ in 0..self.config.verification_attempts() {
            let report =
                verify_coverage(self.completer.as_ref(), &retrieval.documents, required_sections)
                    .await;
            outcome.coverage_ratio = report.ratio;
            if report.missing.is_empty()
                || report.ratio >= self.config.verification_coverage_threshold
            {
                break;
            }

            let query = format!("Find information about: {}", report.missing.join(", "));
            let Some(hits) = self
                .search(retrieval, &query, VERIFICATION_DOCS_PER_QUERY)
                .await
            else {
                break;
            };
            outcome.rounds += 1;
            for hit in &hits {
                if retrieval.collect(hit) {
                    outcome.added += 1;
                }
            }
        }
        tracing::debug!(
            branch = %retrieval.branch,
            rounds = outcome.rounds,
            coverage = outcome.coverage_ratio,
            added = outcome.added,
            "verification finished"
        );
        outcome
    }
}

#[cfg(test)]
#[path = "engine_test.rs"]
mod tests;
