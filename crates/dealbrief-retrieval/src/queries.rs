use std::fmt::Write as _;
use std::sync::LazyLock;

use dealbrief_core::{BranchKind, SourceDocument};
use regex::Regex;

use crate::collab::{ChatMessage, Completer};

const SELLER_FOCUS_AREAS: &[&str] = &[
    "Core product capabilities and features",
    "Unique value propositions",
    "Market differentiation points",
    "Customer success metrics",
];

const PROSPECT_FOCUS_AREAS: &[&str] = &[
    "Current job openings and hiring trends",
    "Recent news and developments (last 12 months)",
    "Industry macro trends and statistics",
    "Core business model and offerings",
    "Target market and customer segments",
    "Unique value proposition and differentiation",
];

const SELLER_FALLBACK_QUERIES: &[&str] = &[
    "What are the main products or services offered?",
    "What unique value does the company provide to customers?",
    "How does the company differentiate itself in the market?",
    "What measurable outcomes do customers achieve?",
];

const PROSPECT_FALLBACK_QUERIES: &[&str] = &[
    "What are the current job openings at the company?",
    "What major news or developments have occurred in the last 12 months?",
    "What are the key macro trends affecting their industry?",
    "What shocking or notable statistics exist about their industry?",
    "What products or services does the company offer?",
    "Who is their target market?",
    "What is their unique selling proposition?",
    "How do they differentiate from competitors?",
];

/// Documents from the tail of the collected set shown to the query generator.
const RECENT_DOCS: usize = 5;
const RECENT_DOC_CHARS: usize = 300;

static NUMBERED_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d+\.\s*(.+)$").expect("valid regex"));

/// Initial queries for a branch, one per report focus area.
#[must_use]
pub fn focus_areas(branch: BranchKind) -> Vec<String> {
    let areas = match branch {
        BranchKind::Seller => SELLER_FOCUS_AREAS,
        BranchKind::Prospect => PROSPECT_FOCUS_AREAS,
    };
    areas.iter().map(|s| (*s).to_string()).collect()
}

#[must_use]
pub fn fallback_queries(branch: BranchKind, n: usize) -> Vec<String> {
    let queries = match branch {
        BranchKind::Seller => SELLER_FALLBACK_QUERIES,
        BranchKind::Prospect => PROSPECT_FALLBACK_QUERIES,
    };
    queries.iter().take(n).map(|s| (*s).to_string()).collect()
}

fn adaptive_prompt(
    collected: &[SourceDocument],
    n: usize,
    branch: BranchKind,
    company_name: &str,
) -> String {
    let areas = focus_areas(branch);
    let start = collected.len().saturating_sub(RECENT_DOCS);
    let mut docs = String::new();
    for doc in &collected[start..] {
        let excerpt: String = doc.content.chars().take(RECENT_DOC_CHARS).collect();
        let _ = writeln!(docs, "Source: {}\nContent: {excerpt}\n", doc.url());
    }
    let numbered = areas
        .iter()
        .enumerate()
        .map(|(i, a)| format!("{}. {a}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");

    let intro = match branch {
        BranchKind::Prospect => "You are a B2B sales intelligence specialist. Review these documents about a potential client company and generate specific questions to gather sales-relevant information.".to_string(),
        BranchKind::Seller => format!("You are a B2B product specialist. Review these documents about {company_name} and generate specific questions to gather comprehensive product and capability information."),
    };

    format!(
        "{intro}\n\nDocuments:\n{docs}\nFocus on finding information about:\n{}\n\n\
         Generate {n} specific questions that will help understand:\n{numbered}\n\n\
         Format each question on a new line, numbered. Questions should be specific and targeted.",
        areas.join(", ")
    )
}

/// Keep only `N.`-prefixed lines, without their numbering.
pub(crate) fn numbered_lines(response: &str) -> Vec<String> {
    response
        .lines()
        .filter_map(|line| NUMBERED_LINE.captures(line))
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|q| !q.is_empty())
        .collect()
}

/// Ask the completion service for `n` follow-up questions given what has
/// been collected so far. Falls back to a static list for the branch when
/// the call fails or yields no usable lines.
pub async fn generate_adaptive_queries(
    completer: &dyn Completer,
    collected: &[SourceDocument],
    n: usize,
    branch: BranchKind,
    company_name: &str,
) -> Vec<String> {
    let messages = [
        ChatMessage::developer(
            "You are an adaptive research strategist specializing in business intelligence. \
             Analyze existing research and generate targeted follow-up queries that fill \
             knowledge gaps.",
        ),
        ChatMessage::user(adaptive_prompt(collected, n, branch, company_name)),
    ];

    match completer.complete(&messages).await {
        Ok(response) => {
            let mut queries = numbered_lines(&response);
            if queries.is_empty() {
                tracing::warn!(%branch, "adaptive query response had no numbered lines, using fallback");
                return fallback_queries(branch, n);
            }
            queries.truncate(n);
            queries
        }
        Err(e) => {
            tracing::warn!(%branch, error = %e, "adaptive query generation failed, using fallback");
            fallback_queries(branch, n)
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use dealbrief_core::DocumentKind;
    use dealbrief_resilience::ServiceError;

    use super::*;

    struct Canned(Result<String, ()>);

    #[async_trait]
    impl Completer for Canned {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, ServiceError> {
            self.0
                .clone()
                .map_err(|()| ServiceError::Empty("completion".into()))
        }
    }

    #[test]
    fn numbered_lines_drops_headers() {
        let response = "Here are questions:\n1. What do they sell?\n2.  Who buys it?\n- stray";
        assert_eq!(
            numbered_lines(response),
            vec!["What do they sell?", "Who buys it?"]
        );
    }

    #[test]
    fn fallback_is_capped_at_n() {
        assert_eq!(fallback_queries(BranchKind::Prospect, 3).len(), 3);
        assert_eq!(fallback_queries(BranchKind::Seller, 99).len(), 4);
    }

    #[test]
    fn prompt_only_shows_last_five_docs_truncated() {
        let docs: Vec<SourceDocument> = (0..7)
            .map(|i| {
                SourceDocument::new(
                    "x".repeat(400),
                    format!("https://doc{i}.example"),
                    "t",
                    DocumentKind::Webpage,
                )
            })
            .collect();
        let prompt = adaptive_prompt(&docs, 4, BranchKind::Prospect, "Acme");
        assert!(!prompt.contains("doc1.example"));
        assert!(prompt.contains("doc2.example"));
        assert!(!prompt.contains(&"x".repeat(301)));
    }

    #[tokio::test]
    async fn parses_and_truncates_generated_queries() {
        let completer = Canned(Ok("1. a?\n2. b?\n3. c?".into()));
        let queries =
            generate_adaptive_queries(&completer, &[], 2, BranchKind::Seller, "Acme").await;
        assert_eq!(queries, vec!["a?", "b?"]);
    }

    #[tokio::test]
    async fn failure_uses_fallback() {
        let completer = Canned(Err(()));
        let queries =
            generate_adaptive_queries(&completer, &[], 2, BranchKind::Prospect, "Acme").await;
        assert_eq!(queries, fallback_queries(BranchKind::Prospect, 2));
    }
}
