//! Prompt text for the completion service.

use std::collections::BTreeMap;

use dealbrief_retrieval::{ChatMessage, ContextSet};

use crate::state::SectionKind;

/// Sections the seller report must cover before verification stops.
pub const SELLER_REQUIRED_SECTIONS: &[&str] = &[
    "Value proposition",
    "Product capabilities",
    "Market differentiation",
    "Customer outcomes",
];

const CITATION_RULES: &str = "Key Requirements:\n\
1. For in-text citations use IEEE style with square brackets (e.g. \"[1]\").\n\
2. Use the original citation numbers provided in the source data. Do not renumber citations.\n\
3. Format output in markdown.\n\
4. Do not write a preface; begin immediately with the first line of the template.";

const WRITER_ROLE: &str = "You are a B2B sales intelligence writer. You only make claims \
supported by the provided sources and cite every claim.";

fn writer_system(contexts: &ContextSet) -> ChatMessage {
    ChatMessage::developer(format!(
        "{WRITER_ROLE}\n\nAvailable sources:\n{}",
        contexts.sources_overview
    ))
}

/// Gap-check prompt for a branch retrieval. `{context}` is filled in by the
/// retrieval engine.
#[must_use]
pub fn verification_prompt(company_name: &str, focus: &[String]) -> String {
    format!(
        "Review the research collected about {company_name} below. The report needs: {}.\n\n\
         Context:\n{{context}}\n\n\
         If anything essential is missing, respond with a short comma-separated list of the \
         missing topics. If nothing is missing, respond with exactly COMPLETE.",
        focus.join(", ")
    )
}

#[must_use]
pub fn seller_report(company_name: &str, contexts: &ContextSet) -> Vec<ChatMessage> {
    vec![
        writer_system(contexts),
        ChatMessage::user(format!(
            "Write a value proposition for {company_name} using the \"Available Data\" below. \
             The company may sell services, products or both.\n\n{CITATION_RULES}\n\n\
             <start of template>\n# {company_name} Value Proposition\n\n\
             [3-5 paragraphs, each under a descriptive heading, covering: core offering and \
             capabilities; unique value and differentiators; target market and customer \
             outcomes. Use bold for key points.]\n\n## Citations\n{}\n<end of template>\n\n\
             **Available Data:**\n{}",
            contexts.citations, contexts.combined
        )),
    ]
}

/// Prompt for one prospect report section.
#[must_use]
pub fn section(
    kind: SectionKind,
    company_name: &str,
    seller_name: &str,
    seller_report: &str,
    contexts: &ContextSet,
) -> Vec<ChatMessage> {
    let body = match kind {
        SectionKind::Overview => format!(
            "<start of template>\n## {company_name} Company Overview\n\n\
             ### What does {company_name} do/sell/offer?\n[3-5 cited sentences.]\n\n\
             ### Who is {company_name}'s target market?\n[3-5 cited sentences.]\n\n\
             ### What is {company_name}'s unique selling proposition?\n[3-5 cited sentences.]\n\
             <end of template>\n\n**Available Webpage Data:**\n{}",
            contexts.webpage
        ),
        SectionKind::Positions => format!(
            "<start of template>\n## Open Positions at {company_name}\n\
             [Bullet list of job titles with citations. If none were found, write: No open \
             positions found in a quick scan of {company_name}'s website.]\n\
             [A paragraph on what the listings suggest about {company_name}'s priorities, tools \
             and methodologies.]\n\
             Note: Job listings are sourced solely from {company_name}'s website.\n\
             <end of template>\n\n**Available Job Data:**\n{}",
            contexts.job
        ),
        SectionKind::News => format!(
            "<start of template>\n## {company_name} News (Last 12 Months)\n\
             [3-7 developments relevant to what {seller_name} offers. For each:\n\
             ### Descriptive title\n<br>3-5 cited sentences\n\
             <br><b>{company_name} Impact Inference:</b> 3-5 sentences\n\
             <br><b>{seller_name} Inference:</b> 3-5 sentences]\n<end of template>\n\n\
             **Available News Data:**\n{}\n\n**Available Webpage Data:**\n{}\n\n\
             **Available {seller_name} Report Data:**\n{seller_report}",
            contexts.news, contexts.webpage
        ),
        SectionKind::Trends => format!(
            "<start of template>\n## Industry Macro Trends\n\
             [Up to 5 trends for {company_name}'s industry. For each:\n\
             ### Descriptive title\n<br>3-5 sentences with multiple citations\n\
             <br><b>Impact:</b> 3-5 sentences]\n\n## Shocking Statistics\n\
             [Up to 3 cited industry-wide statistics, if the data supports them.]\n\
             <end of template>\n\n**Available Macro Data:**\n{}",
            contexts.macro_trend
        ),
    };
    vec![
        writer_system(contexts),
        ChatMessage::user(format!(
            "Fill in the template about {company_name}, with citations.\n\n{CITATION_RULES}\n\n\
             {body}\n\n**Available Citations:**\n{}",
            contexts.citations
        )),
    ]
}

/// The prospect report: sections in order, placeholders for missing ones.
#[must_use]
pub fn combined_report(
    company_name: &str,
    sections: &BTreeMap<SectionKind, String>,
    citations: &str,
) -> String {
    let body = SectionKind::ALL
        .iter()
        .map(|kind| {
            sections
                .get(kind)
                .map_or(kind.placeholder(), String::as_str)
                .trim()
                .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "# {company_name} Intelligence Report\n\n{body}\n\n\
         Note: This analysis is based on publicly available information from {company_name}'s \
         online presence, news coverage, and market research.\n\n## Citations\n{citations}"
    )
}

#[must_use]
pub fn page_selection(company_name: &str, urls: &[String], limit: usize) -> Vec<ChatMessage> {
    vec![
        ChatMessage::developer(
            "You select the web pages that best describe a company. Respond only with a JSON \
             array of URLs.",
        ),
        ChatMessage::user(format!(
            "From the URLs below, pick at most {limit} pages of {company_name}'s site that best \
             describe its products, services, customers, pricing, careers and news. Prefer \
             top-level pages over individual blog posts.\n\n{}",
            urls.join("\n")
        )),
    ]
}

#[must_use]
pub fn industry(company_url: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::developer("You are an expert at identifying companies' specific industries."),
        ChatMessage::user(format!(
            "In what specific industry/industries is {company_url}? Be precise. Respond ONLY \
             with a one-sentence answer that does not mention {company_url}."
        )),
    ]
}

#[must_use]
pub fn trend_queries(industry: &str, count: usize) -> Vec<ChatMessage> {
    vec![
        ChatMessage::developer(
            "You are a market research analyst. Respond only with a comma-separated list.",
        ),
        ChatMessage::user(format!(
            "{industry}\nWhat {count} news search queries are likely to return results that \
             summarize broad market trends, highlighting key events, policy changes, \
             technological innovations, and notable shifts in consumer behavior? Respond only \
             with a comma-separated list of the exact wording of each query."
        )),
    ]
}
