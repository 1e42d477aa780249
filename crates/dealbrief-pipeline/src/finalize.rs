use std::time::Duration;

use crate::state::{FinalMetadata, FinalReport, Submission};

fn error_section(errors: &[String]) -> String {
    if errors.is_empty() {
        return String::new();
    }
    let items = errors
        .iter()
        .map(|e| format!("- {e}"))
        .collect::<Vec<_>>()
        .join("<br>\n");
    format!("\n\n## Execution Errors\n{items}<br>")
}

/// Assemble the delivered report: seller report, prospect report, any
/// recorded errors and a dated footer.
#[must_use]
pub fn finalize(submission: &Submission, elapsed: Duration) -> FinalReport {
    let analysis_date = submission.created_at.format("%Y-%m-%d").to_string();
    let seller = submission.seller.report.as_deref().unwrap_or_default();
    let prospect = submission.prospect.report.as_deref().unwrap_or_default();

    let report = format!(
        "\n{seller}\n<br>\n<br>\n{prospect}\n<br>\n{}\n\n---\n*Report generated on {analysis_date}*\n",
        error_section(&submission.errors)
    );

    FinalReport {
        report,
        metadata: FinalMetadata {
            analysis_date,
            execution_time_secs: elapsed.as_secs_f64(),
            has_errors: !submission.errors.is_empty(),
            errors: submission.errors.clone(),
        },
    }
}
