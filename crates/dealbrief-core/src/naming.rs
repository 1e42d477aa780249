use crate::BranchKind;

fn strip_scheme(url: &str) -> &str {
    url.trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
}

/// Derive a display name for a company from its website URL.
///
/// `https://www.acme-widgets.com/about` becomes `"Acme Widgets"`.
#[must_use]
pub fn company_name_from_url(url: &str) -> String {
    let cleaned = strip_scheme(url).trim_start_matches("www.");
    let host = cleaned.split('/').next().unwrap_or_default();
    let label = host.split('.').next().unwrap_or_default();

    label
        .split('-')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Stable namespace key for a branch's cached data, e.g.
/// `acme_com_webpages_seller`.
#[must_use]
pub fn namespace_key(url: &str, data_type: &str, branch: BranchKind) -> String {
    let safe: String = strip_scheme(url)
        .trim_end_matches('/')
        .chars()
        .map(|c| match c {
            '.' | '-' | '/' => '_',
            c if c.is_ascii_alphanumeric() || c == '_' => c.to_ascii_lowercase(),
            _ => '_',
        })
        .collect();
    format!("{safe}_{data_type}_{branch}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn company_name_strips_scheme_www_and_tld() {
        assert_eq!(
            company_name_from_url("https://www.acme-widgets.com/about"),
            "Acme Widgets"
        );
    }

    #[test]
    fn company_name_handles_bare_host() {
        assert_eq!(company_name_from_url("seller.example"), "Seller");
    }

    #[test]
    fn company_name_of_empty_url_is_empty() {
        assert_eq!(company_name_from_url(""), "");
    }

    #[test]
    fn namespace_key_replaces_separators() {
        assert_eq!(
            namespace_key("https://prospect.example/us-en/", "webpages", BranchKind::Prospect),
            "prospect_example_us_en_webpages_prospect"
        );
    }

    #[test]
    fn namespace_key_differs_per_branch() {
        let seller = namespace_key("https://a.com", "news", BranchKind::Seller);
        let prospect = namespace_key("https://a.com", "news", BranchKind::Prospect);
        assert_ne!(seller, prospect);
    }
}
