//! Tolerant extraction of `{summary, topics, keywords, impact}` from a
//! free-form LLM response, grounded in
//! `original_source/ai/response_parser.py`'s bullet-vs-labeled-field
//! heuristics. Persistence itself lives in `store::queries`; this module is
//! pure text-in, struct-out so it can be unit tested without a database.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedSummary {
    pub summary: String,
    pub topics: Vec<String>,
    pub keywords: Vec<String>,
    pub impact: Impact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Impact {
    Brief,
    Moderate,
    Significant,
}

impl Impact {
    pub fn as_str(&self) -> &'static str {
        match self {
            Impact::Brief => "brief",
            Impact::Moderate => "moderate",
            Impact::Significant => "significant",
        }
    }

    fn normalize(raw: &str) -> Impact {
        match raw.trim().to_lowercase().as_str() {
            "significant" | "high" => Impact::Significant,
            "moderate" | "medium" => Impact::Moderate,
            _ => Impact::Brief,
        }
    }
}

/// Parses a batch summarizer response: bullet-formatted responses are
/// joined into one summary line with an impact derived from bullet count;
/// otherwise `**Label**:` prefixed fields are extracted directly.
pub fn extract(response: &str) -> ExtractedSummary {
    let bullets: Vec<&str> = response
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("- "))
        .collect();

    if !bullets.is_empty() {
        let summary = bullets
            .iter()
            .map(|line| line.trim_start_matches("- ").trim())
            .collect::<Vec<_>>()
            .join("; ");
        let impact = if bullets.len() > 3 {
            Impact::Significant
        } else if bullets.len() > 1 {
            Impact::Moderate
        } else {
            Impact::Brief
        };
        return ExtractedSummary {
            summary,
            topics: Vec::new(),
            keywords: Vec::new(),
            impact,
        };
    }

    let summary = extract_field(response, "Summary").unwrap_or_else(|| response.trim().to_string());
    let topics = extract_list_field(response, "Topics");
    let keywords = extract_list_field(response, "Keywords");
    let impact = extract_field(response, "Impact")
        .map(|v| Impact::normalize(&v))
        .unwrap_or(Impact::Brief);

    ExtractedSummary {
        summary,
        topics,
        keywords,
        impact,
    }
}

/// Derives a single file's impact from how many changes landed on it within
/// the batch, using the same thresholds as the bullet-count heuristic in
/// [`extract`].
pub fn impact_for_change_count(changes_count: usize) -> Impact {
    if changes_count > 3 {
        Impact::Significant
    } else if changes_count > 1 {
        Impact::Moderate
    } else {
        Impact::Brief
    }
}

/// Rolls up per-file impacts: any `significant` wins; else a majority
/// `moderate` wins; else `brief`.
pub fn rollup_impact(per_file: &[Impact]) -> Impact {
    if per_file.is_empty() {
        return Impact::Brief;
    }
    if per_file.iter().any(|i| matches!(i, Impact::Significant)) {
        return Impact::Significant;
    }
    let moderate_count = per_file.iter().filter(|i| matches!(i, Impact::Moderate)).count();
    if moderate_count * 2 > per_file.len() {
        Impact::Moderate
    } else {
        Impact::Brief
    }
}

fn extract_field(text: &str, label: &str) -> Option<String> {
    let marker = format!("**{label}**:");
    let start = text.find(&marker)? + marker.len();
    let rest = &text[start..];
    let end = rest.find('\n').unwrap_or(rest.len());
    let value = rest[..end].trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn extract_list_field(text: &str, label: &str) -> Vec<String> {
    extract_field(text, label)
        .map(|value| {
            value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bullet_response_joins_lines_and_derives_significant_impact() {
        let response = "- Added the parser\n- Fixed a bug\n- Refactored the store\n- Wrote tests";
        let extracted = extract(response);
        assert_eq!(extracted.summary, "Added the parser; Fixed a bug; Refactored the store; Wrote tests");
        assert_eq!(extracted.impact, Impact::Significant);
    }

    #[test]
    fn labeled_field_response_is_parsed_field_by_field() {
        let response = "**Summary**: Reworked the tracker\n**Topics**: parsing, storage\n**Keywords**: sha256, diff\n**Impact**: moderate";
        let extracted = extract(response);
        assert_eq!(extracted.summary, "Reworked the tracker");
        assert_eq!(extracted.topics, vec!["parsing", "storage"]);
        assert_eq!(extracted.keywords, vec!["sha256", "diff"]);
        assert_eq!(extracted.impact, Impact::Moderate);
    }

    #[test]
    fn plain_text_response_falls_back_to_whole_body_as_summary() {
        let extracted = extract("nothing of note happened");
        assert_eq!(extracted.summary, "nothing of note happened");
        assert_eq!(extracted.impact, Impact::Brief);
    }

    #[test]
    fn impact_for_change_count_matches_bullet_thresholds() {
        assert_eq!(impact_for_change_count(1), Impact::Brief);
        assert_eq!(impact_for_change_count(2), Impact::Moderate);
        assert_eq!(impact_for_change_count(4), Impact::Significant);
    }

    #[test]
    fn rollup_impact_prefers_any_significant() {
        let impacts = vec![Impact::Brief, Impact::Significant, Impact::Moderate];
        assert_eq!(rollup_impact(&impacts), Impact::Significant);
    }

    #[test]
    fn rollup_impact_requires_a_majority_of_moderate() {
        assert_eq!(rollup_impact(&[Impact::Moderate, Impact::Brief, Impact::Brief]), Impact::Brief);
        assert_eq!(rollup_impact(&[Impact::Moderate, Impact::Moderate, Impact::Brief]), Impact::Moderate);
    }
}
