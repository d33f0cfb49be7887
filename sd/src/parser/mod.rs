//! Markdown-to-rules parser
//!
//! Extracts typed rule drafts from free-form markdown standards documents
//! using three composed strategies: explicit `**Standards**:` blocks,
//! section bullets, and section numbered lists. Results are deduplicated by
//! description prefix, and category/severity are inferred from section names
//! and rule wording.

use graphstore::{Category, Example, Severity, Standard};
use regex::Regex;
use tracing::{debug, warn};

/// Minimum rule text length for a bullet to qualify
const MIN_RULE_CHARS: usize = 10;

/// Minimum whitespace-separated tokens for a bullet to qualify
const MIN_RULE_TOKENS: usize = 3;

/// Prefix length of the lowercased description used as the dedup key
const DEDUP_PREFIX_CHARS: usize = 100;

/// Bodies at or under this length use the same text for name and description
const NAME_EQ_DESCRIPTION_MAX: usize = 100;

/// Names longer than this are truncated with an ellipsis
const NAME_TRUNCATE_AT: usize = 80;

/// A parsed rule lacking only `id` and timestamps
#[derive(Debug, Clone, PartialEq)]
pub struct DraftStandard {
    pub name: String,
    pub description: String,
    pub language: String,
    pub category: Category,
    pub severity: Severity,
    pub version: String,
    pub examples: Vec<Example>,
    /// Section heading the rule was harvested from
    pub section: String,
}

impl DraftStandard {
    /// Promote the draft to a full standard, assigning id and timestamps
    pub fn into_standard(self, file_source: Option<String>) -> Standard {
        let mut standard = Standard::new(
            self.name,
            self.language,
            self.category,
            self.severity,
            self.description,
        );
        standard.version = self.version;
        standard.examples = self.examples;
        standard.file_source = file_source;
        standard
    }
}

/// Multi-strategy markdown standards parser
pub struct StandardsParser {
    version_patterns: Vec<Regex>,
    standards_label: Regex,
    block_terminator: Regex,
    section_header: Regex,
    bullet: Regex,
    numbered: Regex,
    sentence_end: Regex,
}

impl Default for StandardsParser {
    fn default() -> Self {
        Self::new()
    }
}

impl StandardsParser {
    pub fn new() -> Self {
        Self {
            version_patterns: vec![
                Regex::new(r"(?i)##\s+Version\s+([\d.]+)").expect("static regex"),
                Regex::new(r"(?i)\*\*Version\*\*:\s*([\d.]+)").expect("static regex"),
                Regex::new(r"(?i)-\s*\*\*Version\*\*:\s*([\d.]+)").expect("static regex"),
                Regex::new(r"(?i)Version:\s*([\d.]+)").expect("static regex"),
            ],
            standards_label: Regex::new(r"(?i)\*\*Standards\*\*:").expect("static regex"),
            block_terminator: Regex::new(r"(?m)\n#{2,}|\n\*\*[A-Z]").expect("static regex"),
            section_header: Regex::new(r"(?m)^#{2,4}\s+(.+)$").expect("static regex"),
            bullet: Regex::new(r"(?m)^[-*]\s+(.+)$").expect("static regex"),
            numbered: Regex::new(r"(?m)^\d+\.\s+(.+)$").expect("static regex"),
            sentence_end: Regex::new(r"[.!?]").expect("static regex"),
        }
    }

    /// Parse a document into rule drafts
    ///
    /// Never fails: unreadable bytes are logged and yield an empty list.
    pub fn parse(&self, file_bytes: &[u8], language: &str) -> Vec<DraftStandard> {
        let content = match std::str::from_utf8(file_bytes) {
            Ok(content) => content,
            Err(e) => {
                warn!(%language, error = %e, "Skipping unreadable standards file");
                return Vec::new();
            }
        };

        let version = self.extract_version(content);

        let mut drafts = Vec::new();
        drafts.extend(self.extract_explicit_blocks(content, language, &version));
        drafts.extend(self.extract_section_items(content, language, &version, &self.bullet));
        drafts.extend(self.extract_section_items(content, language, &version, &self.numbered));

        let unique = dedup_by_description(drafts);
        debug!(%language, count = unique.len(), "Parsed standards drafts");
        unique
    }

    /// First matching version marker wins; default 1.0.0
    fn extract_version(&self, content: &str) -> String {
        for pattern in &self.version_patterns {
            if let Some(caps) = pattern.captures(content) {
                return caps[1].trim_matches('.').to_string();
            }
        }
        "1.0.0".to_string()
    }

    /// Strategy 1: regions introduced by `**Standards**:`
    fn extract_explicit_blocks(&self, content: &str, language: &str, version: &str) -> Vec<DraftStandard> {
        let mut drafts = Vec::new();

        for label in self.standards_label.find_iter(content) {
            let rest = &content[label.end()..];
            let body_end = self
                .block_terminator
                .find(rest)
                .map(|m| m.start())
                .unwrap_or(rest.len());
            let body = &rest[..body_end];

            let section = self.section_before(content, label.start());
            let category = infer_category(&section);

            for caps in self.bullet.captures_iter(body) {
                if let Some(draft) = self.build_draft(&caps[1], language, category, version, &section) {
                    drafts.push(draft);
                }
            }
        }

        drafts
    }

    /// Strategies 2 and 3: bullets or numbered items under section headers
    fn extract_section_items(
        &self,
        content: &str,
        language: &str,
        version: &str,
        item_pattern: &Regex,
    ) -> Vec<DraftStandard> {
        let mut drafts = Vec::new();

        for (section, body) in self.split_sections(content) {
            if is_metadata_section(&section) {
                continue;
            }
            let category = infer_category(&section);

            for caps in item_pattern.captures_iter(body) {
                if let Some(draft) = self.build_draft(&caps[1], language, category, version, &section) {
                    drafts.push(draft);
                }
            }
        }

        drafts
    }

    /// Split at level 2-4 headers into (section name, section body) pairs
    fn split_sections<'a>(&self, content: &'a str) -> Vec<(String, &'a str)> {
        let headers: Vec<_> = self.section_header.captures_iter(content).collect();
        let mut sections = Vec::new();

        for (i, caps) in headers.iter().enumerate() {
            let name = caps[1].trim().to_string();
            let start = caps.get(0).map(|m| m.end()).unwrap_or(0);
            let end = headers
                .get(i + 1)
                .and_then(|next| next.get(0))
                .map(|m| m.start())
                .unwrap_or(content.len());
            sections.push((name, &content[start..end]));
        }

        sections
    }

    /// Nearest section header preceding `position`
    fn section_before(&self, content: &str, position: usize) -> String {
        self.section_header
            .captures_iter(&content[..position])
            .last()
            .map(|caps| caps[1].trim().to_string())
            .unwrap_or_else(|| "General".to_string())
    }

    fn build_draft(
        &self,
        raw: &str,
        language: &str,
        category: Category,
        version: &str,
        section: &str,
    ) -> Option<DraftStandard> {
        let text = raw.trim();
        if text.starts_with("```") || text.chars().count() < MIN_RULE_CHARS {
            return None;
        }
        if text.split_whitespace().count() < MIN_RULE_TOKENS {
            return None;
        }

        let (name, description) = self.split_name_description(text);
        let severity = infer_severity(text, category);

        Some(DraftStandard {
            name,
            description,
            language: language.to_string(),
            category,
            severity,
            version: version.to_string(),
            examples: Vec::new(),
            section: section.to_string(),
        })
    }

    /// Short bodies are their own name; long bodies get a truncated first sentence
    fn split_name_description(&self, text: &str) -> (String, String) {
        if text.chars().count() <= NAME_EQ_DESCRIPTION_MAX {
            return (text.to_string(), text.to_string());
        }

        let first_sentence = self
            .sentence_end
            .split(text)
            .next()
            .unwrap_or(text)
            .trim()
            .to_string();
        let name = if first_sentence.chars().count() > NAME_TRUNCATE_AT {
            let truncated: String = first_sentence.chars().take(NAME_TRUNCATE_AT).collect();
            format!("{}...", truncated)
        } else {
            first_sentence
        };

        (name, text.to_string())
    }
}

/// Sections that never carry rules
fn is_metadata_section(name: &str) -> bool {
    matches!(
        name.to_lowercase().as_str(),
        "table of contents" | "version" | "summary of changes"
    )
}

/// Map a section name to a category by keyword
pub fn infer_category(section_name: &str) -> Category {
    let name = section_name.to_lowercase();

    let keyword_sets: &[(Category, &[&str])] = &[
        (Category::ErrorHandling, &["error", "exception", "handling", "failure"]),
        (Category::Security, &["security", "auth", "validation", "privacy"]),
        (Category::Performance, &["performance", "optimization", "async", "caching"]),
        (Category::Testing, &["test", "testing", "quality"]),
        (
            Category::Architecture,
            &["structure", "organization", "architecture", "design", "pattern"],
        ),
        (Category::Style, &["style", "format", "naming", "convention"]),
        (Category::Documentation, &["documentation", "comment", "docstring"]),
        (Category::Deployment, &["deployment", "ci/cd", "devops", "docker"]),
        (Category::Api, &["api", "endpoint", "rest", "graphql"]),
    ];

    for (category, keywords) in keyword_sets {
        if keywords.iter().any(|kw| name.contains(kw)) {
            return *category;
        }
    }
    Category::BestPractices
}

/// Infer severity from rule wording, falling back to a category default
pub fn infer_severity(text: &str, category: Category) -> Severity {
    let text = text.to_lowercase();

    let keyword_sets: &[(Severity, &[&str])] = &[
        (
            Severity::Critical,
            &[
                "security",
                "vulnerability",
                "injection",
                "authentication",
                "authorization",
                "must",
                "required",
            ],
        ),
        (
            Severity::High,
            &["error", "exception", "failure", "crash", "data loss", "should"],
        ),
        (
            Severity::Medium,
            &["performance", "optimization", "best practice", "convention", "recommended"],
        ),
        (
            Severity::Low,
            &["style", "formatting", "naming", "documentation", "prefer"],
        ),
    ];

    for (severity, keywords) in keyword_sets {
        if keywords.iter().any(|kw| text.contains(kw)) {
            return *severity;
        }
    }

    match category {
        Category::Security => Severity::Critical,
        Category::ErrorHandling | Category::Performance => Severity::High,
        Category::BestPractices | Category::Architecture => Severity::Medium,
        _ => Severity::Low,
    }
}

/// Keep the first occurrence per description prefix
fn dedup_by_description(drafts: Vec<DraftStandard>) -> Vec<DraftStandard> {
    let mut seen = std::collections::HashSet::new();
    let mut unique = Vec::new();

    for draft in drafts {
        let key: String = draft
            .description
            .to_lowercase()
            .trim()
            .chars()
            .take(DEDUP_PREFIX_CHARS)
            .collect();
        if seen.insert(key) {
            unique.push(draft);
        }
    }

    unique
}

/// Render a standard back to markdown in the expected file layout
///
/// The output parses back to the same name, category, and severity, which is
/// what the deployment phase and the archive rely on.
pub fn render_markdown(standard: &Standard) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {}\n\n", standard.name));
    out.push_str(&format!("**Version**: {}\n", standard.version));
    out.push_str(&format!("**Category**: {}\n", standard.category));
    out.push_str(&format!("**Language**: {}\n", standard.language));
    out.push_str(&format!(
        "**Status**: {}\n\n",
        if standard.active { "active" } else { "inactive" }
    ));
    out.push_str(&format!("## {}\n\n", section_title(standard.category)));
    out.push_str(&format!("- {}\n", standard.description.replace('\n', " ")));

    if !standard.examples.is_empty() {
        out.push_str("\n### Examples\n");
        for example in &standard.examples {
            out.push_str(&format!("\nBefore:\n\n```\n{}\n```\n", example.before));
            out.push_str(&format!("\nAfter:\n\n```\n{}\n```\n", example.after));
        }
    }

    out
}

/// Section heading whose keywords round-trip to the category
fn section_title(category: Category) -> &'static str {
    match category {
        Category::Security => "Security",
        Category::Performance => "Performance",
        Category::Testing => "Testing",
        Category::ErrorHandling => "Error Handling",
        Category::Style => "Style",
        Category::Documentation => "Documentation",
        Category::Architecture => "Architecture",
        Category::Api => "API",
        Category::Deployment => "Deployment",
        Category::BestPractices => "Guidelines",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn parser() -> StandardsParser {
        StandardsParser::new()
    }

    #[test]
    fn test_minimal_error_handling_file() {
        let content = b"# Python Error Handling\n\n## Exceptions\n\n- Catch specific exceptions, never bare except\n";
        let drafts = parser().parse(content, "python");

        assert_eq!(drafts.len(), 1);
        let draft = &drafts[0];
        assert_eq!(draft.language, "python");
        assert_eq!(draft.category, Category::ErrorHandling);
        assert_eq!(draft.severity, Severity::High);
        assert_eq!(draft.name, "Catch specific exceptions, never bare except");
        assert_eq!(draft.name, draft.description);
        assert_eq!(draft.version, "1.0.0");
    }

    #[test]
    fn test_explicit_standards_block() {
        let content = b"## Security Rules\n\n**Standards**:\n- Validate all user input before use in queries\n- Never log credentials or API tokens anywhere\n\n## Next Section\n\nprose only\n";
        let drafts = parser().parse(content, "general");

        assert_eq!(drafts.len(), 2);
        assert!(drafts.iter().all(|d| d.category == Category::Security));
        assert_eq!(drafts[0].section, "Security Rules");
    }

    #[test]
    fn test_numbered_list_extraction() {
        let content = b"## Testing\n\n1. Write a failing test before the fix lands\n2. Keep unit tests independent of network access\n";
        let drafts = parser().parse(content, "rust");

        assert_eq!(drafts.len(), 2);
        assert!(drafts.iter().all(|d| d.category == Category::Testing));
    }

    #[test]
    fn test_version_markers() {
        let p = parser();
        for content in [
            "## Version 2.1.0\n## X\n- Something worth extracting here\n",
            "**Version**: 2.1.0\n## X\n- Something worth extracting here\n",
            "- **Version**: 2.1.0\n## X\n- Something worth extracting here\n",
            "Version: 2.1.0\n## X\n- Something worth extracting here\n",
        ] {
            let drafts = p.parse(content.as_bytes(), "general");
            assert_eq!(drafts[0].version, "2.1.0", "content: {content}");
        }
    }

    #[test]
    fn test_skips_short_and_code_bullets() {
        let content = b"## Style\n\n- ok\n- ```rust\n- short one\n- Prefer expressive names over abbreviations\n";
        let drafts = parser().parse(content, "rust");

        assert_eq!(drafts.len(), 1);
        assert!(drafts[0].description.starts_with("Prefer expressive"));
        assert_eq!(drafts[0].severity, Severity::Low);
    }

    #[test]
    fn test_metadata_sections_skipped() {
        let content = b"## Table of Contents\n\n- Not a rule despite looking like one\n\n## Version\n\n- Also not a rule despite length\n";
        let drafts = parser().parse(content, "general");
        assert!(drafts.is_empty());
    }

    #[test]
    fn test_dedup_across_strategies() {
        // The same bullet reachable via strategy 1 and strategy 2 appears once
        let content = b"## Security\n\n**Standards**:\n- Validate all user input before rendering\n";
        let drafts = parser().parse(content, "general");
        assert_eq!(drafts.len(), 1);
    }

    #[test]
    fn test_long_body_name_truncation() {
        let long = "a".repeat(120);
        let content = format!("## Guidelines\n\n- {long} tail tokens\n");
        let drafts = parser().parse(content.as_bytes(), "general");

        assert_eq!(drafts.len(), 1);
        assert!(drafts[0].name.ends_with("..."));
        assert_eq!(drafts[0].name.chars().count(), NAME_TRUNCATE_AT + 3);
        assert!(drafts[0].description.chars().count() > NAME_EQ_DESCRIPTION_MAX);
    }

    #[test]
    fn test_unreadable_bytes_yield_empty() {
        let drafts = parser().parse(&[0xff, 0xfe, 0x00, 0x80], "python");
        assert!(drafts.is_empty());
    }

    #[test]
    fn test_no_bullets_yield_empty() {
        let drafts = parser().parse(b"# Title\n\nJust prose, no lists at all.\n", "python");
        assert!(drafts.is_empty());
    }

    #[test]
    fn test_round_trip_preserves_essentials() {
        let content = b"## Exceptions\n\n- Catch specific exceptions, never bare except\n";
        let drafts = parser().parse(content, "python");
        let standard = drafts[0].clone().into_standard(None);

        let rendered = render_markdown(&standard);
        let reparsed = parser().parse(rendered.as_bytes(), "python");

        assert_eq!(reparsed.len(), 1);
        assert_eq!(reparsed[0].name, standard.name);
        assert_eq!(reparsed[0].category, standard.category);
        assert_eq!(reparsed[0].severity, standard.severity);
    }

    #[test]
    fn test_category_inference_table() {
        assert_eq!(infer_category("Error Handling"), Category::ErrorHandling);
        assert_eq!(infer_category("Authentication"), Category::Security);
        assert_eq!(infer_category("Async Performance"), Category::Performance);
        assert_eq!(infer_category("API"), Category::Api);
        assert_eq!(infer_category("Anything Else"), Category::BestPractices);
    }

    #[test]
    fn test_severity_category_defaults() {
        assert_eq!(infer_severity("no keywords at all", Category::Security), Severity::Critical);
        assert_eq!(infer_severity("no keywords at all", Category::Performance), Severity::High);
        assert_eq!(infer_severity("no keywords at all", Category::Architecture), Severity::Medium);
        assert_eq!(infer_severity("no keywords at all", Category::Api), Severity::Low);
    }

    proptest! {
        // Parsing output never carries two drafts with the same dedup prefix
        #[test]
        fn prop_drafts_unique_by_description_prefix(lines in proptest::collection::vec("[a-z ]{10,120}", 0..20)) {
            let content = format!(
                "## Guidelines\n\n{}\n",
                lines.iter().map(|l| format!("- {l}")).collect::<Vec<_>>().join("\n")
            );
            let drafts = parser().parse(content.as_bytes(), "general");

            let mut keys = std::collections::HashSet::new();
            for draft in &drafts {
                let key: String = draft.description.to_lowercase().trim().chars().take(100).collect();
                prop_assert!(keys.insert(key), "duplicate dedup key in output");
            }
        }
    }
}
