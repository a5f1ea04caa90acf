//! Line filter / colorize rules applied by `listen`.
//!
//! ```toml
//! [[rules]]
//! filter = { include = "ERROR", exclude = ["healthcheck", "ping"] }
//! format = { line = "red", match = "bold bright red" }
//! ```
//!
//! Every rule's filter sees the raw line; a rejection drops the line. The
//! first rule that carries a `format` renders it.

mod style;

pub use style::parse_style;

use owo_colors::{OwoColorize, Style};
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// Configuration
// ============================================================================

/// One `[[rules]]` entry as written in `logmesh.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    pub filter: Option<FilterConfig>,
    pub format: Option<FormatConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// All must match.
    pub include: Patterns,
    /// None may match.
    pub exclude: Patterns,
}

/// A single pattern or a list of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Patterns {
    One(String),
    Many(Vec<String>),
}

impl Default for Patterns {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl Patterns {
    pub fn as_slice(&self) -> &[String] {
        match self {
            Self::One(pattern) => std::slice::from_ref(pattern),
            Self::Many(patterns) => patterns,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FormatConfig {
    /// Style for the whole line.
    pub line: Option<String>,
    /// Style for the span of the first include match.
    #[serde(rename = "match")]
    pub matched: Option<String>,
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("invalid pattern `{pattern}`")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("unknown style `{0}`")]
    Style(String),
}

// ============================================================================
// Compiled rules
// ============================================================================

struct Filter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl Filter {
    fn compile(config: &FilterConfig) -> Result<Self, RuleError> {
        Ok(Self {
            include: compile_all(config.include.as_slice())?,
            exclude: compile_all(config.exclude.as_slice())?,
        })
    }

    /// Span to highlight, or `None` if the line is rejected.
    fn check(&self, line: &str) -> Option<(usize, usize)> {
        let mut span = None;
        for pattern in &self.include {
            let found = pattern.find(line)?;
            span.get_or_insert((found.start(), found.end()));
        }
        if self.exclude.iter().any(|p| p.is_match(line)) {
            return None;
        }
        Some(span.unwrap_or((0, line.len())))
    }
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>, RuleError> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|source| RuleError::Pattern {
                pattern: pattern.clone(),
                source,
            })
        })
        .collect()
}

struct Format {
    line: Option<Style>,
    matched: Option<Style>,
}

impl Format {
    fn compile(config: &FormatConfig) -> Result<Self, RuleError> {
        Ok(Self {
            line: config.line.as_deref().map(parse_style).transpose()?,
            matched: config.matched.as_deref().map(parse_style).transpose()?,
        })
    }

    fn render(&self, line: &str, (start, end): (usize, usize)) -> String {
        let paint = |text: &str, style: Option<Style>| match style {
            Some(style) if !text.is_empty() => text.style(style).to_string(),
            _ => text.to_string(),
        };
        let mut out = paint(&line[..start], self.line);
        out.push_str(&paint(&line[start..end], self.matched.or(self.line)));
        out.push_str(&paint(&line[end..], self.line));
        out
    }
}

/// A compiled `[[rules]]` entry.
pub struct Rule {
    filter: Option<Filter>,
    format: Option<Format>,
}

impl Rule {
    pub fn compile(config: &RuleConfig) -> Result<Self, RuleError> {
        Ok(Self {
            filter: config.filter.as_ref().map(Filter::compile).transpose()?,
            format: config.format.as_ref().map(Format::compile).transpose()?,
        })
    }

    fn check(&self, line: &str) -> Option<(usize, usize)> {
        match &self.filter {
            Some(filter) => filter.check(line),
            None => Some((0, line.len())),
        }
    }
}

/// Ordered rule set; empty means every line passes unchanged.
#[derive(Default)]
pub struct Rules {
    rules: Vec<Rule>,
}

impl Rules {
    pub fn compile(configs: &[RuleConfig]) -> Result<Self, RuleError> {
        let rules = configs
            .iter()
            .map(Rule::compile)
            .collect::<Result<_, _>>()?;
        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Filter and render one line. `None` means drop it.
    pub fn process(&self, line: &str) -> Option<String> {
        let mut rendered = None;
        for rule in &self.rules {
            let span = rule.check(line)?;
            if rendered.is_none()
                && let Some(format) = &rule.format
            {
                rendered = Some(format.render(line, span));
            }
        }
        Some(rendered.unwrap_or_else(|| line.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(toml_src: &str) -> Rules {
        #[derive(Deserialize)]
        struct Doc {
            rules: Vec<RuleConfig>,
        }
        let doc: Doc = toml::from_str(toml_src).unwrap();
        Rules::compile(&doc.rules).unwrap()
    }

    #[test]
    fn test_empty_rules_pass_through() {
        let rules = Rules::default();
        assert!(rules.is_empty());
        assert_eq!(rules.process("anything").as_deref(), Some("anything"));
    }

    #[test]
    fn test_include_must_all_match() {
        let rules = rules(
            r#"
            [[rules]]
            filter = { include = ["ERROR", "db"] }
            "#,
        );
        assert!(rules.process("ERROR in db pool").is_some());
        assert!(rules.process("ERROR in cache").is_none());
        assert!(rules.process("INFO db ok").is_none());
    }

    #[test]
    fn test_single_string_pattern() {
        let rules = rules(
            r#"
            [[rules]]
            filter = { include = "WARN" }
            "#,
        );
        assert!(rules.process("WARN low disk").is_some());
        assert!(rules.process("INFO fine").is_none());
    }

    #[test]
    fn test_exclude_only_keeps_other_lines() {
        let rules = rules(
            r#"
            [[rules]]
            filter = { exclude = ["healthcheck", "^DEBUG"] }
            "#,
        );
        assert_eq!(rules.process("GET /api").as_deref(), Some("GET /api"));
        assert!(rules.process("GET /healthcheck").is_none());
        assert!(rules.process("DEBUG noise").is_none());
    }

    #[test]
    fn test_match_span_is_styled() {
        let rules = rules(
            r#"
            [[rules]]
            filter = { include = "disk" }
            format = { match = "red" }
            "#,
        );
        let out = rules.process("error: disk full").unwrap();
        assert!(out.starts_with("error: "));
        assert!(out.ends_with(" full"));
        assert!(out.contains("\x1b["));
        assert!(out.contains("disk"));
    }

    #[test]
    fn test_line_style_covers_whole_line() {
        let rules = rules(
            r#"
            [[rules]]
            format = { line = "blue" }
            "#,
        );
        let out = rules.process("hello").unwrap();
        assert_ne!(out, "hello");
        assert!(out.contains("hello"));
    }

    #[test]
    fn test_first_format_wins_and_every_filter_applies() {
        let rules = rules(
            r#"
            [[rules]]
            filter = { exclude = "secret" }

            [[rules]]
            filter = { include = "ERROR" }
            format = { line = "red" }

            [[rules]]
            format = { line = "green" }
            "#,
        );
        assert!(rules.process("ERROR secret token").is_none());
        assert!(rules.process("INFO fine").is_none());

        // Match span and remainder both take the line style
        let red = parse_style("red").unwrap();
        let expected = format!("{}{}", "ERROR".style(red), " boom".style(red));
        assert_eq!(rules.process("ERROR boom"), Some(expected));
    }

    #[test]
    fn test_invalid_regex_is_error() {
        let config = RuleConfig {
            filter: Some(FilterConfig {
                include: Patterns::One("(unclosed".into()),
                exclude: Patterns::default(),
            }),
            format: None,
        };
        assert!(matches!(
            Rule::compile(&config),
            Err(RuleError::Pattern { .. })
        ));
    }

    #[test]
    fn test_unknown_style_is_error() {
        let config = RuleConfig {
            filter: None,
            format: Some(FormatConfig {
                line: Some("sparkly".into()),
                matched: None,
            }),
        };
        assert!(matches!(Rule::compile(&config), Err(RuleError::Style(_))));
    }
}
