//! String patterns: named conformance rules tested against values.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{RefDataError, Result};

/// Maximum accepted length of a user supplied regular expression.
const MAX_PATTERN_LENGTH: usize = 1000;

/// Splits a simple pattern into runs of the same token class.
static SIMPLE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[aA]+|9+|\s+|.").expect("Failed to compile simple token regex"));

/// Declarative form of a string pattern, as it appears in configuration files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PatternDefinition {
    /// A regular expression.
    Regex {
        expression: String,
        #[serde(default = "default_true")]
        case_sensitive: bool,
        #[serde(default = "default_true")]
        match_entire_string: bool,
    },
    /// A token template such as `aaaa@aaaa.aa` or `9999 AA`.
    Simple { expression: String },
}

fn default_true() -> bool {
    true
}

/// A compiled, named string pattern.
///
/// # Example
///
/// ```rust
/// use term_refdata::reference::StringPattern;
///
/// let zip = StringPattern::regex("usZip", r"\d{5}(-\d{4})?").unwrap();
/// assert!(zip.matches("12345"));
/// assert!(!zip.matches("1234"));
///
/// let email = StringPattern::simple("simpleEmail", "aaaa@aaaa.aa").unwrap();
/// assert!(email.matches("john@example.com"));
/// assert!(!email.matches("john at example.com"));
/// ```
#[derive(Debug, Clone)]
pub struct StringPattern {
    name: String,
    definition: PatternDefinition,
    compiled: Regex,
}

impl StringPattern {
    /// Creates a case-sensitive regex pattern that must match the entire value.
    pub fn regex(name: impl Into<String>, expression: impl Into<String>) -> Result<Self> {
        Self::from_definition(
            name,
            PatternDefinition::Regex {
                expression: expression.into(),
                case_sensitive: true,
                match_entire_string: true,
            },
        )
    }

    /// Creates a pattern from a simple token template.
    ///
    /// Runs of lowercase `a` match lowercase letters, runs of `A` match uppercase
    /// letters, mixed `a`/`A` runs match any letters, runs of `9` match digits and
    /// whitespace runs match whitespace. Every other character matches itself.
    pub fn simple(name: impl Into<String>, expression: impl Into<String>) -> Result<Self> {
        Self::from_definition(
            name,
            PatternDefinition::Simple {
                expression: expression.into(),
            },
        )
    }

    pub fn from_definition(name: impl Into<String>, definition: PatternDefinition) -> Result<Self> {
        let name = name.into();
        let compiled = match &definition {
            PatternDefinition::Regex {
                expression,
                case_sensitive,
                match_entire_string,
            } => {
                validate_expression(&name, expression)?;
                let source = if *match_entire_string {
                    format!("^(?:{expression})$")
                } else {
                    expression.clone()
                };
                RegexBuilder::new(&source)
                    .case_insensitive(!case_sensitive)
                    .build()
                    .map_err(|e| {
                        RefDataError::configuration(format!(
                            "String pattern '{name}' has an invalid regex: {e}"
                        ))
                    })?
            }
            PatternDefinition::Simple { expression } => {
                validate_expression(&name, expression)?;
                if expression.is_empty() {
                    return Err(RefDataError::configuration(format!(
                        "String pattern '{name}' has an empty expression"
                    )));
                }
                Regex::new(&simple_to_regex(expression)).map_err(|e| {
                    RefDataError::configuration(format!(
                        "String pattern '{name}' could not be compiled: {e}"
                    ))
                })?
            }
        };

        Ok(Self {
            name,
            definition,
            compiled,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn definition(&self) -> &PatternDefinition {
        &self.definition
    }

    /// Tests whether `value` conforms to this pattern.
    pub fn matches(&self, value: &str) -> bool {
        self.compiled.is_match(value)
    }
}

fn validate_expression(name: &str, expression: &str) -> Result<()> {
    if expression.len() > MAX_PATTERN_LENGTH {
        return Err(RefDataError::configuration(format!(
            "String pattern '{name}' is too long (max {MAX_PATTERN_LENGTH} characters)"
        )));
    }
    if expression.contains('\0') {
        return Err(RefDataError::configuration(format!(
            "String pattern '{name}' cannot contain null bytes"
        )));
    }
    Ok(())
}

fn simple_to_regex(expression: &str) -> String {
    let mut out = String::from("^");
    for token in SIMPLE_TOKEN.find_iter(expression) {
        let text = token.as_str();
        let first = text.chars().next().unwrap_or_default();
        let class = if first == 'a' || first == 'A' {
            if text.chars().all(|c| c == 'a') {
                r"\p{Ll}+"
            } else if text.chars().all(|c| c == 'A') {
                r"\p{Lu}+"
            } else {
                r"\p{L}+"
            }
        } else if first == '9' {
            r"\d+"
        } else if first.is_whitespace() {
            r"\s+"
        } else {
            out.push_str(&regex::escape(text));
            continue;
        };
        out.push_str(class);
    }
    out.push('$');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regex_entire_string() {
        let pattern = StringPattern::regex("digits", r"\d+").unwrap();
        assert!(pattern.matches("123"));
        assert!(!pattern.matches("a123"));
        assert!(!pattern.matches(""));
    }

    #[test]
    fn test_regex_partial_and_case() {
        let pattern = StringPattern::from_definition(
            "hasFoo",
            PatternDefinition::Regex {
                expression: "foo".to_string(),
                case_sensitive: false,
                match_entire_string: false,
            },
        )
        .unwrap();
        assert!(pattern.matches("xxFOOxx"));
        assert!(!pattern.matches("bar"));
    }

    #[test]
    fn test_invalid_regex_is_configuration_error() {
        let err = StringPattern::regex("broken", "([a-z").unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("broken"));

        let long = "a".repeat(MAX_PATTERN_LENGTH + 1);
        assert!(StringPattern::regex("long", long).is_err());
        assert!(StringPattern::regex("nul", "a\0b").is_err());
        assert!(StringPattern::simple("empty", "").is_err());
    }

    #[test]
    fn test_simple_pattern_translation() {
        assert_eq!(simple_to_regex("aaaa@aaaa.aa"), r"^\p{Ll}+@\p{Ll}+\.\p{Ll}+$");
        assert_eq!(simple_to_regex("9999 AA"), r"^\d+\s+\p{Lu}+$");
        assert_eq!(simple_to_regex("Aaaa"), r"^\p{L}+$");
    }

    #[test]
    fn test_simple_pattern_matching() {
        let postcode = StringPattern::simple("nlPostcode", "9999 AA").unwrap();
        assert!(postcode.matches("1234 AB"));
        assert!(postcode.matches("12 ABC"));
        assert!(!postcode.matches("1234 ab"));
        assert!(!postcode.matches("1234AB"));
    }

    #[test]
    fn test_definition_serde() {
        let json = r#"{"type":"regex","expression":"\\d+"}"#;
        let definition: PatternDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(
            definition,
            PatternDefinition::Regex {
                expression: r"\d+".to_string(),
                case_sensitive: true,
                match_entire_string: true,
            }
        );
    }
}
