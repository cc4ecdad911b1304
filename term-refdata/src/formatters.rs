//! Result formatting and reporting for reference data matching results.
//!
//! This module provides different formatters for [`AggregateResult`]s, allowing
//! users to output results as JSON, human-readable text, or Markdown for
//! documentation purposes.
//!
//! # Examples
//!
//! ```rust
//! use term_refdata::formatters::{HumanFormatter, ResultFormatter};
//!
//! let formatter = HumanFormatter::new();
//! // let result: AggregateResult = engine.finish()?;
//! // let output = formatter.format(&result)?;
//! ```

use std::fmt::Write;

use serde_json::json;

use crate::aggregate::AggregateResult;
use crate::error::{RefDataError, Result};
use crate::matching::MatchOutcome;

/// Configuration options for formatting matching results.
#[derive(Debug, Clone)]
pub struct FormatterConfig {
    /// Include per output column statistics
    pub include_columns: bool,
    /// Include the co-occurrence matrix, when it was tracked
    pub include_co_occurrence: bool,
    /// Include the value combinations, when they were tracked
    pub include_combinations: bool,
    /// Maximum number of combinations to display (-1 for all)
    pub max_combinations: i32,
    /// Whether to use colorized output (for human formatter)
    pub use_colors: bool,
    /// Whether to include timestamps in output
    pub include_timestamps: bool,
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self {
            include_columns: true,
            include_co_occurrence: true,
            include_combinations: true,
            max_combinations: 20,
            use_colors: true,
            include_timestamps: true,
        }
    }
}

impl FormatterConfig {
    /// Creates a minimal configuration showing only the summary.
    pub fn minimal() -> Self {
        Self {
            include_columns: false,
            include_co_occurrence: false,
            include_combinations: false,
            max_combinations: 0,
            use_colors: false,
            include_timestamps: false,
        }
    }

    /// Creates a detailed configuration showing everything.
    pub fn detailed() -> Self {
        Self {
            max_combinations: -1,
            ..Self::default()
        }
    }

    /// Creates a configuration suitable for CI/CD environments.
    pub fn ci() -> Self {
        Self {
            include_co_occurrence: false,
            max_combinations: 10,
            use_colors: false,
            ..Self::default()
        }
    }

    pub fn with_columns(mut self, include: bool) -> Self {
        self.include_columns = include;
        self
    }

    pub fn with_co_occurrence(mut self, include: bool) -> Self {
        self.include_co_occurrence = include;
        self
    }

    pub fn with_combinations(mut self, include: bool) -> Self {
        self.include_combinations = include;
        self
    }

    /// Sets the maximum number of combinations to display.
    pub fn with_max_combinations(mut self, max: i32) -> Self {
        self.max_combinations = max;
        self
    }

    /// Sets whether to use colorized output.
    pub fn with_colors(mut self, use_colors: bool) -> Self {
        self.use_colors = use_colors;
        self
    }

    fn combination_limit(&self, available: usize) -> usize {
        if !self.include_combinations {
            0
        } else if self.max_combinations < 0 {
            available
        } else {
            available.min(self.max_combinations as usize)
        }
    }
}

/// Trait for formatting matching results into different output formats.
///
/// # Examples
///
/// ```rust
/// use term_refdata::aggregate::AggregateResult;
/// use term_refdata::formatters::ResultFormatter;
///
/// struct RowCountFormatter;
///
/// impl ResultFormatter for RowCountFormatter {
///     fn format(&self, result: &AggregateResult) -> term_refdata::error::Result<String> {
///         Ok(format!("{} rows", result.rows_processed))
///     }
/// }
/// ```
pub trait ResultFormatter {
    /// Formats a result into a string representation.
    fn format(&self, result: &AggregateResult) -> Result<String>;

    /// Formats a result with custom configuration.
    fn format_with_config(
        &self,
        result: &AggregateResult,
        _config: &FormatterConfig,
    ) -> Result<String> {
        self.format(result)
    }
}

fn render_error(e: std::fmt::Error) -> RefDataError {
    RefDataError::Serialization(format!("Failed to render result: {e}"))
}

fn outcome_vector(outcomes: &[MatchOutcome]) -> String {
    outcomes.iter().map(MatchOutcome::symbol).collect()
}

fn ratio(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |r| format!("{:.1}%", r * 100.0))
}

/// Formats results as structured JSON.
///
/// # Examples
///
/// ```rust
/// use term_refdata::aggregate::{AggregateOptions, AggregateResult, AggregateState};
/// use term_refdata::formatters::{JsonFormatter, ResultFormatter};
/// use term_refdata::matching::OutputSchema;
/// use term_refdata::reference::Dictionary;
/// use term_refdata::value::Column;
///
/// let schema = OutputSchema::derive(&[Column::utf8("a")], &[Dictionary::new("d", ["x"])], &[], &[]).unwrap();
/// let state = AggregateState::empty(&schema, AggregateOptions::default());
/// let result = AggregateResult::from_state(&schema, &state).unwrap();
///
/// let json = JsonFormatter::new().format(&result).unwrap();
/// assert!(json.contains("\"a in d\""));
/// ```
#[derive(Debug, Clone)]
pub struct JsonFormatter {
    config: FormatterConfig,
    pretty: bool,
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self {
            config: FormatterConfig::default(),
            pretty: true,
        }
    }

    pub fn with_config(config: FormatterConfig) -> Self {
        Self {
            config,
            pretty: true,
        }
    }

    /// Sets whether to use pretty-printed JSON.
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

impl Default for JsonFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultFormatter for JsonFormatter {
    fn format(&self, result: &AggregateResult) -> Result<String> {
        self.format_with_config(result, &self.config)
    }

    fn format_with_config(
        &self,
        result: &AggregateResult,
        config: &FormatterConfig,
    ) -> Result<String> {
        let mut document = json!({
            "status": if result.has_release_errors() { "completed_with_release_errors" } else { "completed" },
            "rows_processed": result.rows_processed,
            "partitions": result.metadata.partitions,
            "release_errors": result.release_errors,
        });

        if config.include_timestamps {
            document["completed_at"] = json!(result.metadata.completed_at);
        }
        if config.include_columns {
            document["columns"] = json!(result.columns);
        }
        if config.include_co_occurrence {
            if let Some(matrix) = &result.co_occurrence {
                document["co_occurrence"] = json!(matrix);
            }
        }
        let shown = config.combination_limit(result.combinations.len());
        if shown > 0 {
            document["combinations"] = json!(result.combinations[..shown]);
        }

        let output = if self.pretty {
            serde_json::to_string_pretty(&document)?
        } else {
            serde_json::to_string(&document)?
        };
        Ok(output)
    }
}

/// Formats results in a human-readable format suitable for console output.
#[derive(Debug, Clone)]
pub struct HumanFormatter {
    config: FormatterConfig,
}

impl HumanFormatter {
    pub fn new() -> Self {
        Self {
            config: FormatterConfig::default(),
        }
    }

    pub fn with_config(config: FormatterConfig) -> Self {
        Self { config }
    }

    fn render(
        &self,
        result: &AggregateResult,
        config: &FormatterConfig,
        output: &mut String,
    ) -> std::fmt::Result {
        let paint = |text: &str, color: &str| {
            if config.use_colors {
                format!("\x1b[{color}m{text}\x1b[0m")
            } else {
                text.to_string()
            }
        };

        writeln!(output)?;
        if result.has_release_errors() {
            writeln!(output, "⚠️  {}", paint("Matching completed with release errors", "33"))?;
        } else {
            writeln!(output, "✅ {}", paint("Matching completed", "32"))?;
        }
        writeln!(output)?;
        writeln!(output, "Rows processed: {}", result.rows_processed)?;
        writeln!(output, "Partitions: {}", result.metadata.partitions)?;
        if config.include_timestamps {
            writeln!(output, "Completed at: {}", result.metadata.completed_at)?;
        }

        if config.include_columns {
            writeln!(output)?;
            writeln!(output, "📊 Output Columns:")?;
            for column in &result.columns {
                writeln!(output, "   {}", column.name)?;
                writeln!(
                    output,
                    "      matched: {}  unmatched: {}  unavailable: {}  ratio: {}",
                    paint(&column.true_count.to_string(), "32"),
                    column.false_count,
                    if column.unavailable_count > 0 {
                        paint(&column.unavailable_count.to_string(), "33")
                    } else {
                        "0".to_string()
                    },
                    ratio(column.match_ratio)
                )?;
            }
        }

        if config.include_co_occurrence {
            if let Some(matrix) = &result.co_occurrence {
                writeln!(output)?;
                writeln!(output, "🔗 Co-occurrence (rows where both matched):")?;
                for (column, row) in result.columns.iter().zip(matrix) {
                    let cells: Vec<String> = row.iter().map(u64::to_string).collect();
                    writeln!(output, "   {:<30} {}", column.name, cells.join(" "))?;
                }
            }
        }

        let shown = config.combination_limit(result.combinations.len());
        if shown > 0 {
            writeln!(output)?;
            writeln!(output, "🧮 Value Combinations (T = match, F = no match, U = unavailable):")?;
            for combination in &result.combinations[..shown] {
                writeln!(
                    output,
                    "   {}  {}",
                    outcome_vector(&combination.outcomes),
                    combination.count
                )?;
            }
            if result.combinations.len() > shown {
                writeln!(
                    output,
                    "   ... and {} more combinations",
                    result.combinations.len() - shown
                )?;
            }
        }

        if result.has_release_errors() {
            writeln!(output)?;
            writeln!(output, "🚨 Release Errors:")?;
            for failure in result.release_errors.iter() {
                writeln!(output, "   {}: {}", paint(&failure.catalog, "31"), failure.message)?;
            }
        }

        writeln!(output)
    }
}

impl Default for HumanFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultFormatter for HumanFormatter {
    fn format(&self, result: &AggregateResult) -> Result<String> {
        self.format_with_config(result, &self.config)
    }

    fn format_with_config(
        &self,
        result: &AggregateResult,
        config: &FormatterConfig,
    ) -> Result<String> {
        let mut output = String::new();
        self.render(result, config, &mut output)
            .map_err(render_error)?;
        Ok(output)
    }
}

/// Formats results as Markdown suitable for documentation.
#[derive(Debug, Clone)]
pub struct MarkdownFormatter {
    config: FormatterConfig,
    heading_level: u8,
}

impl MarkdownFormatter {
    pub fn new() -> Self {
        Self {
            config: FormatterConfig::default(),
            heading_level: 2,
        }
    }

    pub fn with_config(config: FormatterConfig) -> Self {
        Self {
            config,
            heading_level: 2,
        }
    }

    /// Sets the base heading level for the output.
    pub fn with_heading_level(mut self, level: u8) -> Self {
        self.heading_level = level.clamp(1, 6);
        self
    }

    fn render(
        &self,
        result: &AggregateResult,
        config: &FormatterConfig,
        output: &mut String,
    ) -> std::fmt::Result {
        let h = "#".repeat(self.heading_level as usize);

        writeln!(output, "{h} Reference Data Match Report")?;
        writeln!(output)?;
        writeln!(output, "**Rows processed:** {}", result.rows_processed)?;
        writeln!(output, "**Partitions:** {}", result.metadata.partitions)?;
        if config.include_timestamps {
            writeln!(output, "**Completed at:** {}", result.metadata.completed_at)?;
        }

        if config.include_columns {
            writeln!(output)?;
            writeln!(output, "{h}# Output Columns")?;
            writeln!(output)?;
            writeln!(output, "| Output | Source kind | Matched | Unmatched | Unavailable | Ratio |")?;
            writeln!(output, "|--------|-------------|---------|-----------|-------------|-------|")?;
            for column in &result.columns {
                writeln!(
                    output,
                    "| {} | {} | {} | {} | {} | {} |",
                    column.name,
                    column.kind,
                    column.true_count,
                    column.false_count,
                    column.unavailable_count,
                    ratio(column.match_ratio)
                )?;
            }
        }

        if config.include_co_occurrence {
            if let Some(matrix) = &result.co_occurrence {
                writeln!(output)?;
                writeln!(output, "{h}# Co-occurrence")?;
                writeln!(output)?;
                let header: Vec<String> = (1..=matrix.len()).map(|i| i.to_string()).collect();
                writeln!(output, "| # | Output | {} |", header.join(" | "))?;
                writeln!(output, "|---|--------|{}", "---|".repeat(matrix.len()))?;
                for (i, (column, row)) in result.columns.iter().zip(matrix).enumerate() {
                    let cells: Vec<String> = row.iter().map(u64::to_string).collect();
                    writeln!(output, "| {} | {} | {} |", i + 1, column.name, cells.join(" | "))?;
                }
            }
        }

        let shown = config.combination_limit(result.combinations.len());
        if shown > 0 {
            writeln!(output)?;
            writeln!(output, "{h}# Value Combinations")?;
            writeln!(output)?;
            writeln!(output, "| Outcomes | Rows |")?;
            writeln!(output, "|----------|------|")?;
            for combination in &result.combinations[..shown] {
                writeln!(
                    output,
                    "| `{}` | {} |",
                    outcome_vector(&combination.outcomes),
                    combination.count
                )?;
            }
            if result.combinations.len() > shown {
                writeln!(output)?;
                writeln!(
                    output,
                    "> **Note:** {} additional combinations not shown in this report.",
                    result.combinations.len() - shown
                )?;
            }
        }

        if result.has_release_errors() {
            writeln!(output)?;
            writeln!(output, "{h}# Release Errors")?;
            writeln!(output)?;
            for failure in result.release_errors.iter() {
                writeln!(output, "- **{}:** {}", failure.catalog, failure.message)?;
            }
        }

        Ok(())
    }
}

impl Default for MarkdownFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultFormatter for MarkdownFormatter {
    fn format(&self, result: &AggregateResult) -> Result<String> {
        self.format_with_config(result, &self.config)
    }

    fn format_with_config(
        &self,
        result: &AggregateResult,
        config: &FormatterConfig,
    ) -> Result<String> {
        let mut output = String::new();
        self.render(result, config, &mut output)
            .map_err(render_error)?;
        Ok(output)
    }
}
