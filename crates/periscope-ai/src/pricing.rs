//! Token cost estimation
//!
//! Stored pricing rows are scanned in order; the first pattern matching the
//! model supplies the prices. On miss, a built-in table of common model name
//! substrings applies. All arithmetic is integer micro-dollars.

use once_cell::sync::Lazy;
use periscope_core::PricingEntry;
use regex::RegexBuilder;

/// Estimated cost split, in integer micro-dollars.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CostBreakdown {
    pub input_micros: i64,
    pub output_micros: i64,
    pub total_micros: i64,
}

/// Built-in per-million prices (input, output) in micro-dollars, ordered so
/// the more specific substring is tried first (`gpt-4o-mini` before
/// `gpt-4o`, `claude-3.5-sonnet` before `claude-3-sonnet`).
static DEFAULT_PRICES: Lazy<Vec<(&'static str, i64, i64)>> = Lazy::new(|| {
    vec![
        ("gpt-4o-mini", 150_000, 600_000),
        ("gpt-4o", 2_500_000, 10_000_000),
        ("gpt-4-turbo", 10_000_000, 30_000_000),
        ("gpt-3.5-turbo", 500_000, 1_500_000),
        ("gpt-4", 30_000_000, 60_000_000),
        ("claude-3.5-sonnet", 3_000_000, 15_000_000),
        ("claude-3-opus", 15_000_000, 75_000_000),
        ("claude-3-sonnet", 3_000_000, 15_000_000),
        ("claude-3-haiku", 250_000, 1_250_000),
    ]
});

/// Estimate the cost of an exchange. `rows` are the stored pricing entries
/// for the request's provider, in stored order. Returns zeroes when the
/// model is unknown or no tokens were counted.
pub fn estimate_cost(
    model: Option<&str>,
    prompt_tokens: Option<i64>,
    completion_tokens: Option<i64>,
    rows: &[PricingEntry],
) -> CostBreakdown {
    let Some(model) = model else {
        return CostBreakdown::default();
    };
    let prompt = prompt_tokens.unwrap_or(0);
    let completion = completion_tokens.unwrap_or(0);
    if prompt == 0 && completion == 0 {
        return CostBreakdown::default();
    }

    let Some((input_price, output_price)) = lookup_prices(model, rows) else {
        return CostBreakdown::default();
    };

    let input_micros = token_cost(prompt, input_price);
    let output_micros = token_cost(completion, output_price);
    CostBreakdown {
        input_micros,
        output_micros,
        total_micros: input_micros + output_micros,
    }
}

fn lookup_prices(model: &str, rows: &[PricingEntry]) -> Option<(i64, i64)> {
    for row in rows {
        // A pattern that fails to compile is skipped, never an error.
        let Ok(pattern) = RegexBuilder::new(&row.model_pattern)
            .case_insensitive(true)
            .build()
        else {
            continue;
        };
        if pattern.is_match(model) {
            return Some((row.input_price_per_million, row.output_price_per_million));
        }
    }

    let model_lower = model.to_lowercase();
    DEFAULT_PRICES
        .iter()
        .find(|(name, _, _)| model_lower.contains(name))
        .map(|(_, input, output)| (*input, *output))
}

fn token_cost(tokens: i64, price_per_million: i64) -> i64 {
    (tokens as f64 / 1_000_000.0 * price_per_million as f64).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pattern: &str, input: i64, output: i64) -> PricingEntry {
        PricingEntry {
            provider: "openai".to_string(),
            model_pattern: pattern.to_string(),
            input_price_per_million: input,
            output_price_per_million: output,
        }
    }

    #[test]
    fn null_model_or_zero_tokens_cost_nothing() {
        assert_eq!(
            estimate_cost(None, Some(100), Some(100), &[]),
            CostBreakdown::default()
        );
        assert_eq!(
            estimate_cost(Some("gpt-4o"), None, None, &[]),
            CostBreakdown::default()
        );
        assert_eq!(
            estimate_cost(Some("gpt-4o"), Some(0), Some(0), &[]),
            CostBreakdown::default()
        );
    }

    #[test]
    fn first_matching_row_wins() {
        let rows = vec![
            row("^gpt-4o$", 1_000_000, 2_000_000),
            row("gpt-4o", 9_000_000, 9_000_000),
        ];
        let cost = estimate_cost(Some("gpt-4o"), Some(1_000_000), Some(1_000_000), &rows);
        assert_eq!(cost.input_micros, 1_000_000);
        assert_eq!(cost.output_micros, 2_000_000);
        assert_eq!(cost.total_micros, 3_000_000);
    }

    #[test]
    fn row_patterns_match_case_insensitively() {
        let rows = vec![row("GPT-4O", 1_000_000, 1_000_000)];
        let cost = estimate_cost(Some("gpt-4o-2024"), Some(1_000_000), None, &rows);
        assert_eq!(cost.input_micros, 1_000_000);
    }

    #[test]
    fn invalid_patterns_are_skipped() {
        let rows = vec![
            row("(unclosed", 9_000_000, 9_000_000),
            row("gpt-4o", 1_000_000, 1_000_000),
        ];
        let cost = estimate_cost(Some("gpt-4o"), Some(1_000_000), None, &rows);
        assert_eq!(cost.input_micros, 1_000_000);
    }

    #[test]
    fn builtin_prices_apply_on_table_miss() {
        // 10 prompt tokens at $0.15/M and 2 completion tokens at $0.60/M,
        // rounded per component.
        let cost = estimate_cost(Some("gpt-4o-mini"), Some(10), Some(2), &[]);
        assert_eq!(cost.input_micros, 2);
        assert_eq!(cost.output_micros, 1);
        assert_eq!(cost.total_micros, 3);
    }

    #[test]
    fn more_specific_builtin_substring_wins() {
        let mini = estimate_cost(Some("gpt-4o-mini-2024-07-18"), Some(1_000_000), None, &[]);
        assert_eq!(mini.input_micros, 150_000);

        let full = estimate_cost(Some("gpt-4o-2024-08-06"), Some(1_000_000), None, &[]);
        assert_eq!(full.input_micros, 2_500_000);
    }

    #[test]
    fn unknown_model_costs_nothing() {
        assert_eq!(
            estimate_cost(Some("llama-3.1-70b"), Some(100), Some(100), &[]),
            CostBreakdown::default()
        );
    }

    #[test]
    fn cost_is_linear_in_token_counts() {
        let base = estimate_cost(Some("gpt-4"), Some(1_000), Some(1_000), &[]);
        let double = estimate_cost(Some("gpt-4"), Some(2_000), Some(2_000), &[]);
        assert_eq!(double.input_micros, base.input_micros * 2);
        assert_eq!(double.output_micros, base.output_micros * 2);
    }
}
