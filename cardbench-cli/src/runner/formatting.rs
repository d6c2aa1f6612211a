//! Output Formatting
//!
//! Terminal-friendly summaries printed at the end of a run.

use cardbench_core::{AggregateAnswer, AggregateTriple, Value};
use cardbench_stats::ErrorSummary;

/// Format per-estimator error summaries as a table
pub fn format_error_summaries(summaries: &[(String, Option<ErrorSummary>)]) -> String {
    let width = summaries
        .iter()
        .map(|(name, _)| name.len())
        .max()
        .unwrap_or(0)
        .max("estimator".len());

    let mut output = String::new();
    output.push('\n');
    output.push_str(&format!(
        "{:<width$}  {:>7}  {:>10}  {:>10}  {:>10}  {:>10}\n",
        "estimator", "queries", "max", "99th", "95th", "median"
    ));
    output.push_str(&"-".repeat(width + 57));
    output.push('\n');

    for (name, summary) in summaries {
        match summary {
            Some(s) => output.push_str(&format!(
                "{:<width$}  {:>7}  {:>10.3}  {:>10.3}  {:>10.3}  {:>10.3}\n",
                name, s.count, s.max, s.p99, s.p95, s.median
            )),
            None => output.push_str(&format!("{:<width$}  {:>7}\n", name, 0)),
        }
    }
    output
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.3}", v))
}

fn fmt_key(key: &[Value]) -> String {
    let parts: Vec<String> = key.iter().map(|v| v.to_string()).collect();
    format!("({})", parts.join(", "))
}

fn fmt_triple(label: &str, triple: &AggregateTriple) -> String {
    format!(
        "  {:<8} avg {:>12}  count {:>12}  sum {:>14}\n",
        label,
        fmt_opt(triple.avg),
        fmt_opt(triple.count),
        fmt_opt(triple.sum)
    )
}

/// Format estimated and real aggregate answers side by side
pub fn format_aggregate_answers(estimated: &AggregateAnswer, real: &AggregateAnswer) -> String {
    let mut output = String::new();
    match (estimated, real) {
        (AggregateAnswer::Scalar(est), AggregateAnswer::Scalar(real)) => {
            output.push_str(&fmt_triple("est", est));
            output.push_str(&fmt_triple("real", real));
        }
        (estimated, real) => {
            for (label, answer) in [("est", estimated), ("real", real)] {
                output.push_str(&format!("{}:\n", label));
                match answer {
                    AggregateAnswer::Scalar(t) => output.push_str(&fmt_triple("", t)),
                    AggregateAnswer::Grouped(groups) => {
                        for (key, t) in groups {
                            output.push_str(&fmt_triple(&fmt_key(key), t));
                        }
                    }
                }
            }
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_table() {
        let summaries = vec![
            (
                "psample_2000_0_1.000".to_string(),
                Some(ErrorSummary {
                    count: 3,
                    max: 4.0,
                    p99: 3.9,
                    p95: 3.5,
                    median: 1.25,
                    mean: 2.0,
                }),
            ),
            ("sample_0.01".to_string(), None),
        ];
        let out = format_error_summaries(&summaries);
        assert!(out.contains("psample_2000_0_1.000"));
        assert!(out.contains("4.000"));
        assert!(out.contains("1.250"));
        assert!(out.contains("sample_0.01"));
    }

    #[test]
    fn test_aggregate_answers() {
        let t = AggregateTriple {
            avg: Some(2.0),
            count: None,
            sum: None,
        };
        let scalar = format_aggregate_answers(&AggregateAnswer::Scalar(t), &AggregateAnswer::Scalar(t));
        assert!(scalar.contains("2.000"));
        assert!(scalar.contains("-"));

        let grouped = AggregateAnswer::Grouped(vec![(vec![Value::Int(7)], t)]);
        let out = format_aggregate_answers(&grouped, &grouped);
        assert!(out.contains("(7)"));
    }
}
