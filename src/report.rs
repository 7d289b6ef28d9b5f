use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::ReflectConfig;
use crate::reflector::Capture;
use crate::value::Value;

const ARROW: &str = " --> ";
const RESULT_INDENT: usize = 4;

/// Wrap tokens: a run of word characters with at most one trailing
/// non-word character, or a run of non-word characters. Fragments never
/// break inside a token.
#[allow(clippy::unwrap_used)]
static WRAP_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+\W?|\W+").unwrap());

/// The full diagnostic text: the asserted source with its overall value,
/// then one aligned line per capture. Pure string assembly; deterministic.
pub fn format_report(source: &str, value: &Value, captures: &[Capture], config: &ReflectConfig) -> String {
    let mut out = format_assertion_result(source, value, config);
    out.push_str(&format_captures(captures, config));
    out
}

/// First block of the report: the source text, then the arrow and the
/// pretty-printed overall value with continuations aligned under it.
pub fn format_assertion_result(source: &str, value: &Value, config: &ReflectConfig) -> String {
    let pretty = value.pretty(config.pretty_width);
    let aligned = indent_continuations(&pretty, RESULT_INDENT + 4);
    format!("{}\n    --> {}\n", source.trim_end(), aligned)
}

/// One line per capture, arrows in a shared column. The column is the
/// longest fragment, capped so pathological fragments wrap instead of
/// pushing every arrow off screen.
pub fn format_captures(captures: &[Capture], config: &ReflectConfig) -> String {
    let width = captures
        .iter()
        .map(|c| c.fragment.len())
        .max()
        .unwrap_or(0)
        .min(config.snip_width_cap);
    let mut out = String::new();
    for capture in captures {
        out.push_str(&format_snip(width, &capture.fragment));
        out.push_str(ARROW);
        out.push_str(&format_value(width, &capture.value, config));
        out.push('\n');
    }
    out
}

/// Right-align a fragment in `width` columns, soft-wrapping at token
/// boundaries when it does not fit. Every produced line is aligned
/// independently; nothing is ever truncated.
pub fn format_snip(width: usize, fragment: &str) -> String {
    if fragment.len() <= width {
        return format!("{fragment:>width$}");
    }
    let lines: Vec<String> = wrap_fragment(width, fragment)
        .into_iter()
        .map(|line| format!("{line:>width$}"))
        .collect();
    lines.join("\n")
}

/// Pretty-print a value for a capture line; continuation lines sit under
/// the value start column.
pub fn format_value(width: usize, value: &Value, config: &ReflectConfig) -> String {
    indent_continuations(&value.pretty(config.pretty_width), width + 4)
}

fn wrap_fragment(width: usize, fragment: &str) -> Vec<String> {
    let mut lines = vec![];
    let mut current = String::new();
    for token in WRAP_TOKEN.find_iter(fragment) {
        let token = token.as_str();
        if !current.is_empty() && current.len() + token.trim_end().len() > width {
            lines.push(current.trim_end().to_string());
            current.clear();
            current.push_str(token.trim_start());
        } else {
            current.push_str(token);
        }
    }
    let tail = current.trim_end();
    if !tail.is_empty() {
        lines.push(tail.to_string());
    }
    lines
}

fn indent_continuations(text: &str, indent: usize) -> String {
    if !text.contains('\n') {
        return text.to_string();
    }
    let pad = " ".repeat(indent);
    let mut lines = text.lines();
    let mut out = lines.next().unwrap_or_default().to_string();
    for line in lines {
        out.push('\n');
        out.push_str(&pad);
        out.push_str(line);
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn capture(fragment: &str, value: Value) -> Capture {
        Capture {
            fragment: fragment.to_string(),
            value,
        }
    }

    fn arrow_columns(report: &str) -> Vec<usize> {
        report
            .lines()
            .filter_map(|line| line.find("--> "))
            .collect()
    }

    #[test]
    fn result_block_shows_source_then_value() {
        let config = ReflectConfig::default();
        let block = format_assertion_result("1 + 1 == 3", &Value::bool(false), &config);
        assert_eq!(block, "1 + 1 == 3\n    --> false\n");
    }

    #[test]
    fn captures_align_on_the_longest_fragment() {
        let config = ReflectConfig::default();
        let captures = vec![
            capture("1 + 1", Value::int(2)),
            capture("1 + 1 == 3", Value::bool(false)),
        ];
        let text = format_captures(&captures, &config);
        assert_eq!(text, "     1 + 1 --> 2\n1 + 1 == 3 --> false\n");
        let columns = arrow_columns(&text);
        assert!(columns.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn formatting_is_deterministic() {
        let config = ReflectConfig::default();
        let captures = vec![capture("z", Value::str("xab"))];
        let once = format_report("z =~ /ab/", &Value::Nil, &captures, &config);
        let twice = format_report("z =~ /ab/", &Value::Nil, &captures, &config);
        assert_eq!(once, twice);
    }

    #[test]
    fn long_fragments_wrap_at_token_boundaries() {
        let fragment = "alpha + beta + gamma + delta";
        let snip = format_snip(12, fragment);
        let lines: Vec<&str> = snip.lines().collect();
        assert!(lines.len() > 1);
        for line in &lines {
            assert_eq!(line.len(), 12);
            assert!(!line.trim_start().starts_with(' '));
        }
        let rejoined: String = lines
            .iter()
            .map(|l| l.trim_start())
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(rejoined, fragment);
    }

    #[test]
    fn tokens_never_split() {
        let snip = format_snip(4, "abcdef + x");
        for line in snip.lines() {
            let trimmed = line.trim();
            assert!(trimmed == "abcdef" || trimmed == "+ x" || trimmed == "x" || trimmed == "+");
        }
        assert!(snip.contains("abcdef"));
    }

    #[test]
    fn multi_line_values_indent_past_the_arrow() {
        let config = ReflectConfig {
            pretty_width: 20,
            ..ReflectConfig::default()
        };
        let long = Value::array(vec![
            Value::str("aaaaaaaaaaaaaaaa"),
            Value::str("bbbbbbbbbbbbbbbb"),
        ]);
        let text = format_value(10, &long, &config);
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines.len() > 1);
        for line in &lines[1..] {
            assert!(line.starts_with(&" ".repeat(14)));
        }
    }

    #[test]
    fn empty_capture_list_renders_nothing() {
        let config = ReflectConfig::default();
        assert_eq!(format_captures(&[], &config), "");
    }

    #[test]
    fn snip_cap_bounds_the_column() {
        let config = ReflectConfig {
            snip_width_cap: 10,
            ..ReflectConfig::default()
        };
        let captures = vec![
            capture("a_very_long_reconstructed_expression > 0", Value::bool(false)),
            capture("x", Value::int(1)),
        ];
        let text = format_captures(&captures, &config);
        let columns = arrow_columns(&text);
        assert_eq!(columns.last(), Some(&10));
    }
}
