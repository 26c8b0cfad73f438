//! Inline expression expansion
//!
//! Expands data-node expressions such as `ds${0..1}.t_order_${0..2}` or
//! `ds0.t_${['a','b']}` into the full list of names. `$->{...}` is accepted
//! as an alternative to `${...}`. Comma-separated expressions are expanded
//! one after another; within one expression the left-most placeholder varies
//! slowest.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{ShardError, ShardResult};

fn range_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^\s*(-?\d+)\s*\.\.\s*(-?\d+)\s*$").ok())
        .as_ref()
}

#[derive(Debug, Clone, PartialEq)]
enum Part {
    Literal(String),
    Choices(Vec<String>),
}

/// Expand an inline expression into every name it denotes.
pub fn expand(expression: &str) -> ShardResult<Vec<String>> {
    let mut result = Vec::new();
    for segment in split_top_level(expression)? {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        let parts = parse_segment(segment)?;
        result.extend(cartesian(&parts));
    }
    Ok(result)
}

/// Split on commas that are not inside a placeholder.
fn split_top_level(expression: &str) -> ShardResult<Vec<String>> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;

    for ch in expression.chars() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    ShardError::ConfigError(format!("Unbalanced '}}' in inline expression: {}", expression))
                })?
            }
            ',' if depth == 0 => {
                segments.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(ch);
    }
    if depth != 0 {
        return Err(ShardError::ConfigError(format!(
            "Unbalanced '{{' in inline expression: {}",
            expression
        )));
    }
    segments.push(current);
    Ok(segments)
}

fn parse_segment(segment: &str) -> ShardResult<Vec<Part>> {
    let mut parts = Vec::new();
    let mut rest = segment;

    while let Some(open) = find_placeholder(rest) {
        let (literal, tail) = rest.split_at(open.start);
        if !literal.is_empty() {
            parts.push(Part::Literal(literal.to_string()));
        }
        let body_start = open.body_offset;
        let close = tail[body_start..].find('}').ok_or_else(|| {
            ShardError::ConfigError(format!("Unclosed placeholder in inline expression: {}", segment))
        })?;
        let body = &tail[body_start..body_start + close];
        parts.push(Part::Choices(evaluate_placeholder(body)?));
        rest = &tail[body_start + close + 1..];
    }
    if !rest.is_empty() {
        parts.push(Part::Literal(rest.to_string()));
    }
    Ok(parts)
}

struct PlaceholderStart {
    start: usize,
    /// Offset of the placeholder body relative to `start`.
    body_offset: usize,
}

fn find_placeholder(text: &str) -> Option<PlaceholderStart> {
    let plain = text.find("${").map(|start| PlaceholderStart {
        start,
        body_offset: 2,
    });
    let arrow = text.find("$->{").map(|start| PlaceholderStart {
        start,
        body_offset: 4,
    });
    match (plain, arrow) {
        (Some(plain), Some(arrow)) => Some(if plain.start < arrow.start { plain } else { arrow }),
        (plain, arrow) => plain.or(arrow),
    }
}

fn evaluate_placeholder(body: &str) -> ShardResult<Vec<String>> {
    if let Some(captures) = range_pattern().and_then(|pattern| pattern.captures(body)) {
        let parse = |text: &str| {
            text.parse::<i64>().map_err(|_| {
                ShardError::ConfigError(format!("Invalid range bound in inline expression: {}", text))
            })
        };
        let from = parse(&captures[1])?;
        let to = parse(&captures[2])?;
        let values: Vec<String> = if from <= to {
            (from..=to).map(|n| n.to_string()).collect()
        } else {
            (to..=from).rev().map(|n| n.to_string()).collect()
        };
        return Ok(values);
    }

    let trimmed = body.trim();
    if let Some(list) = trimmed.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        return Ok(list
            .split(',')
            .map(|item| item.trim().trim_matches(|c| c == '\'' || c == '"').to_string())
            .filter(|item| !item.is_empty())
            .collect());
    }

    Err(ShardError::ConfigError(format!(
        "Unsupported inline expression placeholder: ${{{}}}",
        body
    )))
}

fn cartesian(parts: &[Part]) -> Vec<String> {
    let mut results = vec![String::new()];
    for part in parts {
        results = match part {
            Part::Literal(text) => results
                .into_iter()
                .map(|mut prefix| {
                    prefix.push_str(text);
                    prefix
                })
                .collect(),
            Part::Choices(choices) => results
                .iter()
                .flat_map(|prefix| choices.iter().map(move |choice| format!("{}{}", prefix, choice)))
                .collect(),
        };
    }
    results
}
