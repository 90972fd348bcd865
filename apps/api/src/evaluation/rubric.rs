//! Rubric parsing: splits free-form rubric text into ordered criteria.

use crate::evaluation::models::Criterion;

const BULLETS: &[char] = &['-', '*', '+', '•', '–'];

/// Splits a rubric into criteria, one per non-blank line, in order.
///
/// List markers (`- `, `* `, `• `, `1. `, `2) `) and surrounding `**` are removed.
/// Text after the first `:` becomes the description. Unmarked lines that end in
/// `:` are headings and are skipped; a marked `- Name:` is still a criterion.
pub fn parse_rubric(rubric: &str) -> Vec<Criterion> {
    rubric
        .lines()
        .map(|line| strip_marker(line.trim()))
        .filter(|(marked, line)| !line.is_empty() && (*marked || !line.ends_with(':')))
        .map(|(_, line)| split_criterion(line))
        .filter(|c| !c.name.is_empty())
        .collect()
}

/// Returns whether a list marker was removed, and the remaining text.
fn strip_marker(line: &str) -> (bool, &str) {
    if let Some(rest) = line.strip_prefix(BULLETS) {
        if rest.is_empty() || rest.starts_with(char::is_whitespace) {
            return (true, rest.trim_start());
        }
    }

    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(['.', ')']) {
            return (true, rest.trim_start());
        }
    }

    (false, line)
}

fn split_criterion(line: &str) -> Criterion {
    let (name, description) = match line.split_once(':') {
        Some((name, description)) if !clean_name(name).is_empty() => {
            let description = description.trim();
            (
                clean_name(name),
                (!description.is_empty()).then(|| description.to_string()),
            )
        }
        _ => (clean_name(line), None),
    };

    Criterion {
        name: name.to_string(),
        description,
    }
}

fn clean_name(name: &str) -> &str {
    name.trim().trim_matches('*').trim()
}
