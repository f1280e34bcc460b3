//! Parsing helpers for language model replies
//!
//! Models answer in free text; these functions pull the chosen names out of it.

use crate::error::{Error, Result};
use crate::models::Category;

/// Categories named in a reply, in the order they appear
///
/// A category counts as named when its name occurs in the reply,
/// case-insensitively. When one name contains another ("Meals" and
/// "Meals and Entertainment"), the longer match at a position wins.
pub fn parse_categories(reply: &str, valid: &[Category]) -> Vec<Category> {
    let haystack = reply.to_lowercase();

    let mut found: Vec<(usize, usize, &Category)> = valid
        .iter()
        .filter(|c| !c.name.trim().is_empty())
        .filter_map(|c| {
            let needle = c.name.trim().to_lowercase();
            haystack.find(&needle).map(|pos| (pos, needle.len(), c))
        })
        .collect();

    // earliest first, longer names first at the same position
    found.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

    let mut result: Vec<Category> = Vec::new();
    let mut covered_until = 0usize;
    for (pos, len, category) in found {
        // skip names that sit inside a longer match already taken
        if pos < covered_until {
            continue;
        }
        if !result.iter().any(|c| c.id == category.id) {
            result.push(category.clone());
        }
        covered_until = pos + len;
    }
    result
}

/// Text following a leading "None", if the reply declines to choose
fn declined_rest(reply: &str) -> Option<&str> {
    let trimmed = reply.trim().trim_start_matches(['"', '\'']);
    let head = trimmed.get(..4)?;
    let rest = &trimmed[4..];
    let word_ends = rest.chars().next().map_or(true, |c| !c.is_alphanumeric());
    if head.eq_ignore_ascii_case("none") && word_ends {
        Some(rest)
    } else {
        None
    }
}

/// The search query from a `None <query>` reply
///
/// Returns `None` for any other reply.
pub fn search_query(reply: &str) -> Option<String> {
    let query = declined_rest(reply)?
        .trim_start_matches([':', '.', ',', '-', ' '])
        .trim()
        .trim_matches(['"', '\''])
        .trim();
    if query.is_empty() {
        None
    } else {
        Some(query.to_string())
    }
}

/// Whether a reply declines to choose
pub fn is_declined(reply: &str) -> bool {
    declined_rest(reply).is_some()
}

/// Split a batched reply into one answer per item
///
/// Expects a JSON array of strings (possibly surrounded by prose). Missing
/// trailing entries become `None`; extra entries are ignored.
pub fn parse_batch_reply(reply: &str, expected: usize) -> Result<Vec<Option<String>>> {
    let reply = reply.trim();
    let start = reply.find('[');
    let end = reply.rfind(']');

    let json_str = match (start, end) {
        (Some(s), Some(e)) if s < e => &reply[s..=e],
        _ => {
            return Err(Error::InvalidData(format!(
                "No JSON array found in batch reply | Raw: {}",
                truncate(reply, 200)
            )))
        }
    };

    let values: Vec<serde_json::Value> = serde_json::from_str(json_str).map_err(|e| {
        Error::InvalidData(format!(
            "Invalid JSON from AI: {} | Raw: {}",
            e,
            truncate(json_str, 200)
        ))
    })?;

    let mut answers: Vec<Option<String>> = values
        .into_iter()
        .take(expected)
        .map(|v| match v {
            serde_json::Value::String(s) if !s.trim().is_empty() && !is_declined(&s) => {
                Some(s.trim().to_string())
            }
            _ => None,
        })
        .collect();
    answers.resize(expected, None);
    Ok(answers)
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Vec<Category> {
        vec![
            Category::new("1", "Meals"),
            Category::new("2", "Travel"),
            Category::new("3", "Meals and Entertainment"),
            Category::new("4", "Software"),
        ]
    }

    #[test]
    fn test_parse_single_category() {
        let found = parse_categories("Travel", &valid());
        assert_eq!(found, vec![Category::new("2", "Travel")]);
    }

    #[test]
    fn test_parse_prefers_longer_name() {
        let found = parse_categories("This is Meals and Entertainment.", &valid());
        assert_eq!(found[0].name, "Meals and Entertainment");
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_parse_orders_by_position() {
        let found = parse_categories("software, or possibly travel", &valid());
        let names: Vec<&str> = found.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Software", "Travel"]);
    }

    #[test]
    fn test_parse_nothing() {
        assert!(parse_categories("I am not sure", &valid()).is_empty());
    }

    #[test]
    fn test_search_query() {
        assert_eq!(
            search_query("None Acme Widgets Calgary").as_deref(),
            Some("Acme Widgets Calgary")
        );
        assert_eq!(search_query("none: \"acme ltd\"").as_deref(), Some("acme ltd"));
        assert_eq!(search_query("None"), None);
        assert_eq!(search_query("Meals"), None);
        assert!(is_declined("None"));
        assert!(!is_declined("Meals"));
        assert!(!is_declined("Nonesuch Hardware"));
    }

    #[test]
    fn test_parse_batch_reply() {
        let answers =
            parse_batch_reply("Here you go:\n[\"Meals\", \"None\", \"Travel\"]", 4).unwrap();
        assert_eq!(
            answers,
            vec![Some("Meals".into()), None, Some("Travel".into()), None]
        );
    }

    #[test]
    fn test_parse_batch_reply_invalid() {
        assert!(parse_batch_reply("Meals, Travel", 2).is_err());
        assert!(parse_batch_reply("[Meals, Travel]", 2).is_err());
    }
}
