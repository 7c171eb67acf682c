//! Sort specifications: `"Name ASC, [Unit Price] DESC"`.

use tabula_core::{Error, Result};
use tabula_index::Order;

/// One column of a sort specification.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SortColumn {
    pub name: String,
    pub order: Order,
}

impl SortColumn {
    pub fn new(name: impl Into<String>, order: Order) -> Self {
        Self {
            name: name.into(),
            order,
        }
    }
}

/// Parses a comma separated sort specification. An empty string yields no
/// columns.
pub fn parse_sort(text: &str) -> Result<Vec<SortColumn>> {
    let mut columns = Vec::new();
    let mut offset = 0;
    for part in split_top_level(text) {
        let trimmed = part.trim();
        if trimmed.is_empty() {
            if text.trim().is_empty() {
                break;
            }
            return Err(Error::expression("empty sort column", offset));
        }
        let (name, rest) = if let Some(stripped) = trimmed.strip_prefix('[') {
            let end = stripped
                .find(']')
                .ok_or_else(|| Error::expression("unterminated column name", offset))?;
            (stripped[..end].to_string(), stripped[end + 1..].trim())
        } else {
            match trimmed.split_once(char::is_whitespace) {
                Some((n, r)) => (n.to_string(), r.trim()),
                None => (trimmed.to_string(), ""),
            }
        };
        let order = match rest.to_ascii_uppercase().as_str() {
            "" | "ASC" => Order::Asc,
            "DESC" => Order::Desc,
            other => {
                return Err(Error::expression(
                    format!("expected ASC or DESC, found '{}'", other),
                    offset,
                ))
            }
        };
        columns.push(SortColumn { name, order });
        offset += part.len() + 1;
    }
    Ok(columns)
}

/// Splits on commas outside of `[...]`.
fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}
