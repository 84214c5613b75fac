use crate::error::NexusError;
use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;

/// A quote row as stored remotely. The text column is named `quote` on the wire.
/// Nullable columns decode as empty strings, which `is_displayable` rejects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Quote {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(rename = "quote", default, deserialize_with = "null_as_empty")]
    pub text: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub author: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl Quote {
    /// Both text and author carry something besides whitespace.
    pub fn is_displayable(&self) -> bool {
        !self.text.trim().is_empty() && !self.author.trim().is_empty()
    }
}

/// Validated insert/update payload; text and author are trimmed and non-empty.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NewQuote {
    #[serde(rename = "quote")]
    text: String,
    author: String,
}

impl NewQuote {
    pub fn new(text: impl AsRef<str>, author: impl AsRef<str>) -> Result<Self, NexusError> {
        let text = text.as_ref().trim();
        let author = author.as_ref().trim();
        if text.is_empty() || author.is_empty() {
            return Err(NexusError::Validation(
                "quote and author must not be empty".to_string(),
            ));
        }
        Ok(Self {
            text: text.to_string(),
            author: author.to_string(),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn author(&self) -> &str {
        &self.author
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    #[default]
    Author,
    Quote,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Admin list view parameters: `?search=&sort_by=author|quote&order=asc|desc`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuoteQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub sort_by: SortField,
    #[serde(default)]
    pub order: SortOrder,
}

impl QuoteQuery {
    /// Case-insensitive substring match over text and author, then case-insensitive sort.
    pub fn apply(&self, quotes: &[Quote]) -> Vec<Quote> {
        let needle = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let mut out: Vec<Quote> = quotes
            .iter()
            .filter(|q| match needle.as_deref() {
                Some(n) => {
                    q.text.to_lowercase().contains(n) || q.author.to_lowercase().contains(n)
                }
                None => true,
            })
            .cloned()
            .collect();

        let key = |q: &Quote| match self.sort_by {
            SortField::Author => q.author.to_lowercase(),
            SortField::Quote => q.text.to_lowercase(),
        };
        out.sort_by(|a, b| {
            let ord: Ordering = key(a).cmp(&key(b));
            match self.order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });
        out
    }
}
