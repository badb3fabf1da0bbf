use std::collections::BTreeSet;

use serde::Serialize;

/// Price identifiers that may ever be charged or fulfilled.
///
/// Membership is checked independently of whether the provider currently
/// reports a price as active.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AllowSet(BTreeSet<String>);

impl AllowSet {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AllowSet(
            ids.into_iter()
                .map(Into::into)
                .map(|id: String| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .collect(),
        )
    }

    /// Parses a comma separated list, ignoring blanks.
    pub fn from_csv(raw: &str) -> Self {
        Self::new(raw.split(','))
    }

    pub fn contains(&self, price_id: &str) -> bool {
        self.0.contains(price_id)
    }

    /// Catalog listing filter. An empty set lists every active price.
    pub fn permits_catalog(&self, price_id: &str) -> bool {
        self.0.is_empty() || self.contains(price_id)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}
