//! Query descriptors for scans, counts, and result sets.

use crate::types::DeviceId;

/// Direction of key ordering in query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Ascending byte-lexicographic key order.
    #[default]
    Asc,
    /// Descending byte-lexicographic key order.
    Desc,
}

/// An opaque filter descriptor interpreted by the storage engine.
///
/// A query selects entries by key prefix and/or an explicit key set,
/// optionally scoped to one device's replica, ordered and windowed.
/// An empty query matches every entry of the targeted replica.
///
/// # Example
///
/// ```
/// use synckv_core::Query;
///
/// let query = Query::new().prefix_key("batch_test").limit(10, 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub(crate) prefix: Option<String>,
    pub(crate) keys: Option<Vec<String>>,
    pub(crate) device: Option<DeviceId>,
    pub(crate) order: SortOrder,
    pub(crate) limit: Option<usize>,
    pub(crate) offset: usize,
}

impl Query {
    /// Creates a query matching everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts matches to keys starting with `prefix`.
    #[must_use]
    pub fn prefix_key(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Restricts matches to the given keys.
    #[must_use]
    pub fn in_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Scopes the query to one device's replica.
    ///
    /// Only meaningful for device-collaboration stores; single-version
    /// stores reject any device other than the local one.
    #[must_use]
    pub fn device_id(mut self, device: DeviceId) -> Self {
        self.device = Some(device);
        self
    }

    /// Sets the result order.
    #[must_use]
    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    /// Windows the results: at most `limit` entries, skipping `offset`.
    #[must_use]
    pub fn limit(mut self, limit: usize, offset: usize) -> Self {
        self.limit = Some(limit);
        self.offset = offset;
        self
    }

    /// Clears every filter, returning the match-all query.
    #[must_use]
    pub fn reset(self) -> Self {
        Self::default()
    }

    pub(crate) fn matches(&self, key: &str) -> bool {
        if let Some(prefix) = &self.prefix {
            if !key.starts_with(prefix.as_str()) {
                return false;
            }
        }
        if let Some(keys) = &self.keys {
            if !keys.iter().any(|k| k == key) {
                return false;
            }
        }
        true
    }
}
