//! Result collections returned by read queries.

use tether_core::Row;

/// An ordered collection of fetched records.
///
/// `total` is the server-side count of all matching records, independent
/// of the page actually materialized. It is `None` when the backend does
/// not report one (for example, a streaming backend). When known,
/// `len() <= total` holds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    rows: Vec<Row>,
    total: Option<u64>,
}

impl ResultSet {
    /// Create a result set with no server-side total.
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows, total: None }
    }

    /// Create a result set carrying a server-reported total.
    pub fn with_total(rows: Vec<Row>, total: u64) -> Self {
        Self {
            rows,
            total: Some(total),
        }
    }

    /// Number of materialized records.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check whether no records were materialized.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The server-reported total, if known.
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    /// The first record, if any.
    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    /// The materialized records.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Iterate over the records.
    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    /// Decompose into records and total.
    pub fn into_parts(self) -> (Vec<Row>, Option<u64>) {
        (self.rows, self.total)
    }

    /// Rebuild from records and an optional total.
    pub fn from_parts(rows: Vec<Row>, total: Option<u64>) -> Self {
        Self { rows, total }
    }

    /// Map every record through `f`, keeping order and total.
    pub fn map_rows(self, f: impl FnMut(Row) -> Row) -> Self {
        Self {
            rows: self.rows.into_iter().map(f).collect(),
            total: self.total,
        }
    }
}

impl IntoIterator for ResultSet {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

impl FromIterator<Row> for ResultSet {
    fn from_iter<I: IntoIterator<Item = Row>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
