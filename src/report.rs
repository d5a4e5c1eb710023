//! Flat-table projection of reports.
//!
//! Every report the guard produces can be flattened into one row per path,
//! gap or verdict. Rows are plain JSON objects so any renderer (CLI table,
//! JSON lines, HTML) can consume them without knowing the report types.

/// A report that can be rendered as a flat table.
pub trait TabularReport {
    /// One JSON object per row; every row of a report has the same keys.
    fn rows(&self) -> Vec<serde_json::Value>;

    /// Rows serialised as newline-delimited JSON.
    fn to_ndjson(&self) -> String {
        let mut out = String::new();
        for row in self.rows() {
            out.push_str(&row.to_string());
            out.push('\n');
        }
        out
    }
}
