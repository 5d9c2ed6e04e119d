// Table storage - in-memory landmark tables and their CSV serialization

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File extension of persisted tables
pub const TABLE_EXTENSION: &str = "csv";

#[derive(Debug, Error)]
pub enum TableError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed table {path} at line {line}: {reason}")]
    Malformed {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

pub type TableResult<T> = Result<T, TableError>;

/// Rows keyed by column name, with the column set being the union of every
/// key seen so far in order of first appearance.
///
/// Rows inserted before a column existed are shorter than the header and are
/// padded with empty cells on access and on write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table with a fixed leading column order
    pub fn with_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut table = Self::new();
        for column in columns {
            table.column_index(column.as_ref());
        }
        table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn column_index(&mut self, name: &str) -> usize {
        if let Some(&i) = self.index.get(name) {
            return i;
        }
        let i = self.columns.len();
        self.columns.push(name.to_string());
        self.index.insert(name.to_string(), i);
        i
    }

    /// Append a row given as `(column, value)` pairs
    pub fn push_row<K, V, I>(&mut self, fields: I)
    where
        K: AsRef<str>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut row = Vec::new();
        for (key, value) in fields {
            let i = self.column_index(key.as_ref());
            if row.len() <= i {
                row.resize(i + 1, String::new());
            }
            row[i] = value.into();
        }
        self.rows.push(row);
    }

    /// Append all rows of `other`, extending the column set as needed
    pub fn append(&mut self, other: Table) {
        let Table { columns, rows, .. } = other;
        for row in rows {
            let fields = columns
                .iter()
                .zip(row)
                .filter(|(_, value)| !value.is_empty());
            self.push_row(fields);
        }
        // Keep columns that only ever held empty cells in the other table
        for column in &columns {
            self.column_index(column);
        }
    }

    /// Cell value, empty string for padded cells, `None` for unknown columns
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let cells = self.rows.get(row)?;
        let i = *self.index.get(column)?;
        Some(cells.get(i).map(String::as_str).unwrap_or(""))
    }

    /// Iterate rows padded to the full column width
    pub fn rows(&self) -> impl Iterator<Item = Vec<&str>> + '_ {
        self.rows.iter().map(|row| {
            (0..self.columns.len())
                .map(|i| row.get(i).map(String::as_str).unwrap_or(""))
                .collect()
        })
    }

    /// Render as CSV: header line, then one line per row.
    ///
    /// A table without columns renders as an empty document.
    pub fn to_csv(&self) -> String {
        if self.columns.is_empty() {
            return String::new();
        }

        let mut out = String::new();
        let header: Vec<String> = self.columns.iter().map(|c| csv_escape(c)).collect();
        out.push_str(&header.join(","));
        out.push('\n');
        for row in self.rows() {
            let cells: Vec<String> = row.into_iter().map(csv_escape).collect();
            out.push_str(&cells.join(","));
            out.push('\n');
        }
        out
    }

    /// Parse a CSV document produced by [`Table::to_csv`].
    ///
    /// Quoted cells may span lines. `origin` is only used in error messages.
    pub fn from_csv(text: &str, origin: &Path) -> TableResult<Self> {
        let malformed = |line: usize, reason: String| TableError::Malformed {
            path: origin.to_path_buf(),
            line,
            reason,
        };

        let mut table = Table::new();
        let mut records = parse_csv(text)
            .map_err(|(line, reason)| malformed(line, reason))?
            .into_iter();

        let Some(header) = records.next() else {
            return Ok(table);
        };
        for column in &header.fields {
            if table.index.contains_key(column) {
                return Err(malformed(
                    header.line,
                    format!("duplicate column {:?}", column),
                ));
            }
            table.column_index(column);
        }

        for record in records {
            if record.fields.len() > header.fields.len() {
                return Err(malformed(
                    record.line,
                    format!(
                        "{} fields but header has {} columns",
                        record.fields.len(),
                        header.fields.len()
                    ),
                ));
            }
            table.rows.push(record.fields);
        }

        Ok(table)
    }

    /// Write the table to `path`, replacing any existing file
    pub fn write(&self, path: &Path) -> TableResult<()> {
        std::fs::write(path, self.to_csv()).map_err(|source| TableError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read a table previously written with [`Table::write`]
    pub fn read(path: &Path) -> TableResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| TableError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_csv(&text, path)
    }
}

fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

// One parsed CSV record and the line it starts on (1-based)
struct CsvRecord {
    line: usize,
    fields: Vec<String>,
}

// Split a document into records; blank lines are skipped
fn parse_csv(text: &str) -> Result<Vec<CsvRecord>, (usize, String)> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut record_line = 1;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    current.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => {
                    if ch == '\n' {
                        line += 1;
                    }
                    current.push(ch);
                }
            }
            continue;
        }

        match ch {
            '"' => in_quotes = true,
            ',' => fields.push(std::mem::take(&mut current)),
            '\r' | '\n' => {
                if ch == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                fields.push(std::mem::take(&mut current));
                push_record(&mut records, record_line, std::mem::take(&mut fields));
                line += 1;
                record_line = line;
            }
            _ => current.push(ch),
        }
    }

    if in_quotes {
        return Err((record_line, "unterminated quoted field".to_string()));
    }
    if !current.is_empty() || !fields.is_empty() {
        fields.push(current);
        push_record(&mut records, record_line, fields);
    }
    Ok(records)
}

fn push_record(records: &mut Vec<CsvRecord>, line: usize, fields: Vec<String>) {
    let blank = fields.len() == 1 && fields[0].trim().is_empty();
    if !blank {
        records.push(CsvRecord { line, fields });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_of_columns_with_padding() {
        let mut table = Table::new();
        table.push_row([("a1_x", "0.1"), ("label", "A")]);
        table.push_row([("a1_x", "0.2"), ("a2_x", "0.3"), ("label", "A")]);

        assert_eq!(table.columns(), &["a1_x", "label", "a2_x"]);
        assert_eq!(table.get(0, "a2_x"), Some(""));
        assert_eq!(table.get(1, "a2_x"), Some("0.3"));
        assert_eq!(table.get(0, "missing"), None);
        assert_eq!(table.to_csv(), "a1_x,label,a2_x\n0.1,A,\n0.2,A,0.3\n");
    }

    #[test]
    fn test_declared_columns_keep_their_order() {
        let mut table = Table::with_columns(["frame", "a1_x", "label"]);
        table.push_row([("label", "A"), ("frame", "0")]);
        assert_eq!(table.to_csv(), "frame,a1_x,label\n0,,A\n");
    }

    #[test]
    fn test_quoting_survives_reparse() {
        let mut table = Table::new();
        table.push_row([("label", "open, \"palm\""), ("frame", "3")]);

        let text = table.to_csv();
        assert!(text.contains("\"open, \"\"palm\"\"\""));

        let parsed = Table::from_csv(&text, Path::new("mem.csv")).unwrap();
        assert_eq!(parsed.get(0, "label"), Some("open, \"palm\""));
        assert_eq!(parsed.get(0, "frame"), Some("3"));
    }

    #[test]
    fn test_empty_table_round_trips_through_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.csv");

        Table::new().write(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");

        let table = Table::read(&path).unwrap();
        assert!(table.is_empty());
        assert!(table.columns().is_empty());
    }

    #[test]
    fn test_short_rows_are_padded_on_read() {
        let table = Table::from_csv("a,b,c\n1\n1,2,3\n", Path::new("mem.csv")).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows().next().unwrap(), vec!["1", "", ""]);
    }

    #[test]
    fn test_multiline_cell_survives_reparse() {
        let mut table = Table::new();
        table.push_row([("label", "wave\r\nhello"), ("frame", "0")]);
        table.push_row([("label", "B"), ("frame", "1")]);

        let parsed = Table::from_csv(&table.to_csv(), Path::new("mem.csv")).unwrap();
        assert_eq!(parsed, table);
        assert_eq!(parsed.get(0, "label"), Some("wave\r\nhello"));
        assert_eq!(parsed.get(1, "frame"), Some("1"));
    }

    #[test]
    fn test_unterminated_quote_is_malformed() {
        let err = Table::from_csv("a,b\n1,2\n\"open,3\n", Path::new("bad.csv")).unwrap_err();
        assert!(matches!(err, TableError::Malformed { line: 3, .. }));
    }

    #[test]
    fn test_duplicate_header_is_malformed() {
        let err = Table::from_csv("frame,a1_x,frame\n0,0.5,1\n", Path::new("bad.csv")).unwrap_err();
        assert!(
            matches!(&err, TableError::Malformed { line: 1, reason, .. } if reason.contains("frame")),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn test_overlong_row_is_malformed() {
        let err = Table::from_csv("a\n1,2\n", Path::new("bad.csv")).unwrap_err();
        assert!(matches!(err, TableError::Malformed { line: 2, .. }));

        let err = Table::from_csv("a\n\"x\ny\"\n1,2\n", Path::new("bad.csv")).unwrap_err();
        assert!(matches!(err, TableError::Malformed { line: 4, .. }));
    }

    #[test]
    fn test_append_merges_schemas() {
        let mut left = Table::new();
        left.push_row([("frame", "0"), ("label", "A")]);
        let mut right = Table::new();
        right.push_row([("frame", "4"), ("partial", "true"), ("label", "B")]);
        right.push_row([("frame", "5"), ("label", "B")]);

        left.append(right);
        assert_eq!(left.len(), 3);
        assert_eq!(left.columns(), &["frame", "label", "partial"]);
        assert_eq!(left.get(1, "partial"), Some("true"));
        assert_eq!(left.get(2, "label"), Some("B"));
        assert_eq!(left.get(0, "partial"), Some(""));
    }
}
