//! Comma-separated tables with a header row.
//!
//! Reading follows RFC 4180 quoting: fields may be wrapped in `"`, embedded
//! quotes are doubled, and quoted fields may span lines. Blank lines are
//! skipped and a leading UTF-8 byte-order mark is dropped. Rows shorter than
//! the header are padded with empty fields. Longer rows are truncated to the
//! header width and remembered, so callers can warn about them or, through
//! [`Table::require_exact_width`], refuse them.

use std::path::Path;

use thiserror::Error;

/// Marker written for missing or inapplicable values.
pub const NA: &str = "NA";

#[derive(Debug, Error)]
pub enum TableError {
    #[error("cannot read {origin}: {source}")]
    Io {
        origin: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{origin}: no header row")]
    MissingHeader { origin: String },
    #[error("{origin}:{line}: unterminated quoted field")]
    UnterminatedQuote { origin: String, line: usize },
    #[error("{origin}:{line}: {found} fields but the header has {expected}")]
    TooManyFields {
        origin: String,
        line: usize,
        expected: usize,
        found: usize,
    },
}

/// One data row and the 1-based line it started on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub line: usize,
    fields: Vec<String>,
    /// Trailing fields beyond the header width that were dropped.
    dropped: usize,
}

/// A data row that carried more fields than the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlongRow {
    pub line: usize,
    pub found: usize,
    pub expected: usize,
}

impl Record {
    /// Field `col`, or `""` when the row is short.
    #[must_use]
    pub fn get(&self, col: usize) -> &str {
        self.fields.get(col).map_or("", String::as_str)
    }

    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Number of fields cut off because the row was wider than the header.
    #[must_use]
    pub fn dropped_fields(&self) -> usize {
        self.dropped
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    origin: String,
    headers: Vec<String>,
    rows: Vec<Record>,
}

impl Table {
    pub fn read(path: &Path) -> Result<Self, TableError> {
        let origin = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| TableError::Io {
            origin: origin.clone(),
            source,
        })?;
        Self::parse(&text, origin)
    }

    /// Parse table text; `origin` names the source in error messages.
    pub fn parse(text: &str, origin: impl Into<String>) -> Result<Self, TableError> {
        let origin = origin.into();
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut records = split_records(text, &origin)?.into_iter();

        let headers = loop {
            match records.next() {
                Some(r) if is_blank(&r.fields) => continue,
                Some(r) => break r.fields.into_iter().map(|h| h.trim().to_string()).collect::<Vec<_>>(),
                None => return Err(TableError::MissingHeader { origin }),
            }
        };

        let mut rows = Vec::new();
        for mut r in records {
            if is_blank(&r.fields) {
                continue;
            }
            r.dropped = r.fields.len().saturating_sub(headers.len());
            r.fields.resize(headers.len(), String::new());
            rows.push(r);
        }
        Ok(Self {
            origin,
            headers,
            rows,
        })
    }

    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    #[must_use]
    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows that were truncated to the header width, in file order.
    #[must_use]
    pub fn overlong_rows(&self) -> Vec<OverlongRow> {
        let expected = self.headers.len();
        self.rows
            .iter()
            .filter(|r| r.dropped > 0)
            .map(|r| OverlongRow {
                line: r.line,
                found: expected + r.dropped,
                expected,
            })
            .collect()
    }

    /// Fail on the first row that was wider than the header.
    pub fn require_exact_width(&self) -> Result<(), TableError> {
        match self.overlong_rows().first() {
            Some(row) => Err(TableError::TooManyFields {
                origin: self.origin.clone(),
                line: row.line,
                expected: row.expected,
                found: row.found,
            }),
            None => Ok(()),
        }
    }

    /// Position of the header equal to `name`.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

fn is_blank(fields: &[String]) -> bool {
    fields.len() == 1 && fields[0].trim().is_empty()
}

fn split_records(text: &str, origin: &str) -> Result<Vec<Record>, TableError> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut record_line = 1;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => fields.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                fields.push(std::mem::take(&mut field));
                records.push(Record {
                    line: record_line,
                    fields: std::mem::take(&mut fields),
                    dropped: 0,
                });
                line += 1;
                record_line = line;
            }
            _ => field.push(c),
        }
    }
    if in_quotes {
        return Err(TableError::UnterminatedQuote {
            origin: origin.to_string(),
            line: record_line,
        });
    }
    if !field.is_empty() || !fields.is_empty() {
        fields.push(field);
        records.push(Record {
            line: record_line,
            fields,
            dropped: 0,
        });
    }
    Ok(records)
}

/// Builds table text row by row.
#[derive(Debug, Clone)]
pub struct TableWriter {
    buf: String,
}

impl TableWriter {
    #[must_use]
    pub fn new<S: AsRef<str>>(headers: &[S]) -> Self {
        let mut w = Self { buf: String::new() };
        w.push_row(headers);
        w
    }

    pub fn push_row<I, S>(&mut self, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for (i, f) in fields.into_iter().enumerate() {
            if i > 0 {
                self.buf.push(',');
            }
            push_field(&mut self.buf, f.as_ref());
        }
        self.buf.push('\n');
    }

    #[must_use]
    pub fn finish(self) -> String {
        self.buf
    }
}

fn push_field(buf: &mut String, field: &str) {
    if field.contains([',', '"', '\n', '\r']) {
        buf.push('"');
        buf.push_str(&field.replace('"', "\"\""));
        buf.push('"');
    } else {
        buf.push_str(field);
    }
}

/// Shortest round-trip decimal form; non-finite values become [`NA`].
#[must_use]
pub fn format_f64(value: f64) -> String {
    if value.is_finite() {
        value.to_string()
    } else {
        NA.to_string()
    }
}

#[must_use]
pub fn format_opt(value: Option<f64>) -> String {
    value.map_or_else(|| NA.to_string(), format_f64)
}

/// Parse a numeric cell; blanks, [`NA`] and garbage read as missing.
#[must_use]
pub fn parse_f64(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quoted_fields_and_pads_short_rows() {
        let text = "\u{feff}a,b,c\r\n1,\"x, y\",\"say \"\"hi\"\"\"\n\n2\n";
        let t = Table::parse(text, "mem").unwrap();
        assert_eq!(t.headers(), ["a", "b", "c"]);
        assert_eq!(t.len(), 2);
        assert_eq!(t.rows()[0].get(1), "x, y");
        assert_eq!(t.rows()[0].get(2), "say \"hi\"");
        assert_eq!(t.rows()[1].get(0), "2");
        assert_eq!(t.rows()[1].get(2), "");
        assert_eq!(t.rows()[1].line, 4);
    }

    #[test]
    fn quoted_field_can_span_lines() {
        let t = Table::parse("a,b\n\"one\ntwo\",3\n4,5\n", "mem").unwrap();
        assert_eq!(t.rows()[0].get(0), "one\ntwo");
        assert_eq!(t.rows()[1].line, 4);
    }

    #[test]
    fn long_rows_are_truncated_and_reported() {
        let t = Table::parse("a,b\n1,2,3\n4,5\n6,7,8,9\n", "mem").unwrap();
        assert_eq!(t.len(), 3);
        assert_eq!(t.rows()[0].fields(), ["1", "2"]);
        assert_eq!(t.rows()[0].dropped_fields(), 1);
        assert_eq!(t.rows()[1].dropped_fields(), 0);
        assert_eq!(
            t.overlong_rows(),
            vec![
                OverlongRow { line: 2, found: 3, expected: 2 },
                OverlongRow { line: 4, found: 4, expected: 2 },
            ]
        );
        assert!(matches!(
            t.require_exact_width(),
            Err(TableError::TooManyFields { line: 2, found: 3, .. })
        ));
        assert!(Table::parse("a,b\n1,2\n", "mem").unwrap().require_exact_width().is_ok());
    }

    #[test]
    fn rejects_open_quotes_and_missing_header() {
        assert!(matches!(
            Table::parse("a\n\"open\n", "mem"),
            Err(TableError::UnterminatedQuote { line: 2, .. })
        ));
        assert!(matches!(
            Table::parse("\n\n", "mem"),
            Err(TableError::MissingHeader { .. })
        ));
    }

    #[test]
    fn writer_quotes_only_when_needed() {
        let mut w = TableWriter::new(&["k", "v"]);
        w.push_row(["plain", "a,b"]);
        w.push_row(["q\"", ""]);
        assert_eq!(w.finish(), "k,v\nplain,\"a,b\"\n\"q\"\"\",\n");
    }

    #[test]
    fn written_text_reads_back() {
        let mut w = TableWriter::new(&["index", "perm"]);
        w.push_row(["0", "1;2;3"]);
        w.push_row(["1", "x, \"y\""]);
        let t = Table::parse(&w.finish(), "mem").unwrap();
        assert_eq!(t.rows()[1].get(1), "x, \"y\"");
    }

    #[test]
    fn float_formatting() {
        assert_eq!(format_f64(0.5), "0.5");
        assert_eq!(format_f64(1.0), "1");
        assert_eq!(format_f64(f64::NAN), NA);
        assert_eq!(format_opt(None), NA);
        assert_eq!(format_opt(Some(0.25)), "0.25");
        assert_eq!(parse_f64(" 0.75 "), Some(0.75));
        assert_eq!(parse_f64("NA"), None);
        assert_eq!(parse_f64(""), None);
    }
}
