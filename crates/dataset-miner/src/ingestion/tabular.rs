//! CSV and spreadsheet rendering

use calamine::Reader;
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::{Segment, SegmentLabel};

/// A header row plus data rows, all cells as text
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Build a table, padding short rows to the widest row
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = rows
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(headers.len()))
            .max()
            .unwrap_or(0);
        let pad = |mut cells: Vec<String>| {
            cells.resize(width, String::new());
            cells
        };
        Self {
            headers: pad(headers),
            rows: rows.into_iter().map(pad).collect(),
        }
    }

    pub fn width(&self) -> usize {
        self.headers.len()
    }

    /// Drop every column whose data cells are all blank; headers do not count
    pub fn remove_empty_columns(&mut self) -> usize {
        let keep: Vec<bool> = (0..self.width())
            .map(|col| self.rows.iter().any(|row| !row[col].trim().is_empty()))
            .collect();
        let removed = keep.iter().filter(|k| !**k).count();
        if removed == 0 {
            return 0;
        }

        let retain = |cells: &mut Vec<String>| {
            let mut col = 0;
            cells.retain(|_| {
                let kept = keep[col];
                col += 1;
                kept
            });
        };
        retain(&mut self.headers);
        self.rows.iter_mut().for_each(retain);
        removed
    }

    /// Rows with at least one non-blank cell
    fn data_rows(&self) -> impl Iterator<Item = (usize, &Vec<String>)> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.iter().any(|cell| !cell.trim().is_empty()))
    }

    /// Render one row as `header: value | header: value`
    pub fn render_row(&self, row: &[String]) -> String {
        self.headers
            .iter()
            .zip(row)
            .map(|(header, value)| {
                let header = header.trim();
                let value = value.trim();
                if header.is_empty() {
                    value.to_string()
                } else {
                    format!("{}: {}", header, value)
                }
            })
            .collect::<Vec<_>>()
            .join(" | ")
    }

    /// Render the whole table as ` | `-delimited lines under a title
    pub fn render_sheet(&self, name: &str) -> String {
        let mut out = format!("=== Sheet: {} ===\n", name);
        out.push_str(&self.headers.join(" | "));
        for (_, row) in self.data_rows() {
            out.push('\n');
            out.push_str(&row.join(" | "));
        }
        out
    }
}

/// One segment per non-blank CSV data row
pub fn csv_segments(path: &Path, text: &str, remove_empty_columns: bool) -> Result<Vec<Segment>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| Error::extraction(path, format!("invalid CSV header: {}", e)))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| Error::extraction(path, format!("invalid CSV row: {}", e)))?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    let mut table = Table::new(headers, rows);
    if remove_empty_columns {
        let removed = table.remove_empty_columns();
        if removed > 0 {
            tracing::debug!("Removed {} empty column(s) from {}", removed, path.display());
        }
    }

    Ok(table
        .data_rows()
        .map(|(index, row)| Segment::new(table.render_row(row), SegmentLabel::Row(index as u32 + 1)))
        .collect())
}

/// One segment per non-empty worksheet
pub fn workbook_segments(path: &Path, data: &[u8], remove_empty_columns: bool) -> Result<Vec<Segment>> {
    let mut workbook = calamine::open_workbook_auto_from_rs(std::io::Cursor::new(data))
        .map_err(|e| Error::extraction(path, format!("unreadable spreadsheet: {}", e)))?;

    let mut segments = Vec::new();
    for name in workbook.sheet_names().to_vec() {
        let range = match workbook.worksheet_range(&name) {
            Ok(range) => range,
            Err(e) => {
                tracing::warn!("Skipping sheet '{}' in {}: {}", name, path.display(), e);
                continue;
            }
        };

        let mut rows = range
            .rows()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect::<Vec<_>>());
        let Some(headers) = rows.next() else {
            continue;
        };
        let mut table = Table::new(headers, rows.collect());
        if remove_empty_columns {
            table.remove_empty_columns();
        }
        if table.data_rows().next().is_none() && table.headers.iter().all(|h| h.trim().is_empty()) {
            continue;
        }

        segments.push(Segment::new(table.render_sheet(&name), SegmentLabel::Sheet(name)));
    }

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_remove_empty_columns_ignores_header() {
        let mut table = Table::new(
            strings(&["name", "notes", "age"]),
            vec![strings(&["ada", "", "36"]), strings(&["alan", "  ", "41"])],
        );
        assert_eq!(table.remove_empty_columns(), 1);
        assert_eq!(table.headers, strings(&["name", "age"]));
        assert_eq!(table.rows[1], strings(&["alan", "41"]));
    }

    #[test]
    fn test_short_rows_are_padded() {
        let table = Table::new(strings(&["a", "b", "c"]), vec![strings(&["1"])]);
        assert_eq!(table.rows[0], strings(&["1", "", ""]));
    }

    #[test]
    fn test_csv_segments_per_row() {
        let csv = "city,country,code\nOslo,Norway,\n,,\nLima,Peru,\n";
        let segments = csv_segments(Path::new("cities.csv"), csv, false).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "city: Oslo | country: Norway | code: ");
        assert_eq!(segments[1].label, SegmentLabel::Row(3));

        let segments = csv_segments(Path::new("cities.csv"), csv, true).unwrap();
        assert_eq!(segments[0].text, "city: Oslo | country: Norway");
    }

    #[test]
    fn test_render_sheet() {
        let table = Table::new(
            strings(&["id", "label"]),
            vec![strings(&["1", "first"]), strings(&["", ""])],
        );
        assert_eq!(table.render_sheet("Q1"), "=== Sheet: Q1 ===\nid | label\n1 | first");
    }

    #[test]
    fn test_corrupt_workbook() {
        let result = workbook_segments(Path::new("bad.xlsx"), b"not a workbook", false);
        assert!(matches!(result, Err(Error::Extraction { .. })));
    }
}
