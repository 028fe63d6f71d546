//! Table rendering utilities for CLI outputs.

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

pub struct Column {
    pub header: String,
    pub width: usize,
}

impl Column {
    pub fn new(header: &str, width: usize) -> Self {
        Self {
            header: header.to_string(),
            width,
        }
    }
}

pub struct Table {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<String>>,
}

/// Cut `s` to `width` terminal columns, marking the cut with `…`, then pad.
/// Geofence names come from the backend and may hold wide characters.
fn fit(s: &str, width: usize) -> String {
    let mut out = String::new();
    if UnicodeWidthStr::width(s) <= width {
        out.push_str(s);
    } else {
        let mut used = 0;
        for c in s.chars() {
            let w = UnicodeWidthChar::width(c).unwrap_or(0);
            if used + w + 1 > width {
                break;
            }
            out.push(c);
            used += w;
        }
        out.push('…');
    }
    let pad = width.saturating_sub(UnicodeWidthStr::width(out.as_str()));
    out.push_str(&" ".repeat(pad));
    out
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn add_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn render(&self) -> String {
        let mut out = String::new();

        // Header
        for col in &self.columns {
            out.push_str(&fit(&col.header, col.width));
            out.push(' ');
        }
        out.push('\n');

        // Rows (missing cells render empty)
        for row in &self.rows {
            for (i, col) in self.columns.iter().enumerate() {
                let cell = row.get(i).map(String::as_str).unwrap_or("");
                out.push_str(&fit(cell, col.width));
                out.push(' ');
            }
            out.push('\n');
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_cells_are_truncated_to_column_width() {
        let mut t = Table::new(vec![Column::new("ID", 3), Column::new("NAME", 6)]);
        t.add_row(vec!["1".into(), "Office Headquarters".into()]);
        let out = t.render();
        assert!(out.contains("Offic…"));
        assert!(!out.contains("Headquarters"));
    }

    #[test]
    fn wide_characters_are_padded_by_display_width() {
        let mut t = Table::new(vec![Column::new("NAME", 6), Column::new("ID", 2)]);
        t.add_row(vec!["東京".into(), "7".into()]);
        let out = t.render();
        // 東京 takes four columns, so two spaces of padding plus the separator
        assert!(out.contains("東京   7"));
    }
}
