//! Loosely typed raw table: the bronze side of the refinement.
//!
//! Column labels are whatever the source files claimed; every cell is text or
//! missing. Rows always have exactly one cell per column.

use super::TransformError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table from string cells; empty strings become missing.
    pub fn from_strings<C, R, S>(columns: C, rows: R) -> Result<Self, TransformError>
    where
        C: IntoIterator,
        C::Item: Into<String>,
        R: IntoIterator,
        R::Item: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut table = Self::new(columns.into_iter().map(Into::into).collect());
        for row in rows {
            table.push_row(row.into_iter().map(|c| cell(c.as_ref())).collect())?;
        }
        Ok(table)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Option<String>>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of the first column with this label.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn push_row(&mut self, row: Vec<Option<String>>) -> Result<(), TransformError> {
        if row.len() != self.columns.len() {
            return Err(TransformError::Malformed(format!(
                "row {} has {} cells, expected {}",
                self.rows.len(),
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Relabel every column. Columns that end up with the same label are
    /// merged into the first of them, taking each row's first non-missing cell.
    pub fn map_columns<F: Fn(&str) -> String>(self, f: F) -> Self {
        let labels: Vec<String> = self.columns.iter().map(|c| f(c)).collect();
        let mut merged = RawTable::new(Vec::new());
        let mapping = merged.column_mapping(&labels);
        merged.push_mapped(self.rows, &mapping);
        merged
    }

    /// Append `other` below this table. Columns are the union of both headers
    /// in first-seen order; cells a table did not have are missing. Repeated
    /// labels in `other` fold into one column, first non-missing cell wins.
    pub fn append(&mut self, other: RawTable) {
        let mapping = self.column_mapping(&other.columns);
        self.push_mapped(other.rows, &mapping);
    }

    /// Target column for each label, adding columns this table lacks.
    fn column_mapping(&mut self, labels: &[String]) -> Vec<usize> {
        labels
            .iter()
            .map(|col| match self.column_index(col) {
                Some(i) => i,
                None => {
                    self.columns.push(col.clone());
                    for row in &mut self.rows {
                        row.push(None);
                    }
                    self.columns.len() - 1
                }
            })
            .collect()
    }

    fn push_mapped(&mut self, rows: Vec<Vec<Option<String>>>, mapping: &[usize]) {
        let width = self.columns.len();
        for row in rows {
            let mut out = vec![None; width];
            for (value, &target) in row.into_iter().zip(mapping) {
                if out[target].is_none() {
                    out[target] = value;
                }
            }
            self.rows.push(out);
        }
    }
}

/// Empty text is a missing cell.
pub(crate) fn cell(raw: &str) -> Option<String> {
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}
