use serde::{Deserialize, Serialize};

use crate::error::{DatasetError, InvalidRange};
use crate::value::CellValue;

fn default_title() -> String {
    "Data".to_string()
}

// ════════════════════════════════════════════════════════════════
//  DataColumn / Dataset
// ════════════════════════════════════════════════════════════════

/// A single column of data. The viewer works column-wise because that is
/// how most sources store tabular data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataColumn {
    pub name: String,
    /// Type tag for the client. Not enforced here.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Vec<CellValue>,
}

impl DataColumn {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, data: Vec<CellValue>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            data,
        }
    }
}

/// Column-oriented snapshot of a table.
///
/// `row_count` is the logical size of the source. `columns` may hold fewer
/// rows than that; clients use `row_count` to know how many pages remain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    #[serde(default)]
    pub id: String,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub columns: Vec<DataColumn>,
    #[serde(default)]
    pub row_count: usize,
}

impl Dataset {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        columns: Vec<DataColumn>,
        row_count: usize,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            columns,
            row_count,
        }
    }

    /// Dataset with an empty id whose row count is taken from the first column.
    pub fn from_columns(title: impl Into<String>, columns: Vec<DataColumn>) -> Self {
        let row_count = columns.first().map_or(0, |c| c.data.len());
        Self::new(String::new(), title, columns, row_count)
    }

    /// Verify that every column holds the same number of values.
    pub fn check_columns(&self) -> Result<(), DatasetError> {
        let Some(first) = self.columns.first() else {
            return Ok(());
        };
        let expected = first.data.len();
        match self.columns.iter().find(|c| c.data.len() != expected) {
            Some(column) => Err(DatasetError::RaggedColumns {
                column: column.name.clone(),
                expected,
                actual: column.data.len(),
            }),
            None => Ok(()),
        }
    }

    /// Rows `[start, start + size)` of every column, as borrowed views.
    ///
    /// `start` must lie in `[0, row_count)`; an empty dataset therefore rejects
    /// every start, including 0. The end of the window is clipped to each
    /// column's length. A negative end (`start + size < 0`) counts back from
    /// the end of the column, and an end at or before `start` gives an empty
    /// window.
    pub fn slice(&self, start: i64, size: i64) -> Result<Vec<ColumnView<'_>>, InvalidRange> {
        let in_range = usize::try_from(start)
            .ok()
            .filter(|&s| s < self.row_count);
        let Some(first) = in_range else {
            return Err(InvalidRange { start });
        };

        if first == 0 && i64::try_from(self.row_count).is_ok_and(|n| n <= size) {
            // Whole dataset fits in one page.
            return Ok(self.columns.iter().map(ColumnView::from).collect());
        }

        let end = start.saturating_add(size);
        Ok(self
            .columns
            .iter()
            .map(|column| {
                let n = column.data.len();
                let lo = first.min(n);
                let hi = if end < 0 {
                    n.saturating_sub(usize::try_from(end.unsigned_abs()).unwrap_or(usize::MAX))
                } else {
                    usize::try_from(end).map_or(n, |e| e.min(n))
                };
                let hi = hi.max(lo);
                ColumnView {
                    name: &column.name,
                    kind: &column.kind,
                    data: &column.data[lo..hi],
                }
            })
            .collect())
    }

    /// Payload for a data response: this dataset's identity and total row
    /// count with the columns replaced by the requested window.
    pub fn window(&self, start: i64, size: i64) -> Result<DatasetWindow<'_>, InvalidRange> {
        Ok(DatasetWindow {
            id: &self.id,
            title: &self.title,
            columns: self.slice(start, size)?,
            row_count: self.row_count,
        })
    }
}

// ════════════════════════════════════════════════════════════════
//  Borrowed views
// ════════════════════════════════════════════════════════════════

/// Column restricted to a row window. References the owning column's values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ColumnView<'a> {
    pub name: &'a str,
    #[serde(rename = "type")]
    pub kind: &'a str,
    pub data: &'a [CellValue],
}

impl<'a> From<&'a DataColumn> for ColumnView<'a> {
    fn from(column: &'a DataColumn) -> Self {
        Self {
            name: &column.name,
            kind: &column.kind,
            data: &column.data,
        }
    }
}

/// Dataset-shaped payload carried by `initial_data` / `receive_rows`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetWindow<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub columns: Vec<ColumnView<'a>>,
    pub row_count: usize,
}
