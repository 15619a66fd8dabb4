use std::path::{Path, PathBuf};

use serde::Deserialize;

use viewer_api::{CellValue, DataColumn, Dataset};

use crate::error::LoadError;

/// On-disk layout of a dataset file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    /// A Dataset-shaped JSON object.
    Json,
    /// Header row plus records; every column is typed `string`.
    Csv,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(SourceFormat::Json),
            "csv" => Some(SourceFormat::Csv),
            _ => None,
        }
    }
}

/// One `[[datasets]]` entry of the server config.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetSource {
    pub path: PathBuf,
    /// Overrides the id stored in the file. Empty → generated on registration.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    /// Inferred from the file extension when absent.
    #[serde(default)]
    pub format: Option<SourceFormat>,
}

impl DatasetSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            id: None,
            title: None,
            format: None,
        }
    }
}

/// Read a dataset described by `source`.
pub fn load_dataset(source: &DatasetSource) -> Result<Dataset, LoadError> {
    let path = &source.path;
    let shown = path.display().to_string();

    let format = source
        .format
        .or_else(|| SourceFormat::from_path(path))
        .ok_or_else(|| LoadError::UnknownFormat(shown.clone()))?;

    let mut dataset = match format {
        SourceFormat::Json => load_json(path)?,
        SourceFormat::Csv => load_csv(path)?,
    };

    dataset.check_columns().map_err(|source| LoadError::Shape {
        path: shown.clone(),
        source,
    })?;

    if let Some(id) = &source.id {
        dataset.id = id.clone();
    }
    if let Some(title) = &source.title {
        dataset.title = title.clone();
    }

    tracing::debug!(
        path = %shown,
        format = ?format,
        rows = dataset.row_count,
        columns = dataset.columns.len(),
        "loaded dataset"
    );
    Ok(dataset)
}

fn load_json(path: &Path) -> Result<Dataset, LoadError> {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Raw {
        #[serde(default)]
        id: String,
        title: Option<String>,
        #[serde(default)]
        columns: Vec<DataColumn>,
        row_count: Option<usize>,
    }

    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let raw: Raw = serde_json::from_str(&content).map_err(|source| LoadError::Json {
        path: path.display().to_string(),
        source,
    })?;

    let mut dataset = Dataset::from_columns(raw.title.unwrap_or_else(|| file_stem(path)), raw.columns);
    dataset.id = raw.id;
    if let Some(n) = raw.row_count {
        dataset.row_count = n;
    }
    Ok(dataset)
}

fn load_csv(path: &Path) -> Result<Dataset, LoadError> {
    let csv_err = |source| LoadError::Csv {
        path: path.display().to_string(),
        source,
    };

    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    let mut columns: Vec<DataColumn> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(|name| DataColumn::new(name.trim(), "string", Vec::new()))
        .collect();

    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        for (column, field) in columns.iter_mut().zip(record.iter()) {
            column.data.push(CellValue::Text(field.to_string()));
        }
    }

    Ok(Dataset::from_columns(file_stem(path), columns))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Data")
        .to_string()
}
