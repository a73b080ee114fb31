//! Delimited file reader
//!
//! Splits each physical line on a literal delimiter and maps the tokens
//! positionally onto the configured source columns. There is no quoting or
//! escaping: a delimiter inside a field always splits it.

use std::path::PathBuf;

use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::debug;

use super::error::LoadError;
use super::model::{FileConfig, GenericDataRecord};

/// Lazy, single-pass sequence of records read from a source
pub struct DelimitedRecordReader<R = BufReader<File>> {
    lines: Lines<R>,
    delimiter: String,
    columns: Vec<String>,
    table_name: String,
    skip_header: bool,
    line: u64,
}

impl DelimitedRecordReader<BufReader<File>> {
    /// Open the configured source file
    ///
    /// Fails before any record is produced when the file is missing or
    /// cannot be opened.
    pub async fn open(config: &FileConfig) -> Result<Self, LoadError> {
        let path = PathBuf::from(&config.source_file_path);
        let file = File::open(&path)
            .await
            .map_err(|source| LoadError::SourceOpen { path: path.clone(), source })?;

        debug!(path = %path.display(), "Opened source file");
        Ok(Self::from_reader(BufReader::new(file), config))
    }
}

impl<R: AsyncBufRead + Unpin> DelimitedRecordReader<R> {
    pub fn from_reader(reader: R, config: &FileConfig) -> Self {
        Self {
            lines: reader.lines(),
            delimiter: config.delimiter.clone(),
            columns: config
                .ordered_columns()
                .into_iter()
                .map(|c| c.source_column_name.clone())
                .collect(),
            table_name: config.target_table_name.clone(),
            skip_header: config.has_header,
            line: 0,
        }
    }

    /// Physical lines consumed so far, header included
    pub fn lines_read(&self) -> u64 {
        self.line
    }

    /// Read the next record, or `None` once the source is exhausted
    pub async fn next_record(&mut self) -> Result<Option<GenericDataRecord>, LoadError> {
        if self.skip_header {
            self.skip_header = false;
            if self.next_line().await?.is_none() {
                return Ok(None);
            }
        }

        let text = match self.next_line().await? {
            Some(text) => text,
            None => return Ok(None),
        };

        self.map_line(&text).map(Some)
    }

    async fn next_line(&mut self) -> Result<Option<String>, LoadError> {
        let next = self
            .lines
            .next_line()
            .await
            .map_err(|source| LoadError::SourceRead { line: self.line, source })?;
        if next.is_some() {
            self.line += 1;
        }
        Ok(next)
    }

    fn map_line(&self, text: &str) -> Result<GenericDataRecord, LoadError> {
        let tokens: Vec<&str> = text.split(self.delimiter.as_str()).collect();
        if tokens.len() != self.columns.len() {
            return Err(LoadError::RecordParse {
                line: self.line,
                expected: self.columns.len(),
                actual: tokens.len(),
            });
        }

        let mut record = GenericDataRecord::new(&self.table_name, self.line);
        for (column, token) in self.columns.iter().zip(tokens) {
            record.set_value(column.clone(), Some(token.to_string()));
        }
        Ok(record)
    }
}
