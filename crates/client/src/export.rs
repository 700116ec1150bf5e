//! Sheet export of the filtered record set.

use labgate_shared::Record;
use serde::Serialize;

type Formatter<R> = Box<dyn Fn(&R) -> String + Send + Sync>;

/// One exported column: a header and how to render a record into it.
pub struct SheetColumn<R> {
    pub header: String,
    format: Formatter<R>,
}

impl<R: Record> SheetColumn<R> {
    pub fn new(header: impl Into<String>, format: impl Fn(&R) -> String + Send + Sync + 'static) -> Self {
        Self {
            header: header.into(),
            format: Box::new(format),
        }
    }

    /// Column that copies a record field as-is.
    pub fn field(header: impl Into<String>, key: &'static str) -> Self {
        Self::new(header, move |r: &R| r.field(key).unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

pub fn build_sheet<R: Record>(records: &[R], columns: &[SheetColumn<R>]) -> Sheet {
    Sheet {
        headers: columns.iter().map(|c| c.header.clone()).collect(),
        rows: records
            .iter()
            .map(|r| columns.iter().map(|c| (c.format)(r)).collect())
            .collect(),
    }
}
