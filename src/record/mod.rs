use serde::Serialize;

/// Upper bound on the capacity reserved up front for a fresh batch.
/// Larger batches grow on demand.
const PREALLOC_LIMIT: usize = 1024;

/// One normalized log entry.
///
/// Serializes as `{"timestamp": .., "line": .., "file": ..}`, the shape the
/// ingestion API expects for each element of `lines`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    /// Unix seconds.
    pub timestamp: i64,
    pub line: String,
    #[serde(rename = "file")]
    pub origin: String,
}

impl Record {
    pub fn new(timestamp: i64, line: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            timestamp,
            line: line.into(),
            origin: origin.into(),
        }
    }
}

/// Ordered group of records bounded by a fixed maximum count.
#[derive(Debug)]
pub struct Batch {
    records: Vec<Record>,
    max_records: usize,
}

impl Batch {
    pub fn new(max_records: usize) -> Self {
        let max_records = max_records.max(1);
        Self {
            records: Vec::with_capacity(max_records.min(PREALLOC_LIMIT)),
            max_records,
        }
    }

    /// Append a record. A full batch hands the record back untouched so the
    /// caller can flush first and retry against the fresh batch.
    pub fn push(&mut self, record: Record) -> Result<(), Record> {
        if self.is_full() {
            return Err(record);
        }
        self.records.push(record);
        Ok(())
    }

    pub fn is_full(&self) -> bool {
        self.records.len() >= self.max_records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn max_records(&self) -> usize {
        self.max_records
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Detach the current contents, leaving an empty batch with the same limit.
    pub fn take(&mut self) -> Batch {
        std::mem::replace(self, Batch::new(self.max_records))
    }
}
