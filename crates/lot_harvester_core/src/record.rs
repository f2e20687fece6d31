use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Identifier;

pub const IDENTIFIER_COLUMN: &str = "LotNumber";
pub const OUTCOME_COLUMN: &str = "Outcome";

const PERMIT_FIELDS: &[&str] = &[
    "Going Through",
    "Name",
    "Gender",
    "PassportNo",
    "Company",
    "Country",
    "ApprovedDate",
    "StickerNo",
    "Skill",
    "Contract Period (in years)",
    "Salary",
    "Insurance",
    "Policy No.",
    "Policy Expiry Date",
    "Medical",
    "SSFId",
    "SubmissionNo",
];

/// Label/value pairs as read from the result page, in page order.
pub type FieldValues = Vec<(String, String)>;

/// The fixed set of extracted fields, in artifact column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    labels: Vec<String>,
}

impl FieldSchema {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    /// Labels of the work-permit details table.
    pub fn permit_details() -> Self {
        Self::new(PERMIT_FIELDS.iter().copied())
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Column index for a label scraped from the page. Matching ignores case,
    /// surrounding whitespace and a trailing colon.
    pub fn position(&self, label: &str) -> Option<usize> {
        let wanted = normalize_label(label);
        if wanted.is_empty() {
            return None;
        }
        self.labels
            .iter()
            .position(|known| normalize_label(known).eq_ignore_ascii_case(wanted))
    }

    /// Header row: identifier, outcome, then every field label.
    pub fn header(&self) -> Vec<String> {
        let mut header = Vec::with_capacity(self.labels.len() + 2);
        header.push(IDENTIFIER_COLUMN.to_string());
        header.push(OUTCOME_COLUMN.to_string());
        header.extend(self.labels.iter().cloned());
        header
    }
}

impl Default for FieldSchema {
    fn default() -> Self {
        Self::permit_details()
    }
}

fn normalize_label(label: &str) -> &str {
    label.trim().trim_end_matches(':').trim_end()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Success,
    NotFound,
    Transient,
    Fatal,
}

impl RecordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Success => "success",
            RecordStatus::NotFound => "not_found",
            RecordStatus::Transient => "transient",
            RecordStatus::Fatal => "fatal",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One output row. `values` is aligned with the [`FieldSchema`] it was built
/// against; unavailable fields are empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub identifier: Identifier,
    pub status: RecordStatus,
    pub values: Vec<String>,
}

impl Record {
    /// Builds a successful record from scraped pairs. Labels outside the
    /// schema are dropped; for repeated labels the first one wins.
    pub fn from_pairs<I>(identifier: Identifier, schema: &FieldSchema, pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut values = vec![String::new(); schema.len()];
        let mut filled = vec![false; schema.len()];
        for (label, value) in pairs {
            if let Some(idx) = schema.position(&label) {
                if !filled[idx] {
                    values[idx] = value.trim().to_string();
                    filled[idx] = true;
                }
            }
        }
        Self {
            identifier,
            status: RecordStatus::Success,
            values,
        }
    }

    /// Row with every field empty, marking an identifier that produced no data.
    pub fn placeholder(identifier: Identifier, status: RecordStatus, schema: &FieldSchema) -> Self {
        Self {
            identifier,
            status,
            values: vec![String::new(); schema.len()],
        }
    }

    pub fn value<'a>(&'a self, schema: &FieldSchema, label: &str) -> Option<&'a str> {
        schema
            .position(label)
            .and_then(|idx| self.values.get(idx))
            .map(String::as_str)
    }

    /// Cells in header order, the identifier rendered at `id_width`.
    pub fn to_row(&self, id_width: usize) -> Vec<String> {
        let mut row = Vec::with_capacity(self.values.len() + 2);
        row.push(self.identifier.token(id_width));
        row.push(self.status.as_str().to_string());
        row.extend(self.values.iter().cloned());
        row
    }
}

/// Terminal result of one identifier's fetch cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success(Record),
    /// Page loaded but the details were absent.
    NotFound(Identifier),
    /// Timing or staleness fault that outlived every retry.
    Transient(Identifier, String),
    /// Unclassified fault; not retried.
    Fatal(Identifier, String),
}

impl AttemptOutcome {
    pub fn identifier(&self) -> Identifier {
        match self {
            AttemptOutcome::Success(record) => record.identifier,
            AttemptOutcome::NotFound(id)
            | AttemptOutcome::Transient(id, _)
            | AttemptOutcome::Fatal(id, _) => *id,
        }
    }

    pub fn status(&self) -> RecordStatus {
        match self {
            AttemptOutcome::Success(_) => RecordStatus::Success,
            AttemptOutcome::NotFound(_) => RecordStatus::NotFound,
            AttemptOutcome::Transient(..) => RecordStatus::Transient,
            AttemptOutcome::Fatal(..) => RecordStatus::Fatal,
        }
    }

    /// Every outcome becomes exactly one row.
    pub fn into_record(self, schema: &FieldSchema) -> Record {
        match self {
            AttemptOutcome::Success(record) => record,
            other => {
                let status = other.status();
                Record::placeholder(other.identifier(), status, schema)
            }
        }
    }
}

/// Records accumulated since the last checkpoint, in identifier order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    records: Vec<Record>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn first_identifier(&self) -> Option<Identifier> {
        self.records.first().map(|r| r.identifier)
    }

    pub fn last_identifier(&self) -> Option<Identifier> {
        self.records.last().map(|r| r.identifier)
    }

    /// Puts an earlier batch back in front of this one, keeping order.
    pub fn restore_front(&mut self, earlier: Batch) {
        let mut records = earlier.records;
        records.append(&mut self.records);
        self.records = records;
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

impl From<Vec<Record>> for Batch {
    fn from(records: Vec<Record>) -> Self {
        Self { records }
    }
}
