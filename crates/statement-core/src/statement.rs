//! Extracted statement data and the transaction edit buffer

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// One extracted transaction.
///
/// Only `id` is interpreted; date, description, amount and whatever else the
/// extraction produced are carried through untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Transaction {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    /// Builder-style field setter
    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn set_field(&mut self, name: &str, value: impl Into<Value>) {
        self.fields.insert(name.to_string(), value.into());
    }

    pub fn amount(&self) -> Option<f64> {
        self.field("amount").and_then(Value::as_f64)
    }
}

/// Transactions plus any other metadata returned by the extraction
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StatementData {
    pub transactions: Vec<Transaction>,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

/// Accept identifiers sent either as JSON strings or numbers
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Committed statement plus a working copy that absorbs edits
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionEditBuffer {
    statement: Option<StatementData>,
    statement_copy: Option<StatementData>,
}

impl TransactionEditBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The committed statement
    pub fn committed(&self) -> Option<&StatementData> {
        self.statement.as_ref()
    }

    /// The working copy
    pub fn working(&self) -> Option<&StatementData> {
        self.statement_copy.as_ref()
    }

    /// Seed both statement and working copy with the same data
    pub fn load(&mut self, statement: StatementData) {
        self.statement_copy = Some(statement.clone());
        self.statement = Some(statement);
    }

    /// Drop both statement and working copy, returning them
    pub fn take(&mut self) -> (Option<StatementData>, Option<StatementData>) {
        (self.statement.take(), self.statement_copy.take())
    }

    /// Put back a pair previously returned by [`take`](Self::take)
    pub fn restore(&mut self, pair: (Option<StatementData>, Option<StatementData>)) {
        self.statement = pair.0;
        self.statement_copy = pair.1;
    }

    pub fn is_empty(&self) -> bool {
        self.statement.is_none() && self.statement_copy.is_none()
    }

    /// Replace the working-copy entry with the same id.
    ///
    /// Returns false when no entry matches.
    pub fn edit(&mut self, transaction: Transaction) -> bool {
        let Some(copy) = self.statement_copy.as_mut() else {
            return false;
        };
        match copy.transactions.iter_mut().find(|t| t.id == transaction.id) {
            Some(slot) => {
                *slot = transaction;
                true
            }
            None => false,
        }
    }

    /// Replace the committed statement with the whole working copy
    pub fn commit(&mut self) -> bool {
        match &self.statement_copy {
            Some(copy) => {
                self.statement = Some(copy.clone());
                true
            }
            None => false,
        }
    }

    /// Replace the working copy with the whole committed statement
    pub fn discard_edits(&mut self) {
        self.statement_copy = self.statement.clone();
    }

    /// Whether the working copy differs from the committed statement
    pub fn is_dirty(&self) -> bool {
        self.statement != self.statement_copy
    }

    /// Overwrite the transaction list of both statement and working copy,
    /// keeping their other metadata and the given identifiers
    pub fn replace_transactions(&mut self, transactions: Vec<Transaction>) {
        self.statement
            .get_or_insert_with(StatementData::default)
            .transactions = transactions.clone();
        self.statement_copy
            .get_or_insert_with(StatementData::default)
            .transactions = transactions;
    }
}
