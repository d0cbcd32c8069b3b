//! Per-turn tool call registry

use crate::conversation::{ToolCallRecord, ToolStatus};

/// Why a tool result could not be applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveError {
    /// No call with this id was registered in the turn
    Unknown,
    /// The call was already resolved with the given status
    AlreadyResolved(ToolStatus),
}

/// Tool calls issued during one turn, in call order.
///
/// A fresh registry is created for every turn, so a call id reused by a later turn
/// never resolves a record that belongs to an earlier one.
#[derive(Debug, Default, Clone)]
pub struct ToolCallRegistry {
    calls: Vec<ToolCallRecord>,
}

impl ToolCallRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record. Returns false (and leaves the registry alone) if the id is taken.
    pub fn register(&mut self, record: ToolCallRecord) -> bool {
        if self.get(&record.id).is_some() {
            return false;
        }
        self.calls.push(record);
        true
    }

    /// Resolve a call by id
    pub fn resolve(
        &mut self,
        id: &str,
        status: ToolStatus,
        result: &str,
        at: f64,
    ) -> Result<&ToolCallRecord, ResolveError> {
        let record = self
            .calls
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(ResolveError::Unknown)?;
        if !record.resolve(status, result, at) {
            return Err(ResolveError::AlreadyResolved(record.status));
        }
        Ok(record)
    }

    /// Look up a call by id
    pub fn get(&self, id: &str) -> Option<&ToolCallRecord> {
        self.calls.iter().find(|r| r.id == id)
    }

    /// Copy of every record, in call order
    pub fn snapshot(&self) -> Vec<ToolCallRecord> {
        self.calls.clone()
    }

    /// Number of calls that finished successfully
    pub fn completed_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|r| r.status == ToolStatus::Completed)
            .count()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}
