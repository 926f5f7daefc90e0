//! Background operation controls.

use dropq_core::{OperationAction, OperationControls, OperationId, OperationSnapshot};

use crate::{ApiError, Services};

fn parse_operation_ids<S: AsRef<str>>(ids: &[S]) -> Result<Vec<OperationId>, ApiError> {
    ids.iter()
        .map(|id| {
            let id = id.as_ref();
            OperationId::parse(id).map_err(|e| ApiError::invalid_id(id, e))
        })
        .collect()
}

impl Services {
    pub fn list_operations(&self) -> Vec<OperationSnapshot> {
        self.operations.list()
    }

    /// Only filesystem work, as shown in the disk operations view.
    pub fn disk_operations(&self) -> Vec<OperationSnapshot> {
        self.operations.disk_ops()
    }

    pub fn operation_controls<S: AsRef<str>>(
        &self,
        ids: &[S],
    ) -> Result<OperationControls, ApiError> {
        Ok(self.operations.controls(&parse_operation_ids(ids)?))
    }

    /// Apply one action to one operation.
    pub fn control_operation(
        &self,
        id: &str,
        action: OperationAction,
    ) -> Result<OperationSnapshot, ApiError> {
        let id = OperationId::parse(id).map_err(|e| ApiError::invalid_id(id, e))?;
        Ok(self.operations.control(id, action)?)
    }

    /// Apply an action to every eligible operation in a selection.
    pub fn apply_operations<S: AsRef<str>>(
        &self,
        ids: &[S],
        action: OperationAction,
    ) -> Result<Vec<OperationId>, ApiError> {
        let applied = self.operations.apply(&parse_operation_ids(ids)?, action);
        tracing::debug!(action = action.as_str(), applied = applied.len(), "Operation batch");
        Ok(applied)
    }
}
