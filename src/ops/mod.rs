//! File operations: copy, move, rename and delete batches.

pub mod executor;
pub mod journal;
pub mod perform;
pub mod types;

pub use executor::{FileOperationExecutor, OperationHandle};
pub use journal::{JobOwner, JobRecord, Journal};
pub use types::{
    BatchSummary, Confirmation, ConflictResolution, FileOperation, ItemState, OperationEvent,
    OperationItem, OperationKind,
};
