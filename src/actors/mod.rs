pub mod coordinator;
pub mod messages;

pub use coordinator::CoordinatorHandle;
pub use messages::{
    ClearHistoryResponse, CoordinatorEvent, LifecycleEvent, Request, Response, StorageStatus,
};
