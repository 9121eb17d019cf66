pub mod errors;
pub mod events;
pub mod id;

pub use errors::{ConfigError, LocusError, RemoteError, SyncError};
pub use events::{EventBus, SyncEvent};
pub use id::{new_id, DeviceId, UserId};

pub type Result<T> = std::result::Result<T, LocusError>;
