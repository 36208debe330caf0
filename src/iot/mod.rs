//! Hierarchical device registry
//!
//! Devices are grouped under groups, groups under managers, and managers under
//! one supervisor. Each registry level lazily creates its children, forwards
//! track requests down the tree, forgets children as soon as they exit, and
//! answers system reads through a deadline-bounded scatter-gather.

// Submodules
pub mod device;
pub mod group;
pub mod manager;
pub mod messages;
pub mod query;
pub mod reading;
pub mod supervisor;
pub mod system;

// Re-export commonly used types
pub use device::{Device, DeviceMessage, ReadResult, RecordAck};
pub use group::{DeviceGroup, GroupMessage};
pub use manager::{DeviceManager, ManagerMessage};
pub use messages::{
    ChildFound, ChildList, DeviceRegistered, ListChildren, LookupChild, ManagerRegistered,
    RequestId, ScatterGather, ScatterResult, TrackDevice, TrackManager, is_valid_child_id,
};
pub use query::{QueryCoordinator, QueryTimeouts, ScatterTarget};
pub use reading::{GroupReading, ManagerReading, Reading};
pub use supervisor::{DeviceSupervisor, SupervisorMessage};
pub use system::IotSystem;
