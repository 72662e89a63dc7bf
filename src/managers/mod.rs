//! Domain managers the command dispatcher forwards to

mod host;
mod user;
mod vm;

pub use host::{HostManager, TopologyHostManager};
pub use user::{MemoryUserManager, UserManager, UserRecord};
pub use vm::{MemoryVmManager, PowerState, VmManager, VmOperation, VmRecord};
