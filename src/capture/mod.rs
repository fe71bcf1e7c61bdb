pub mod automation;
pub mod protocol;

pub use automation::{Automation, CopyVariant, SystemAutomation};
pub use protocol::{CaptureTiming, SelectionCapture};
