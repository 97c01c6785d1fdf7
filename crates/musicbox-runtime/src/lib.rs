pub mod bridge;
pub mod channel;
pub mod log_scan;
pub mod process;
pub mod readiness;
pub mod resolver;
pub mod session;
pub mod sync;

pub use bridge::{BridgeRuntime, DebugStatus};
pub use channel::{ControlChannel, OscControlChannel};
pub use log_scan::{GuiLogScanner, LogSource};
pub use process::{EngineProcess, SystemEngineProcess};
pub use readiness::{PollOutcome, ReadinessPolicy};
pub use resolver::ConnectionResolver;
pub use session::{Session, SessionSnapshot, StopOutcome};
pub use sync::{LiveMixSynchronizer, MixSnapshot, UpdateSummary};
