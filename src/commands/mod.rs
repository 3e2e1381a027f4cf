//! Outbound command encoding and issuance.
//!
//! ```text
//! commands/
//! ├── encoder.rs    - Command kinds and the SendCommand envelope
//! ├── schedule.rs   - Schedule entries and the legacy/split protocol choice
//! ├── commander.rs  - Publishes commands to a gateway's command topic
//! └── error.rs
//! ```

pub mod commander;
pub mod encoder;
pub mod error;
pub mod schedule;

pub use commander::FeederCommander;
pub use encoder::{build_command, Budget, Command, CommandEnvelope, RecipeId};
pub use error::CommandError;
pub use schedule::{plan_schedule, ScheduleEntry, ScheduleEvent, ScheduleProtocol};
