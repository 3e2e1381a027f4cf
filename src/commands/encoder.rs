//! Outbound command envelopes.
//!
//! Every command is wrapped in the same envelope. The firmware expects the
//! command arguments as a JSON *string* inside the JSON envelope, so `payload`
//! is encoded twice.

use super::error::CommandError;
use super::schedule::ScheduleEntry;
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const DEFAULT_FEED_PORTION: f64 = 0.0625;
pub const DEFAULT_REMOTE_BUTTON_ENABLED: bool = true;
pub const DEFAULT_UTC_OFFSET: i64 = 0;

const TASK_ID_LEN: usize = 32;
const ENVELOPE_NAME: &str = "SendCommand";

/// 32 random lowercase ASCII letters.
pub fn generate_task_id() -> String {
    let mut rng = rand::thread_rng();
    (0..TASK_ID_LEN)
        .map(|_| rng.gen_range(b'a'..=b'z') as char)
        .collect()
}

/// Recipe identifier as the firmware parses it: one letter and seven digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecipeId(u32);

impl RecipeId {
    pub const MAX: u32 = 9_999_999;

    pub fn new(id: u32) -> Result<Self, CommandError> {
        if id > Self::MAX {
            return Err(CommandError::RecipeIdOutOfRange(id));
        }
        Ok(RecipeId(id))
    }

    pub fn encode(self) -> String {
        format!("E{:07}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Budget {
    pub recipe_id: RecipeId,
    pub tbsp_per_feeding: f64,
    pub g_per_tbsp: f64,
    pub budget_tbsp: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Feed { portion: f64 },
    ButtonEnableRemote { enable: bool },
    Reboot,
    UtcOffset { seconds: i64 },
    Budget(Budget),
    /// Legacy single-shot schedule replacement.
    Schedule(Vec<ScheduleEntry>),
    ScheduleClear,
    ScheduleModStart { size: usize },
    /// Entries are indexed by position when encoded.
    ScheduleAdd(Vec<ScheduleEntry>),
    ScheduleModEnd,
}

#[derive(Serialize)]
struct FeedArgs {
    portion: f64,
}

#[derive(Serialize)]
struct ButtonArgs {
    enable: bool,
}

#[derive(Serialize)]
struct UtcOffsetArgs {
    utc_offset: i64,
}

#[derive(Serialize)]
struct BudgetArgs {
    recipe: String,
    tbsp_per_feeding: f64,
    g_per_tbsp: f64,
    budget_tbsp: f64,
}

#[derive(Serialize)]
struct SizeArgs {
    size: usize,
}

#[derive(Serialize)]
struct IndexedEntry<'a> {
    index: usize,
    data: &'a ScheduleEntry,
}

#[derive(Serialize)]
struct NoArgs {}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Feed { .. } => "feed",
            Command::ButtonEnableRemote { .. } => "button_enable_remote",
            Command::Reboot => "reboot",
            Command::UtcOffset { .. } => "utc_offset",
            Command::Budget(_) => "budget",
            Command::Schedule(_) => "schedule",
            Command::ScheduleClear => "schedule_clear",
            Command::ScheduleModStart { .. } => "schedule_mod_start",
            Command::ScheduleAdd(_) => "schedule_add",
            Command::ScheduleModEnd => "schedule_mod_end",
        }
    }

    /// JSON-encoded arguments, as carried in the envelope's `payload`.
    pub fn arguments(&self) -> Result<String, CommandError> {
        let encoded = match self {
            Command::Feed { portion } => serde_json::to_string(&FeedArgs { portion: *portion }),
            Command::ButtonEnableRemote { enable } => {
                serde_json::to_string(&ButtonArgs { enable: *enable })
            }
            Command::UtcOffset { seconds } => serde_json::to_string(&UtcOffsetArgs {
                utc_offset: *seconds,
            }),
            Command::Budget(budget) => serde_json::to_string(&BudgetArgs {
                recipe: budget.recipe_id.encode(),
                tbsp_per_feeding: budget.tbsp_per_feeding,
                g_per_tbsp: budget.g_per_tbsp,
                budget_tbsp: budget.budget_tbsp,
            }),
            Command::Schedule(entries) => serde_json::to_string(entries),
            Command::ScheduleModStart { size } => serde_json::to_string(&SizeArgs { size: *size }),
            Command::ScheduleAdd(entries) => serde_json::to_string(
                &entries
                    .iter()
                    .enumerate()
                    .map(|(index, data)| IndexedEntry { index, data })
                    .collect::<Vec<_>>(),
            ),
            Command::Reboot | Command::ScheduleClear | Command::ScheduleModEnd => {
                serde_json::to_string(&NoArgs {})
            }
        };
        Ok(encoded?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    /// Task id; the device protocol calls this field `hid`.
    #[serde(rename = "hid")]
    pub task_id: String,
    pub name: String,
    pub encrypted: bool,
    pub parameters: CommandParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandParameters {
    #[serde(rename = "deviceHid")]
    pub device_id: String,
    pub command: String,
    pub payload: String,
}

impl CommandEnvelope {
    pub fn to_bytes(&self) -> Result<Vec<u8>, CommandError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Wraps `command` for `device_id` with a fresh task id.
pub fn build_command(device_id: &str, command: &Command) -> Result<CommandEnvelope, CommandError> {
    Ok(CommandEnvelope {
        task_id: generate_task_id(),
        name: ENVELOPE_NAME.to_string(),
        encrypted: false,
        parameters: CommandParameters {
            device_id: device_id.to_string(),
            command: command.name().to_string(),
            payload: command.arguments()?,
        },
    })
}
