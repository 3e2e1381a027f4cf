use crate::backends::StoreError;
use crate::mqtt::transport::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Recipe id {0} does not fit in seven digits")]
    RecipeIdOutOfRange(u32),

    #[error("Schedule time {0}s is outside a single day")]
    TimeOutOfRange(u32),

    #[error("Unparseable firmware version: {0}")]
    InvalidFirmwareVersion(String),

    #[error("Failed to encode command: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Device registry lookup failed: {0}")]
    Registry(#[from] StoreError),

    #[error("Failed to publish {command}: {source}")]
    Publish {
        command: &'static str,
        #[source]
        source: TransportError,
    },
}
