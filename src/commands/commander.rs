use super::encoder::{
    build_command, Budget, Command, DEFAULT_FEED_PORTION, DEFAULT_REMOTE_BUTTON_ENABLED,
    DEFAULT_UTC_OFFSET,
};
use super::error::CommandError;
use super::schedule::{plan_schedule, ScheduleEvent, ScheduleProtocol, LEGACY_FIRMWARE_VERSION};
use crate::backends::DeviceRegistry;
use crate::mqtt::config::TopicConfig;
use crate::mqtt::transport::Publisher;
use rumqttc::QoS;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Command issuance API used by the rest of the backend.
///
/// `Ok` means the publish was accepted by the local transport; the wire
/// protocol gives no end-to-end confirmation for commands.
#[derive(Clone)]
pub struct FeederCommander {
    publisher: Arc<dyn Publisher>,
    registry: Arc<dyn DeviceRegistry>,
    topics: TopicConfig,
}

impl FeederCommander {
    pub fn new(
        publisher: Arc<dyn Publisher>,
        registry: Arc<dyn DeviceRegistry>,
        topics: TopicConfig,
    ) -> Self {
        Self {
            publisher,
            registry,
            topics,
        }
    }

    pub async fn send(
        &self,
        gateway_id: &str,
        device_id: &str,
        command: &Command,
    ) -> Result<(), CommandError> {
        let envelope = build_command(device_id, command)?;
        let topic = self.topics.command_topic(gateway_id);
        debug!(
            "Publishing {} ({}) for {} to {}",
            command.name(),
            envelope.task_id,
            device_id,
            topic
        );

        self.publisher
            .publish(&topic, QoS::ExactlyOnce, envelope.to_bytes()?)
            .await
            .map_err(|source| CommandError::Publish {
                command: command.name(),
                source,
            })
    }

    pub async fn feed(
        &self,
        gateway_id: &str,
        device_id: &str,
        portion: Option<f64>,
    ) -> Result<(), CommandError> {
        let portion = portion.unwrap_or(DEFAULT_FEED_PORTION);
        self.send(gateway_id, device_id, &Command::Feed { portion })
            .await
    }

    pub async fn button_enable_remote(
        &self,
        gateway_id: &str,
        device_id: &str,
        enable: Option<bool>,
    ) -> Result<(), CommandError> {
        let enable = enable.unwrap_or(DEFAULT_REMOTE_BUTTON_ENABLED);
        self.send(gateway_id, device_id, &Command::ButtonEnableRemote { enable })
            .await
    }

    pub async fn reboot(&self, gateway_id: &str, device_id: &str) -> Result<(), CommandError> {
        self.send(gateway_id, device_id, &Command::Reboot).await
    }

    pub async fn utc_offset(
        &self,
        gateway_id: &str,
        device_id: &str,
        seconds: Option<i64>,
    ) -> Result<(), CommandError> {
        let seconds = seconds.unwrap_or(DEFAULT_UTC_OFFSET);
        self.send(gateway_id, device_id, &Command::UtcOffset { seconds })
            .await
    }

    pub async fn budget(
        &self,
        gateway_id: &str,
        device_id: &str,
        budget: Budget,
    ) -> Result<(), CommandError> {
        self.send(gateway_id, device_id, &Command::Budget(budget))
            .await
    }

    /// Replaces the device schedule using the protocol its firmware speaks.
    ///
    /// Steps are published strictly in order and publishing stops at the
    /// first failure; the device may then hold a partially updated schedule.
    pub async fn schedule(
        &self,
        gateway_id: &str,
        device_id: &str,
        events: &[ScheduleEvent],
    ) -> Result<ScheduleProtocol, CommandError> {
        let firmware = self.registry.firmware_version(device_id).await?;
        match &firmware {
            Some(version) => debug!("Device {} reports firmware {}", device_id, version),
            None => debug!(
                "No firmware version recorded for {}, assuming {}",
                device_id, LEGACY_FIRMWARE_VERSION
            ),
        }

        let plan = plan_schedule(device_id, events, firmware.as_deref())?;
        info!(
            "Sending {} schedule events to {} using {:?} protocol",
            events.len(),
            device_id,
            plan.protocol
        );

        for (step, command) in plan.commands.iter().enumerate() {
            if let Err(e) = self.send(gateway_id, device_id, command).await {
                error!(
                    "Schedule update for {} stopped at step {} of {} ({}): {}",
                    device_id,
                    step + 1,
                    plan.commands.len(),
                    command.name(),
                    e
                );
                return Err(e);
            }
        }
        Ok(plan.protocol)
    }
}
