use std::time::Duration;

use rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS};

use crate::config::MqttConfig;

/// Fixed command tokens a viewer can issue. Each maps to exactly one publish
/// on the actuator topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Red,
    Yellow,
    Green,
}

impl Command {
    pub fn token(self) -> &'static str {
        match self {
            Command::Red => "red",
            Command::Yellow => "yellow",
            Command::Green => "green",
        }
    }
}

/// Fire-and-forget publisher for viewer commands. Fully independent of the
/// video pipeline; a broker outage costs commands, never frames.
#[derive(Clone)]
pub struct CommandBus {
    client: AsyncClient,
    topic: String,
}

impl CommandBus {
    /// Create the client and spawn its event loop. Broker unavailability is
    /// not fatal: the loop logs and keeps reconnecting.
    pub fn connect(config: &MqttConfig) -> Self {
        let mut options = MqttOptions::new(
            config.client_id.clone(),
            config.broker_host.clone(),
            config.broker_port,
        );
        options.set_keep_alive(Duration::from_secs(30));

        let (client, event_loop) = AsyncClient::new(options, 10);
        tokio::spawn(drive_event_loop(event_loop));

        Self {
            client,
            topic: config.topic.clone(),
        }
    }

    /// Publish one command. Errors are logged, never retried or surfaced.
    pub async fn send(&self, command: Command) {
        let payload = command.token();
        match self
            .client
            .publish(self.topic.as_str(), QoS::AtLeastOnce, false, payload.as_bytes().to_vec())
            .await
        {
            Ok(()) => {
                tracing::debug!(command = payload, topic = %self.topic, "command published")
            }
            Err(e) => {
                tracing::warn!(command = payload, error = %e, "command publish failed")
            }
        }
    }
}

async fn drive_event_loop(mut event_loop: EventLoop) {
    loop {
        match event_loop.poll().await {
            Ok(event) => tracing::trace!(?event, "mqtt event"),
            Err(e) => {
                tracing::warn!(error = %e, "mqtt connection error");
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_payloads_are_fixed_and_distinct() {
        let tokens = [
            Command::Red.token(),
            Command::Yellow.token(),
            Command::Green.token(),
        ];
        assert_eq!(tokens, ["red", "yellow", "green"]);
    }
}
