//! Device: leaf entity holding the last recorded reading
//!
//! A device is created by its group with a fixed `(group_id, device_id)`
//! identity and never changes it. The identity is only used to reject
//! misrouted track requests.

use crate::runtime::{ActorResult, Context, Entity, ReplyTo};

use super::messages::{DeviceRegistered, RequestId, TrackDevice};

/// Messages accepted by a [`Device`]
#[derive(Debug)]
pub enum DeviceMessage {
    /// Identity check; acknowledged only if both ids match
    Track(TrackDevice),
    /// Store a new reading
    Record {
        /// Caller correlation id
        request_id: RequestId,
        /// Reading to store
        value: f64,
        /// Receives the acknowledgement
        reply_to: ReplyTo<RecordAck>,
    },
    /// Report the last stored reading
    Read {
        /// Caller correlation id
        request_id: RequestId,
        /// Receives the reading
        reply_to: ReplyTo<ReadResult>,
    },
}

/// Acknowledgement of a [`DeviceMessage::Record`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordAck {
    /// Echo of the record request id
    pub request_id: RequestId,
}

/// Answer to a [`DeviceMessage::Read`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadResult {
    /// Echo of the read request id
    pub request_id: RequestId,
    /// Last recorded value, if any
    pub value: Option<f64>,
}

/// Leaf entity: one device within one group
pub struct Device {
    group_id: String,
    device_id: String,
    last_reading: Option<f64>,
}

impl Device {
    /// Create a device with no reading yet
    pub fn new(group_id: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            device_id: device_id.into(),
            last_reading: None,
        }
    }

    fn on_track(&self, ctx: &Context<DeviceMessage>, request: TrackDevice) {
        if request.group_id == self.group_id && request.device_id == self.device_id {
            request.reply_to.send(ctx.id(), DeviceRegistered);
        } else {
            tracing::warn!(
                requested_group = %request.group_id,
                requested_device = %request.device_id,
                group = %self.group_id,
                device = %self.device_id,
                "ignoring track request for another device"
            );
        }
    }
}

impl Entity for Device {
    type Message = DeviceMessage;

    fn on_start(&mut self, _ctx: &mut Context<DeviceMessage>) -> ActorResult<()> {
        tracing::info!(group = %self.group_id, device = %self.device_id, "device started");
        Ok(())
    }

    fn on_message(
        &mut self,
        ctx: &mut Context<DeviceMessage>,
        message: DeviceMessage,
    ) -> ActorResult<()> {
        match message {
            DeviceMessage::Track(request) => self.on_track(ctx, request),

            DeviceMessage::Record {
                request_id,
                value,
                reply_to,
            } => {
                tracing::debug!(device = %self.device_id, request_id, value, "recording reading");
                self.last_reading = Some(value);
                reply_to.send(ctx.id(), RecordAck { request_id });
            }

            DeviceMessage::Read {
                request_id,
                reply_to,
            } => {
                reply_to.send(
                    ctx.id(),
                    ReadResult {
                        request_id,
                        value: self.last_reading,
                    },
                );
            }
        }
        Ok(())
    }

    fn on_stop(&mut self, _ctx: &mut Context<DeviceMessage>) {
        tracing::info!(group = %self.group_id, device = %self.device_id, "device stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{AskError, Runtime};
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn track(group_id: &str, device_id: &str, reply_to: ReplyTo<DeviceRegistered>) -> DeviceMessage {
        DeviceMessage::Track(TrackDevice {
            manager_id: "m".to_string(),
            group_id: group_id.to_string(),
            device_id: device_id.to_string(),
            reply_to,
        })
    }

    #[tokio::test]
    async fn test_reply_to_registration_request() {
        let runtime = Runtime::new();
        let device = runtime.spawn("/iot/m/group/device", Device::new("group", "device"));

        let reply = device
            .ask(|reply_to| track("group", "device", reply_to), TIMEOUT)
            .await
            .unwrap();

        assert_eq!(reply.body, DeviceRegistered);
        assert_eq!(reply.sender, device.id());
    }

    #[tokio::test]
    async fn test_ignore_wrong_registration_requests() {
        let runtime = Runtime::new();
        let device = runtime.spawn("/iot/m/group/device", Device::new("group", "device"));

        let err = device
            .ask(|reply_to| track("wrongGroup", "device", reply_to), TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, AskError::Unanswered(_)));

        let err = device
            .ask(|reply_to| track("group", "wrongDevice", reply_to), TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, AskError::Unanswered(_)));
    }

    #[tokio::test]
    async fn test_reply_with_empty_reading_if_no_value_is_known() {
        let runtime = Runtime::new();
        let device = runtime.spawn("/iot/m/group/device", Device::new("group", "device"));

        let reply = device
            .ask(
                |reply_to| DeviceMessage::Read {
                    request_id: 42,
                    reply_to,
                },
                TIMEOUT,
            )
            .await
            .unwrap();

        assert_eq!(
            reply.body,
            ReadResult {
                request_id: 42,
                value: None
            }
        );
    }

    #[tokio::test]
    async fn test_reply_with_latest_reading() {
        let runtime = Runtime::new();
        let device = runtime.spawn("/iot/m/group/device", Device::new("group", "device"));

        for (request_id, value) in [(1, 24.0), (3, 55.0)] {
            let ack = device
                .ask(
                    |reply_to| DeviceMessage::Record {
                        request_id,
                        value,
                        reply_to,
                    },
                    TIMEOUT,
                )
                .await
                .unwrap();
            assert_eq!(ack.body, RecordAck { request_id });

            let read = device
                .ask(
                    |reply_to| DeviceMessage::Read {
                        request_id: request_id + 1,
                        reply_to,
                    },
                    TIMEOUT,
                )
                .await
                .unwrap();
            assert_eq!(read.body.request_id, request_id + 1);
            assert_eq!(read.body.value, Some(value));
        }
    }
}
