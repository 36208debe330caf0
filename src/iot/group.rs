//! Group registry: the devices of one group
//!
//! A group creates devices on first track, forwards track requests to them,
//! and forgets a device as soon as it exits. Reads across all devices go
//! through a fresh [`DeviceQuery`] coordinator per request.

use std::time::Duration;

use crate::runtime::{ActorId, ActorResult, ChildRegistry, Context, Entity};

use super::device::{Device, DeviceMessage};
use super::messages::{
    ChildFound, ChildList, ListChildren, LookupChild, ScatterGather, TrackDevice,
    is_valid_child_id,
};
use super::query::DeviceQuery;
use super::reading::Reading;

/// Messages accepted by a [`DeviceGroup`]
#[derive(Debug)]
pub enum GroupMessage {
    /// Create the device if needed and let it acknowledge
    TrackDevice(TrackDevice),
    /// Report the ids of the current devices
    ListDevices(ListChildren),
    /// Report the handle of one device
    LookupDevice(LookupChild<DeviceMessage>),
    /// Read every device within the group deadline
    ReadAll(ScatterGather<Reading>),
    /// A watched device exited
    DeviceTerminated(ActorId),
}

/// Registry entity owning the devices of one group
pub struct DeviceGroup {
    group_id: String,
    devices: ChildRegistry<DeviceMessage>,
    query_timeout: Duration,
}

impl DeviceGroup {
    /// Create an empty group whose reads give up after `query_timeout`
    pub fn new(group_id: impl Into<String>, query_timeout: Duration) -> Self {
        Self {
            group_id: group_id.into(),
            devices: ChildRegistry::new(),
            query_timeout,
        }
    }

    fn track_device(&mut self, ctx: &mut Context<GroupMessage>, request: TrackDevice) {
        if request.group_id != self.group_id {
            tracing::warn!(
                requested_group = %request.group_id,
                group = %self.group_id,
                "ignoring track request for another group"
            );
            return;
        }
        if !is_valid_child_id(&request.device_id) {
            tracing::warn!(group = %self.group_id, device = %request.device_id, "invalid device id");
            return;
        }

        let group_id = self.group_id.clone();
        let device_id = request.device_id.clone();
        let device = self.devices.get_or_spawn(
            ctx,
            &request.device_id,
            |ctx| {
                tracing::info!(group = %group_id, device = %device_id, "creating device");
                ctx.spawn_child(&device_id, Device::new(group_id.as_str(), device_id.as_str()))
            },
            GroupMessage::DeviceTerminated,
        );

        device.tell(DeviceMessage::Track(request));
    }

    fn list_devices(&self, ctx: &Context<GroupMessage>, request: ListChildren) {
        if request.owner_id != self.group_id {
            tracing::warn!(
                requested_group = %request.owner_id,
                group = %self.group_id,
                "ignoring device list request for another group"
            );
            return;
        }

        request.reply_to.send(
            ctx.id(),
            ChildList {
                request_id: request.request_id,
                ids: self.devices.ids(),
            },
        );
    }

    fn lookup_device(&self, ctx: &Context<GroupMessage>, request: LookupChild<DeviceMessage>) {
        let Some(device) = self.devices.get(&request.child_id) else {
            tracing::warn!(group = %self.group_id, device = %request.child_id, "unknown device");
            return;
        };

        request.reply_to.send(
            ctx.id(),
            ChildFound {
                request_id: request.request_id,
                child_id: request.child_id,
                child: device.clone(),
            },
        );
    }

    fn read_all(&self, ctx: &mut Context<GroupMessage>, request: ScatterGather<Reading>) {
        tracing::debug!(
            group = %self.group_id,
            request_id = request.request_id,
            devices = self.devices.len(),
            "starting group query"
        );

        let reply_as = ctx.id();
        ctx.spawn_anonymous(
            "query",
            DeviceQuery::new(
                self.devices.snapshot(),
                request.request_id,
                request.reply_to,
                reply_as,
                self.query_timeout,
            ),
        );
    }
}

impl Entity for DeviceGroup {
    type Message = GroupMessage;

    fn on_start(&mut self, _ctx: &mut Context<GroupMessage>) -> ActorResult<()> {
        tracing::info!(group = %self.group_id, "device group started");
        Ok(())
    }

    fn on_message(
        &mut self,
        ctx: &mut Context<GroupMessage>,
        message: GroupMessage,
    ) -> ActorResult<()> {
        match message {
            GroupMessage::TrackDevice(request) => self.track_device(ctx, request),
            GroupMessage::ListDevices(request) => self.list_devices(ctx, request),
            GroupMessage::LookupDevice(request) => self.lookup_device(ctx, request),
            GroupMessage::ReadAll(request) => self.read_all(ctx, request),
            GroupMessage::DeviceTerminated(device) => {
                if let Some(device_id) = self.devices.remove(&device) {
                    tracing::info!(group = %self.group_id, device = %device_id, "device terminated");
                }
            }
        }
        Ok(())
    }

    fn on_stop(&mut self, _ctx: &mut Context<GroupMessage>) {
        tracing::info!(group = %self.group_id, "device group stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iot::device::{ReadResult, RecordAck};
    use crate::iot::messages::DeviceRegistered;
    use crate::runtime::{ActorRef, AskError, Reply, ReplyTo, Runtime};
    use std::collections::{HashMap, HashSet};

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn spawn_group(runtime: &Runtime) -> ActorRef<GroupMessage> {
        runtime.spawn("/iot/m/group", DeviceGroup::new("group", Duration::from_secs(3)))
    }

    fn track(group_id: &str, device_id: &str, reply_to: ReplyTo<DeviceRegistered>) -> GroupMessage {
        GroupMessage::TrackDevice(TrackDevice {
            manager_id: "m".to_string(),
            group_id: group_id.to_string(),
            device_id: device_id.to_string(),
            reply_to,
        })
    }

    async fn register(group: &ActorRef<GroupMessage>, device_id: &str) -> ActorId {
        let reply = group
            .ask(|reply_to| track("group", device_id, reply_to), TIMEOUT)
            .await
            .unwrap();
        reply.sender
    }

    async fn lookup(group: &ActorRef<GroupMessage>, device_id: &str) -> ActorRef<DeviceMessage> {
        let reply: Reply<ChildFound<DeviceMessage>> = group
            .ask(
                |reply_to| {
                    GroupMessage::LookupDevice(LookupChild {
                        request_id: 0,
                        child_id: device_id.to_string(),
                        reply_to,
                    })
                },
                TIMEOUT,
            )
            .await
            .unwrap();
        reply.body.child
    }

    async fn list(group: &ActorRef<GroupMessage>, request_id: u64) -> ChildList {
        group
            .ask(
                |reply_to| {
                    GroupMessage::ListDevices(ListChildren {
                        request_id,
                        owner_id: "group".to_string(),
                        reply_to,
                    })
                },
                TIMEOUT,
            )
            .await
            .unwrap()
            .body
    }

    fn ids(values: &[&str]) -> HashSet<String> {
        values.iter().map(|id| id.to_string()).collect()
    }

    #[tokio::test]
    async fn test_register_a_device_actor() {
        let runtime = Runtime::new();
        let group = spawn_group(&runtime);

        let device1 = register(&group, "device1").await;
        let device2 = register(&group, "device2").await;
        assert_ne!(device1, device2);

        // Registered devices answer reads.
        let device = lookup(&group, "device1").await;
        assert_eq!(device.id(), device1);
        assert_eq!(device.path(), "/iot/m/group/device1");

        let ack: Reply<RecordAck> = device
            .ask(
                |reply_to| DeviceMessage::Record {
                    request_id: 0,
                    value: 1.0,
                    reply_to,
                },
                TIMEOUT,
            )
            .await
            .unwrap();
        assert_eq!(ack.body.request_id, 0);
    }

    #[tokio::test]
    async fn test_ignore_requests_for_wrong_group_id() {
        let runtime = Runtime::new();
        let group = spawn_group(&runtime);

        let err = group
            .ask(|reply_to| track("wrongGroup", "device1", reply_to), TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, AskError::Unanswered(_)));
        assert!(list(&group, 0).await.ids.is_empty());
    }

    #[tokio::test]
    async fn test_reject_device_ids_that_are_not_one_segment() {
        let runtime = Runtime::new();
        let group = spawn_group(&runtime);

        for device_id in ["", "nested/device", "/"] {
            let err = group
                .ask(|reply_to| track("group", device_id, reply_to), TIMEOUT)
                .await
                .unwrap_err();
            assert!(matches!(err, AskError::Unanswered(_)));
        }
        assert!(list(&group, 0).await.ids.is_empty());
        assert!(runtime.directory().paths().iter().all(|path| !path.contains("nested")));
    }

    #[tokio::test]
    async fn test_return_same_actor_for_same_device_id() {
        let runtime = Runtime::new();
        let group = spawn_group(&runtime);

        let first = register(&group, "device1").await;
        let second = register(&group, "device1").await;
        assert_eq!(first, second);
        assert_eq!(list(&group, 0).await.ids, ids(&["device1"]));
    }

    #[tokio::test]
    async fn test_lookup_unknown_device_is_not_answered() {
        let runtime = Runtime::new();
        let group = spawn_group(&runtime);

        let err = group
            .ask(
                |reply_to| {
                    GroupMessage::LookupDevice(LookupChild {
                        request_id: 0,
                        child_id: "missing".to_string(),
                        reply_to,
                    })
                },
                TIMEOUT,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AskError::Unanswered(_)));
    }

    #[tokio::test]
    async fn test_list_active_devices() {
        let runtime = Runtime::new();
        let group = spawn_group(&runtime);

        register(&group, "device1").await;
        register(&group, "device2").await;

        let listed = list(&group, 0).await;
        assert_eq!(listed.request_id, 0);
        assert_eq!(listed.ids, ids(&["device1", "device2"]));
    }

    #[tokio::test]
    async fn test_list_active_devices_after_one_shuts_down() {
        let runtime = Runtime::new();
        let group = spawn_group(&runtime);

        register(&group, "device1").await;
        register(&group, "device2").await;

        let device = lookup(&group, "device1").await;
        device.stop();
        device.terminated().await;

        // The exit notification reaches the group asynchronously.
        let mut attempts = 0;
        loop {
            let listed = list(&group, 1).await;
            if listed.ids == ids(&["device2"]) {
                break;
            }
            attempts += 1;
            assert!(attempts < 100, "device1 was never removed: {:?}", listed.ids);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_track_recreates_stopped_device() {
        let runtime = Runtime::new();
        let group = spawn_group(&runtime);

        let first = register(&group, "device1").await;
        let device = lookup(&group, "device1").await;
        device.stop();
        device.terminated().await;

        let second = register(&group, "device1").await;
        assert_ne!(first, second);
        assert_eq!(list(&group, 0).await.ids, ids(&["device1"]));
        assert_eq!(
            runtime.resolve::<DeviceMessage>("/iot/m/group/device1").map(|d| d.id()),
            Some(second)
        );
    }

    #[tokio::test]
    async fn test_collect_temperatures_from_all_active_devices() {
        let runtime = Runtime::new();
        let group = spawn_group(&runtime);

        for device_id in ["device1", "device2", "device3"] {
            register(&group, device_id).await;
        }

        for (device_id, value) in [("device1", 1.0), ("device2", 2.0)] {
            let device = lookup(&group, device_id).await;
            device
                .ask(
                    |reply_to| DeviceMessage::Record {
                        request_id: 0,
                        value,
                        reply_to,
                    },
                    TIMEOUT,
                )
                .await
                .unwrap();
        }

        let reply = group
            .ask(
                |reply_to| {
                    GroupMessage::ReadAll(ScatterGather {
                        request_id: 0,
                        reply_to,
                    })
                },
                TIMEOUT,
            )
            .await
            .unwrap();

        assert_eq!(reply.sender, group.id());
        assert_eq!(reply.body.request_id, 0);
        assert_eq!(
            reply.body.readings,
            HashMap::from([
                ("device1".to_string(), Reading::Value(1.0)),
                ("device2".to_string(), Reading::Value(2.0)),
                ("device3".to_string(), Reading::NotAvailable),
            ])
        );
    }

    #[tokio::test]
    async fn test_read_all_of_empty_group() {
        let runtime = Runtime::new();
        let group = spawn_group(&runtime);

        let reply = group
            .ask(
                |reply_to| {
                    GroupMessage::ReadAll(ScatterGather {
                        request_id: 5,
                        reply_to,
                    })
                },
                TIMEOUT,
            )
            .await
            .unwrap();
        assert_eq!(reply.body.request_id, 5);
        assert!(reply.body.readings.is_empty());
    }

    #[tokio::test]
    async fn test_stopping_group_stops_devices() {
        let runtime = Runtime::new();
        let group = spawn_group(&runtime);

        register(&group, "device1").await;
        let device = lookup(&group, "device1").await;

        group.stop();
        group.terminated().await;
        device.terminated().await;

        let err = device
            .ask(
                |reply_to: ReplyTo<ReadResult>| DeviceMessage::Read {
                    request_id: 0,
                    reply_to,
                },
                TIMEOUT,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AskError::Gone(_)));
        assert!(runtime.resolve::<GroupMessage>("/iot/m/group").is_none());
    }
}
