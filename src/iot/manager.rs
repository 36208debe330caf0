//! Manager registry: the groups of one manager
//!
//! Mirrors the group level one step up. Track requests create the group on
//! demand and travel on to it; reads fan out to every group, each of which
//! runs its own device-level query under the shorter group deadline.

use crate::runtime::{ActorId, ActorResult, ChildRegistry, Context, Entity};

use super::group::{DeviceGroup, GroupMessage};
use super::messages::{
    ChildFound, ChildList, ListChildren, LookupChild, ManagerRegistered, ScatterGather,
    TrackDevice, TrackManager, is_valid_child_id,
};
use super::query::{GroupQuery, QueryTimeouts};
use super::reading::GroupReading;

/// Messages accepted by a [`DeviceManager`]
#[derive(Debug)]
pub enum ManagerMessage {
    /// Identity check; acknowledged only if the manager id matches
    TrackManager(TrackManager),
    /// Create the group if needed and pass the request on
    TrackDevice(TrackDevice),
    /// Report the ids of the current groups
    ListGroups(ListChildren),
    /// Report the handle of one group
    LookupGroup(LookupChild<GroupMessage>),
    /// Read every group within the manager deadline
    ReadAll(ScatterGather<GroupReading>),
    /// A watched group exited
    GroupTerminated(ActorId),
}

/// Registry entity owning the groups of one manager
pub struct DeviceManager {
    manager_id: String,
    groups: ChildRegistry<GroupMessage>,
    timeouts: QueryTimeouts,
}

impl DeviceManager {
    /// Create an empty manager; `timeouts` applies to it and its groups
    pub fn new(manager_id: impl Into<String>, timeouts: QueryTimeouts) -> Self {
        Self {
            manager_id: manager_id.into(),
            groups: ChildRegistry::new(),
            timeouts,
        }
    }

    fn track_manager(&self, ctx: &Context<ManagerMessage>, request: TrackManager) {
        if request.manager_id != self.manager_id {
            tracing::warn!(
                requested_manager = %request.manager_id,
                manager = %self.manager_id,
                "ignoring track request for another manager"
            );
            return;
        }

        request.reply_to.send(
            ctx.id(),
            ManagerRegistered {
                request_id: request.request_id,
            },
        );
    }

    fn track_device(&mut self, ctx: &mut Context<ManagerMessage>, request: TrackDevice) {
        if request.manager_id != self.manager_id {
            tracing::warn!(
                requested_manager = %request.manager_id,
                manager = %self.manager_id,
                "ignoring device track request for another manager"
            );
            return;
        }
        if !is_valid_child_id(&request.group_id) {
            tracing::warn!(manager = %self.manager_id, group = %request.group_id, "invalid group id");
            return;
        }

        let manager_id = self.manager_id.clone();
        let group_id = request.group_id.clone();
        let group_timeout = self.timeouts.group;
        let group = self.groups.get_or_spawn(
            ctx,
            &request.group_id,
            |ctx| {
                tracing::info!(manager = %manager_id, group = %group_id, "creating device group");
                ctx.spawn_child(&group_id, DeviceGroup::new(group_id.as_str(), group_timeout))
            },
            ManagerMessage::GroupTerminated,
        );

        group.tell(GroupMessage::TrackDevice(request));
    }

    fn list_groups(&self, ctx: &Context<ManagerMessage>, request: ListChildren) {
        if request.owner_id != self.manager_id {
            tracing::warn!(
                requested_manager = %request.owner_id,
                manager = %self.manager_id,
                "ignoring group list request for another manager"
            );
            return;
        }

        request.reply_to.send(
            ctx.id(),
            ChildList {
                request_id: request.request_id,
                ids: self.groups.ids(),
            },
        );
    }

    fn lookup_group(&self, ctx: &Context<ManagerMessage>, request: LookupChild<GroupMessage>) {
        let Some(group) = self.groups.get(&request.child_id) else {
            tracing::warn!(manager = %self.manager_id, group = %request.child_id, "unknown group");
            return;
        };

        request.reply_to.send(
            ctx.id(),
            ChildFound {
                request_id: request.request_id,
                child_id: request.child_id,
                child: group.clone(),
            },
        );
    }

    fn read_all(&self, ctx: &mut Context<ManagerMessage>, request: ScatterGather<GroupReading>) {
        tracing::debug!(
            manager = %self.manager_id,
            request_id = request.request_id,
            groups = self.groups.len(),
            "starting manager query"
        );

        let reply_as = ctx.id();
        ctx.spawn_anonymous(
            "query",
            GroupQuery::new(
                self.groups.snapshot(),
                request.request_id,
                request.reply_to,
                reply_as,
                self.timeouts.manager,
            ),
        );
    }
}

impl Entity for DeviceManager {
    type Message = ManagerMessage;

    fn on_start(&mut self, _ctx: &mut Context<ManagerMessage>) -> ActorResult<()> {
        tracing::info!(manager = %self.manager_id, "device manager started");
        Ok(())
    }

    fn on_message(
        &mut self,
        ctx: &mut Context<ManagerMessage>,
        message: ManagerMessage,
    ) -> ActorResult<()> {
        match message {
            ManagerMessage::TrackManager(request) => self.track_manager(ctx, request),
            ManagerMessage::TrackDevice(request) => self.track_device(ctx, request),
            ManagerMessage::ListGroups(request) => self.list_groups(ctx, request),
            ManagerMessage::LookupGroup(request) => self.lookup_group(ctx, request),
            ManagerMessage::ReadAll(request) => self.read_all(ctx, request),
            ManagerMessage::GroupTerminated(group) => {
                if let Some(group_id) = self.groups.remove(&group) {
                    tracing::info!(
                        manager = %self.manager_id,
                        group = %group_id,
                        "device group terminated"
                    );
                }
            }
        }
        Ok(())
    }

    fn on_stop(&mut self, _ctx: &mut Context<ManagerMessage>) {
        tracing::info!(manager = %self.manager_id, "device manager stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iot::device::DeviceMessage;
    use crate::iot::messages::DeviceRegistered;
    use crate::iot::reading::Reading;
    use crate::runtime::{ActorRef, AskError, Reply, ReplyTo, Runtime};
    use std::collections::{HashMap, HashSet};
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn spawn_manager(runtime: &Runtime) -> ActorRef<ManagerMessage> {
        runtime.spawn("/iot/m1", DeviceManager::new("m1", QueryTimeouts::default()))
    }

    fn track(
        manager_id: &str,
        group_id: &str,
        device_id: &str,
        reply_to: ReplyTo<DeviceRegistered>,
    ) -> ManagerMessage {
        ManagerMessage::TrackDevice(TrackDevice {
            manager_id: manager_id.to_string(),
            group_id: group_id.to_string(),
            device_id: device_id.to_string(),
            reply_to,
        })
    }

    async fn register(
        manager: &ActorRef<ManagerMessage>,
        group_id: &str,
        device_id: &str,
    ) -> ActorId {
        manager
            .ask(|reply_to| track("m1", group_id, device_id, reply_to), TIMEOUT)
            .await
            .unwrap()
            .sender
    }

    async fn lookup(manager: &ActorRef<ManagerMessage>, group_id: &str) -> ActorRef<GroupMessage> {
        let reply: Reply<ChildFound<GroupMessage>> = manager
            .ask(
                |reply_to| {
                    ManagerMessage::LookupGroup(LookupChild {
                        request_id: 0,
                        child_id: group_id.to_string(),
                        reply_to,
                    })
                },
                TIMEOUT,
            )
            .await
            .unwrap();
        reply.body.child
    }

    async fn list(manager: &ActorRef<ManagerMessage>) -> HashSet<String> {
        manager
            .ask(
                |reply_to| {
                    ManagerMessage::ListGroups(ListChildren {
                        request_id: 0,
                        owner_id: "m1".to_string(),
                        reply_to,
                    })
                },
                TIMEOUT,
            )
            .await
            .unwrap()
            .body
            .ids
    }

    fn ids(values: &[&str]) -> HashSet<String> {
        values.iter().map(|id| id.to_string()).collect()
    }

    #[tokio::test]
    async fn test_acknowledge_own_manager_id_only() {
        let runtime = Runtime::new();
        let manager = spawn_manager(&runtime);

        let reply = manager
            .ask(
                |reply_to| {
                    ManagerMessage::TrackManager(TrackManager {
                        request_id: 9,
                        manager_id: "m1".to_string(),
                        reply_to,
                    })
                },
                TIMEOUT,
            )
            .await
            .unwrap();
        assert_eq!(reply.sender, manager.id());
        assert_eq!(reply.body, ManagerRegistered { request_id: 9 });

        let err = manager
            .ask(
                |reply_to| {
                    ManagerMessage::TrackManager(TrackManager {
                        request_id: 10,
                        manager_id: "m2".to_string(),
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
    async fn test_register_devices_across_groups() {
        let runtime = Runtime::new();
        let manager = spawn_manager(&runtime);

        let a = register(&manager, "g1", "device1").await;
        let b = register(&manager, "g2", "device1").await;
        let again = register(&manager, "g1", "device1").await;

        assert_ne!(a, b);
        assert_eq!(a, again);
        assert_eq!(list(&manager).await, ids(&["g1", "g2"]));

        let device = runtime
            .resolve::<DeviceMessage>("/iot/m1/g2/device1")
            .unwrap();
        assert_eq!(device.id(), b);
    }

    #[tokio::test]
    async fn test_ignore_requests_for_wrong_manager_id() {
        let runtime = Runtime::new();
        let manager = spawn_manager(&runtime);

        let err = manager
            .ask(|reply_to| track("m2", "g1", "device1", reply_to), TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, AskError::Unanswered(_)));
        assert!(list(&manager).await.is_empty());
    }

    #[tokio::test]
    async fn test_list_groups_after_one_shuts_down() {
        let runtime = Runtime::new();
        let manager = spawn_manager(&runtime);

        register(&manager, "g1", "device1").await;
        register(&manager, "g2", "device1").await;

        let group = lookup(&manager, "g1").await;
        group.stop();
        group.terminated().await;

        let mut attempts = 0;
        while list(&manager).await != ids(&["g2"]) {
            attempts += 1;
            assert!(attempts < 100, "g1 was never removed");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_nested_read_matches_group_reads() {
        let runtime = Runtime::new();
        let manager = spawn_manager(&runtime);

        register(&manager, "g1", "device1").await;
        register(&manager, "g1", "device2").await;
        register(&manager, "g2", "device3").await;

        let device1 = runtime.resolve::<DeviceMessage>("/iot/m1/g1/device1").unwrap();
        device1
            .ask(
                |reply_to| DeviceMessage::Record {
                    request_id: 0,
                    value: 21.5,
                    reply_to,
                },
                TIMEOUT,
            )
            .await
            .unwrap();

        let reply = manager
            .ask(
                |reply_to| {
                    ManagerMessage::ReadAll(ScatterGather {
                        request_id: 3,
                        reply_to,
                    })
                },
                TIMEOUT,
            )
            .await
            .unwrap();

        assert_eq!(reply.sender, manager.id());
        assert_eq!(reply.body.request_id, 3);
        assert_eq!(
            reply.body.readings,
            HashMap::from([
                (
                    "g1".to_string(),
                    GroupReading::Devices(HashMap::from([
                        ("device1".to_string(), Reading::Value(21.5)),
                        ("device2".to_string(), Reading::NotAvailable),
                    ]))
                ),
                (
                    "g2".to_string(),
                    GroupReading::Devices(HashMap::from([(
                        "device3".to_string(),
                        Reading::NotAvailable
                    )]))
                ),
            ])
        );

        // The same group queried directly gives the same map.
        let g1 = lookup(&manager, "g1").await;
        let direct = g1
            .ask(
                |reply_to| {
                    GroupMessage::ReadAll(ScatterGather {
                        request_id: 4,
                        reply_to,
                    })
                },
                TIMEOUT,
            )
            .await
            .unwrap();
        assert_eq!(
            reply.body.readings.get("g1"),
            Some(&GroupReading::Devices(direct.body.readings))
        );
    }
}
