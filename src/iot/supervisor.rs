//! Supervisor registry: the root of the device tree
//!
//! The supervisor owns every manager, keyed by manager id. It is the entry
//! point for track requests and for system-wide reads.

use crate::runtime::{ActorId, ActorRef, ActorResult, ChildRegistry, Context, Entity};

use super::manager::{DeviceManager, ManagerMessage};
use super::messages::{
    ChildFound, ChildList, ListChildren, LookupChild, ScatterGather, TrackDevice, TrackManager,
    is_valid_child_id,
};
use super::query::{ManagerQuery, QueryTimeouts};
use super::reading::ManagerReading;

/// Messages accepted by a [`DeviceSupervisor`]
#[derive(Debug)]
pub enum SupervisorMessage {
    /// Create the manager if needed and let it acknowledge
    TrackManager(TrackManager),
    /// Create the manager if needed and pass the request on
    TrackDevice(TrackDevice),
    /// Report the ids of the current managers
    ListManagers(ListChildren),
    /// Report the handle of one manager
    LookupManager(LookupChild<ManagerMessage>),
    /// Read every manager within the supervisor deadline
    ReadAll(ScatterGather<ManagerReading>),
    /// A watched manager exited
    ManagerTerminated(ActorId),
}

/// Root registry entity
pub struct DeviceSupervisor {
    name: String,
    managers: ChildRegistry<ManagerMessage>,
    timeouts: QueryTimeouts,
}

impl DeviceSupervisor {
    /// Create a supervisor answering list requests addressed to `name`
    pub fn new(name: impl Into<String>, timeouts: QueryTimeouts) -> Self {
        Self {
            name: name.into(),
            managers: ChildRegistry::new(),
            timeouts,
        }
    }

    fn manager(
        &mut self,
        ctx: &mut Context<SupervisorMessage>,
        manager_id: &str,
    ) -> Option<ActorRef<ManagerMessage>> {
        if !is_valid_child_id(manager_id) {
            tracing::warn!(supervisor = %self.name, manager = %manager_id, "invalid manager id");
            return None;
        }

        let timeouts = self.timeouts;
        let manager = self.managers.get_or_spawn(
            ctx,
            manager_id,
            |ctx| {
                tracing::info!(manager = %manager_id, "creating device manager");
                ctx.spawn_child(manager_id, DeviceManager::new(manager_id, timeouts))
            },
            SupervisorMessage::ManagerTerminated,
        );
        Some(manager)
    }

    fn list_managers(&self, ctx: &Context<SupervisorMessage>, request: ListChildren) {
        if request.owner_id != self.name {
            tracing::warn!(
                requested = %request.owner_id,
                supervisor = %self.name,
                "ignoring manager list request for another supervisor"
            );
            return;
        }

        request.reply_to.send(
            ctx.id(),
            ChildList {
                request_id: request.request_id,
                ids: self.managers.ids(),
            },
        );
    }

    fn lookup_manager(
        &self,
        ctx: &Context<SupervisorMessage>,
        request: LookupChild<ManagerMessage>,
    ) {
        let Some(manager) = self.managers.get(&request.child_id) else {
            tracing::warn!(manager = %request.child_id, "unknown device manager");
            return;
        };

        request.reply_to.send(
            ctx.id(),
            ChildFound {
                request_id: request.request_id,
                child_id: request.child_id,
                child: manager.clone(),
            },
        );
    }

    fn read_all(
        &self,
        ctx: &mut Context<SupervisorMessage>,
        request: ScatterGather<ManagerReading>,
    ) {
        tracing::debug!(
            request_id = request.request_id,
            managers = self.managers.len(),
            "starting supervisor query"
        );

        let reply_as = ctx.id();
        ctx.spawn_anonymous(
            "query",
            ManagerQuery::new(
                self.managers.snapshot(),
                request.request_id,
                request.reply_to,
                reply_as,
                self.timeouts.supervisor,
            ),
        );
    }
}

impl Entity for DeviceSupervisor {
    type Message = SupervisorMessage;

    fn on_start(&mut self, _ctx: &mut Context<SupervisorMessage>) -> ActorResult<()> {
        tracing::info!(name = %self.name, "device supervisor started");
        Ok(())
    }

    fn on_message(
        &mut self,
        ctx: &mut Context<SupervisorMessage>,
        message: SupervisorMessage,
    ) -> ActorResult<()> {
        match message {
            SupervisorMessage::TrackManager(request) => {
                if let Some(manager) = self.manager(ctx, &request.manager_id) {
                    manager.tell(ManagerMessage::TrackManager(request));
                }
            }
            SupervisorMessage::TrackDevice(request) => {
                if let Some(manager) = self.manager(ctx, &request.manager_id) {
                    manager.tell(ManagerMessage::TrackDevice(request));
                }
            }
            SupervisorMessage::ListManagers(request) => self.list_managers(ctx, request),
            SupervisorMessage::LookupManager(request) => self.lookup_manager(ctx, request),
            SupervisorMessage::ReadAll(request) => self.read_all(ctx, request),
            SupervisorMessage::ManagerTerminated(manager) => {
                if let Some(manager_id) = self.managers.remove(&manager) {
                    tracing::info!(manager = %manager_id, "device manager terminated");
                }
            }
        }
        Ok(())
    }

    fn on_stop(&mut self, _ctx: &mut Context<SupervisorMessage>) {
        tracing::info!(name = %self.name, "device supervisor stopped");
    }
}
