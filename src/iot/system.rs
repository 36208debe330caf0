//! Boot and caller-side access to a running device tree
//!
//! [`IotSystem`] owns the runtime and the supervisor handle. Its methods are
//! thin asks over the entity protocol: they pick request ids, wait for the
//! reply with a deadline, and resolve paths through the runtime directory.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::runtime::{ActorRef, AskError, Result, Runtime, RuntimeConfig};

use super::device::DeviceMessage;
use super::group::GroupMessage;
use super::manager::ManagerMessage;
use super::messages::{
    ChildList, ListChildren, RequestId, ScatterGather, ScatterResult, TrackDevice, TrackManager,
};
use super::query::QueryTimeouts;
use super::reading::{GroupReading, ManagerReading, Reading};
use super::supervisor::{DeviceSupervisor, SupervisorMessage};

/// Deadline for asks that do not wait on a scatter-gather
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// A running device tree
pub struct IotSystem {
    runtime: Runtime,
    config: RuntimeConfig,
    supervisor: ActorRef<SupervisorMessage>,
    next_request_id: AtomicU64,
}

impl IotSystem {
    /// Validate `config` and spawn the supervisor at `/<name>`
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: RuntimeConfig) -> Result<Self> {
        config.validate()?;

        let runtime = Runtime::new();
        let supervisor = runtime.spawn(
            format!("/{}", config.name),
            DeviceSupervisor::new(config.name.as_str(), QueryTimeouts::from(&config)),
        );
        tracing::info!(name = %config.name, "iot system started");

        Ok(Self {
            runtime,
            config,
            supervisor,
            next_request_id: AtomicU64::new(1),
        })
    }

    /// Get the runtime
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Get the configuration
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Handle of the supervisor
    pub fn supervisor(&self) -> &ActorRef<SupervisorMessage> {
        &self.supervisor
    }

    fn request_id(&self) -> RequestId {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Path of a manager
    pub fn manager_path(&self, manager_id: &str) -> String {
        format!("/{}/{}", self.config.name, manager_id)
    }

    /// Path of a group
    pub fn group_path(&self, manager_id: &str, group_id: &str) -> String {
        format!("/{}/{}/{}", self.config.name, manager_id, group_id)
    }

    /// Path of a device
    pub fn device_path(&self, manager_id: &str, group_id: &str, device_id: &str) -> String {
        format!("/{}/{}/{}/{}", self.config.name, manager_id, group_id, device_id)
    }

    fn resolve<M: Send + 'static>(&self, path: String) -> Result<ActorRef<M>> {
        self.runtime
            .resolve(&path)
            .ok_or_else(|| AskError::Gone(path).into())
    }

    /// Make sure a manager exists
    pub async fn track_manager(&self, manager_id: &str) -> Result<ActorRef<ManagerMessage>> {
        let request_id = self.request_id();
        self.supervisor
            .ask(
                |reply_to| {
                    SupervisorMessage::TrackManager(TrackManager {
                        request_id,
                        manager_id: manager_id.to_string(),
                        reply_to,
                    })
                },
                REQUEST_TIMEOUT,
            )
            .await?;

        self.resolve(self.manager_path(manager_id))
    }

    /// Make sure a device exists, creating its manager and group as needed
    pub async fn track_device(
        &self,
        manager_id: &str,
        group_id: &str,
        device_id: &str,
    ) -> Result<ActorRef<DeviceMessage>> {
        let reply = self
            .supervisor
            .ask(
                |reply_to| {
                    SupervisorMessage::TrackDevice(TrackDevice {
                        manager_id: manager_id.to_string(),
                        group_id: group_id.to_string(),
                        device_id: device_id.to_string(),
                        reply_to,
                    })
                },
                REQUEST_TIMEOUT,
            )
            .await?;

        let path = self.device_path(manager_id, group_id, device_id);
        let device: ActorRef<DeviceMessage> = self.resolve(path.clone())?;
        if device.id() != reply.sender {
            // Replaced between the acknowledgement and the lookup.
            return Err(AskError::Gone(path).into());
        }
        Ok(device)
    }

    /// Resolve a live device by its ids
    pub fn device(
        &self,
        manager_id: &str,
        group_id: &str,
        device_id: &str,
    ) -> Option<ActorRef<DeviceMessage>> {
        self.runtime.resolve(&self.device_path(manager_id, group_id, device_id))
    }

    /// Store a reading on a device
    pub async fn record(&self, device: &ActorRef<DeviceMessage>, value: f64) -> Result<()> {
        let request_id = self.request_id();
        device
            .ask(
                |reply_to| DeviceMessage::Record {
                    request_id,
                    value,
                    reply_to,
                },
                REQUEST_TIMEOUT,
            )
            .await?;
        Ok(())
    }

    /// Last reading of a device
    pub async fn read(&self, device: &ActorRef<DeviceMessage>) -> Result<Option<f64>> {
        let request_id = self.request_id();
        let reply = device
            .ask(
                |reply_to| DeviceMessage::Read {
                    request_id,
                    reply_to,
                },
                REQUEST_TIMEOUT,
            )
            .await?;
        Ok(reply.body.value)
    }

    /// Ids of the current managers
    pub async fn list_managers(&self) -> Result<ChildList> {
        let request_id = self.request_id();
        let owner_id = self.config.name.clone();
        let reply = self
            .supervisor
            .ask(
                |reply_to| {
                    SupervisorMessage::ListManagers(ListChildren {
                        request_id,
                        owner_id,
                        reply_to,
                    })
                },
                REQUEST_TIMEOUT,
            )
            .await?;
        Ok(reply.body)
    }

    /// Ids of the current groups of a manager
    pub async fn list_groups(&self, manager_id: &str) -> Result<ChildList> {
        let manager: ActorRef<ManagerMessage> = self.resolve(self.manager_path(manager_id))?;
        let request_id = self.request_id();
        let reply = manager
            .ask(
                |reply_to| {
                    ManagerMessage::ListGroups(ListChildren {
                        request_id,
                        owner_id: manager_id.to_string(),
                        reply_to,
                    })
                },
                REQUEST_TIMEOUT,
            )
            .await?;
        Ok(reply.body)
    }

    /// Ids of the current devices of a group
    pub async fn list_devices(&self, manager_id: &str, group_id: &str) -> Result<ChildList> {
        let group: ActorRef<GroupMessage> = self.resolve(self.group_path(manager_id, group_id))?;
        let request_id = self.request_id();
        let reply = group
            .ask(
                |reply_to| {
                    GroupMessage::ListDevices(ListChildren {
                        request_id,
                        owner_id: group_id.to_string(),
                        reply_to,
                    })
                },
                REQUEST_TIMEOUT,
            )
            .await?;
        Ok(reply.body)
    }

    /// Read every device of one group
    pub async fn read_group(
        &self,
        manager_id: &str,
        group_id: &str,
    ) -> Result<ScatterResult<Reading>> {
        let group: ActorRef<GroupMessage> = self.resolve(self.group_path(manager_id, group_id))?;
        let request_id = self.request_id();
        let reply = group
            .ask(
                |reply_to| GroupMessage::ReadAll(ScatterGather { request_id, reply_to }),
                self.config.group_query_timeout() + REQUEST_TIMEOUT,
            )
            .await?;
        Ok(reply.body)
    }

    /// Read every group of one manager
    pub async fn read_manager(&self, manager_id: &str) -> Result<ScatterResult<GroupReading>> {
        let manager: ActorRef<ManagerMessage> = self.resolve(self.manager_path(manager_id))?;
        let request_id = self.request_id();
        let reply = manager
            .ask(
                |reply_to| ManagerMessage::ReadAll(ScatterGather { request_id, reply_to }),
                self.config.manager_query_timeout() + REQUEST_TIMEOUT,
            )
            .await?;
        Ok(reply.body)
    }

    /// Read every manager
    pub async fn read_all(&self) -> Result<ScatterResult<ManagerReading>> {
        let request_id = self.request_id();
        let reply = self
            .supervisor
            .ask(
                |reply_to| SupervisorMessage::ReadAll(ScatterGather { request_id, reply_to }),
                self.config.supervisor_query_timeout() + REQUEST_TIMEOUT,
            )
            .await?;
        Ok(reply.body)
    }

    /// Stop the supervisor and, through it, every entity in the tree
    pub async fn shutdown(self) {
        tracing::info!(name = %self.config.name, "shutting down iot system");
        self.supervisor.stop();
        self.supervisor.terminated().await;
    }
}
