//! Requests and replies shared by every registry level
//!
//! A [`TrackDevice`] request carries the full path of ids. Each level reads
//! the pair it is responsible for: the supervisor keys on `manager_id`, a
//! manager checks `manager_id` and keys on `group_id`, a group checks
//! `group_id` and keys on `device_id`, and the device checks both of the last
//! two. Requests whose owner id does not match are dropped with a warning and
//! never answered.
//!
//! A child id becomes one segment of the child's path, so it must be
//! non-empty and free of `/`. Track requests naming any other id are dropped
//! the same way.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::runtime::{ActorRef, ReplyTo};

/// Correlation id chosen by the caller and echoed in replies
pub type RequestId = u64;

/// Separator between the segments of an entity path
pub const PATH_SEPARATOR: char = '/';

/// Whether `id` can name a child, i.e. forms exactly one path segment
pub fn is_valid_child_id(id: &str) -> bool {
    !id.is_empty() && !id.contains(PATH_SEPARATOR)
}

/// Make sure a device exists, creating every missing level on the way down
#[derive(Debug, Clone)]
pub struct TrackDevice {
    /// Manager that owns the group
    pub manager_id: String,
    /// Group that owns the device
    pub group_id: String,
    /// Device to track
    pub device_id: String,
    /// Receives the device's acknowledgement
    pub reply_to: ReplyTo<DeviceRegistered>,
}

/// Identity acknowledgement sent by a device; the reply's sender is the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceRegistered;

/// Make sure a manager exists
#[derive(Debug, Clone)]
pub struct TrackManager {
    /// Caller correlation id
    pub request_id: RequestId,
    /// Manager to track
    pub manager_id: String,
    /// Receives the manager's acknowledgement
    pub reply_to: ReplyTo<ManagerRegistered>,
}

/// Identity acknowledgement sent by a manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerRegistered {
    /// Echo of [`TrackManager::request_id`]
    pub request_id: RequestId,
}

/// Ask a registry for the ids of its current children
#[derive(Debug, Clone)]
pub struct ListChildren {
    /// Caller correlation id
    pub request_id: RequestId,
    /// Id of the registry the caller means to ask
    pub owner_id: String,
    /// Receives the id set
    pub reply_to: ReplyTo<ChildList>,
}

/// Ids of a registry's children at the time the request was handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildList {
    /// Echo of [`ListChildren::request_id`]
    pub request_id: RequestId,
    /// Child ids
    pub ids: HashSet<String>,
}

/// Ask a registry for the handle of one child
#[derive(Debug, Clone)]
pub struct LookupChild<C: Send + 'static> {
    /// Caller correlation id
    pub request_id: RequestId,
    /// Child to look up
    pub child_id: String,
    /// Receives the handle, only if the child is known
    pub reply_to: ReplyTo<ChildFound<C>>,
}

/// Handle of a known child
#[derive(Debug, Clone)]
pub struct ChildFound<C: Send + 'static> {
    /// Echo of [`LookupChild::request_id`]
    pub request_id: RequestId,
    /// Echo of [`LookupChild::child_id`]
    pub child_id: String,
    /// The child's handle
    pub child: ActorRef<C>,
}

/// Ask a registry for one reading per child, within the level's deadline
#[derive(Debug, Clone)]
pub struct ScatterGather<R> {
    /// Caller correlation id
    pub request_id: RequestId,
    /// Receives the aggregated result
    pub reply_to: ReplyTo<ScatterResult<R>>,
}

/// Aggregated scatter-gather result: exactly one entry per queried child
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterResult<R> {
    /// Echo of [`ScatterGather::request_id`]
    pub request_id: RequestId,
    /// Reading per child id
    pub readings: HashMap<String, R>,
}
