//! Per-child results of a scatter-gather
//!
//! Each level classifies every child it queried into exactly one variant,
//! so a result always covers the full snapshot of children.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Outcome of reading one device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Reading {
    /// The device's last recorded value
    Value(f64),
    /// The device is alive but has never recorded a value
    NotAvailable,
    /// The device exited before answering
    Unavailable,
    /// The device did not answer before the deadline
    TimedOut,
}

/// Outcome of querying one device group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "devices", rename_all = "snake_case")]
pub enum GroupReading {
    /// The group's own scatter-gather result
    Devices(HashMap<String, Reading>),
    /// The group exited before answering
    Unavailable,
    /// The group did not answer before the deadline
    TimedOut,
}

/// Outcome of querying one device manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "groups", rename_all = "snake_case")]
pub enum ManagerReading {
    /// The manager's own scatter-gather result
    Groups(HashMap<String, GroupReading>),
    /// The manager exited before answering
    Unavailable,
    /// The manager did not answer before the deadline
    TimedOut,
}
