//! Deadline-bounded scatter-gather coordinators
//!
//! A registry answers a scatter-gather request by spawning a short-lived
//! [`QueryCoordinator`] over a point-in-time snapshot of its children. The
//! coordinator sends one request to every child, watches each child for
//! termination, and arms a single timer. Every child ends up with exactly one
//! classification:
//!
//! - answered: the child's reply, interpreted per level
//! - exited before answering: `unavailable`
//! - still silent when the timer fires: `timed_out`
//!
//! The coordinator replies exactly once, then stops. The algorithm is the same
//! at every level; [`ScatterTarget`] supplies the level-specific messages.

use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::mem;
use std::time::Duration;

use crate::runtime::{
    ActorId, ActorRef, ActorResult, Context, Entity, Reply, ReplyTo, RuntimeConfig, TimerHandle,
};

use super::device::{DeviceMessage, ReadResult};
use super::group::GroupMessage;
use super::manager::ManagerMessage;
use super::messages::{RequestId, ScatterGather, ScatterResult};
use super::reading::{GroupReading, ManagerReading, Reading};

/// Level-specific half of a scatter-gather
pub trait ScatterTarget: Send + 'static {
    /// Messages understood by the queried children
    type Child: Send + 'static;
    /// What each child answers with
    type Reply: Send + 'static;
    /// Classification recorded per child
    type Reading: Clone + Send + 'static;

    /// Build the request sent to every child
    fn request(request_id: RequestId, reply_to: ReplyTo<Self::Reply>) -> Self::Child;

    /// Classify a child's answer
    fn interpret(reply: Self::Reply) -> Self::Reading;

    /// Classification for a child that exited before answering
    fn unavailable() -> Self::Reading;

    /// Classification for a child still silent at the deadline
    fn timed_out() -> Self::Reading;
}

/// Scatter-gather over the devices of a group
pub struct DeviceScatter;

impl ScatterTarget for DeviceScatter {
    type Child = DeviceMessage;
    type Reply = ReadResult;
    type Reading = Reading;

    fn request(request_id: RequestId, reply_to: ReplyTo<ReadResult>) -> DeviceMessage {
        DeviceMessage::Read {
            request_id,
            reply_to,
        }
    }

    fn interpret(reply: ReadResult) -> Reading {
        match reply.value {
            Some(value) => Reading::Value(value),
            None => Reading::NotAvailable,
        }
    }

    fn unavailable() -> Reading {
        Reading::Unavailable
    }

    fn timed_out() -> Reading {
        Reading::TimedOut
    }
}

/// Scatter-gather over the groups of a manager
pub struct GroupScatter;

impl ScatterTarget for GroupScatter {
    type Child = GroupMessage;
    type Reply = ScatterResult<Reading>;
    type Reading = GroupReading;

    fn request(request_id: RequestId, reply_to: ReplyTo<ScatterResult<Reading>>) -> GroupMessage {
        GroupMessage::ReadAll(ScatterGather {
            request_id,
            reply_to,
        })
    }

    fn interpret(reply: ScatterResult<Reading>) -> GroupReading {
        GroupReading::Devices(reply.readings)
    }

    fn unavailable() -> GroupReading {
        GroupReading::Unavailable
    }

    fn timed_out() -> GroupReading {
        GroupReading::TimedOut
    }
}

/// Scatter-gather over the managers of a supervisor
pub struct ManagerScatter;

impl ScatterTarget for ManagerScatter {
    type Child = ManagerMessage;
    type Reply = ScatterResult<GroupReading>;
    type Reading = ManagerReading;

    fn request(
        request_id: RequestId,
        reply_to: ReplyTo<ScatterResult<GroupReading>>,
    ) -> ManagerMessage {
        ManagerMessage::ReadAll(ScatterGather {
            request_id,
            reply_to,
        })
    }

    fn interpret(reply: ScatterResult<GroupReading>) -> ManagerReading {
        ManagerReading::Groups(reply.readings)
    }

    fn unavailable() -> ManagerReading {
        ManagerReading::Unavailable
    }

    fn timed_out() -> ManagerReading {
        ManagerReading::TimedOut
    }
}

/// Scatter-gather deadline for each registry level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryTimeouts {
    /// Deadline of a group over its devices
    pub group: Duration,
    /// Deadline of a manager over its groups
    pub manager: Duration,
    /// Deadline of the supervisor over its managers
    pub supervisor: Duration,
}

impl From<&RuntimeConfig> for QueryTimeouts {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            group: config.group_query_timeout(),
            manager: config.manager_query_timeout(),
            supervisor: config.supervisor_query_timeout(),
        }
    }
}

impl Default for QueryTimeouts {
    fn default() -> Self {
        Self::from(&RuntimeConfig::default())
    }
}

/// Event that can advance a collecting coordinator
#[derive(Debug, Clone, PartialEq)]
pub enum QueryEvent<R> {
    /// `sender` is settled with `reading` (an answer, or its termination)
    Settled {
        /// Child the event is about
        sender: ActorId,
        /// Classification for that child
        reading: R,
    },
    /// The deadline fired; every child still waited on gets `reading`
    Deadline(R),
}

/// Coordinator state machine
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState<R> {
    /// Waiting on at least one child
    Collecting {
        /// Classifications recorded so far, by child id
        replies_so_far: HashMap<String, R>,
        /// Children not yet settled
        still_waiting: HashSet<ActorId>,
    },
    /// Every child is classified
    Done(HashMap<String, R>),
}

impl<R: Clone> QueryState<R> {
    /// Initial state over `waiting`; an empty snapshot is immediately done
    pub fn start(waiting: impl IntoIterator<Item = ActorId>) -> Self {
        let still_waiting: HashSet<ActorId> = waiting.into_iter().collect();
        if still_waiting.is_empty() {
            QueryState::Done(HashMap::new())
        } else {
            QueryState::Collecting {
                replies_so_far: HashMap::new(),
                still_waiting,
            }
        }
    }

    /// Consume the state and produce the next one
    ///
    /// `ids` is the coordinator's fixed handle-to-id table. Events about
    /// children that are already settled, or were never in the snapshot, leave
    /// the state as it was; the first event about a child wins.
    pub fn advance(self, event: QueryEvent<R>, ids: &HashMap<ActorId, String>) -> Self {
        let (mut replies_so_far, mut still_waiting) = match self {
            QueryState::Collecting {
                replies_so_far,
                still_waiting,
            } => (replies_so_far, still_waiting),
            done @ QueryState::Done(_) => return done,
        };

        match event {
            QueryEvent::Settled { sender, reading } => {
                let Some(child_id) = ids.get(&sender) else {
                    return QueryState::Collecting {
                        replies_so_far,
                        still_waiting,
                    };
                };

                if !still_waiting.remove(&sender) {
                    tracing::debug!(child = %child_id, "ignoring event for settled child");
                    return QueryState::Collecting {
                        replies_so_far,
                        still_waiting,
                    };
                }

                replies_so_far.insert(child_id.clone(), reading);

                if still_waiting.is_empty() {
                    QueryState::Done(replies_so_far)
                } else {
                    QueryState::Collecting {
                        replies_so_far,
                        still_waiting,
                    }
                }
            }

            QueryEvent::Deadline(reading) => {
                for waiting in still_waiting {
                    if let Some(child_id) = ids.get(&waiting) {
                        replies_so_far.insert(child_id.clone(), reading.clone());
                    }
                }
                QueryState::Done(replies_so_far)
            }
        }
    }

    /// Whether every child is classified
    pub fn is_done(&self) -> bool {
        matches!(self, QueryState::Done(_))
    }
}

/// Messages accepted by a [`QueryCoordinator`]
#[derive(Debug)]
pub enum QueryMessage<T> {
    /// A child answered
    Answer(Reply<T>),
    /// A watched child exited
    Terminated(ActorId),
    /// The deadline fired
    CollectionTimeout,
}

/// Short-lived entity running one scatter-gather
pub struct QueryCoordinator<S: ScatterTarget> {
    targets: HashMap<ActorRef<S::Child>, String>,
    ids: HashMap<ActorId, String>,
    request_id: RequestId,
    requester: ReplyTo<ScatterResult<S::Reading>>,
    reply_as: ActorId,
    timeout: Duration,
    state: QueryState<S::Reading>,
    timer: Option<TimerHandle>,
    _target: PhantomData<S>,
}

impl<S: ScatterTarget> QueryCoordinator<S> {
    /// Prepare a coordinator over `targets`, a snapshot of the registry's
    /// handle-to-id table
    ///
    /// The result is sent to `requester` attributed to `reply_as`, normally
    /// the registry that spawned the coordinator, so that a coordinator one
    /// level up can match it to the registry it queried.
    pub fn new(
        targets: HashMap<ActorRef<S::Child>, String>,
        request_id: RequestId,
        requester: ReplyTo<ScatterResult<S::Reading>>,
        reply_as: ActorId,
        timeout: Duration,
    ) -> Self {
        let ids: HashMap<ActorId, String> = targets
            .iter()
            .map(|(handle, id)| (handle.id(), id.clone()))
            .collect();
        let state = QueryState::start(ids.keys().copied());

        Self {
            targets,
            ids,
            request_id,
            requester,
            reply_as,
            timeout,
            state,
            timer: None,
            _target: PhantomData,
        }
    }

    fn finish_if_done(&mut self, ctx: &mut Context<QueryMessage<S::Reply>>) {
        let QueryState::Done(readings) = &mut self.state else {
            return;
        };

        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }

        let result = ScatterResult {
            request_id: self.request_id,
            readings: mem::take(readings),
        };
        tracing::debug!(
            path = %ctx.path(),
            request_id = self.request_id,
            children = result.readings.len(),
            "scatter-gather complete"
        );

        self.requester.send(self.reply_as, result);
        ctx.stop();
    }
}

impl<S: ScatterTarget> Entity for QueryCoordinator<S> {
    type Message = QueryMessage<S::Reply>;

    fn on_start(&mut self, ctx: &mut Context<QueryMessage<S::Reply>>) -> ActorResult<()> {
        for child in self.targets.keys() {
            ctx.watch(child, QueryMessage::Terminated);
            let reply_to = ctx.myself().reply_to(QueryMessage::Answer);
            child.tell(S::request(self.request_id, reply_to));
        }

        if self.state.is_done() {
            self.finish_if_done(ctx);
        } else {
            self.timer = Some(ctx.schedule_once(self.timeout, QueryMessage::CollectionTimeout));
        }
        Ok(())
    }

    fn on_message(
        &mut self,
        ctx: &mut Context<QueryMessage<S::Reply>>,
        message: QueryMessage<S::Reply>,
    ) -> ActorResult<()> {
        let event = match message {
            QueryMessage::Answer(reply) => {
                ctx.unwatch(reply.sender);
                QueryEvent::Settled {
                    sender: reply.sender,
                    reading: S::interpret(reply.body),
                }
            }
            QueryMessage::Terminated(sender) => QueryEvent::Settled {
                sender,
                reading: S::unavailable(),
            },
            QueryMessage::CollectionTimeout => QueryEvent::Deadline(S::timed_out()),
        };

        let state = mem::replace(&mut self.state, QueryState::Done(HashMap::new()));
        self.state = state.advance(event, &self.ids);
        self.finish_if_done(ctx);
        Ok(())
    }

    fn on_stop(&mut self, _ctx: &mut Context<QueryMessage<S::Reply>>) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }
}

/// Coordinator of a group over its devices
pub type DeviceQuery = QueryCoordinator<DeviceScatter>;

/// Coordinator of a manager over its groups
pub type GroupQuery = QueryCoordinator<GroupScatter>;

/// Coordinator of the supervisor over its managers
pub type ManagerQuery = QueryCoordinator<ManagerScatter>;
