//! Entities, handles, mailboxes, and execution contexts
//!
//! Implements the isolated-state entity model:
//! - Entities: units of sequential logic owning their state outright
//! - Handles: opaque, comparable references used to address an entity
//! - Contexts: per-entity services (children, liveness watches, timers)
//!
//! Every entity runs as one tokio task draining a private unbounded mailbox.
//! A handler never runs concurrently with itself, so entity state needs no
//! locks. Messages from one sender are delivered in send order.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::directory::Directory;
use super::error::{ActorResult, AskError};

/// Entity identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(pub Uuid);

impl ActorId {
    /// Create a new random ActorId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ActorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mailbox item: a user message, a liveness notification, or the ordered stop signal
pub(crate) enum Envelope<M> {
    Message(M),
    /// Delivered by watch `seq` on `target`; handled as `message`
    Exited {
        target: ActorId,
        seq: u64,
        message: M,
    },
    Stop,
}

/// Handle to a running entity accepting messages of type `M`
///
/// Handles compare and hash by [`ActorId`] only, so they can key maps. A
/// handle names exactly one entity instance; a recreated entity with the same
/// path gets a new handle.
pub struct ActorRef<M> {
    id: ActorId,
    path: Arc<str>,
    mailbox: mpsc::UnboundedSender<Envelope<M>>,
    exited: watch::Receiver<bool>,
}

impl<M> Clone for ActorRef<M> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            path: self.path.clone(),
            mailbox: self.mailbox.clone(),
            exited: self.exited.clone(),
        }
    }
}

impl<M> PartialEq for ActorRef<M> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<M> Eq for ActorRef<M> {}

impl<M> Hash for ActorRef<M> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<M> Borrow<ActorId> for ActorRef<M> {
    fn borrow(&self) -> &ActorId {
        &self.id
    }
}

impl<M> fmt::Debug for ActorRef<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorRef({}#{})", self.path, self.id)
    }
}

impl<M: Send + 'static> ActorRef<M> {
    pub(crate) fn from_parts(
        path: String,
        mailbox: mpsc::UnboundedSender<Envelope<M>>,
        exited: watch::Receiver<bool>,
    ) -> Self {
        Self {
            id: ActorId::new(),
            path: path.into(),
            mailbox,
            exited,
        }
    }

    /// Identity of the referenced entity
    pub fn id(&self) -> ActorId {
        self.id
    }

    /// Hierarchical path the entity was spawned under
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Enqueue a message; returns false if the entity has already exited
    pub fn tell(&self, message: M) -> bool {
        let delivered = self.mailbox.send(Envelope::Message(message)).is_ok();
        if !delivered {
            tracing::debug!(path = %self.path, "dropping message for exited entity");
        }
        delivered
    }

    /// Ask the entity to stop once it has handled everything sent before
    pub fn stop(&self) {
        let _ = self.mailbox.send(Envelope::Stop);
    }

    /// Whether the entity is still running
    pub fn is_alive(&self) -> bool {
        !*self.exited.borrow() && !self.mailbox.is_closed()
    }

    /// Wait until the entity has exited
    pub async fn terminated(&self) {
        let mut exited = self.exited.clone();
        // A dropped sender also means the entity is gone.
        let _ = exited.wait_for(|done| *done).await;
    }

    /// Build a reply address that wraps each reply into a message for this entity
    pub fn reply_to<T, F>(&self, wrap: F) -> ReplyTo<T>
    where
        T: Send + 'static,
        F: Fn(Reply<T>) -> M + Send + Sync + 'static,
    {
        let mailbox = self.mailbox.clone();
        ReplyTo {
            deliver: Arc::new(move |reply| mailbox.send(Envelope::Message(wrap(reply))).is_ok()),
        }
    }

    /// Send a request built around a fresh reply address and wait for the first reply
    ///
    /// This is the caller-side deadline: protocol messages never carry error
    /// replies, so a misrouted request surfaces here as a timeout or as an
    /// unanswered request.
    pub async fn ask<T, F>(&self, make: F, timeout: Duration) -> Result<Reply<T>, AskError>
    where
        T: Send + 'static,
        F: FnOnce(ReplyTo<T>) -> M,
    {
        let (reply_to, mut replies) = ReplyTo::channel();

        if !self.tell(make(reply_to)) {
            return Err(AskError::Gone(self.path.to_string()));
        }

        match tokio::time::timeout(timeout, replies.recv()).await {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => Err(AskError::Unanswered(self.path.to_string())),
            Err(_) => Err(AskError::TimedOut {
                target: self.path.to_string(),
                timeout,
            }),
        }
    }
}

/// A reply together with the identity of the entity that sent it
#[derive(Debug, Clone, PartialEq)]
pub struct Reply<T> {
    /// Entity the reply is attributed to
    pub sender: ActorId,
    /// Reply payload
    pub body: T,
}

/// Address a reply of type `T` can be sent to
///
/// Either another entity's mailbox (see [`ActorRef::reply_to`]) or a plain
/// channel read by an external caller (see [`ReplyTo::channel`]).
pub struct ReplyTo<T> {
    deliver: Arc<dyn Fn(Reply<T>) -> bool + Send + Sync>,
}

impl<T> Clone for ReplyTo<T> {
    fn clone(&self) -> Self {
        Self {
            deliver: self.deliver.clone(),
        }
    }
}

impl<T> fmt::Debug for ReplyTo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ReplyTo")
    }
}

impl<T: Send + 'static> ReplyTo<T> {
    /// Reply address backed by a channel the caller reads from
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Reply<T>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let reply_to = Self {
            deliver: Arc::new(move |reply| tx.send(reply).is_ok()),
        };
        (reply_to, rx)
    }

    /// Send `body` attributed to `sender`; returns false if nobody is listening
    pub fn send(&self, sender: ActorId, body: T) -> bool {
        (self.deliver)(Reply { sender, body })
    }
}

/// Entity: sequential message handler owning its state
pub trait Entity: Send + 'static {
    /// Messages this entity accepts
    type Message: Send + 'static;

    /// Called once before the first message
    fn on_start(&mut self, _ctx: &mut Context<Self::Message>) -> ActorResult<()> {
        Ok(())
    }

    /// Handle one message; an error stops the entity
    fn on_message(
        &mut self,
        ctx: &mut Context<Self::Message>,
        message: Self::Message,
    ) -> ActorResult<()>;

    /// Called once after the last message, unless a handler panicked
    fn on_stop(&mut self, _ctx: &mut Context<Self::Message>) {}
}

/// Something a parent can stop when it exits
trait ChildLink: Send {
    fn stop_child(&self);
    fn child_alive(&self) -> bool;
}

impl<M: Send + 'static> ChildLink for ActorRef<M> {
    fn stop_child(&self) {
        self.stop();
    }

    fn child_alive(&self) -> bool {
        self.is_alive()
    }
}

/// One-shot timer armed by [`Context::schedule_once`]
///
/// Cancelling or dropping the handle guarantees the timer never delivers.
#[derive(Debug)]
pub struct TimerHandle {
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// Cancel the timer
    pub fn cancel(self) {
        self.task.abort();
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Execution context handed to an entity's handlers
///
/// Dropping the context (normal exit, handler error, or panic unwinding)
/// cancels all liveness watches, stops the children, releases the
/// directory path, and signals the entity's own watchers.
pub struct Context<M: Send + 'static> {
    myself: ActorRef<M>,
    directory: Arc<Directory>,
    registered: bool,
    children: Vec<Box<dyn ChildLink>>,
    watches: HashMap<ActorId, (u64, JoinHandle<()>)>,
    watch_seq: u64,
    anonymous_seq: u64,
    stopping: bool,
    exit: watch::Sender<bool>,
}

impl<M: Send + 'static> Context<M> {
    /// Handle of the entity this context belongs to
    pub fn myself(&self) -> &ActorRef<M> {
        &self.myself
    }

    /// Identity of the entity this context belongs to
    pub fn id(&self) -> ActorId {
        self.myself.id
    }

    /// Path of the entity this context belongs to
    pub fn path(&self) -> &str {
        self.myself.path()
    }

    /// Stop after the current message
    pub fn stop(&mut self) {
        self.stopping = true;
    }

    /// Spawn a named child at `<own path>/<name>`, resolvable through the directory
    pub fn spawn_child<E: Entity>(&mut self, name: &str, entity: E) -> ActorRef<E::Message> {
        let path = format!("{}/{}", self.myself.path, name);
        let child = spawn_entity(&self.directory, path, true, entity);
        self.adopt(child.clone());
        child
    }

    /// Spawn an unnamed, short-lived child that is not entered in the directory
    pub fn spawn_anonymous<E: Entity>(&mut self, prefix: &str, entity: E) -> ActorRef<E::Message> {
        self.anonymous_seq += 1;
        let path = format!("{}/${}-{}", self.myself.path, prefix, self.anonymous_seq);
        let child = spawn_entity(&self.directory, path, false, entity);
        self.adopt(child.clone());
        child
    }

    fn adopt<C: Send + 'static>(&mut self, child: ActorRef<C>) {
        self.children.retain(|link| link.child_alive());
        self.children.push(Box::new(child));
    }

    /// Deliver `on_exit(target id)` to this entity once `target` exits
    ///
    /// Watching an entity that has already exited fires immediately. Watching
    /// the same target twice replaces the earlier watch. A watch is forgotten
    /// once its notification has been handled.
    pub fn watch<C, F>(&mut self, target: &ActorRef<C>, on_exit: F)
    where
        C: Send + 'static,
        F: FnOnce(ActorId) -> M + Send + 'static,
    {
        let id = target.id;
        let mut exited = target.exited.clone();
        let mailbox = self.myself.mailbox.clone();
        self.watch_seq += 1;
        let seq = self.watch_seq;

        let task = tokio::spawn(async move {
            let _ = exited.wait_for(|done| *done).await;
            let _ = mailbox.send(Envelope::Exited {
                target: id,
                seq,
                message: on_exit(id),
            });
        });

        if let Some((_, previous)) = self.watches.insert(id, (seq, task)) {
            previous.abort();
        }
    }

    /// Cancel a watch; a notification already enqueued is not recalled
    pub fn unwatch(&mut self, target: ActorId) {
        if let Some((_, task)) = self.watches.remove(&target) {
            task.abort();
        }
    }

    /// Number of watches not yet delivered or cancelled
    pub fn watch_count(&self) -> usize {
        self.watches.len()
    }

    fn release_watch(&mut self, target: ActorId, seq: u64) {
        // A newer watch on the same target stays in place.
        if self.watches.get(&target).is_some_and(|(current, _)| *current == seq) {
            self.watches.remove(&target);
        }
    }

    /// Deliver `message` to this entity after `delay`
    pub fn schedule_once(&self, delay: Duration, message: M) -> TimerHandle {
        let myself = self.myself.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            myself.tell(message);
        });
        TimerHandle { task }
    }
}

impl<M: Send + 'static> Drop for Context<M> {
    fn drop(&mut self) {
        for (_, (_, task)) in self.watches.drain() {
            task.abort();
        }

        for child in self.children.drain(..) {
            child.stop_child();
        }

        if self.registered {
            self.directory.unregister(self.myself.path(), self.myself.id);
        }

        self.exit.send_replace(true);
    }
}

/// Start `entity` on its own task and return its handle
///
/// Must be called from within a tokio runtime.
pub(crate) fn spawn_entity<E: Entity>(
    directory: &Arc<Directory>,
    path: String,
    registered: bool,
    entity: E,
) -> ActorRef<E::Message> {
    let (mailbox_tx, mailbox_rx) = mpsc::unbounded_channel();
    let (exit_tx, exit_rx) = watch::channel(false);
    let myself = ActorRef::from_parts(path, mailbox_tx, exit_rx);

    if registered {
        directory.register(&myself);
    }

    let ctx = Context {
        myself: myself.clone(),
        directory: directory.clone(),
        registered,
        children: Vec::new(),
        watches: HashMap::new(),
        watch_seq: 0,
        anonymous_seq: 0,
        stopping: false,
        exit: exit_tx,
    };

    tokio::spawn(run(entity, ctx, mailbox_rx));
    myself
}

async fn run<E: Entity>(
    mut entity: E,
    mut ctx: Context<E::Message>,
    mut mailbox: mpsc::UnboundedReceiver<Envelope<E::Message>>,
) {
    if let Err(err) = entity.on_start(&mut ctx) {
        tracing::error!(path = %ctx.path(), error = %err, "entity failed to start");
        return;
    }

    while !ctx.stopping {
        let Some(envelope) = mailbox.recv().await else {
            break;
        };

        let message = match envelope {
            Envelope::Message(message) => message,
            Envelope::Exited {
                target,
                seq,
                message,
            } => {
                ctx.release_watch(target, seq);
                message
            }
            Envelope::Stop => break,
        };

        if let Err(err) = entity.on_message(&mut ctx, message) {
            tracing::error!(path = %ctx.path(), error = %err, "entity handler failed, stopping");
            break;
        }
    }

    mailbox.close();
    entity.on_stop(&mut ctx);
}
