//! Hand-driven entity stand-in for tests and external callers
//!
//! A [`Probe`] exposes a real [`ActorRef`] whose mailbox is read by the code
//! holding the probe instead of by an entity task. The holder decides if and
//! when to answer, and when the "entity" terminates, which makes slow,
//! silent, or dying children easy to stage.

use std::time::Duration;
use tokio::sync::{mpsc, watch};

use super::actor::{ActorId, ActorRef, Envelope};

/// Handle-backed test double with a caller-controlled lifetime
pub struct Probe<M: Send + 'static> {
    handle: ActorRef<M>,
    mailbox: mpsc::UnboundedReceiver<Envelope<M>>,
    exit: watch::Sender<bool>,
}

impl<M: Send + 'static> Probe<M> {
    /// Create a probe addressed as `path`
    pub fn new(path: impl Into<String>) -> Self {
        let (mailbox_tx, mailbox) = mpsc::unbounded_channel();
        let (exit, exit_rx) = watch::channel(false);
        Self {
            handle: ActorRef::from_parts(path.into(), mailbox_tx, exit_rx),
            mailbox,
            exit,
        }
    }

    /// Handle other entities use to message the probe
    pub fn handle(&self) -> ActorRef<M> {
        self.handle.clone()
    }

    /// Identity of the probe's handle
    pub fn id(&self) -> ActorId {
        self.handle.id()
    }

    /// Wait up to `timeout` for the next message
    ///
    /// A stop request terminates the probe and yields `None`, as would a
    /// real entity exiting.
    pub async fn expect_message(&mut self, timeout: Duration) -> Option<M> {
        match tokio::time::timeout(timeout, self.mailbox.recv()).await {
            Ok(Some(Envelope::Message(message) | Envelope::Exited { message, .. })) => {
                Some(message)
            }
            Ok(Some(Envelope::Stop)) => {
                self.terminate();
                None
            }
            Ok(None) | Err(_) => None,
        }
    }

    /// Take the next already-queued message, if any
    pub fn try_next(&mut self) -> Option<M> {
        match self.mailbox.try_recv() {
            Ok(Envelope::Message(message) | Envelope::Exited { message, .. }) => Some(message),
            Ok(Envelope::Stop) => {
                self.terminate();
                None
            }
            Err(_) => None,
        }
    }

    /// Terminate the probe: watchers are notified and further sends fail
    pub fn terminate(&mut self) {
        self.mailbox.close();
        self.exit.send_replace(true);
    }
}

impl<M: Send + 'static> Drop for Probe<M> {
    fn drop(&mut self) {
        self.exit.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_receives_messages() {
        let mut probe = Probe::<&'static str>::new("/probe");
        probe.handle().tell("ping");

        assert_eq!(probe.expect_message(Duration::from_secs(1)).await, Some("ping"));
        assert!(probe.try_next().is_none());
    }

    #[tokio::test]
    async fn test_stop_terminates_probe() {
        let mut probe = Probe::<&'static str>::new("/probe");
        let handle = probe.handle();

        handle.stop();
        assert_eq!(probe.expect_message(Duration::from_secs(1)).await, None);

        handle.terminated().await;
        assert!(!handle.is_alive());
        assert!(!handle.tell("late"));
    }
}
