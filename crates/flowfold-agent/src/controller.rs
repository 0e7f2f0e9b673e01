use anyhow::{Context, Result};
use flowfold_core::{Admission, FlowError, Gate, Msg, Session, PROTOCOL_VERSION};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{sleep_until, Instant};

/// A client message plus the channel its direct reply goes back on.
pub struct Request {
    pub msg: Msg,
    pub reply: oneshot::Sender<Option<Msg>>,
}

#[derive(Debug, Default, PartialEq)]
pub struct Outcome {
    /// Sent only to the requesting client.
    pub reply: Option<Msg>,
    /// Published to every connected client, the requester included.
    pub broadcast: Option<Msg>,
}

impl Outcome {
    fn reply(msg: Msg) -> Self {
        Self {
            reply: Some(msg),
            broadcast: None,
        }
    }

    fn broadcast(msg: Msg) -> Self {
        Self {
            reply: None,
            broadcast: Some(msg),
        }
    }
}

/// Cheap to clone; one per connection.
#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::Sender<Request>,
    bus: broadcast::Sender<Msg>,
}

impl ControllerHandle {
    pub async fn request(&self, msg: Msg) -> Result<Option<Msg>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request { msg, reply })
            .await
            .context("controller stopped")?;
        rx.await.context("controller dropped the request")
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Msg> {
        self.bus.subscribe()
    }
}

/// Sole owner of the session. Gestures from every connection are applied
/// one at a time in arrival order.
pub struct Controller {
    session: Session,
    bus: broadcast::Sender<Msg>,
    settle_after: Duration,
    deadline: Option<(u64, Instant)>,
}

pub fn spawn(session: Session, settle_after: Duration) -> ControllerHandle {
    let (tx, rx) = mpsc::channel(256);
    let (bus, _) = broadcast::channel(1024);
    let controller = Controller::new(session, bus.clone(), settle_after);
    tokio::spawn(controller.run(rx));
    ControllerHandle { tx, bus }
}

impl Controller {
    pub fn new(session: Session, bus: broadcast::Sender<Msg>, settle_after: Duration) -> Self {
        let mut controller = Self {
            session,
            bus,
            settle_after,
            deadline: None,
        };
        if let Gate::Settling { epoch } = controller.session.gate() {
            controller.arm(epoch);
        }
        controller
    }

    pub async fn run(mut self, mut rx: mpsc::Receiver<Request>) {
        loop {
            let deadline = self.deadline.map(|(_, at)| at);
            tokio::select! {
                req = rx.recv() => {
                    let Some(req) = req else { break };
                    let out = self.handle(req.msg);
                    if let Some(msg) = out.broadcast {
                        // no subscribers is fine
                        let _ = self.bus.send(msg);
                    }
                    let _ = req.reply.send(out.reply);
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let Some(msg) = self.expire() {
                        let _ = self.bus.send(msg);
                    }
                }
            }
        }
        tracing::debug!("controller stopped");
    }

    pub fn handle(&mut self, msg: Msg) -> Outcome {
        match msg {
            Msg::Hello { version } => {
                if version != PROTOCOL_VERSION {
                    tracing::warn!(%version, expected = PROTOCOL_VERSION, "protocol version mismatch");
                }
                Outcome::reply(Msg::Hello {
                    version: PROTOCOL_VERSION.into(),
                })
            }
            Msg::RequestSnapshot => Outcome::reply(self.snapshot()),
            Msg::Toggle { node } => match self.session.toggle(&node) {
                Ok(Admission::Accepted(transition)) => {
                    self.arm(transition.epoch);
                    Outcome::broadcast(Msg::Transition(transition))
                }
                Ok(Admission::Deferred { pending }) => {
                    Outcome::reply(Msg::Deferred { node, pending })
                }
                Err(err) => rejected(err),
            },
            Msg::Settled { epoch } => {
                if self.session.settle(epoch) {
                    self.deadline = None;
                    Outcome::broadcast(self.status())
                } else {
                    Outcome::reply(self.status())
                }
            }
            Msg::HoverNode { node } => match self.session.hover_node(node.as_ref()) {
                Ok(hover) => Outcome::reply(Msg::Highlight { hover }),
                Err(err) => rejected(err),
            },
            Msg::HoverLink { link } => match self.session.hover_link(link.as_ref()) {
                Ok(detail) => Outcome::reply(Msg::LinkInfo { detail }),
                Err(err) => rejected(err),
            },
            Msg::Ping => Outcome::reply(Msg::Pong),
            other => {
                tracing::debug!(msg = ?std::mem::discriminant(&other), "unexpected client message");
                Outcome::reply(Msg::Rejected {
                    error: "unexpected message from client".into(),
                })
            }
        }
    }

    /// Settle the pending epoch once its window has passed without an
    /// acknowledgement. Returns the status to publish when something changed.
    pub fn expire(&mut self) -> Option<Msg> {
        let (epoch, _) = self.deadline.take()?;
        if self.session.settle(epoch) {
            tracing::debug!(epoch, "transition settled by timeout");
            Some(self.status())
        } else {
            None
        }
    }

    pub fn snapshot(&self) -> Msg {
        Msg::Snapshot {
            epoch: self.session.epoch(),
            gate: self.session.gate(),
            frame: self.session.frame().clone(),
        }
    }

    fn status(&self) -> Msg {
        Msg::Status {
            gate: self.session.gate(),
        }
    }

    fn arm(&mut self, epoch: u64) {
        self.deadline = Some((epoch, Instant::now() + self.settle_after));
    }
}

fn rejected(err: FlowError) -> Outcome {
    tracing::debug!(error = %err, "request rejected");
    Outcome::reply(Msg::Rejected {
        error: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowfold_core::{LinkRecord, NodeId, NodeRecord, NodeState, Topology};

    fn topology() -> Topology {
        Topology::new(
            vec![
                NodeRecord::new("R", "Group", "Revenue"),
                NodeRecord::new("A", "Leaf", "A").with_parent("R"),
                NodeRecord::new("B", "Leaf", "B").with_parent("R"),
                NodeRecord::new("X", "Leaf", "X"),
            ],
            vec![
                LinkRecord::new("A", "B", 10.0),
                LinkRecord::new("X", "A", 5.0),
            ],
        )
    }

    fn controller() -> Controller {
        let mut session = Session::new();
        session.load(topology()).expect("valid topology");
        let (bus, _) = broadcast::channel(16);
        Controller::new(session, bus, Duration::from_millis(800))
    }

    fn toggle(c: &mut Controller, node: &str) -> Outcome {
        c.handle(Msg::Toggle {
            node: NodeId::from(node),
        })
    }

    #[tokio::test]
    async fn load_epoch_settles_by_timeout() {
        let mut c = controller();
        assert!(matches!(c.snapshot(), Msg::Snapshot { gate: Gate::Settling { .. }, .. }));

        let status = c.expire().expect("pending epoch settled");
        assert!(matches!(status, Msg::Status { gate: Gate::Ready }));
        assert_eq!(c.expire(), None);
    }

    #[tokio::test]
    async fn toggle_is_broadcast_then_deferred() {
        let mut c = controller();
        c.expire();

        let out = toggle(&mut c, "R");
        let Some(Msg::Transition(t)) = out.broadcast else {
            panic!("expected a broadcast transition");
        };
        assert_eq!(t.state, NodeState::Expanded);
        assert!(out.reply.is_none());

        let out = toggle(&mut c, "R");
        assert!(matches!(out.reply, Some(Msg::Deferred { pending, .. }) if pending == t.epoch));

        let out = c.handle(Msg::Settled { epoch: t.epoch });
        assert!(matches!(out.broadcast, Some(Msg::Status { gate: Gate::Ready })));
        assert_eq!(c.expire(), None);
    }

    #[tokio::test]
    async fn stale_settle_only_replies() {
        let mut c = controller();
        let out = c.handle(Msg::Settled { epoch: 99 });
        assert!(out.broadcast.is_none());
        assert!(matches!(out.reply, Some(Msg::Status { gate: Gate::Settling { .. } })));
    }

    #[tokio::test]
    async fn errors_become_rejections() {
        let mut c = controller();
        c.expire();

        let out = toggle(&mut c, "A");
        let Some(Msg::Rejected { error }) = out.reply else {
            panic!("contained node toggle should be rejected");
        };
        assert!(error.contains("contained"), "{error}");

        let out = c.handle(Msg::HoverNode {
            node: Some(NodeId::from("missing")),
        });
        assert!(matches!(out.reply, Some(Msg::Rejected { .. })));

        let out = c.handle(Msg::Pong);
        assert!(matches!(out.reply, Some(Msg::Rejected { .. })));
    }

    #[tokio::test]
    async fn hover_and_ping_reply_directly() {
        let mut c = controller();
        c.expire();

        let out = c.handle(Msg::HoverNode {
            node: Some(NodeId::from("X")),
        });
        let Some(Msg::Highlight { hover: Some(hover) }) = out.reply else {
            panic!("expected highlight");
        };
        assert_eq!(hover.hint, "X\nNet flow: 5 CR");
        let connectivity = hover.connectivity.expect("box hover classifies neighbours");
        assert!(connectivity.is_connected(&NodeId::from("R")));

        assert_eq!(c.handle(Msg::Ping).reply, Some(Msg::Pong));
    }

    #[tokio::test]
    async fn running_controller_auto_settles() {
        let mut session = Session::new();
        session.load(topology()).expect("valid topology");
        let handle = spawn(session, Duration::from_millis(20));
        let mut bus = handle.subscribe();

        let status = tokio::time::timeout(Duration::from_secs(2), bus.recv())
            .await
            .expect("status before timeout")
            .expect("bus open");
        assert!(matches!(status, Msg::Status { gate: Gate::Ready }));

        let reply = handle
            .request(Msg::Toggle {
                node: NodeId::from("R"),
            })
            .await
            .expect("controller running");
        assert_eq!(reply, None);
        let event = bus.recv().await.expect("transition published");
        assert!(matches!(event, Msg::Transition(_)));
    }
}
