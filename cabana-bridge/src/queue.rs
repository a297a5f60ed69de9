//! Outbound write queue.
//!
//! The only path to the transport. Commands are written strictly FIFO
//! with at most one outstanding on the half-duplex bus; replies are
//! correlated against outstanding requests, timeouts requeue bounded by
//! `max_attempts`, and certain writes automatically enqueue a read-back
//! so the state store converges on equipment-confirmed values.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::protocol::actions::{ChlorinatorAction, ControllerAction, PumpAction};
use crate::protocol::{DecodeError, EncodeError, Frame, Protocol};
use crate::tracing::prelude::*;
use crate::transport::BusTransport;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum QueueError {
    #[error("frame rejected at admission: {0}")]
    Rejected(#[from] EncodeError),

    #[error("raw bytes rejected at admission: {0}")]
    RejectedRaw(#[from] DecodeError),

    #[error("no acknowledgement after {attempts} attempts")]
    Aborted { attempts: u8 },

    #[error("write queue is shutting down")]
    ShuttingDown,

    #[error("write queue task is gone")]
    Closed,
}

/// How a reply is recognized as the ack for a given request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    /// The bus convention: the reply comes from the request's destination
    /// and its first payload byte echoes the request's action code.
    PayloadEcho,
    /// The reply mirrors the request's action code (pump status replies,
    /// whose first payload byte is data).
    ActionMirror,
    /// The reply carries this specific action code. Chlorinator replies
    /// cannot echo the request action, and their wire format does not
    /// carry a usable source address, so only the protocol and the
    /// expected action are checked.
    ReplyAction(u8),
}

impl MatchRule {
    pub fn matches(&self, request: &Frame, reply: &Frame) -> bool {
        match self {
            MatchRule::PayloadEcho => {
                reply.source == request.dest && reply.payload.first() == Some(&request.action)
            }
            MatchRule::ActionMirror => {
                reply.source == request.dest && reply.action == request.action
            }
            MatchRule::ReplyAction(action) => {
                reply.protocol == request.protocol && reply.action == *action
            }
        }
    }
}

/// Queue tuning. The matching extensions and the follow-up trigger set
/// are configuration rather than hardcoded tables.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Attempts before a request is abandoned.
    pub max_attempts: u8,
    /// Per-attempt ack timeout.
    pub reply_timeout: Duration,
    /// Chlorinator request action -> expected reply action.
    pub chlor_reply_actions: HashMap<u8, u8>,
    /// Pump actions whose replies mirror the action code instead of
    /// echoing it in the payload.
    pub pump_mirror_actions: HashSet<u8>,
    /// Controller set action -> read-back action queued after the ack.
    pub follow_ups: HashMap<u8, u8>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            reply_timeout: Duration::from_secs(1),
            chlor_reply_actions: HashMap::from([
                (
                    ChlorinatorAction::SetControl as u8,
                    ChlorinatorAction::Ack as u8,
                ),
                (
                    ChlorinatorAction::SetOutput as u8,
                    ChlorinatorAction::SaltReading as u8,
                ),
                (
                    ChlorinatorAction::SetSaltCellConfig as u8,
                    ChlorinatorAction::SaltReading as u8,
                ),
                (
                    ChlorinatorAction::GetVersion as u8,
                    ChlorinatorAction::SaltReading as u8,
                ),
                (
                    ChlorinatorAction::GetModel as u8,
                    ChlorinatorAction::Model as u8,
                ),
            ]),
            pump_mirror_actions: HashSet::from([PumpAction::Status as u8]),
            follow_ups: HashMap::from([
                (
                    ControllerAction::SetHeatSetpoint as u8,
                    ControllerAction::GetHeatSetpoint as u8,
                ),
                (
                    ControllerAction::SetHeatPump as u8,
                    ControllerAction::GetHeatPump as u8,
                ),
            ]),
        }
    }
}

impl QueueConfig {
    fn match_rule(&self, request: &Frame) -> MatchRule {
        match request.protocol {
            Protocol::Chlorinator => self
                .chlor_reply_actions
                .get(&request.action)
                .copied()
                .map(MatchRule::ReplyAction)
                .unwrap_or(MatchRule::PayloadEcho),
            Protocol::Pump if self.pump_mirror_actions.contains(&request.action) => {
                MatchRule::ActionMirror
            }
            _ => MatchRule::PayloadEcho,
        }
    }
}

type Completion = oneshot::Sender<Result<Frame, QueueError>>;

struct PendingRequest {
    frame: Frame,
    wire: Vec<u8>,
    rule: MatchRule,
    attempts: u8,
    /// None for internally queued follow-ups: nobody is waiting, the
    /// outcome is only logged.
    done: Option<Completion>,
}

impl PendingRequest {
    fn resolve(self, result: Result<Frame, QueueError>) {
        match self.done {
            Some(done) => {
                let _ = done.send(result);
            }
            None => match result {
                Ok(reply) => debug!("follow-up for action {} answered: {reply}", self.frame.action),
                Err(err) => warn!("follow-up for action {} failed: {err}", self.frame.action),
            },
        }
    }
}

enum Command {
    Submit {
        frame: Frame,
        wire: Vec<u8>,
        done: Completion,
    },
}

/// Cloneable handle to the queue actor.
#[derive(Clone)]
pub struct QueueHandle {
    tx: mpsc::Sender<Command>,
}

impl QueueHandle {
    /// Queue a frame and wait for its ack (or terminal failure).
    ///
    /// The frame is encoded here, before any transport interaction, so a
    /// malformed construction is rejected at admission.
    pub async fn submit(&self, frame: Frame) -> Result<Frame, QueueError> {
        let wire = frame.encode().map_err(QueueError::Rejected)?;
        self.enqueue(frame, wire).await
    }

    /// Queue pre-encoded bytes. The bytes are decoded (checksum included)
    /// before admission; inconsistent bytes never reach the wire.
    pub async fn submit_raw(&self, bytes: Vec<u8>) -> Result<Frame, QueueError> {
        let frame = Frame::decode(&bytes).map_err(QueueError::RejectedRaw)?;
        self.enqueue(frame, bytes).await
    }

    async fn enqueue(&self, frame: Frame, wire: Vec<u8>) -> Result<Frame, QueueError> {
        let (done, rx) = oneshot::channel();
        self.tx
            .send(Command::Submit { frame, wire, done })
            .await
            .map_err(|_| QueueError::Closed)?;
        rx.await.map_err(|_| QueueError::Closed)?
    }
}

/// The queue actor. Owns the transport exclusively; nothing else writes.
pub struct WriteQueue {
    transport: Box<dyn BusTransport>,
    config: QueueConfig,
    cmd_rx: mpsc::Receiver<Command>,
    inbound_rx: mpsc::Receiver<Frame>,
    shutdown: CancellationToken,
    queued: VecDeque<PendingRequest>,
    in_flight: Option<InFlight>,
    cmds_closed: bool,
}

struct InFlight {
    request: PendingRequest,
    deadline: Instant,
}

impl WriteQueue {
    /// Spawn the actor onto `tracker` and return its handle.
    ///
    /// `inbound_rx` carries every decoded inbound frame; the engine's
    /// read task feeds it (tests feed it directly).
    pub fn spawn(
        transport: Box<dyn BusTransport>,
        config: QueueConfig,
        inbound_rx: mpsc::Receiver<Frame>,
        shutdown: CancellationToken,
        tracker: &TaskTracker,
    ) -> QueueHandle {
        let (tx, cmd_rx) = mpsc::channel(32);
        let queue = WriteQueue {
            transport,
            config,
            cmd_rx,
            inbound_rx,
            shutdown,
            queued: VecDeque::new(),
            in_flight: None,
            cmds_closed: false,
        };
        tracker.spawn(queue.run());
        QueueHandle { tx }
    }

    async fn run(mut self) {
        loop {
            self.start_next_write().await;

            if self.cmds_closed && self.queued.is_empty() && self.in_flight.is_none() {
                return;
            }

            let deadline = self.in_flight.as_ref().map(|f| f.deadline);
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break,

                Some(frame) = self.inbound_rx.recv() => {
                    self.on_inbound(frame);
                }

                _ = sleep_until_opt(deadline), if deadline.is_some() => {
                    self.on_timeout();
                }

                cmd = self.cmd_rx.recv(), if !self.cmds_closed => {
                    match cmd {
                        Some(cmd) => self.on_command(cmd),
                        // All handles dropped: finish what is already
                        // queued, then exit.
                        None => self.cmds_closed = true,
                    }
                }
            }
        }
        self.drain_for_shutdown().await;
    }

    /// Write the next queued request if the bus is idle. Write failures
    /// are not terminal: the request stays outstanding and the timeout
    /// path requeues it, bounded by `max_attempts`.
    async fn start_next_write(&mut self) {
        if self.in_flight.is_some() {
            return;
        }
        let Some(mut request) = self.queued.pop_front() else {
            return;
        };
        request.attempts += 1;
        if let Err(err) = self.transport.send(&request.wire).await {
            warn!(
                "transport write failed (attempt {}): {err}",
                request.attempts
            );
        }
        self.in_flight = Some(InFlight {
            request,
            deadline: Instant::now() + self.config.reply_timeout,
        });
    }

    fn on_command(&mut self, cmd: Command) {
        let Command::Submit { frame, wire, done } = cmd;
        let rule = self.config.match_rule(&frame);
        debug!("queued {frame} (rule {rule:?}, depth {})", self.queued.len());
        self.queued.push_back(PendingRequest {
            frame,
            wire,
            rule,
            attempts: 0,
            done: Some(done),
        });
    }

    /// Correlate an inbound frame against the in-flight request first,
    /// then the still-queued ones in submission order; first match wins.
    fn on_inbound(&mut self, reply: Frame) {
        if let Some(in_flight) = self
            .in_flight
            .take_if(|f| f.request.rule.matches(&f.request.frame, &reply))
        {
            self.queue_follow_up(&in_flight.request.frame);
            debug!(
                "acked {} after {} attempt(s)",
                in_flight.request.frame, in_flight.request.attempts
            );
            in_flight.request.resolve(Ok(reply));
            return;
        }
        let matched = self
            .queued
            .iter()
            .position(|p| p.rule.matches(&p.frame, &reply))
            .and_then(|pos| self.queued.remove(pos));
        if let Some(request) = matched {
            // The equipment answered before we even transmitted; happens
            // when the panel broadcasts the value another master set.
            debug!("{} answered while still queued", request.frame);
            self.queue_follow_up(&request.frame);
            request.resolve(Ok(reply));
        }
    }

    fn on_timeout(&mut self) {
        let Some(in_flight) = self.in_flight.take() else {
            return;
        };
        let mut request = in_flight.request;
        if request.attempts >= self.config.max_attempts {
            warn!(
                "abandoning {} after {} attempts",
                request.frame, request.attempts
            );
            let attempts = request.attempts;
            request.resolve(Err(QueueError::Aborted { attempts }));
            return;
        }
        // The first few misses are routine bus contention; persistent
        // ones deserve attention.
        if request.attempts > 3 {
            warn!(
                "no ack for {} (attempt {} of {}), requeueing",
                request.frame, request.attempts, self.config.max_attempts
            );
        } else {
            debug!(
                "no ack for {} (attempt {} of {}), requeueing",
                request.frame, request.attempts, self.config.max_attempts
            );
        }
        self.queued.push_front(request);
    }

    fn queue_follow_up(&mut self, acked: &Frame) {
        if acked.protocol != Protocol::Controller {
            return;
        }
        let Some(&get_action) = self.config.follow_ups.get(&acked.action) else {
            return;
        };
        let frame = Frame {
            protocol: acked.protocol,
            pad: acked.pad,
            dest: acked.dest,
            source: acked.source,
            action: get_action,
            payload: vec![0],
        };
        let wire = match frame.encode() {
            Ok(wire) => wire,
            Err(err) => {
                // Unreachable for a one-byte payload, but never panic here.
                warn!("follow-up encode failed: {err}");
                return;
            }
        };
        let rule = self.config.match_rule(&frame);
        debug!("queueing read-back action {get_action} after acked action {}", acked.action);
        self.queued.push_back(PendingRequest {
            frame,
            wire,
            rule,
            attempts: 0,
            done: None,
        });
    }

    /// Shutdown: refuse new admissions, give the in-flight request one
    /// timeout window, abandon everything still queued unwritten.
    async fn drain_for_shutdown(mut self) {
        self.cmd_rx.close();
        while let Ok(cmd) = self.cmd_rx.try_recv() {
            let Command::Submit { done, .. } = cmd;
            let _ = done.send(Err(QueueError::ShuttingDown));
        }

        if let Some(in_flight) = self.in_flight.take() {
            let InFlight { request, deadline } = in_flight;
            let reply = self.await_reply_until(&request, deadline).await;
            match reply {
                Some(reply) => request.resolve(Ok(reply)),
                None => {
                    let attempts = request.attempts;
                    request.resolve(Err(QueueError::Aborted { attempts }));
                }
            }
        }

        for request in self.queued.drain(..) {
            request.resolve(Err(QueueError::ShuttingDown));
        }
        info!("write queue stopped");
    }

    async fn await_reply_until(
        &mut self,
        request: &PendingRequest,
        deadline: Instant,
    ) -> Option<Frame> {
        loop {
            let frame = tokio::time::timeout_at(deadline, self.inbound_rx.recv())
                .await
                .ok()??;
            if request.rule.matches(&request.frame, &frame) {
                return Some(frame);
            }
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn request(dest: u8, action: u8) -> Frame {
        Frame::command(dest, action, vec![])
    }

    fn reply(source: u8, action: u8, payload: Vec<u8>) -> Frame {
        Frame {
            protocol: Protocol::Pump,
            pad: 0,
            dest: 16,
            source,
            action,
            payload,
        }
    }

    // The canonical rule from the bus convention: reply source must be
    // the request dest and payload[0] must echo the request action.
    #[test_case(96, 1, vec![1], true; "echo_matches")]
    #[test_case(97, 1, vec![1], false; "wrong_source")]
    #[test_case(96, 1, vec![2], false; "wrong_echo")]
    #[test_case(96, 1, vec![], false; "empty_payload")]
    fn payload_echo_rule(source: u8, action: u8, payload: Vec<u8>, expect: bool) {
        let req = request(96, 1);
        assert_eq!(
            MatchRule::PayloadEcho.matches(&req, &reply(source, action, payload)),
            expect
        );
    }

    #[test]
    fn action_mirror_rule_ignores_payload() {
        let req = request(96, 7);
        let status = reply(96, 7, vec![10, 0, 2, 1, 14]);
        assert!(MatchRule::ActionMirror.matches(&req, &status));
        assert!(!MatchRule::ActionMirror.matches(&req, &reply(96, 1, vec![7])));
    }

    #[test]
    fn reply_action_rule_checks_protocol_and_action() {
        let req = Frame::chlorinator(1, 17, vec![75]);
        let rule = MatchRule::ReplyAction(18);
        let salt = Frame {
            protocol: Protocol::Chlorinator,
            pad: 0,
            dest: 0,
            source: 1,
            action: 18,
            payload: vec![81, 128],
        };
        assert!(rule.matches(&req, &salt));
        assert!(!rule.matches(&req, &reply(1, 18, vec![81, 128])));
    }

    #[test]
    fn config_selects_rules_per_protocol() {
        let config = QueueConfig::default();
        assert_eq!(
            config.match_rule(&Frame::chlorinator(1, 17, vec![75])),
            MatchRule::ReplyAction(18)
        );
        assert_eq!(
            config.match_rule(&Frame::chlorinator(1, 19, vec![])),
            MatchRule::PayloadEcho
        );
        assert_eq!(config.match_rule(&request(96, 7)), MatchRule::ActionMirror);
        assert_eq!(config.match_rule(&request(96, 1)), MatchRule::PayloadEcho);
        assert_eq!(config.match_rule(&request(16, 136)), MatchRule::PayloadEcho);
    }
}
