// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! CAN bus session worker.
//!
//! A [`Session`] owns the bus handle for its whole lifetime and runs the
//! blocking receive loop on a dedicated thread. Everything it learns is
//! published, in arrival order, as [`Event`] values on a single channel.
//! Outbound configuration frames are queued through a [`SessionHandle`] and
//! transmitted by the worker between polls, so no other thread ever touches
//! the bus.

use crate::{
    can::{describe, CanBus, Error, Packet},
    codec::{decode_status, decode_target, FrameClass, FrameIds, RadarStatusRecord, TargetRecord},
};
use chrono::{DateTime, Utc};
use kanal::{Receiver, Sender};
use log::{debug, error, info, trace, warn};
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

/// Default bounded wait for each receive poll.
pub const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Default number of empty polls between liveness checks (5 s at 100 ms).
pub const CHECK_CYCLES: u32 = 50;

/// Default silence after which a liveness check warns.
pub const NO_DATA_WINDOW: Duration = Duration::from_secs(5);

const REPLY_POLL: Duration = Duration::from_millis(50);

/// Connection health of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No bus handle has been opened, or the session stopped cleanly
    Disconnected,
    /// Bus handle open, no frame seen yet
    Connected,
    /// Frames are arriving
    Active,
    /// The last poll elapsed without a frame
    Inactive,
    /// Open or receive failed; terminal for the session
    Error,
}

impl ConnectionState {
    /// Whether the receive loop may move from `self` to `next`.
    pub fn can_transition(self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        match (self, next) {
            (Error, _) => false,
            (_, Error) => true,
            (Disconnected, Connected) => true,
            (Connected | Inactive, Active) => true,
            (Connected | Active, Inactive) => true,
            (Connected | Active | Inactive, Disconnected) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Active => write!(f, "active"),
            ConnectionState::Inactive => write!(f, "inactive"),
            ConnectionState::Error => write!(f, "error"),
        }
    }
}

/// Everything a session reports to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A target frame decoded successfully
    NewTarget(TargetRecord),
    /// Any frame seen on the bus, decoded or not
    RawFrameObserved {
        /// Frame identifier
        id: u32,
        /// Frame payload
        data: Vec<u8>,
        /// Wall clock time of reception
        timestamp: DateTime<Utc>,
    },
    /// The connection state moved
    StatusChanged(ConnectionState),
    /// A status frame decoded successfully
    RadarStatusUpdated(RadarStatusRecord),
    /// No traffic for longer than the liveness window, or the bus failed
    NoDataWarning,
}

/// Monotonic time source for liveness checks.
pub trait Clock: Send {
    /// Current instant.
    fn now(&self) -> Instant;
}

/// [`Clock`] backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Receive loop tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSettings {
    /// Bounded wait of each poll
    pub poll_timeout: Duration,
    /// Empty polls between liveness checks
    pub check_cycles: u32,
    /// Silence tolerated before a liveness check warns
    pub no_data_window: Duration,
    /// Identifier classification table
    pub ids: FrameIds,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            poll_timeout: POLL_TIMEOUT,
            check_cycles: CHECK_CYCLES,
            no_data_window: NO_DATA_WINDOW,
            ids: FrameIds::default(),
        }
    }
}

/// Outbound frame queued for the worker, with a reply slot for the outcome.
struct SendRequest {
    packet: Packet,
    reply: Sender<Result<(), Error>>,
}

/// Caller side of a running session.
pub struct SessionHandle {
    stop: Arc<AtomicBool>,
    bus_open: Arc<AtomicBool>,
    requests: Sender<SendRequest>,
    thread: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Queue a configuration frame for transmission and wait for the result.
    ///
    /// Returns `Ok(false)` without doing anything when the session holds no
    /// open bus handle. Transmit failures are returned but leave the session
    /// running.
    ///
    /// Blocks for up to one poll period. Callers that must keep servicing
    /// other work use [`SessionHandle::queue_config_frame`] instead.
    pub fn send_config_frame(&self, id: u16, body: [u8; 8]) -> Result<bool, Error> {
        match self.queue_config_frame(id, body) {
            Some(pending) => pending.wait().map(|_| true),
            None => Ok(false),
        }
    }

    /// Queue a configuration frame without waiting for the worker.
    ///
    /// Returns `None` when the session holds no open bus handle. Frames
    /// queued back to back are transmitted in order before the next poll.
    pub fn queue_config_frame(&self, id: u16, body: [u8; 8]) -> Option<PendingSend> {
        if !self.is_open() {
            debug!("no bus open, dropping config frame {:#05X}", id);
            return None;
        }

        let (reply, outcome) = kanal::bounded(1);
        let request = SendRequest {
            packet: Packet::new(id as u32, &body),
            reply,
        };
        if self.requests.send(request).is_err() {
            return None;
        }

        Some(PendingSend {
            id,
            outcome,
            bus_open: self.bus_open.clone(),
        })
    }

    /// Whether the worker currently holds an open bus handle.
    pub fn is_open(&self) -> bool {
        self.bus_open.load(Ordering::Acquire)
    }

    /// Whether the worker thread has returned.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Request a cooperative stop and wait for the worker to release the bus.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("can session thread panicked");
            }
        }
    }
}

/// Outcome of a queued configuration frame.
pub struct PendingSend {
    id: u16,
    outcome: Receiver<Result<(), Error>>,
    bus_open: Arc<AtomicBool>,
}

impl PendingSend {
    /// CAN identifier of the queued frame.
    pub fn id(&self) -> u16 {
        self.id
    }

    /// The transmit result once the worker has handled the frame.
    ///
    /// A frame still queued when the worker releases the bus is never sent
    /// and resolves to [`Error::Closed`].
    pub fn try_result(&self) -> Option<Result<(), Error>> {
        match self.outcome.try_recv() {
            Ok(Some(result)) => return Some(result),
            Ok(None) => (),
            Err(_) => return Some(Err(Error::Closed)),
        }

        if self.bus_open.load(Ordering::Acquire) {
            return None;
        }

        // The worker may have answered just before releasing the bus.
        match self.outcome.try_recv() {
            Ok(Some(result)) => Some(result),
            _ => Some(Err(Error::Closed)),
        }
    }

    /// Block until the worker has handled the frame.
    pub fn wait(self) -> Result<(), Error> {
        loop {
            if let Ok(result) = self.outcome.recv_timeout(REPLY_POLL) {
                return result;
            }
            if let Some(result) = self.try_result() {
                return result;
            }
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Receive loop state for one bus handle.
pub struct Session<C: Clock = SystemClock> {
    settings: SessionSettings,
    clock: C,
    state: ConnectionState,
    last_received: Option<Instant>,
    check_timer: u32,
    events: Sender<Event>,
    requests: Receiver<SendRequest>,
    stop: Arc<AtomicBool>,
    bus_open: Arc<AtomicBool>,
}

/// Start a session on a named thread.
///
/// `open` runs on the worker thread, so a blocking or failing open never
/// stalls the caller. Events arrive on the returned receiver in the order the
/// worker produced them.
pub fn spawn<B, F>(
    settings: SessionSettings,
    open: F,
) -> Result<(SessionHandle, Receiver<Event>), Error>
where
    B: CanBus,
    F: FnOnce() -> Result<B, Error> + Send + 'static,
{
    spawn_with_clock(settings, SystemClock, open)
}

/// [`spawn`] with an explicit time source.
pub fn spawn_with_clock<B, C, F>(
    settings: SessionSettings,
    clock: C,
    open: F,
) -> Result<(SessionHandle, Receiver<Event>), Error>
where
    B: CanBus,
    C: Clock + 'static,
    F: FnOnce() -> Result<B, Error> + Send + 'static,
{
    let (events, rx) = kanal::unbounded();
    let (requests, pending) = kanal::unbounded();
    let session = Session::new(settings, clock, events, pending);
    let stop = session.stop.clone();
    let bus_open = session.bus_open.clone();

    let thread = thread::Builder::new()
        .name("can".to_string())
        .spawn(move || session.run(open))?;

    let handle = SessionHandle {
        stop,
        bus_open,
        requests,
        thread: Some(thread),
    };

    Ok((handle, rx))
}

impl<C: Clock> Session<C> {
    fn new(
        settings: SessionSettings,
        clock: C,
        events: Sender<Event>,
        requests: Receiver<SendRequest>,
    ) -> Self {
        Session {
            settings,
            clock,
            state: ConnectionState::Disconnected,
            last_received: None,
            check_timer: 0,
            events,
            requests,
            stop: Arc::new(AtomicBool::new(false)),
            bus_open: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Open the bus and run the receive loop until stopped or failed. The
    /// bus is dropped exactly once before this returns.
    pub fn run<B, F>(mut self, open: F)
    where
        B: CanBus,
        F: FnOnce() -> Result<B, Error>,
    {
        let mut bus = match open() {
            Ok(bus) => bus,
            Err(err) => {
                error!("can open error: {}", err);
                self.fail();
                return;
            }
        };

        self.bus_open.store(true, Ordering::Release);
        self.set_state(ConnectionState::Connected);
        info!("can bus connected");

        let result = self.receive_loop(&mut bus);

        self.bus_open.store(false, Ordering::Release);
        drop(bus);
        debug!("can bus released");

        match result {
            Ok(()) => self.set_state(ConnectionState::Disconnected),
            Err(err) => {
                error!("can receive error: {}", err);
                self.fail();
            }
        }
    }

    fn receive_loop<B: CanBus>(&mut self, bus: &mut B) -> Result<(), Error> {
        while !self.stop.load(Ordering::Acquire) {
            if self.events.is_disconnected() {
                debug!("event consumer gone, leaving receive loop");
                break;
            }

            self.drain_requests(bus);

            match bus.recv(self.settings.poll_timeout)? {
                Some(packet) => self.on_frame(packet),
                None => self.on_timeout(),
            }
        }

        Ok(())
    }

    fn drain_requests<B: CanBus>(&mut self, bus: &mut B) {
        while let Ok(Some(request)) = self.requests.try_recv() {
            let result = transmit(bus, &request.packet);
            let _ = request.reply.send(result);
        }
    }

    fn on_frame(&mut self, packet: Packet) {
        self.last_received = Some(self.clock.now());
        if self.state != ConnectionState::Active {
            self.set_state(ConnectionState::Active);
        }

        match self.settings.ids.classify(packet.id) {
            FrameClass::Target => match decode_target(packet.payload()) {
                Ok(target) => self.emit(Event::NewTarget(target)),
                Err(err) => trace!("target frame dropped: {}", err),
            },
            FrameClass::Status => match decode_status(packet.payload()) {
                Ok(status) => self.emit(Event::RadarStatusUpdated(status)),
                Err(err) => trace!("status frame dropped: {}", err),
            },
            FrameClass::Unrecognized => (),
        }

        self.emit(Event::RawFrameObserved {
            id: packet.id,
            data: packet.payload().to_vec(),
            timestamp: Utc::now(),
        });
    }

    fn on_timeout(&mut self) {
        if matches!(
            self.state,
            ConnectionState::Active | ConnectionState::Connected
        ) {
            self.set_state(ConnectionState::Inactive);
        }

        self.check_timer += 1;
        if self.check_timer >= self.settings.check_cycles {
            self.check_timer = 0;
            let silent = match self.last_received {
                None => true,
                Some(last) => {
                    self.clock.now().saturating_duration_since(last) > self.settings.no_data_window
                }
            };
            if silent {
                warn!("no can data received");
                self.emit(Event::NoDataWarning);
            }
        }
    }

    fn fail(&mut self) {
        self.set_state(ConnectionState::Error);
        self.emit(Event::NoDataWarning);
    }

    fn set_state(&mut self, next: ConnectionState) {
        if !self.state.can_transition(next) {
            warn!("ignoring connection transition {} -> {}", self.state, next);
            return;
        }
        debug!("connection {} -> {}", self.state, next);
        self.state = next;
        self.emit(Event::StatusChanged(next));
    }

    fn emit(&self, event: Event) {
        if self.events.send(event).is_err() {
            trace!("event dropped, consumer gone");
        }
    }
}

fn transmit<B: CanBus>(bus: &mut B, packet: &Packet) -> Result<(), Error> {
    match bus.send(packet) {
        Ok(()) => {
            debug!("sent config {}", describe(packet));
            Ok(())
        }
        Err(err) => {
            error!("send config {} failed: {}", describe(packet), err);
            Err(err)
        }
    }
}
