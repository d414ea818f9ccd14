//! Session coordination
//!
//! Owns the process-wide shutdown flag and shared counters, starts input
//! capture, and supervises the command and telemetry loops. Each loop opens
//! its own channel and fails independently; the session only ends when the
//! user quits or an interrupt arrives.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::{watch, Notify};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::command::{command_loop, WsCommandSink};
use crate::config::Config;
use crate::error::TeleopError;
use crate::input::spawn_input_capture;
use crate::telemetry::{telemetry_loop, WsTelemetrySource};
use crate::velocity::Velocity;

/// How long to wait for the input worker after the loops have exited
const INPUT_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Process-wide one-way stop flag.
///
/// Transitions false to true exactly once; waiters are woken and polls
/// stay true forever after.
#[derive(Clone, Default)]
pub struct ShutdownFlag {
    inner: Arc<ShutdownInner>,
}

#[derive(Default)]
struct ShutdownInner {
    requested: AtomicBool,
    notify: Notify,
}

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Safe to call from any thread, any number of times.
    pub fn request(&self) {
        if !self.inner.requested.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_requested(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    /// Resolve once shutdown has been requested
    pub async fn requested(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_requested() {
                return;
            }
            notified.await;
        }
    }
}

/// Shared send/receive counters for the status line
#[derive(Clone, Default)]
pub struct SessionCounters {
    inner: Arc<CounterInner>,
}

#[derive(Default)]
struct CounterInner {
    commands_sent: AtomicU64,
    frames_received: AtomicU64,
}

impl SessionCounters {
    /// Bump the sent-command counter, returning the new total
    pub fn record_command(&self) -> u64 {
        self.inner.commands_sent.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Bump the received-frame counter, returning the new total
    pub fn record_frame(&self) -> u64 {
        self.inner.frames_received.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn commands_sent(&self) -> u64 {
        self.inner.commands_sent.load(Ordering::Relaxed)
    }

    pub fn frames_received(&self) -> u64 {
        self.inner.frames_received.load(Ordering::Relaxed)
    }
}

/// Lifecycle of one channel, tracked independently per loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Connecting,
    Active,
    Stopping,
    Terminated,
}

fn transition(tag: &str, state: &mut ChannelState, next: ChannelState) {
    log::debug!("[{}] {:?} -> {:?}", tag, *state, next);
    *state = next;
}

/// Single-session teleop controller. No reconnect, no restart: once the
/// session terminates the process is done.
pub struct Session {
    config: Config,
}

impl Session {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the session to completion: Idle -> Running -> Terminated.
    pub async fn run(&self) -> Result<(), TeleopError> {
        self.print_banner();

        let shutdown = ShutdownFlag::new();
        let counters = SessionCounters::default();

        let (velocity_rx, input_handle) = spawn_input_capture(shutdown.clone());
        log::info!("session running");

        // Ctrl-C outside raw mode (or before capture starts) is equivalent
        // to the quit key.
        let interrupt_shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("interrupt received, stopping session");
                interrupt_shutdown.request();
            }
        });

        let command_task = tokio::spawn(run_command_channel(
            self.config.clone(),
            velocity_rx,
            shutdown.clone(),
            counters.clone(),
        ));
        let telemetry_task = tokio::spawn(run_telemetry_channel(
            self.config.clone(),
            shutdown.clone(),
            counters.clone(),
        ));

        let (command_join, telemetry_join) = tokio::join!(command_task, telemetry_task);
        if let Err(e) = command_join {
            log::error!("[CMD] task panicked: {}", e);
        }
        if let Err(e) = telemetry_join {
            log::error!("[VID] task panicked: {}", e);
        }

        // Both loops are done; make sure the input worker lets go of the
        // terminal, bounded in case it is wedged.
        shutdown.request();
        if tokio::time::timeout(INPUT_JOIN_TIMEOUT, input_handle)
            .await
            .is_err()
        {
            log::warn!("[KEY] input worker did not exit in time");
        }

        log::info!("session terminated");
        println!(
            "\n\nDisconnected. Sent {} commands, received {} frames. Goodbye!",
            counters.commands_sent(),
            counters.frames_received()
        );
        Ok(())
    }

    fn print_banner(&self) {
        let rule = "=".repeat(55);
        println!("{}", rule);
        println!("  OpenMind Teleops - Robot Remote Controller");
        println!("{}", rule);
        println!("  API Key: {}", self.config.api_key_preview());
        println!("  Controls: W=Forward S=Back A=Left D=Right Q=Quit");
        println!("{}", rule);
    }
}

/// Open the command channel and drive the dispatch loop on it. Any error
/// here stays local: the telemetry channel keeps running.
async fn run_command_channel(
    config: Config,
    velocity_rx: watch::Receiver<Velocity>,
    shutdown: ShutdownFlag,
    counters: SessionCounters,
) {
    let mut state = ChannelState::Idle;
    transition("CMD", &mut state, ChannelState::Connecting);
    log::info!("[CMD] connecting to command channel...");

    let stream = match connect(&config.command_url(), config.connect_timeout).await {
        Ok(stream) => stream,
        Err(e) => {
            log::error!("[CMD] {}", e);
            transition("CMD", &mut state, ChannelState::Terminated);
            return;
        }
    };
    transition("CMD", &mut state, ChannelState::Active);
    log::info!("[CMD] connected, use W/A/S/D to control, Q to quit");

    // The command channel is write-only; the read half is dropped.
    let (write, _read) = stream.split();
    let result = command_loop(
        WsCommandSink::new(write),
        velocity_rx,
        config.command_period,
        shutdown,
        counters,
    )
    .await;

    transition("CMD", &mut state, ChannelState::Stopping);
    match result {
        Ok(()) => log::info!("[CMD] dispatch loop stopped"),
        Err(e) => log::error!("[CMD] channel error: {}", e),
    }
    transition("CMD", &mut state, ChannelState::Terminated);
}

/// Open the video channel and drive the ingest loop on it. Independent of
/// the command channel in both lifetime and failure.
async fn run_telemetry_channel(config: Config, shutdown: ShutdownFlag, counters: SessionCounters) {
    let mut state = ChannelState::Idle;
    transition("VID", &mut state, ChannelState::Connecting);
    log::info!("[VID] connecting to video stream...");

    let stream = match connect(&config.video_url(), config.connect_timeout).await {
        Ok(stream) => stream,
        Err(e) => {
            log::error!("[VID] {}", e);
            transition("VID", &mut state, ChannelState::Terminated);
            return;
        }
    };
    transition("VID", &mut state, ChannelState::Active);
    log::info!("[VID] video stream connected");

    let (_write, read) = stream.split();
    let result = telemetry_loop(
        WsTelemetrySource::new(read),
        config.recv_timeout,
        shutdown,
        counters,
    )
    .await;

    transition("VID", &mut state, ChannelState::Stopping);
    match result {
        Ok(()) => log::info!("[VID] ingest loop stopped"),
        Err(e) => log::error!("[VID] channel error: {}", e),
    }
    transition("VID", &mut state, ChannelState::Terminated);
}

/// Websocket handshake with a bounded wait. The credential travels in the
/// URL query string, so errors report only the path part.
async fn connect(
    url: &str,
    connect_timeout: Duration,
) -> Result<WebSocketStream<MaybeTlsStream<TcpStream>>, TeleopError> {
    let display_url = url.split('?').next().unwrap_or(url).to_string();
    match tokio::time::timeout(connect_timeout, connect_async(url)).await {
        Ok(Ok((stream, _response))) => Ok(stream),
        Ok(Err(e)) => Err(TeleopError::Connect {
            url: display_url,
            reason: e.to_string(),
        }),
        Err(_) => Err(TeleopError::Connect {
            url: display_url,
            reason: format!("handshake timed out after {:?}", connect_timeout),
        }),
    }
}
