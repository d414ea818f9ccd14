//! Command dispatcher loop
//!
//! Republishes the latest commanded velocity over the command channel at a
//! fixed 10 Hz cadence. Publishing is unconditional per tick, not
//! edge-triggered, so a single dropped message can never leave the robot
//! stuck on a stale motion command.

use std::io::{self, Write as _};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::TeleopError;
use crate::session::{SessionCounters, ShutdownFlag};
use crate::velocity::Velocity;

/// Outbound transport for serialized velocity commands.
///
/// The production implementation wraps the websocket write half; tests
/// substitute in-memory sinks.
pub trait CommandSink {
    fn send(
        &mut self,
        payload: String,
    ) -> impl std::future::Future<Output = Result<(), TeleopError>> + Send;
}

/// Write half of the command-channel websocket
pub struct WsCommandSink {
    inner: SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>,
}

impl WsCommandSink {
    pub fn new(inner: SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>) -> Self {
        Self { inner }
    }
}

impl CommandSink for WsCommandSink {
    async fn send(&mut self, payload: String) -> Result<(), TeleopError> {
        self.inner
            .send(Message::Text(payload))
            .await
            .map_err(TeleopError::from)
    }
}

/// Run the dispatch loop until shutdown is requested or the sink fails.
///
/// Every tick stamps the most recently published velocity with the current
/// wall-clock time and fires it at the sink. A send error terminates only
/// this loop; the caller reports it.
pub async fn command_loop<S: CommandSink>(
    mut sink: S,
    velocity_rx: watch::Receiver<Velocity>,
    period: Duration,
    shutdown: ShutdownFlag,
    counters: SessionCounters,
) -> Result<(), TeleopError> {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.requested() => break,
            _ = ticker.tick() => {
                let velocity = *velocity_rx.borrow();
                let command = velocity.stamp(unix_now());
                let payload = serde_json::to_string(&command)?;
                sink.send(payload).await?;
                let sent = counters.record_command();
                print_status(&velocity, sent, counters.frames_received());
            }
        }
    }
    Ok(())
}

/// Current wall-clock time as unix seconds
fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Rewrite the single status line in place
fn print_status(velocity: &Velocity, commands: u64, frames: u64) {
    print!(
        "\r[TELEOPS] {} | vx={:.1} vyaw={:.1} | cmds={} frames={}   ",
        velocity.direction_label(),
        velocity.vx,
        velocity.vyaw,
        commands,
        frames
    );
    let _ = io::stdout().flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    /// Records every send together with the (paused) time it happened
    #[derive(Clone, Default)]
    struct RecordingSink {
        sent: Arc<Mutex<Vec<(Instant, String)>>>,
    }

    impl RecordingSink {
        fn sent(&self) -> Vec<(Instant, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl CommandSink for RecordingSink {
        async fn send(&mut self, payload: String) -> Result<(), TeleopError> {
            self.sent.lock().unwrap().push((Instant::now(), payload));
            Ok(())
        }
    }

    /// Fails every send after the first `ok_sends`
    struct FailingSink {
        ok_sends: usize,
    }

    impl CommandSink for FailingSink {
        async fn send(&mut self, _payload: String) -> Result<(), TeleopError> {
            if self.ok_sends == 0 {
                return Err(TeleopError::ChannelClosed);
            }
            self.ok_sends -= 1;
            Ok(())
        }
    }

    const PERIOD: Duration = Duration::from_millis(100);

    #[tokio::test(start_paused = true)]
    async fn test_one_send_per_tick() {
        let (_velocity_tx, velocity_rx) = watch::channel(Velocity::default());
        let shutdown = ShutdownFlag::new();
        let counters = SessionCounters::default();
        let sink = RecordingSink::default();

        let task = tokio::spawn(command_loop(
            sink.clone(),
            velocity_rx,
            PERIOD,
            shutdown.clone(),
            counters.clone(),
        ));

        // First send fires immediately, then one per period.
        tokio::time::sleep(Duration::from_millis(1050)).await;
        shutdown.request();
        task.await.unwrap().unwrap();

        let sent = sink.sent();
        assert_eq!(sent.len(), 11);
        assert_eq!(counters.commands_sent(), 11);

        // Exactly one period apart under the paused clock
        for pair in sent.windows(2) {
            assert_eq!(pair[1].0 - pair[0].0, PERIOD);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timestamps_non_decreasing_and_wire_fields() {
        let (velocity_tx, velocity_rx) = watch::channel(Velocity::default());
        let shutdown = ShutdownFlag::new();
        let sink = RecordingSink::default();

        velocity_tx
            .send(Velocity { vx: 0.5, vy: 0.0, vyaw: -0.5 })
            .unwrap();

        let task = tokio::spawn(command_loop(
            sink.clone(),
            velocity_rx,
            PERIOD,
            shutdown.clone(),
            SessionCounters::default(),
        ));

        tokio::time::sleep(Duration::from_millis(450)).await;
        shutdown.request();
        task.await.unwrap().unwrap();

        let mut last_timestamp = f64::NEG_INFINITY;
        for (_, payload) in sink.sent() {
            let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
            assert_eq!(value["vx"], 0.5);
            assert_eq!(value["vy"], 0.0);
            assert_eq!(value["vyaw"], -0.5);
            let timestamp = value["timestamp"].as_f64().unwrap();
            assert!(timestamp >= last_timestamp);
            last_timestamp = timestamp;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sends_latest_velocity_not_queued() {
        let (velocity_tx, velocity_rx) = watch::channel(Velocity::default());
        let shutdown = ShutdownFlag::new();
        let sink = RecordingSink::default();

        let task = tokio::spawn(command_loop(
            sink.clone(),
            velocity_rx,
            PERIOD,
            shutdown.clone(),
            SessionCounters::default(),
        ));
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Several updates between ticks; only the last must go out.
        for vx in [0.5, -0.5, 0.0, 0.5] {
            velocity_tx.send(Velocity { vx, vy: 0.0, vyaw: 0.0 }).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.request();
        task.await.unwrap().unwrap();

        let (_, last_payload) = sink.sent().last().cloned().unwrap();
        let value: serde_json::Value = serde_json::from_str(&last_payload).unwrap();
        assert_eq!(value["vx"], 0.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_failure_ends_loop() {
        let (_velocity_tx, velocity_rx) = watch::channel(Velocity::default());
        let shutdown = ShutdownFlag::new();
        let counters = SessionCounters::default();

        let result = command_loop(
            FailingSink { ok_sends: 2 },
            velocity_rx,
            PERIOD,
            shutdown,
            counters.clone(),
        )
        .await;

        assert!(matches!(result, Err(TeleopError::ChannelClosed)));
        assert_eq!(counters.commands_sent(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_observed_within_one_tick() {
        let (_velocity_tx, velocity_rx) = watch::channel(Velocity::default());
        let shutdown = ShutdownFlag::new();
        let sink = RecordingSink::default();

        let task = tokio::spawn(command_loop(
            sink,
            velocity_rx,
            PERIOD,
            shutdown.clone(),
            SessionCounters::default(),
        ));
        tokio::time::sleep(Duration::from_millis(10)).await;

        shutdown.request();
        let result = tokio::time::timeout(PERIOD, task).await;
        assert!(result.is_ok(), "loop did not exit within one tick");
    }
}
