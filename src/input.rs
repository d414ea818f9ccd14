//! Keyboard input capture
//!
//! Runs crossterm raw-mode capture on a blocking worker. The worker owns
//! the pressed-key set exclusively and publishes derived velocity snapshots
//! through a watch channel; no other component can touch key state.
//!
//! Key release events require the kitty keyboard enhancement protocol; on
//! terminals that support it the flags are pushed for the session. Without
//! release reporting a held key keeps its last commanded velocity until a
//! counter-key or quit, which is why `q` always stops everything.

use std::io;
use std::time::Duration;

use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, supports_keyboard_enhancement};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::session::ShutdownFlag;
use crate::velocity::{ControlKey, KeyState, Velocity};

/// How often the capture worker wakes to check for shutdown
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Start key capture on a blocking worker.
///
/// Returns the velocity snapshot receiver and the worker handle. The worker
/// exits when the quit key is seen (after requesting shutdown) or when
/// shutdown is requested elsewhere, and always restores the terminal.
pub fn spawn_input_capture(
    shutdown: ShutdownFlag,
) -> (watch::Receiver<Velocity>, JoinHandle<()>) {
    let (velocity_tx, velocity_rx) = watch::channel(Velocity::default());
    let handle = tokio::task::spawn_blocking(move || {
        if let Err(e) = capture_loop(&velocity_tx, &shutdown) {
            log::error!("[KEY] input capture failed: {}", e);
            shutdown.request();
        }
    });
    (velocity_rx, handle)
}

/// Restores the terminal even if the capture loop errors out
struct RawModeGuard {
    enhanced: bool,
}

impl RawModeGuard {
    fn enable() -> io::Result<Self> {
        enable_raw_mode()?;
        let enhanced = matches!(supports_keyboard_enhancement(), Ok(true));
        if enhanced {
            execute!(
                io::stdout(),
                PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
            )?;
        } else {
            log::warn!("[KEY] terminal does not report key releases; Q stops the robot");
        }
        Ok(Self { enhanced })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.enhanced {
            let _ = execute!(io::stdout(), PopKeyboardEnhancementFlags);
        }
        let _ = disable_raw_mode();
    }
}

fn capture_loop(velocity_tx: &watch::Sender<Velocity>, shutdown: &ShutdownFlag) -> io::Result<()> {
    let _guard = RawModeGuard::enable()?;
    let mut keys = KeyState::default();

    while !shutdown.is_requested() {
        if !event::poll(POLL_INTERVAL)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if is_quit(&key) {
            log::info!("[KEY] quit requested");
            shutdown.request();
            break;
        }
        let Some(control) = map_key(key.code) else {
            continue;
        };
        match key.kind {
            KeyEventKind::Press => keys.press(control),
            KeyEventKind::Release => keys.release(control),
            KeyEventKind::Repeat => continue,
        }
        // Receivers may already be gone during shutdown
        let _ = velocity_tx.send(keys.velocity());
    }
    Ok(())
}

/// `q`, Esc, or Ctrl-C (raw mode swallows the SIGINT) all quit
fn is_quit(key: &KeyEvent) -> bool {
    if key.kind != KeyEventKind::Press {
        return false;
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => true,
        KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

/// W/S/A/D plus the arrow keys
fn map_key(code: KeyCode) -> Option<ControlKey> {
    match code {
        KeyCode::Char('w') | KeyCode::Char('W') | KeyCode::Up => Some(ControlKey::Forward),
        KeyCode::Char('s') | KeyCode::Char('S') | KeyCode::Down => Some(ControlKey::Backward),
        KeyCode::Char('a') | KeyCode::Char('A') | KeyCode::Left => Some(ControlKey::TurnLeft),
        KeyCode::Char('d') | KeyCode::Char('D') | KeyCode::Right => Some(ControlKey::TurnRight),
        _ => None,
    }
}
