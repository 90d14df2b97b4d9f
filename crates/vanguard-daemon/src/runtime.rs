//! Mirror runtime.
//!
//! The HID handle and the mirror loop live on a dedicated thread. The async
//! side talks to it through a command channel and receives a snapshot every
//! time the mirror state changes.

use std::sync::Arc;
use std::sync::mpsc::{self as std_mpsc, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace};
use vanguard_core::{ColorSource, MirrorLoop, MirrorSnapshot, MirrorTarget, SourceId, SourceRegistry};
use vanguard_hid::{DeviceLink, HidApiBackend, LinkSettings};

/// Request for the mirror thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeCommand {
    SetEnabled(bool),
    SelectSource(Option<SourceId>),
    Shutdown,
}

/// A command plus an optional channel for the state after it was applied.
struct Envelope {
    command: RuntimeCommand,
    applied: Option<oneshot::Sender<MirrorSnapshot>>,
}

/// Startup parameters for the mirror thread.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub link: LinkSettings,
    pub tick_interval: Duration,
    pub enabled: bool,
    pub source: Option<SourceId>,
}

/// Handle to the mirror thread for the async world.
pub struct MirrorRuntime {
    command_tx: std_mpsc::Sender<Envelope>,
    thread: Option<JoinHandle<()>>,
}

impl MirrorRuntime {
    /// Spawn the mirror thread.
    ///
    /// Returns once the HID backend is initialised, together with the
    /// receiver for state snapshots.
    pub fn spawn(
        settings: RuntimeSettings,
        registry: Arc<SourceRegistry>,
    ) -> Result<(Self, mpsc::Receiver<MirrorSnapshot>)> {
        let (snapshot_tx, snapshot_rx) = mpsc::channel(64);
        let (command_tx, command_rx) = std_mpsc::channel();
        let (ready_tx, ready_rx) = std_mpsc::channel();

        let thread = std::thread::Builder::new()
            .name("mirror-runtime".to_string())
            .spawn(move || {
                let backend = match HidApiBackend::new() {
                    Ok(backend) => backend,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                let link = DeviceLink::with_settings(backend, settings.link);
                let mut mirror = MirrorLoop::new(registry, link);
                mirror.set_selected_source(settings.source);
                mirror.set_enabled(settings.enabled);

                run_mirror_loop(&mut mirror, settings.tick_interval, &command_rx, &snapshot_tx);
            })
            .context("Failed to spawn mirror runtime thread")?;

        ready_rx
            .recv()
            .context("Mirror runtime exited during startup")?
            .context("Failed to initialise HID backend")?;

        info!("Mirror runtime started");
        Ok((Self { command_tx, thread: Some(thread) }, snapshot_rx))
    }

    /// Forward a command to the mirror thread.
    ///
    /// The returned receiver yields the mirror state right after the thread
    /// applied the command.
    pub fn apply(&self, command: RuntimeCommand) -> Result<oneshot::Receiver<MirrorSnapshot>> {
        let (applied, applied_rx) = oneshot::channel();
        self.command_tx
            .send(Envelope { command, applied: Some(applied) })
            .map_err(|_| anyhow!("Mirror runtime is not running"))?;
        Ok(applied_rx)
    }

    /// Stop the thread and wait for it to release the keyboard.
    pub fn shutdown(mut self) {
        let _ = self.command_tx.send(Envelope { command: RuntimeCommand::Shutdown, applied: None });
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            error!("Mirror runtime panicked");
        }
        info!("Mirror runtime stopped");
    }
}

/// Drive the mirror until told to stop.
///
/// Commands are applied as soon as they arrive; ticks fire on a fixed
/// schedule. A tick that overruns its slot (pacing alone takes ~480 ms)
/// pushes the schedule back instead of queueing catch-up ticks.
fn run_mirror_loop<S, T>(
    mirror: &mut MirrorLoop<S, T>,
    tick_interval: Duration,
    commands: &std_mpsc::Receiver<Envelope>,
    snapshots: &mpsc::Sender<MirrorSnapshot>,
) where
    S: ColorSource,
    T: MirrorTarget,
{
    let mut published = mirror.snapshot();
    let _ = snapshots.blocking_send(published.clone());

    let mut next_tick = Instant::now();
    loop {
        let timeout = next_tick.saturating_duration_since(Instant::now());
        let mut applied = None;
        match commands.recv_timeout(timeout) {
            Ok(envelope) => {
                match envelope.command {
                    RuntimeCommand::SetEnabled(enabled) => mirror.set_enabled(enabled),
                    RuntimeCommand::SelectSource(source) => mirror.set_selected_source(source),
                    RuntimeCommand::Shutdown => {
                        debug!("Mirror runtime shutdown requested");
                        break;
                    }
                }
                applied = envelope.applied;
            }
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Command channel closed");
                break;
            }
            Err(RecvTimeoutError::Timeout) => {
                let outcome = mirror.on_tick();
                trace!(?outcome, "Tick");

                next_tick += tick_interval;
                let now = Instant::now();
                if next_tick < now {
                    next_tick = now + tick_interval;
                }
            }
        }

        let snapshot = mirror.snapshot();
        if let Some(applied) = applied {
            let _ = applied.send(snapshot.clone());
        }
        if snapshot != published {
            let _ = snapshots.blocking_send(snapshot.clone());
            published = snapshot;
        }
    }

    mirror.shutdown();
    let _ = snapshots.blocking_send(mirror.snapshot());
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use vanguard_core::{Color, MirrorStatus};

    use super::*;

    #[derive(Default)]
    struct Recorder {
        open: bool,
        sent: Vec<Color>,
    }

    /// Target whose activity outlives the mirror thread.
    #[derive(Clone, Default)]
    struct SharedTarget(Arc<Mutex<Recorder>>);

    impl MirrorTarget for SharedTarget {
        type Error = String;

        fn is_open(&self) -> bool {
            self.0.lock().unwrap().open
        }

        fn open(&mut self) -> Result<(), String> {
            self.0.lock().unwrap().open = true;
            Ok(())
        }

        fn close(&mut self) {
            self.0.lock().unwrap().open = false;
        }

        fn set_global_color(&mut self, color: Color) -> Result<(), String> {
            self.0.lock().unwrap().sent.push(color);
            Ok(())
        }
    }

    struct Harness {
        registry: Arc<SourceRegistry>,
        target: SharedTarget,
        commands: std_mpsc::Sender<Envelope>,
        snapshots: mpsc::Receiver<MirrorSnapshot>,
        thread: JoinHandle<()>,
    }

    fn start(tick_interval: Duration) -> Harness {
        let registry = Arc::new(SourceRegistry::new());
        let target = SharedTarget::default();
        let (commands, command_rx) = std_mpsc::channel();
        let (snapshot_tx, snapshots) = mpsc::channel(64);

        let thread = {
            let registry = Arc::clone(&registry);
            let target = target.clone();
            std::thread::spawn(move || {
                let mut mirror = MirrorLoop::new(registry, target);
                run_mirror_loop(&mut mirror, tick_interval, &command_rx, &snapshot_tx);
            })
        };

        Harness { registry, target, commands, snapshots, thread }
    }

    impl Harness {
        fn send(&self, command: RuntimeCommand) {
            self.commands.send(Envelope { command, applied: None }).unwrap();
        }

        fn apply(&self, command: RuntimeCommand) -> MirrorSnapshot {
            let (applied, applied_rx) = oneshot::channel();
            self.commands.send(Envelope { command, applied: Some(applied) }).unwrap();
            applied_rx.blocking_recv().unwrap()
        }
    }

    /// Block until a snapshot matches.
    fn wait_for(
        snapshots: &mut mpsc::Receiver<MirrorSnapshot>,
        pred: impl Fn(&MirrorSnapshot) -> bool,
    ) -> MirrorSnapshot {
        loop {
            let snapshot = snapshots.blocking_recv().expect("runtime stopped");
            if pred(&snapshot) {
                return snapshot;
            }
        }
    }

    #[test]
    fn test_publishes_initial_snapshot() {
        let mut h = start(Duration::from_millis(5));

        let first = h.snapshots.blocking_recv().unwrap();
        assert_eq!(first.status, MirrorStatus::Loaded);
        assert!(!first.enabled);

        h.send(RuntimeCommand::Shutdown);
        h.thread.join().unwrap();
    }

    #[test]
    fn test_mirrors_registry_color() {
        let mut h = start(Duration::from_millis(5));
        let red = Color::rgb(255, 0, 0);
        h.registry.upsert(SourceId(0), "GPU", vec![red]).unwrap();

        h.send(RuntimeCommand::SelectSource(Some(SourceId(0))));
        h.send(RuntimeCommand::SetEnabled(true));

        let snapshot = wait_for(&mut h.snapshots, |s| s.last_color.is_some());
        assert_eq!(snapshot.last_color, Some(red));
        assert_eq!(snapshot.status, MirrorStatus::Mirroring(SourceId(0)));
        assert!(snapshot.link_open);

        h.send(RuntimeCommand::Shutdown);
        let last = wait_for(&mut h.snapshots, |s| s.status == MirrorStatus::Idle);
        assert!(!last.link_open);
        h.thread.join().unwrap();

        let recorder = h.target.0.lock().unwrap();
        assert_eq!(recorder.sent, [red]);
        assert!(!recorder.open);
    }

    #[test]
    fn test_disable_stops_device_activity() {
        let mut h = start(Duration::from_millis(5));
        h.registry.upsert(SourceId(0), "GPU", vec![Color::rgb(0, 0, 255)]).unwrap();
        h.send(RuntimeCommand::SelectSource(Some(SourceId(0))));
        h.send(RuntimeCommand::SetEnabled(true));
        wait_for(&mut h.snapshots, |s| s.last_color.is_some());

        h.send(RuntimeCommand::SetEnabled(false));
        wait_for(&mut h.snapshots, |s| s.status == MirrorStatus::Disabled);

        h.registry.upsert(SourceId(0), "GPU", vec![Color::rgb(0, 255, 0)]).unwrap();
        std::thread::sleep(Duration::from_millis(30));

        h.send(RuntimeCommand::Shutdown);
        h.thread.join().unwrap();
        assert_eq!(h.target.0.lock().unwrap().sent, [Color::rgb(0, 0, 255)]);
    }

    #[test]
    fn test_apply_returns_state_after_command() {
        let h = start(Duration::from_secs(60));

        let selected = h.apply(RuntimeCommand::SelectSource(Some(SourceId(2))));
        assert_eq!(selected.selected_source, Some(SourceId(2)));
        assert_eq!(selected.status, MirrorStatus::Mirroring(SourceId(2)));
        assert!(!selected.enabled);

        let enabled = h.apply(RuntimeCommand::SetEnabled(true));
        assert!(enabled.enabled);
        assert_eq!(enabled.status, MirrorStatus::Enabled);

        let disabled = h.apply(RuntimeCommand::SetEnabled(false));
        assert_eq!(disabled.status, MirrorStatus::Disabled);
        assert!(!disabled.link_open);

        h.send(RuntimeCommand::Shutdown);
        h.thread.join().unwrap();
    }

    #[test]
    fn test_stops_when_handle_dropped() {
        let h = start(Duration::from_millis(5));
        drop(h.commands);
        h.thread.join().unwrap();
    }
}
