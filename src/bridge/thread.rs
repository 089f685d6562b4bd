//! Dedicated render thread.
//!
//! The thread runs a current-thread tokio runtime whose only task is the
//! render loop: it serves bridge commands, services ready continuous
//! painters one at a time, and sleeps on the scheduler's wake event when
//! nothing is ready.

use crate::bridge::{RenderCommand, RenderHandle};
use crate::config::RenderConfig;
use crate::errors::RenderError;
use crate::events::RenderEvent;
use crate::render::backend::RenderDevice;
use crate::scheduler::Scheduler;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const THREAD_NAME: &str = "gosub-render";

pub struct RenderThread {
    handle: RenderHandle,
    cancel: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl RenderThread {
    pub fn spawn(config: &RenderConfig, device: Box<dyn RenderDevice>) -> Result<Self, RenderError> {
        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_capacity);
        let scheduler = Scheduler::new(config, device);
        let events = scheduler.event_sender();
        let cancel = CancellationToken::new();
        let frame_time = config.max_fps.map(|fps| Duration::from_secs_f64(1.0 / f64::from(fps)));

        let render_loop = RenderLoop {
            scheduler,
            cmd_rx,
            cancel: cancel.clone(),
        };
        let join = std::thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread().enable_time().build() {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        log::error!("render thread: failed to build runtime: {e}");
                        return;
                    }
                };
                runtime.block_on(render_loop.run(frame_time));
            })?;

        let handle = RenderHandle::threaded(cmd_tx, events, join.thread().id());
        Ok(Self {
            handle,
            cancel,
            join: Some(join),
        })
    }

    pub fn handle(&self) -> RenderHandle {
        self.handle.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RenderEvent> {
        self.handle.subscribe()
    }

    /// Shuts the scheduler down and waits for the thread to finish.
    pub fn shutdown(mut self) -> Result<(), RenderError> {
        let result = match self.handle.shutdown() {
            Err(RenderError::ChannelClosed) => Ok(()),
            other => other,
        };
        self.stop();
        result
    }

    fn stop(&mut self) {
        self.cancel.cancel();
        let Some(join) = self.join.take() else {
            return;
        };
        if join.thread().id() == std::thread::current().id() {
            return;
        }
        if join.join().is_err() {
            log::error!("render thread panicked");
        }
    }
}

impl Drop for RenderThread {
    fn drop(&mut self) {
        self.stop();
    }
}

struct RenderLoop {
    scheduler: Scheduler,
    cmd_rx: mpsc::Receiver<RenderCommand>,
    cancel: CancellationToken,
}

impl RenderLoop {
    async fn run(mut self, frame_time: Option<Duration>) {
        let wake = self.scheduler.wake_handle();
        let mut pacer: Option<Interval> = frame_time.map(|period| {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        self.scheduler.start();

        'run: loop {
            if self.cancel.is_cancelled() || !self.drain_commands() {
                break;
            }

            let ready = self.scheduler.collect_ready();
            if ready.is_empty() {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = wake.notified() => {}
                    cmd = self.cmd_rx.recv() => {
                        if !self.handle(cmd) {
                            break;
                        }
                    }
                }
                continue;
            }

            if let Some(pacer) = pacer.as_mut() {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = pacer.tick() => {}
                    cmd = self.cmd_rx.recv() => {
                        if !self.handle(cmd) {
                            break;
                        }
                        continue;
                    }
                }
            }

            for (id, painter) in ready {
                self.scheduler.service(id, &painter);
                tokio::task::yield_now().await;
                if !self.drain_commands() {
                    break 'run;
                }
            }
        }

        self.scheduler.shutdown();
    }

    /// Serves queued commands without waiting. Returns `false` once the
    /// scheduler is done.
    fn drain_commands(&mut self) -> bool {
        while let Ok(cmd) = self.cmd_rx.try_recv() {
            if !self.scheduler.execute(cmd) {
                return false;
            }
        }
        true
    }

    fn handle(&mut self, cmd: Option<RenderCommand>) -> bool {
        match cmd {
            Some(cmd) => self.scheduler.execute(cmd),
            // every handle is gone
            None => false,
        }
    }
}
