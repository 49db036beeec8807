//! Notice channel task.
//!
//! [`NoticeChannel::spawn`] starts a single tokio task that owns the
//! [`ChannelMachine`], the active transport task and the retry timer. Every
//! input (session change, operator command, transport event, timer) is fed
//! through [`ChannelMachine::step`] and the returned effects are executed
//! here, in order.

// Rust guideline compliant 2026-02

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::machine::{ChannelEvent, ChannelMachine, Effect, RetryPolicy};
use super::transport::{Closure, Transport, TransportEvent, TransportEvents};
use super::ChannelStatus;
use crate::state::{SharedAppState, Toast};

/// Operator commands accepted by the channel task.
#[derive(Debug)]
enum Command {
    Connect,
}

/// Handle to a running notice channel.
///
/// Dropping the handle stops the task and tears down the connection.
#[derive(Debug)]
pub struct NoticeChannelHandle {
    command_tx: mpsc::UnboundedSender<Command>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    status_rx: watch::Receiver<ChannelStatus>,
    join: Option<JoinHandle<()>>,
}

impl NoticeChannelHandle {
    /// Ask the channel to connect.
    ///
    /// Ignored unless the session is admin-authenticated and the channel is
    /// closed.
    pub fn connect(&self) {
        let _ = self.command_tx.send(Command::Connect);
    }

    /// Current connection status.
    #[must_use]
    pub fn status(&self) -> ChannelStatus {
        *self.status_rx.borrow()
    }

    /// Watch the connection status.
    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<ChannelStatus> {
        self.status_rx.clone()
    }

    /// Stop the task and wait for it to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                log::warn!("[NoticeChannel] Task ended abnormally: {e}");
            }
        }
    }
}

impl Drop for NoticeChannelHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// State owned by the channel task.
pub struct NoticeChannel {
    url: String,
    state: SharedAppState,
    transport: Arc<dyn Transport>,
    machine: ChannelMachine,
    /// Bumped on every open and force-close; events from older attempts are
    /// dropped.
    generation: u64,
    active: Option<JoinHandle<Closure>>,
    retry_at: Option<Instant>,
    event_tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
    status_tx: watch::Sender<ChannelStatus>,
}

impl std::fmt::Debug for NoticeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoticeChannel")
            .field("url", &self.url)
            .field("machine", &self.machine)
            .field("generation", &self.generation)
            .field("retry_at", &self.retry_at)
            .finish_non_exhaustive()
    }
}

impl NoticeChannel {
    /// Spawn the channel task.
    ///
    /// The channel opens right away if the session is already
    /// admin-authenticated, and from then on follows the session store.
    pub fn spawn(
        url: impl Into<String>,
        policy: RetryPolicy,
        state: SharedAppState,
        transport: Arc<dyn Transport>,
    ) -> NoticeChannelHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ChannelStatus::Closed);

        let channel = Self {
            url: url.into(),
            state,
            transport,
            machine: ChannelMachine::new(policy, false),
            generation: 0,
            active: None,
            retry_at: None,
            event_tx,
            status_tx,
        };

        let join = tokio::spawn(channel.run(command_rx, event_rx, shutdown_rx));

        NoticeChannelHandle {
            command_tx,
            shutdown_tx: Some(shutdown_tx),
            status_rx,
            join: Some(join),
        }
    }

    async fn run(
        mut self,
        mut command_rx: mpsc::UnboundedReceiver<Command>,
        mut event_rx: mpsc::UnboundedReceiver<(u64, TransportEvent)>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        let mut session_rx = self.state.session.subscribe();
        let mut epoch = self.state.session.epoch();
        let admin = session_rx.borrow_and_update().is_admin_authenticated();

        log::info!("[NoticeChannel] Started for {}", self.url);
        self.state.notices.set_status(ChannelStatus::Closed);
        self.dispatch(&ChannelEvent::SessionChanged { admin });

        loop {
            let retry_at = self.retry_at;
            let retry = async move {
                match retry_at {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };
            let active = self.active.as_mut();
            let closed = async move {
                match active {
                    Some(handle) => handle.await,
                    None => std::future::pending().await,
                }
            };

            // Transport events are queued before their run task completes,
            // so polling them first keeps the final frames ahead of the close.
            tokio::select! {
                biased;

                _ = &mut shutdown_rx => {
                    log::info!("[NoticeChannel] Shutdown requested");
                    break;
                }

                Some((generation, event)) = event_rx.recv() => {
                    if generation == self.generation {
                        self.on_transport_event(event);
                    }
                }

                changed = session_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let admin = session_rx.borrow_and_update().is_admin_authenticated();
                    // A reset followed by a new login can coalesce into one
                    // change; the old session's socket must still go.
                    let current = self.state.session.epoch();
                    if current != epoch {
                        epoch = current;
                        self.dispatch(&ChannelEvent::SessionChanged { admin: false });
                    }
                    self.dispatch(&ChannelEvent::SessionChanged { admin });
                }

                Some(command) = command_rx.recv() => match command {
                    Command::Connect => self.dispatch(&ChannelEvent::ConnectRequested),
                },

                result = closed => {
                    self.active = None;
                    match result {
                        Ok(closure) => {
                            log::info!(
                                "[NoticeChannel] Closed with code {} {}",
                                closure.code,
                                closure.reason
                            );
                            self.dispatch(&ChannelEvent::Disconnected {
                                code: closure.code,
                                reason: closure.reason,
                            });
                        }
                        Err(e) if e.is_cancelled() => {}
                        Err(e) => {
                            log::error!("[NoticeChannel] Transport task failed: {e}");
                            let closure = Closure::abnormal();
                            self.dispatch(&ChannelEvent::Disconnected {
                                code: closure.code,
                                reason: closure.reason,
                            });
                        }
                    }
                }

                () = retry => {
                    self.retry_at = None;
                    self.dispatch(&ChannelEvent::RetryElapsed);
                }
            }
        }

        self.teardown();
    }

    fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => self.dispatch(&ChannelEvent::Connected),
            TransportEvent::Message(text) => self.dispatch(&ChannelEvent::Message(text)),
            TransportEvent::Error(e) => {
                log::warn!("[NoticeChannel] Transport error: {e}");
                self.dispatch(&ChannelEvent::TransportError(e));
            }
        }
    }

    fn dispatch(&mut self, event: &ChannelEvent) {
        let (machine, effects) = self.machine.step(event);
        self.machine = machine;
        for effect in effects {
            self.execute(effect);
        }
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::Open => {
                self.abort_active();
                self.generation += 1;
                log::info!("[NoticeChannel] Connecting to {}", self.url);

                let events = TransportEvents::new(self.generation, self.event_tx.clone());
                let transport = Arc::clone(&self.transport);
                let url = self.url.clone();
                self.active = Some(tokio::spawn(async move {
                    transport.run(&url, &events).await
                }));
            }
            Effect::ForceClose => {
                log::info!("[NoticeChannel] Force closing");
                self.abort_active();
                self.generation += 1;
            }
            Effect::ScheduleRetry(delay) => {
                log::debug!("[NoticeChannel] Retrying in {delay:?}");
                self.retry_at = Some(Instant::now() + delay);
            }
            Effect::CancelRetry => self.retry_at = None,
            Effect::SetAlert(alert) => self.state.alert.set(alert),
            Effect::ReconnectFailed { attempts } => {
                log::warn!(
                    "[NoticeChannel] Still unable to connect after {attempts} attempts"
                );
                self.state.toast.set(Toast::error(format!(
                    "Failed to connect web socket to \"{}\" after {} retries.",
                    self.url, attempts
                )));
            }
            Effect::PrependNotice(notice) => self.state.notices.prepend(notice),
            Effect::PublishStatus(status) => {
                log::debug!("[NoticeChannel] Status {status}");
                self.state.notices.set_status(status);
                self.status_tx.send_replace(status);
            }
            Effect::DiscardMessage { error } => {
                log::warn!("[NoticeChannel] Discarding malformed notice: {error}");
            }
        }
    }

    fn abort_active(&mut self) {
        if let Some(handle) = self.active.take() {
            handle.abort();
        }
    }

    fn teardown(&mut self) {
        self.abort_active();
        self.retry_at = None;
        if self.machine.status() != ChannelStatus::Closed {
            self.state.notices.set_status(ChannelStatus::Closed);
            self.status_tx.send_replace(ChannelStatus::Closed);
        }
    }
}
