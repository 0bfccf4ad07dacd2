//! TCP socket server and host state.
//!
//! One accept loop; each connection gets a framed codec split into a read
//! loop and an mpsc-fed send task, so a slow peer never blocks routing.
//! All mutable host state lives in `HostState` behind one `RwLock`; inbound
//! messages are handled sequentially per connection while holding the write
//! guard, which serializes routing the same way a single-owner thread would.

use crate::connection::{ConnectionId, Peer};
use crate::error::Result;
use crate::frontend::FrontendHandle;
use crate::registry::ConnectionRegistry;
use crate::supervisor::ProcessSupervisor;
use crate::transcript::Transcript;
use crate::{presence, router};
use deck_core::{ContextRegistry, SettingsStore, now_millis};
use deck_rpc::protocol::events;
use deck_rpc::{EventCodec, EventMessage, parse_frame};
use deck_types::{FrontendEvent, HostSnapshot, PluginDescriptor};
use futures_util::{SinkExt, StreamExt};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

pub const DEFAULT_PORT: u16 = 9321;

/// Retained transcript entries
const TRANSCRIPT_CAPACITY: usize = 512;

/// Transcript entries exposed in a snapshot
const RECENT_LOG_LIMIT: usize = 100;

/// Quiet period after the last settings mutation before a save
const SETTINGS_SAVE_DEBOUNCE_MS: u64 = 1000;

const SETTINGS_SAVER_POLL: Duration = Duration::from_millis(500);
const SUPERVISOR_POLL: Duration = Duration::from_secs(1);

/// Host configuration.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Listen port; 0 picks an ephemeral port
    pub port: u16,
    pub settings_path: PathBuf,
    pub plugins: Vec<PluginDescriptor>,
    pub presence_interval: Duration,
    /// Spawn plugin executables at startup
    pub launch_plugins: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            settings_path: SettingsStore::default_path(),
            plugins: Vec::new(),
            presence_interval: Duration::from_secs(2),
            launch_plugins: true,
        }
    }
}

/// All mutable host state, behind one `Arc<RwLock<_>>`.
#[derive(Debug)]
pub struct HostState {
    pub plugins: Vec<PluginDescriptor>,
    pub contexts: ContextRegistry,
    pub settings: SettingsStore,
    pub connections: ConnectionRegistry,
    pub transcript: Transcript,
    pub supervisor: ProcessSupervisor,
    pub frontend_tx: UnboundedSender<FrontendEvent>,
    pub listen_port: u16,
    pub settings_path: PathBuf,
    pub shutdown: bool,
}

impl HostState {
    #[must_use]
    pub fn new(
        plugins: Vec<PluginDescriptor>,
        settings: SettingsStore,
        settings_path: PathBuf,
        frontend_tx: UnboundedSender<FrontendEvent>,
    ) -> Self {
        Self {
            plugins,
            contexts: ContextRegistry::new(),
            settings,
            connections: ConnectionRegistry::new(),
            transcript: Transcript::new(TRANSCRIPT_CAPACITY),
            supervisor: ProcessSupervisor::new(),
            frontend_tx,
            listen_port: 0,
            settings_path,
            shutdown: false,
        }
    }

    #[must_use]
    pub fn descriptor(&self, plugin_id: &str) -> Option<&PluginDescriptor> {
        self.plugins.iter().find(|d| d.id == plugin_id)
    }

    /// The plugin declaring the given action id, if any.
    #[must_use]
    pub fn descriptor_for_action(&self, action_id: &str) -> Option<&PluginDescriptor> {
        self.plugins.iter().find(|d| d.has_action(action_id))
    }

    #[must_use]
    pub fn snapshot(&self) -> HostSnapshot {
        HostSnapshot {
            listen_port: self.listen_port,
            plugins: self.plugins.clone(),
            contexts: self.contexts.snapshot(),
            recent_logs: self.transcript.recent(RECENT_LOG_LIMIT),
        }
    }
}

/// A started host: state handle, front-end interface and event channel.
pub struct HostHandle {
    state: Arc<RwLock<HostState>>,
    frontend: FrontendHandle,
    events: UnboundedReceiver<FrontendEvent>,
    port: u16,
    accept_task: JoinHandle<()>,
}

impl HostHandle {
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn frontend(&self) -> FrontendHandle {
        self.frontend.clone()
    }

    /// Next visual/settings push for the front-end.
    pub async fn next_event(&mut self) -> Option<FrontendEvent> {
        self.events.recv().await
    }

    #[must_use]
    pub fn state(&self) -> Arc<RwLock<HostState>> {
        Arc::clone(&self.state)
    }

    /// Stop background tasks, terminate supervised plugins, flush settings
    /// and close the listener.
    pub async fn shutdown(self) {
        {
            let mut state = self.state.write().await;
            state.shutdown = true;
            state.supervisor.terminate_all();
            let path = state.settings_path.clone();
            if let Err(e) = state.settings.save(&path) {
                warn!("Failed to save settings on shutdown: {e}");
            }
        }
        self.accept_task.abort();
        info!("Host stopped");
    }
}

pub struct Host;

impl Host {
    /// Bind the listener and start the host's background tasks.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot bind; this is the only
    /// startup failure that aborts the host.
    pub async fn start(config: HostConfig) -> Result<HostHandle> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, config.port)).await?;
        let port = listener.local_addr()?.port();
        info!("Listening on 127.0.0.1:{port}");

        let settings = SettingsStore::load(&config.settings_path);
        let (frontend_tx, frontend_rx) = mpsc::unbounded_channel();

        let mut state = HostState::new(
            config.plugins.clone(),
            settings,
            config.settings_path.clone(),
            frontend_tx,
        );
        state.listen_port = port;

        if config.launch_plugins {
            for descriptor in &config.plugins {
                if let Err(e) = state.supervisor.launch(descriptor, port) {
                    warn!("[{}] Failed to launch plugin: {e}", descriptor.id);
                }
            }
        }

        let state = Arc::new(RwLock::new(state));

        let accept_task = tokio::spawn(accept_loop(listener, Arc::clone(&state)));
        tokio::spawn(settings_saver(Arc::clone(&state)));
        tokio::spawn(supervisor_watcher(Arc::clone(&state)));
        tokio::spawn(presence::run_presence_monitor(
            Arc::clone(&state),
            config.presence_interval,
        ));

        Ok(HostHandle {
            frontend: FrontendHandle::new(Arc::clone(&state)),
            state,
            events: frontend_rx,
            port,
            accept_task,
        })
    }
}

/// Start the host and run until interrupted.
///
/// # Errors
///
/// Returns an error if startup fails (see [`Host::start`]).
pub async fn run(config: HostConfig) -> Result<()> {
    let handle = Host::start(config).await?;
    info!("deck-host ready on port {}", handle.port());

    tokio::signal::ctrl_c().await?;
    info!("Received interrupt, shutting down");
    handle.shutdown().await;
    Ok(())
}

async fn accept_loop(listener: TcpListener, state: Arc<RwLock<HostState>>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!("Accepted connection from {addr}");
                tokio::spawn(handle_connection(stream, Arc::clone(&state)));
            }
            Err(e) => {
                warn!("Failed to accept connection: {e}");
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, state: Arc<RwLock<HostState>>) {
    let conn_id = ConnectionId::new();
    let framed = Framed::new(stream, EventCodec::new());
    let (mut sink, mut reader) = framed.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<EventMessage>();

    state.write().await.connections.on_connect(conn_id.clone(), tx);

    let send_conn = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = sink.send(message).await {
                debug!("[{send_conn}] Send failed: {e}");
                break;
            }
        }
    });

    while let Some(result) = reader.next().await {
        match result {
            // A frame that fails to parse is logged and skipped; the peer
            // keeps its connection and classification.
            Ok(frame) => match parse_frame(&frame) {
                Ok(message) => {
                    let mut guard = state.write().await;
                    router::handle(&mut guard, &conn_id, message);
                }
                Err(e) => {
                    warn!("[{conn_id}] Dropping malformed message: {e}");
                }
            },
            Err(e) => {
                warn!("[{conn_id}] Transport error: {e}");
                break;
            }
        }
    }

    let mut guard = state.write().await;
    let gone = guard.connections.on_disconnect(&conn_id);
    debug!("[{conn_id}] Connection closed");

    // An inspector vanishing while bound to a context means its plugin
    // should be told the inspector is gone.
    if let Peer::Inspector(inspector) = gone.peer
        && let Some(context_id) = inspector.context
        && let Some(plugin_conn) = guard.connections.plugin_conn(&inspector.plugin_id).cloned()
    {
        let message = EventMessage::new(events::PROPERTY_INSPECTOR_DID_DISAPPEAR)
            .with_context(context_id);
        router::deliver(&mut guard, &plugin_conn, message);
    }
    drop(guard);

    send_task.abort();
}

/// Debounced settings persistence. Saves once mutations have settled for
/// `SETTINGS_SAVE_DEBOUNCE_MS`; a final save happens in `shutdown`.
async fn settings_saver(state: Arc<RwLock<HostState>>) {
    let mut interval = tokio::time::interval(SETTINGS_SAVER_POLL);
    loop {
        interval.tick().await;
        let mut guard = state.write().await;
        if guard.shutdown {
            break;
        }
        if guard.settings.is_dirty()
            && now_millis().saturating_sub(guard.settings.last_dirty_at())
                >= SETTINGS_SAVE_DEBOUNCE_MS
        {
            let path = guard.settings_path.clone();
            if let Err(e) = guard.settings.save(&path) {
                warn!("Failed to save settings: {e}");
            }
        }
    }
}

/// Watches supervised processes and evicts the socket entry of any plugin
/// whose process died, so routing no-ops until it reconnects.
async fn supervisor_watcher(state: Arc<RwLock<HostState>>) {
    let mut interval = tokio::time::interval(SUPERVISOR_POLL);
    loop {
        interval.tick().await;
        let mut guard = state.write().await;
        if guard.shutdown {
            break;
        }
        for plugin_id in guard.supervisor.reap_exited() {
            if let Some(conn) = guard.connections.plugin_conn(&plugin_id).cloned() {
                guard.connections.on_disconnect(&conn);
                info!("[{plugin_id}] Evicted connection of exited plugin");
            }
        }
    }
}
