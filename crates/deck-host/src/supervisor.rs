//! Plugin process supervision.
//!
//! One OS child per launchable descriptor. Spawned plugins receive the
//! listen port, their plugin id and a registration-info JSON blob as
//! arguments, so a spawned plugin performs the same socket handshake as a
//! self-connecting one. A missing executable is logged and skipped; the
//! plugin's contexts simply stay pending until something connects for it.

use crate::error::Result;
use deck_rpc::RegistrationInfo;
use deck_types::PluginDescriptor;
use std::collections::HashMap;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

#[derive(Debug)]
struct SupervisedPlugin {
    child: Child,
}

/// Tracks spawned plugin processes by plugin id.
#[derive(Debug, Default)]
pub struct ProcessSupervisor {
    children: HashMap<String, SupervisedPlugin>,
}

impl ProcessSupervisor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn the plugin's executable, if it declares one that exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the spawn itself fails; callers log and
    /// continue, a broken plugin never blocks the host.
    pub fn launch(&mut self, descriptor: &PluginDescriptor, port: u16) -> Result<()> {
        let Some(executable) = &descriptor.executable else {
            debug!("[{}] No executable, expecting external connection", descriptor.id);
            return Ok(());
        };
        if !executable.exists() {
            warn!(
                "[{}] Plugin executable not found: {}",
                descriptor.id,
                executable.display()
            );
            return Ok(());
        }

        let info = RegistrationInfo::new(port, descriptor.id.clone());
        let info_json = serde_json::to_string(&info)?;

        let mut child = Command::new(executable)
            .arg(port.to_string())
            .arg(&descriptor.id)
            .arg(info_json)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(stdout) = child.stdout.take() {
            spawn_line_logger(descriptor.id.clone(), stdout, false);
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_logger(descriptor.id.clone(), stderr, true);
        }

        info!("[{}] Launched {}", descriptor.id, executable.display());
        self.children
            .insert(descriptor.id.clone(), SupervisedPlugin { child });
        Ok(())
    }

    /// Collect plugins whose process has exited and drop their handles.
    pub fn reap_exited(&mut self) -> Vec<String> {
        let mut exited = Vec::new();
        for (plugin_id, supervised) in &mut self.children {
            match supervised.child.try_wait() {
                Ok(Some(status)) => {
                    warn!("[{plugin_id}] Plugin process exited: {status}");
                    exited.push(plugin_id.clone());
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("[{plugin_id}] Failed to poll plugin process: {e}");
                    exited.push(plugin_id.clone());
                }
            }
        }
        for plugin_id in &exited {
            self.children.remove(plugin_id);
        }
        exited
    }

    /// Signal every tracked process to terminate. Does not wait for exit.
    pub fn terminate_all(&mut self) {
        for (plugin_id, supervised) in &mut self.children {
            debug!("[{plugin_id}] Terminating plugin process");
            if let Err(e) = supervised.child.start_kill() {
                warn!("[{plugin_id}] Failed to terminate plugin process: {e}");
            }
        }
        self.children.clear();
    }

    #[must_use]
    pub fn is_running(&self, plugin_id: &str) -> bool {
        self.children.contains_key(plugin_id)
    }

    #[must_use]
    pub fn running_count(&self) -> usize {
        self.children.len()
    }
}

fn spawn_line_logger(
    plugin_id: String,
    stream: impl AsyncRead + Unpin + Send + 'static,
    is_stderr: bool,
) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if is_stderr {
                warn!("[{plugin_id}] {line}");
            } else {
                info!("[{plugin_id}] {line}");
            }
        }
    });
}
