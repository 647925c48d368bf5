//! Driver station communication lifecycle
//!
//! Owns the listener pair and the control scheduler. `stop` closes the
//! listening sockets, joins every task (including per-connection read
//! loops) and disconnects all stations; `start` can then be called again.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::config::NetworkConfig;
use crate::error::ConnectionError;
use crate::station::StationRegistry;

use super::scheduler::{run_scheduler, MatchInfo};
use super::{tcp, udp};

struct RunningComms {
    stop_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    tcp_addr: SocketAddr,
    udp_addr: SocketAddr,
}

/// Driver station communication service
pub struct DriverStationComms {
    config: NetworkConfig,
    registry: Arc<StationRegistry>,
    match_info: Arc<dyn MatchInfo>,
    running: Mutex<Option<RunningComms>>,
}

impl DriverStationComms {
    pub fn new(
        config: NetworkConfig,
        registry: Arc<StationRegistry>,
        match_info: Arc<dyn MatchInfo>,
    ) -> Self {
        Self {
            config,
            registry,
            match_info,
            running: Mutex::new(None),
        }
    }

    /// Bind both listeners and spawn the comms tasks; no-op when running
    pub async fn start(&self) -> Result<(), ConnectionError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Ok(());
        }

        tracing::info!("Initializing driver station communication");
        let listener = tcp::bind(self.config.tcp_listen_addr()).await?;
        let socket = udp::create_socket(self.config.udp_listen_addr())?;
        let tcp_addr = listener
            .local_addr()
            .map_err(|e| ConnectionError::BindFailed(e.to_string()))?;
        let udp_addr = socket
            .local_addr()
            .map_err(|e| ConnectionError::BindFailed(e.to_string()))?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let tasks = vec![
            tokio::spawn(tcp::run_acceptor(
                listener,
                self.registry.clone(),
                self.config.clone(),
                stop_rx.clone(),
            )),
            tokio::spawn(udp::run_receiver(socket, self.registry.clone(), stop_rx.clone())),
            tokio::spawn(run_scheduler(
                self.registry.clone(),
                self.match_info.clone(),
                self.config.control_period(),
                stop_rx,
            )),
        ];

        *running = Some(RunningComms {
            stop_tx,
            tasks,
            tcp_addr,
            udp_addr,
        });
        Ok(())
    }

    /// Stop all comms tasks and wait for them to exit
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };

        tracing::info!("Stopping driver station communication");
        let _ = running.stop_tx.send(true);
        for task in running.tasks {
            if let Err(e) = task.await {
                tracing::warn!("Comms task ended abnormally: {}", e);
            }
        }
        self.registry.disconnect_all();
    }

    /// Stop, wait out the cooldown, start again
    ///
    /// Forces every driver station to reconnect.
    pub async fn reset(&self) -> Result<(), ConnectionError> {
        self.stop().await;
        tokio::time::sleep(self.config.reset_cooldown()).await;
        self.start().await
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Bound TCP and UDP listen addresses while running
    pub async fn local_addrs(&self) -> Option<(SocketAddr, SocketAddr)> {
        self.running
            .lock()
            .await
            .as_ref()
            .map(|running| (running.tcp_addr, running.udp_addr))
    }

    pub fn registry(&self) -> &Arc<StationRegistry> {
        &self.registry
    }
}
