//! Service assembly.
//!
//! Builds the shared pieces once and wires them together:
//!
//! ```text
//!  SensorPort ──▶ ReadingProducer ──append──▶ SessionHandle ◀──snapshot── HTTP
//!                       │ mode                     ▲
//!                       └──────────▶ LeakTestController ──▶ ResultStore
//! ```

use crate::config::PoolSenseConfig;
use crate::controller::LeakTestController;
use crate::error::{AppError, AppResult};
use crate::producer::{ProducerMode, ProducerSettings, ReadingProducer};
use crate::server::{self, ServerHandle};
use crate::storage::ResultStore;
use pool_core::analyzer::LeakAnalyzer;
use pool_core::capabilities::SensorPort;
use pool_core::clock::Clock;
use pool_core::session::SessionHandle;
use pool_driver_mock::SimulatedPool;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub struct PoolSenseService {
    controller: Arc<LeakTestController>,
    server: ServerHandle,
    producer: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl PoolSenseService {
    /// Initialize the sensor, start the producer loop and bind the HTTP server.
    ///
    /// A sensor that cannot be initialized does not fail startup; the
    /// producer comes up in degraded mode instead.
    ///
    /// # Errors
    /// Invalid server address or a port that cannot be bound.
    pub async fn start(
        config: &PoolSenseConfig,
        port: Arc<dyn SensorPort>,
        clock: Arc<dyn Clock>,
        store: Arc<dyn ResultStore>,
    ) -> AppResult<Self> {
        let addr: SocketAddr = config.server.socket_addr().map_err(AppError::Config)?;

        let session = SessionHandle::new(
            config.session.to_session_config(),
            LeakAnalyzer::new(config.analysis.to_analyzer_config()),
        );

        let mut producer = ReadingProducer::new(
            port,
            session.clone(),
            clock.clone(),
            ProducerSettings::from(&config.sensor),
            SimulatedPool::new(config.sensor.simulation_seed),
        );
        let mode = producer.start().await;
        if mode == ProducerMode::Degraded {
            info!("Serving simulated readings until the sensor responds");
        }

        let controller = Arc::new(LeakTestController::new(
            session,
            store,
            clock,
            config.session.baseline_duration(),
            producer.subscribe_mode(),
        ));

        let server = server::start(addr, controller.clone()).await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let producer = tokio::spawn(producer.run(shutdown_rx));

        info!(
            addr = %server.local_addr(),
            mode = %mode,
            "PoolSense service started"
        );

        Ok(Self {
            controller,
            server,
            producer,
            shutdown_tx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    pub fn controller(&self) -> &Arc<LeakTestController> {
        &self.controller
    }

    /// Stop the producer, then the HTTP server.
    pub async fn shutdown(self) {
        info!("Shutting down PoolSense service");
        self.shutdown_tx.send_replace(true);
        if let Err(err) = self.producer.await {
            error!(error = %err, "Producer task failed");
        }
        self.server.shutdown().await;
        info!("PoolSense service stopped");
    }
}
