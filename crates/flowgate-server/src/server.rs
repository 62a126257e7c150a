//! Line-oriented TCP front end gated by an [`AdmissionController`].
//!
//! Every newline-terminated line is one request. Admitted requests are echoed
//! back after the configured handler delay; rejected ones get whatever the
//! rejection policy staged. Closing the connection cancels its in-flight
//! requests, which releases their admission slots.
//!
//! A `Respond` rejection terminates the connection as soon as its payload is
//! flushed: reading stops, requests still in flight on that connection are
//! cancelled and their responses are never sent.

use crate::config::ServerConfig;
use crate::error::Result;
use crate::sink::PendingResponse;
use flowgate_admission::{AdmissionController, Decision};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

type SharedWriter<W> = Arc<Mutex<W>>;

/// TCP server that admits each request through a shared controller.
pub struct GateServer {
    controller: AdmissionController,
    handler_delay: Duration,
}

impl GateServer {
    /// Creates a server around an existing controller.
    pub fn new(controller: AdmissionController, handler_delay: Duration) -> Self {
        Self {
            controller,
            handler_delay,
        }
    }

    /// Builds the controller from `config` and wraps it.
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let controller = AdmissionController::new(config.admission.clone())?;
        Ok(Self::new(controller, config.handler_delay()))
    }

    /// The controller gating this server.
    pub fn controller(&self) -> &AdmissionController {
        &self.controller
    }

    /// Runs the accept loop. Spawns a task per connection.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        loop {
            let (stream, peer) = listener.accept().await?;
            debug!(peer = %peer, "accepted connection");
            let controller = self.controller.clone();
            let delay = self.handler_delay;
            tokio::spawn(async move {
                let (reader, writer) = stream.into_split();
                if let Err(e) = handle_connection(reader, writer, peer, controller, delay).await {
                    debug!(peer = %peer, error = %e, "connection ended with error");
                }
            });
        }
    }
}

async fn handle_connection<R, W>(
    reader: R,
    writer: W,
    peer: SocketAddr,
    controller: AdmissionController,
    delay: Duration,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let writer: SharedWriter<W> = Arc::new(Mutex::new(writer));
    let mut lines = BufReader::new(reader).lines();
    let mut inflight: JoinSet<io::Result<()>> = JoinSet::new();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!(peer = %peer, pending = inflight.len(), "peer closed connection");
                inflight.shutdown().await;
                return Ok(());
            }
            Err(e) => {
                inflight.shutdown().await;
                return Err(e);
            }
        };

        let mut pending = PendingResponse::new();
        match controller.try_admit(&mut pending) {
            Decision::Admitted(permit) => {
                let writer = Arc::clone(&writer);
                inflight.spawn(permit.run_fallible(echo(line, writer, delay)));
            }
            Decision::Rejected(rejection) => {
                debug!(peer = %peer, cause = rejection.cause.as_str(), "request rejected");
                if let Some(payload) = pending.take_payload() {
                    let mut out = writer.lock().await;
                    let flushed = match out.write_all(&payload).await {
                        Ok(()) => out.flush().await,
                        Err(e) => Err(e),
                    };
                    if let Err(e) = flushed {
                        warn!(peer = %peer, error = %e, "failed to write rejection");
                        controller.report_delivery_failure();
                    }
                }
                if pending.should_close() {
                    break;
                }
            }
        }

        while let Some(done) = inflight.try_join_next() {
            log_request_result(peer, done);
        }
    }

    debug!(peer = %peer, cancelled = inflight.len(), "closing connection after rejection");
    inflight.shutdown().await;
    let mut writer = writer.lock().await;
    writer.shutdown().await
}

async fn echo<W>(line: String, writer: SharedWriter<W>, delay: Duration) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    let mut writer = writer.lock().await;
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await
}

fn log_request_result(
    peer: SocketAddr,
    done: std::result::Result<io::Result<()>, tokio::task::JoinError>,
) {
    match done {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(peer = %peer, error = %e, "request failed"),
        Err(e) if e.is_cancelled() => {}
        Err(e) => warn!(peer = %peer, error = %e, "request task panicked"),
    }
}

/// Logs a metrics snapshot every `period` until the task is dropped.
pub async fn report_metrics(controller: AdmissionController, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let snapshot = controller.metrics();
        info!(
            accepted = snapshot.accepted,
            rejected_by_rate = snapshot.rejected_by_rate,
            rejected_by_concurrency = snapshot.rejected_by_concurrency,
            active = snapshot.currently_active,
            completed = snapshot.completed,
            delivery_failures = snapshot.rejection_delivery_failures,
            "admission metrics"
        );
    }
}
