//! HTTP listener that funnels every request into a recorder

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::recorder::Recorder;
use crate::{RecorderError, Result};

use super::http::{
    check_content_length, create_response, error_response, into_hyper, is_supported_method,
    read_body, recorded_request,
};
use super::{DEFAULT_MAX_REQUEST_SIZE, SHUTDOWN_TIMEOUT_MS};

/// A running listener bound to one address
///
/// Dropping the server reports unsatisfied expectations and aborts the
/// listener. [`RecorderServer::shutdown`] does the same but waits for open
/// connections to close.
pub struct RecorderServer {
    recorder: Arc<Recorder>,
    addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    task: Option<JoinHandle<()>>,
}

impl RecorderServer {
    /// Bind `addr` and start answering requests from `recorder`
    ///
    /// Port 0 binds an ephemeral port; see [`RecorderServer::local_addr`].
    ///
    /// # Errors
    ///
    /// Returns `Bind` if the address cannot be bound
    pub async fn start(recorder: Arc<Recorder>, addr: SocketAddr) -> Result<Self> {
        Self::start_with_limit(recorder, addr, DEFAULT_MAX_REQUEST_SIZE).await
    }

    /// Like [`RecorderServer::start`] with a request body limit
    ///
    /// # Errors
    ///
    /// Returns `Bind` if the address cannot be bound
    pub async fn start_with_limit(
        recorder: Arc<Recorder>,
        addr: SocketAddr,
        max_request_size: usize,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| RecorderError::Bind { addr, source })?;
        let bound = listener
            .local_addr()
            .map_err(|source| RecorderError::Bind { addr, source })?;

        info!("{} listening on {}", recorder, bound);

        let (shutdown_tx, _) = broadcast::channel(1);
        let task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&recorder),
            max_request_size,
            shutdown_tx.subscribe(),
        ));

        Ok(Self {
            recorder,
            addr: bound,
            shutdown_tx,
            task: Some(task),
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL of the listener, e.g. `http://127.0.0.1:8080`
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Recorder answering this server's requests
    pub fn recorder(&self) -> &Arc<Recorder> {
        &self.recorder
    }

    /// Report unsatisfied expectations, then stop listening
    ///
    /// Open connections are closed. The listener is released even when
    /// expectations are unsatisfied.
    ///
    /// # Errors
    ///
    /// Returns error if the accept loop panicked
    pub async fn shutdown(mut self) -> Result<()> {
        self.recorder.report_unsatisfied();
        self.shutdown_tx.send(()).ok();

        let Some(task) = self.task.take() else {
            return Ok(());
        };

        let shutdown_timeout = Duration::from_millis(SHUTDOWN_TIMEOUT_MS);
        match tokio::time::timeout(shutdown_timeout, task).await {
            Ok(Ok(())) => {
                info!("{} on {} shut down", self.recorder, self.addr);
                Ok(())
            }
            Ok(Err(e)) => {
                error!("Accept loop failed: {}", e);
                Err(RecorderError::Io(std::io::Error::other(format!(
                    "accept loop failed: {e}"
                ))))
            }
            Err(_) => {
                warn!("Accept loop did not stop within {:?}", shutdown_timeout);
                Ok(())
            }
        }
    }
}

impl Drop for RecorderServer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            self.recorder.report_unsatisfied();
            self.shutdown_tx.send(()).ok();
            task.abort();
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    recorder: Arc<Recorder>,
    max_request_size: usize,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer_addr)) => {
                        debug!("Accepted connection from {}", peer_addr);
                        let recorder = Arc::clone(&recorder);

                        connections.spawn(async move {
                            let service = service_fn(move |request| {
                                serve(Arc::clone(&recorder), request, max_request_size)
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(TokioIo::new(stream), service)
                                .await
                            {
                                debug!("Connection from {} ended: {}", peer_addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                    }
                }
            }
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            _ = shutdown_rx.recv() => {
                debug!("Accept loop for {} shutting down", recorder);
                break;
            }
        }
    }

    connections.shutdown().await;
}

/// Answer one request
async fn serve(
    recorder: Arc<Recorder>,
    request: Request<Incoming>,
    max_request_size: usize,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    if !is_supported_method(request.method()) {
        warn!("{} rejected {} {}", recorder, request.method(), request.uri().path());
        return Ok(create_response(StatusCode::METHOD_NOT_ALLOWED, ""));
    }

    if let Err(e) = check_content_length(request.headers(), max_request_size) {
        warn!("{} rejected request: {}", recorder, e);
        return Ok(error_response(&e));
    }

    let (parts, body) = request.into_parts();
    let body = match read_body(body, max_request_size).await {
        Ok(body) => body,
        Err(e) => {
            warn!("{} could not read request: {}", recorder, e);
            return Ok(error_response(&e));
        }
    };

    let recorded = recorded_request(&parts.method, &parts.uri, &parts.headers, body);

    match recorder.handle(recorded) {
        Ok(reply) => Ok(into_hyper(reply.into_full())),
        Err(e) => {
            error!("Error handling request: {}", e);
            Ok(error_response(&e))
        }
    }
}
