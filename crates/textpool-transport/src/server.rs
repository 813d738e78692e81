use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use textpool_core::{ModelRunner, ServerConfig};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinSet;

use crate::access_log::AccessLog;
use crate::dispatcher::Dispatcher;
use crate::error::TransportError;
use crate::pool::WorkerPool;
use crate::task::{build_response, Exchange, OneshotWriter, Reply, RequestInfo, ResponseBody};

/// HTTP/1.1 front end. Tokio drives sockets and hyper connections; every
/// request is processed on a pool worker.
pub struct TextpoolServer<R> {
    listener: TcpListener,
    dispatcher: Arc<Dispatcher<R>>,
}

impl<R: ModelRunner> TextpoolServer<R> {
    /// Binds the listener and spawns the worker pool. Nothing is served
    /// until [`serve`](Self::serve) is awaited.
    pub async fn bind(config: &ServerConfig, access_log: AccessLog) -> Result<Self, TransportError> {
        let addr = config.listen_addr();
        let listener = TcpListener::bind(addr.as_str())
            .await
            .map_err(|source| TransportError::Bind { addr, source })?;

        let pool = WorkerPool::new(config.threads, config.queue_capacity, Arc::clone(&config.model))?;
        tracing::info!(
            "Spawned {} workers (queue capacity {})",
            pool.size(),
            match pool.capacity() {
                0 => "unbounded".to_string(),
                n => n.to_string(),
            }
        );

        let dispatcher = Dispatcher::new(pool, Arc::clone(&config.model), access_log);
        Ok(Self {
            listener,
            dispatcher: Arc::new(dispatcher),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Shared handle to the dispatcher. A clone still held when `serve`
    /// returns keeps the workers running until it is dropped.
    pub fn dispatcher(&self) -> Arc<Dispatcher<R>> {
        Arc::clone(&self.dispatcher)
    }

    /// Accepts connections until `shutdown` resolves. Open connections are
    /// then asked to close once their in-flight request is answered, and the
    /// pool is drained and joined before this returns.
    pub async fn serve<F>(self, shutdown: F) -> Result<(), TransportError>
    where
        F: Future<Output = ()>,
    {
        let TextpoolServer { listener, dispatcher } = self;
        tracing::info!("Listening on {}", listener.local_addr()?);
        tokio::pin!(shutdown);

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!("Connection task failed: {e}");
                    }
                }
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::warn!("Accept failed: {e}");
                            continue;
                        }
                    };
                    connections.spawn(serve_connection(Arc::clone(&dispatcher), stream, peer, stop_rx.clone()));
                }
            }
        }

        tracing::info!("Shutting down; closing {} open connections", connections.len());
        drop(listener);
        let _ = stop_tx.send(true);
        while let Some(joined) = connections.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Connection task failed: {e}");
            }
        }

        match Arc::try_unwrap(dispatcher) {
            Ok(dispatcher) => {
                let joined = tokio::task::spawn_blocking(move || dispatcher.into_pool().shutdown()).await;
                if let Err(e) = joined {
                    tracing::error!("Worker pool shutdown failed: {e}");
                }
            }
            Err(_) => tracing::warn!("Dispatcher handle still held; workers stop when it is dropped"),
        }
        Ok(())
    }
}

async fn serve_connection<R: ModelRunner>(
    dispatcher: Arc<Dispatcher<R>>,
    stream: TcpStream,
    peer: SocketAddr,
    mut stop: watch::Receiver<bool>,
) {
    let service = service_fn(move |req| handle(Arc::clone(&dispatcher), req, peer));
    let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let result = tokio::select! {
        res = conn.as_mut() => res,
        _ = stop.changed() => {
            conn.as_mut().graceful_shutdown();
            conn.as_mut().await
        }
    };
    if let Err(e) = result {
        tracing::debug!("Error serving connection from {peer}: {e}");
    }
}

async fn handle<R: ModelRunner>(
    dispatcher: Arc<Dispatcher<R>>,
    req: Request<Incoming>,
    peer: SocketAddr,
) -> Result<Response<ResponseBody>, hyper::Error> {
    let (parts, body) = req.into_parts();
    let info = RequestInfo::from_parts(&parts, Some(peer));
    let body = body.collect().await?.to_bytes();

    let (tx, rx) = oneshot::channel();
    // A refused exchange has already been answered through the writer.
    let _ = dispatcher.dispatch(Exchange { info, body }, Box::new(OneshotWriter(tx)));

    match rx.await {
        Ok(response) => Ok(response),
        Err(_) => {
            tracing::error!("Worker dropped a request from {peer} without answering");
            Ok(build_response(Reply::failed("request abandoned by worker"), Utc::now()))
        }
    }
}

/// Resolves once ctrl-c is received.
pub async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Unable to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
