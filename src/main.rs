mod config;

use config::{Config, StoreKind};
use core::{convert::Infallible, pin::pin};
use db::{backend::Backend, Database, DynamoBackend, MemoryBackend};
use hyper::{server::conn::http1, service::service_fn};
use hyper_util::rt::TokioIo;
use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
};
use tokio::{net::TcpListener, runtime::Runtime};

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let Config { port, store, endpoint, settings } = Config::from_env()?;

    let runtime = Runtime::new()?;
    runtime.block_on(async move {
        let addr: SocketAddr = (Ipv4Addr::UNSPECIFIED, port).into();
        let listener = TcpListener::bind(addr).await?;
        log::info!("listening on {addr} with the {store:?} store");

        match store {
            StoreKind::Memory => serve(listener, Database::new(MemoryBackend::new(), settings)).await,
            StoreKind::Dynamo => {
                let backend = DynamoBackend::from_env(endpoint.as_deref()).await;
                serve(listener, Database::new(backend, settings)).await
            }
        }
    })
}

async fn serve<B: Backend + 'static>(listener: TcpListener, db: Database<B>) -> anyhow::Result<()> {
    let db = Arc::new(db);
    let mut shutdown = pin!(tokio::signal::ctrl_c());

    loop {
        let (stream, peer) = tokio::select! {
            biased;
            signal = &mut shutdown => {
                signal?;
                break;
            }
            conn = listener.accept() => match conn {
                Ok(pair) => pair,
                Err(err) => {
                    log::error!("failed to accept connection: {err}");
                    continue;
                }
            },
        };

        let db = Arc::clone(&db);
        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let db = Arc::clone(&db);
                async move { Ok::<_, Infallible>(api::try_respond(req, &db).await) }
            });
            if let Err(err) = http1::Builder::new().serve_connection(TokioIo::new(stream), service).await {
                log::error!("connection with {peer} failed: {err}");
            }
        });
    }

    log::info!("shutting down");
    Ok(())
}
