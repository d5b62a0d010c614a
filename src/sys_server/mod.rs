//! The hyper service loop and route dispatch.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};

use crate::sys_filehost;
use crate::sys_receiver;

/// Shared server configuration.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Directory stored files live in.
    pub storage_dir: PathBuf,
}

async fn route(req: Request<Body>, state: Arc<AppState>) -> Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let resp = if method == Method::POST && path == "/upload" {
        sys_receiver::handlers::handler_upload(req, &state.storage_dir).await
    } else if method == Method::GET && path == "/upload/remove" {
        sys_receiver::handlers::handler_remove(req.uri().query(), &state.storage_dir).await
    } else if method == Method::GET && path.starts_with("/upload/") {
        sys_filehost::handlers::handler_stored(&path["/upload/".len()..], &state.storage_dir).await
    } else {
        Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::from("Not found"))
            .unwrap()
    };
    Ok(resp)
}

/// Bind `addr` and return the resolved local address together with the
/// server future. Binding happens before the future runs so callers may ask
/// for port 0 and learn the real port.
pub fn serve(
    addr: SocketAddr,
    state: Arc<AppState>,
) -> Result<(SocketAddr, impl Future<Output = Result<(), hyper::Error>>), hyper::Error> {
    let make = make_service_fn(move |_| {
        let state = state.clone();
        async move { Ok::<_, Infallible>(service_fn(move |req| route(req, state.clone()))) }
    });
    let server = Server::try_bind(&addr)?.serve(make);
    let local = server.local_addr();
    log::info!("listening on {local}");
    Ok((local, server))
}
