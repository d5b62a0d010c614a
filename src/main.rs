use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use pack_upload::sys_server::{AppState, serve};

/// Port to listen on; `PACK_UPLOAD_PORT`, default 8000.
fn configured_port() -> u16 {
    env::var("PACK_UPLOAD_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000)
}

/// Storage directory; `PACK_UPLOAD_DIR`, default `upload`.
fn configured_dir() -> PathBuf {
    env::var("PACK_UPLOAD_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("upload"))
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let state = Arc::new(AppState {
        storage_dir: configured_dir(),
    });
    let addr = ([0, 0, 0, 0], configured_port()).into();

    match serve(addr, state) {
        Ok((_, server)) => {
            if let Err(e) = server.await {
                log::error!("server error: {e}");
                std::process::exit(1);
            }
        }
        Err(e) => {
            log::error!("could not bind {addr}: {e}");
            std::process::exit(1);
        }
    }
}
