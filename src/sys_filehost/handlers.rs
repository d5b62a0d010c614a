//! HTTP glue: stream a stored file back with its guessed content type.

use std::path::Path;

use hyper::header::CONTENT_TYPE;
use hyper::{Body, Response, StatusCode};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use crate::sys_filehost::core;

pub async fn handler_stored(rel: &str, base_dir: &Path) -> Response<Body> {
    let Some(path) = core::map_stored_path(base_dir, rel) else {
        return Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::from("Not found"))
            .unwrap();
    };
    match File::open(&path).await {
        Ok(file) => {
            let stream = ReaderStream::new(file);
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            Response::builder()
                .header(CONTENT_TYPE, mime.as_ref())
                .body(Body::wrap_stream(stream))
                .unwrap()
        }
        Err(_) => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::from("Not found"))
            .unwrap(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys_receiver::core::tests::temp_dir;

    #[tokio::test]
    async fn serves_stored_files_with_their_mime() {
        let dir = temp_dir("filehost");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("abc-1-1.png"), b"png bytes").unwrap();

        let resp = handler_stored("abc-1-1.png", &dir).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get(CONTENT_TYPE).unwrap(), "image/png");
        let body = hyper::body::to_bytes(resp.into_body()).await.unwrap();
        assert_eq!(&body[..], b"png bytes");
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn unknown_names_are_not_found() {
        let dir = temp_dir("filehost-missing");
        let resp = handler_stored("nope.png", &dir).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
