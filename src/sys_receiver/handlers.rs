//! HTTP glue: multipart decode, JSON/JSONP replies.

use std::collections::HashMap;
use std::path::Path;

use hyper::{Body, Request, Response, StatusCode, header::CONTENT_TYPE};
use multer::Multipart;

use crate::sys_receiver::core::{self, StoredPart, UploadConfig, UploadReply};
use crate::sys_wire::parse_query;

/// URL prefix stored files are served back under.
pub const PUBLIC_BASE: &str = "/upload";

/// `ajax` query parameter, when present and non-empty: the callback (or
/// comment marker) the JSON body gets wrapped in.
fn ajax_param(query: Option<&str>) -> Option<String> {
    parse_query(query.unwrap_or(""))
        .into_iter()
        .find(|(k, _)| k == "ajax")
        .map(|(_, v)| v)
        .filter(|v| !v.is_empty())
}

fn bad_request(msg: String) -> Response<Body> {
    Response::builder()
        .status(StatusCode::BAD_REQUEST)
        .body(Body::from(msg))
        .unwrap()
}

/// Serialize a reply, JSONP-wrapped when the request asked for it.
pub fn reply_json(reply: &UploadReply, ajax: Option<&str>) -> Response<Body> {
    let json = serde_json::to_string(reply)
        .unwrap_or_else(|_| format!(r#"{{"return":{}}}"#, core::CODE_MOVE_FAILED));
    match ajax {
        Some(cb) => Response::builder()
            .header(CONTENT_TYPE, "application/javascript")
            .body(Body::from(format!("{cb}({json})")))
            .unwrap(),
        None => Response::builder()
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(json))
            .unwrap(),
    }
}

/// Accept one multipart upload: a `config` field naming the uploading field
/// id, extra form fields (ignored here), and the file keyed by that id.
pub async fn handler_upload(req: Request<Body>, base_dir: &Path) -> Response<Body> {
    let ajax = ajax_param(req.uri().query());

    // parse boundary
    let ct = match req.headers().get(CONTENT_TYPE).and_then(|h| h.to_str().ok()) {
        Some(ct) => ct,
        None => return bad_request("Missing Content-Type".to_string()),
    };
    let boundary = match multer::parse_boundary(ct) {
        Ok(b) => b,
        Err(e) => return bad_request(format!("Bad boundary: {e}")),
    };

    let mut multipart = Multipart::new(req.into_body(), boundary);
    let mut texts: HashMap<String, String> = HashMap::new();
    let mut files: Vec<StoredPart> = Vec::new();
    while let Some(field) = multipart.next_field().await.transpose() {
        match field {
            Ok(f) => {
                let name = f.name().unwrap_or("").to_string();
                if let Some(file_name) = f.file_name().map(str::to_string) {
                    let mime = f
                        .content_type()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| {
                            mime_guess::from_path(&file_name)
                                .first_or_octet_stream()
                                .to_string()
                        });
                    match f.bytes().await {
                        Ok(data) => files.push(StoredPart { name, file_name, mime, data }),
                        Err(e) => {
                            log::warn!("multipart read error: {e}");
                            return bad_request("Invalid form data".to_string());
                        }
                    }
                } else {
                    match f.text().await {
                        Ok(text) => {
                            texts.insert(name, text);
                        }
                        Err(e) => {
                            log::warn!("multipart read error: {e}");
                            return bad_request("Invalid form data".to_string());
                        }
                    }
                }
            }
            Err(e) => {
                log::warn!("multipart error: {e}");
                return bad_request("Invalid form data".to_string());
            }
        }
    }

    let config = texts
        .get("config")
        .and_then(|raw| serde_json::from_str::<UploadConfig>(raw).ok());
    let reply = match config {
        Some(cfg) => match files.into_iter().find(|p| p.name == cfg.field) {
            Some(part) => core::store_upload(base_dir, PUBLIC_BASE, &part).await,
            None => UploadReply::status(core::CODE_NO_FILE),
        },
        None => UploadReply::status(core::CODE_NO_FILE),
    };
    reply_json(&reply, ajax.as_deref())
}

/// Deletion notification: `file=<path>` in the query. Clients ignore the
/// reply, but it reports the outcome anyway.
pub async fn handler_remove(query: Option<&str>, base_dir: &Path) -> Response<Body> {
    let params = parse_query(query.unwrap_or(""));
    let ajax = ajax_param(query);
    let file = params.iter().find(|(k, _)| k == "file").map(|(_, v)| v.as_str());

    let reply = match file {
        Some(file) => match core::remove_stored(base_dir, file).await {
            Ok(true) => UploadReply::status(core::CODE_OK),
            Ok(false) => UploadReply::status(core::CODE_NO_FILE),
            Err(e) => {
                log::warn!("remove {file:?} failed: {e}");
                UploadReply::status(core::CODE_MOVE_FAILED)
            }
        },
        None => UploadReply::status(core::CODE_NO_FILE),
    };
    reply_json(&reply, ajax.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys_receiver::core::tests::{TINY_PNG, temp_dir};
    use crate::sys_wire::{FilePart, MultipartPayload};
    use bytes::Bytes;

    fn upload_request(uri: &str, field_id: &str, file_name: &str, data: &'static [u8]) -> Request<Body> {
        let payload = MultipartPayload {
            fields: vec![(
                "config".to_string(),
                format!(r#"{{"field":"{field_id}","multi":1,"model":"list"}}"#),
            )],
            file: FilePart {
                name: field_id.to_string(),
                file_name: file_name.to_string(),
                content_type: "image/png".to_string(),
                data: Bytes::from_static(data),
            },
        };
        let boundary = "XTESTBOUND";
        Request::post(uri)
            .header(CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(payload.encode(boundary)))
            .unwrap()
    }

    async fn body_text(resp: Response<Body>) -> String {
        let bytes = hyper::body::to_bytes(resp.into_body()).await.unwrap();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    #[tokio::test]
    async fn upload_round_trips_through_multipart() {
        let dir = temp_dir("handler-upload");
        let req = upload_request("/upload", "file1", "pic.png", TINY_PNG);
        let resp = handler_upload(req, &dir).await;
        let body = body_text(resp).await;
        let v: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(v["return"], 0);
        assert!(v["file"].as_str().unwrap().ends_with("-1-1.png"));
        assert_eq!(v["size"], TINY_PNG.len() as u64);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn missing_file_part_reports_no_file() {
        let dir = temp_dir("handler-nofile");
        // config names field "file1" but the file arrives under another name
        let req = upload_request("/upload", "file1", "pic.png", TINY_PNG);
        let (mut parts, body) = req.into_parts();
        parts.uri = "/upload".parse().unwrap();
        let body = hyper::body::to_bytes(body).await.unwrap();
        let text = String::from_utf8_lossy(&body).replace("name=\"file1\"", "name=\"other\"");
        let req = Request::from_parts(parts, Body::from(text));

        let resp = handler_upload(req, &dir).await;
        let v: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(v["return"], core::CODE_NO_FILE);
    }

    #[tokio::test]
    async fn ajax_parameter_wraps_the_reply() {
        let dir = temp_dir("handler-ajax");
        let req = upload_request("/upload?ajax=cb", "file1", "pic.png", TINY_PNG);
        let resp = handler_upload(req, &dir).await;
        assert_eq!(
            resp.headers().get(CONTENT_TYPE).unwrap(),
            "application/javascript"
        );
        let body = body_text(resp).await;
        assert!(body.starts_with("cb("));
        assert!(body.ends_with(')'));
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn missing_content_type_is_a_bad_request() {
        let dir = temp_dir("handler-noct");
        let req = Request::post("/upload").body(Body::empty()).unwrap();
        let resp = handler_upload(req, &dir).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn remove_handler_reports_both_outcomes() {
        let dir = temp_dir("handler-remove");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("gone.png"), b"x").unwrap();

        let resp = handler_remove(Some("file=%2Fupload%2Fgone.png&ajax=//"), &dir).await;
        let body = body_text(resp).await;
        assert!(body.starts_with("//("));
        assert!(body.contains(r#""return":0"#));

        let resp = handler_remove(Some("file=gone.png"), &dir).await;
        let body = body_text(resp).await;
        assert!(body.contains(&core::CODE_NO_FILE.to_string()));
        std::fs::remove_dir_all(dir).unwrap();
    }
}
