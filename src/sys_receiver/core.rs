//! Core receiver logic: whitelist checks, stored-name generation and the
//! storage move. No Hyper types here.

use std::io::Cursor;
use std::path::Path;

use bytes::Bytes;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::fs;

use crate::sys_pathutil;
use crate::sys_wire::ImageInfo;

pub const CODE_OK: i64 = 0;
pub const CODE_EMPTY_FILE: i64 = -1005;
pub const CODE_NO_STORAGE: i64 = -1006;
pub const CODE_NO_FILE: i64 = -2001;
pub const CODE_MOVE_FAILED: i64 = -9000;
pub const CODE_BAD_MIME: i64 = -9001;
pub const CODE_BAD_TYPE: i64 = -9002;

const ALLOW_MIME: [&str; 5] = [
    "image/gif",
    "image/jpg",
    "image/jpeg",
    "image/pjpeg",
    "image/png",
];
const ALLOW_TYPE: [&str; 4] = ["gif", "jpg", "jpeg", "png"];

/// Charset for stored names; ambiguous glyphs left out.
const NAME_CHARSET: &[u8] = b"abcdefghijkmnpqrstwxyz23456789";

/// The `config` form field as the receiver reads it: the uploading field id
/// plus passthrough keys it does not act on.
#[derive(Debug, Deserialize)]
pub struct UploadConfig {
    pub field: String,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// JSON reply body. All codes are numeric; `return >= 0` is success.
#[derive(Debug, Serialize)]
pub struct UploadReply {
    #[serde(rename = "return")]
    pub code: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl UploadReply {
    /// A bare status with no payload.
    pub fn status(code: i64) -> Self {
        UploadReply {
            code,
            file: None,
            name: None,
            mime: None,
            size: None,
            image: None,
            message: None,
        }
    }

    /// A rejection carrying the offending value.
    pub fn rejected(code: i64, message: impl Into<String>) -> Self {
        UploadReply {
            message: Some(message.into()),
            ..Self::status(code)
        }
    }
}

/// One decoded multipart file part.
#[derive(Debug, Clone)]
pub struct StoredPart {
    /// Form field name the part arrived under.
    pub name: String,
    pub file_name: String,
    pub mime: String,
    pub data: Bytes,
}

/// Lowercased extension, capped at ten characters.
pub fn file_ext_lower(name: &str) -> String {
    let ext = sys_pathutil::file_ext(name).to_ascii_lowercase();
    ext.chars().take(10).collect()
}

/// Random stored-name prefix of `len` charset characters.
pub fn random_name(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| NAME_CHARSET[rng.gen_range(0..NAME_CHARSET.len())] as char)
        .collect()
}

/// Image dimensions of the payload, when it decodes as one.
pub fn probe_dimensions(data: &[u8]) -> Option<ImageInfo> {
    image::ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
        .map(|(width, height)| ImageInfo { width, height })
}

/// Validate one uploaded part and move it into the storage directory under
/// a fresh name embedding its dimensions (or a random number when the
/// payload is not a decodable image). `public_base` is the URL prefix the
/// stored file is served back under.
pub async fn store_upload(base_dir: &Path, public_base: &str, part: &StoredPart) -> UploadReply {
    if !ALLOW_MIME.contains(&part.mime.as_str()) {
        return UploadReply::rejected(CODE_BAD_MIME, part.mime.clone());
    }
    let ext = file_ext_lower(&part.file_name);
    if !ALLOW_TYPE.contains(&ext.as_str()) {
        return UploadReply::rejected(CODE_BAD_TYPE, ext);
    }
    if part.data.is_empty() {
        return UploadReply::status(CODE_EMPTY_FILE);
    }

    let image = probe_dimensions(&part.data);
    let mark = match image {
        Some(i) => format!("{}-{}", i.width, i.height),
        None => rand::random::<u32>().to_string(),
    };
    let stored = format!("{}-{}.{}", random_name(10), mark, ext);

    if let Err(e) = fs::create_dir_all(base_dir).await {
        log::error!("storage dir {base_dir:?} unavailable: {e}");
        return UploadReply::status(CODE_NO_STORAGE);
    }
    let path = base_dir.join(&stored);
    if let Err(e) = fs::write(&path, &part.data).await {
        log::error!("storing {path:?} failed: {e}");
        return UploadReply::status(CODE_MOVE_FAILED);
    }

    UploadReply {
        code: CODE_OK,
        file: Some(format!("{}/{}", public_base.trim_end_matches('/'), stored)),
        name: Some(part.file_name.clone()),
        mime: Some(part.mime.clone()),
        size: Some(part.data.len() as u64),
        image,
        message: None,
    }
}

/// Delete a stored file by path or bare name. The name is flattened to its
/// base and sanitized, so the request cannot reach outside the storage dir.
///
/// `Ok(true)` if deleted, `Ok(false)` if it was not there.
pub async fn remove_stored(base_dir: &Path, file: &str) -> Result<bool, std::io::Error> {
    let name = sanitize_filename::sanitize(sys_pathutil::base_name(file));
    if name.is_empty() {
        return Ok(false);
    }
    match fs::remove_file(base_dir.join(&name)).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
