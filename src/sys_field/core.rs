//! The per-field upload lifecycle: selection, validation, transport,
//! response handling, list mutation and status recomputation.

use std::sync::Arc;

use bytes::Bytes;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::sys_pathutil;
use crate::sys_registry::{FieldId, FieldRegistry, FileEntry, Phase, random_token};
use crate::sys_render::Renderer;
use crate::sys_wire::{FilePart, ImageInfo, MultipartPayload, Transport, url_encode};

pub const CODE_PARSE_FAILURE: i64 = -2000;
pub const CODE_LIMIT_EXCEEDED: i64 = -2002;
pub const CODE_UNSUPPORTED_TYPE: i64 = -2003;

/// Everything that can end a submission attempt early. Terminal for that
/// attempt only; the field is immediately usable again.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("maximum file count: {limit}")]
    LimitExceeded { limit: u32 },
    #[error("unsupported file type: {ext}")]
    UnsupportedType { ext: String },
    #[error("{message}")]
    ServerRejected { code: i64, message: String },
    #[error("{raw}")]
    ResponseParseFailure { raw: String },
}

impl UploadError {
    pub fn code(&self) -> i64 {
        match self {
            UploadError::LimitExceeded { .. } => CODE_LIMIT_EXCEEDED,
            UploadError::UnsupportedType { .. } => CODE_UNSUPPORTED_TYPE,
            UploadError::ServerRejected { code, .. } => *code,
            UploadError::ResponseParseFailure { .. } => CODE_PARSE_FAILURE,
        }
    }
}

/// Human-readable text for a server status code. Unknown codes get an
/// explicit fallback instead of a blank table miss.
pub fn status_message(code: i64) -> &'static str {
    match code {
        -1000 => "no permission to upload files",
        -1001 => "uploaded file exceeds the server size limit",
        -1002 => "uploaded file exceeds the form MAX_FILE_SIZE limit",
        -1003 => "file was only partially uploaded, possibly corrupt",
        -1004 => "no file was uploaded, invalid or empty",
        -1005 => "uploaded file is empty",
        -1006 => "server temporary folder is missing",
        -1007 => "file write failed, possibly no permission",
        -2001 => "no file received",
        -9000 => "failed to move uploaded file into storage",
        -9001 => "file stream type not allowed",
        -9002 => "file extension not allowed",
        _ => "unknown upload error",
    }
}

/// Compile an accept filter (`image/jpg,image/png` or `image/*`) into a
/// case-insensitive extension matcher: subtypes collapse to an alternation,
/// `*` subtypes widen to any word characters.
pub fn accept_pattern(accept: &str) -> Result<Regex, regex::Error> {
    let accept: String = accept.chars().filter(|c| !c.is_whitespace()).collect();
    let alts: Vec<String> = accept
        .split(',')
        .filter(|e| !e.is_empty())
        .map(|entry| match entry.split_once('/') {
            Some((_, "*")) => r"\w+".to_string(),
            Some((_, sub)) => regex::escape(sub),
            None => regex::escape(entry),
        })
        .collect();
    RegexBuilder::new(&format!("^({})$", alts.join("|")))
        .case_insensitive(true)
        .build()
}

/// The server's upload reply as the client reads it.
#[derive(Debug, Deserialize)]
pub struct ServerReply {
    #[serde(rename = "return")]
    pub code: i64,
    pub file: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub mime: Option<String>,
    pub size: Option<u64>,
    pub image: Option<ImageInfo>,
}

pub type ValidHook = Box<dyn Fn(&str, &str, u64, Option<ImageInfo>) + Send + Sync>;
pub type ErrorHook = Box<dyn Fn(&str, i64, &str) + Send + Sync>;
pub type CompleteHook = Box<dyn Fn(&str, &str, Option<&str>) + Send + Sync>;

/// Observation hooks. `complete` fires on every outcome; errors surface
/// only through `error`, never as propagated failures.
pub struct Events {
    pub valid: ValidHook,
    pub error: ErrorHook,
    pub complete: CompleteHook,
}

impl Default for Events {
    fn default() -> Self {
        Events {
            valid: Box::new(|name, file, size, _| {
                log::info!("upload ok: {name} -> {file} ({size} bytes)");
            }),
            error: Box::new(|name, code, msg| {
                log::warn!("upload error on {name}: {code} {msg}");
            }),
            complete: Box::new(|name, _, _| {
                log::debug!("upload finished: {name}");
            }),
        }
    }
}

impl Events {
    pub fn on_valid(mut self, f: impl Fn(&str, &str, u64, Option<ImageInfo>) + Send + Sync + 'static) -> Self {
        self.valid = Box::new(f);
        self
    }

    pub fn on_error(mut self, f: impl Fn(&str, i64, &str) + Send + Sync + 'static) -> Self {
        self.error = Box::new(f);
        self
    }

    pub fn on_complete(mut self, f: impl Fn(&str, &str, Option<&str>) + Send + Sync + 'static) -> Self {
        self.complete = Box::new(f);
        self
    }
}

/// Global upload parameters shared by every field of one manager.
#[derive(Debug, Clone, Default)]
pub struct Params {
    /// Upload endpoint URL.
    pub upload: String,
    /// Deletion notification endpoint URL; empty disables notifications.
    pub delete: String,
    /// CSS class for rendered lists.
    pub class: String,
    /// Extra form fields sent verbatim with every upload and deletion.
    pub formdata: Vec<(String, String)>,
}

/// Bind-time description of one field, parsed once instead of being re-read
/// from markup.
#[derive(Debug, Clone, Default)]
pub struct BindSpec {
    /// Original input name, reported through callbacks.
    pub name: String,
    /// Pre-existing `||`-delimited file list.
    pub value: String,
    /// MIME filter; `None` means unrestricted.
    pub accept: Option<String>,
    /// Per-field config overrides, merged over the defaults.
    pub config: Option<Map<String, Value>>,
    pub read_only: bool,
}

impl BindSpec {
    pub fn new(name: &str) -> Self {
        BindSpec {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

/// A validated selection, packaged for the transport. Detached from the
/// manager so the borrow ends before the request is awaited.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub endpoint: String,
    pub payload: MultipartPayload,
}

/// Drives every bound field through
/// `Idle -> Validating -> Submitting -> AwaitingResponse -> Idle`,
/// delegating presentation to the renderer and I/O to the transport.
pub struct UploadManager<T: Transport, R: Renderer> {
    registry: FieldRegistry,
    params: Params,
    events: Events,
    transport: Arc<T>,
    renderer: R,
}

impl<T: Transport, R: Renderer> UploadManager<T, R> {
    pub fn new(params: Params, events: Events, transport: T, renderer: R) -> Self {
        UploadManager {
            registry: FieldRegistry::new(),
            params,
            events,
            transport: Arc::new(transport),
            renderer,
        }
    }

    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    /// A handle the caller can await on without borrowing the manager.
    pub fn transport(&self) -> Arc<T> {
        Arc::clone(&self.transport)
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Bind one field: register it, mount its list, attach any pre-existing
    /// files and publish the initial status.
    pub fn bind(&mut self, spec: BindSpec) -> Result<FieldId, serde_json::Error> {
        let id = self.registry.register(
            &spec.name,
            spec.accept.as_deref(),
            spec.config.as_ref(),
            spec.read_only,
        )?;
        let config = self.registry.get(&id).config.clone();
        self.renderer.mount(&id, &config, &self.params.class);
        for file in sys_pathutil::list_entries(&spec.value) {
            self.attach(&id, &file);
        }
        self.update(&id);
        Ok(id)
    }

    /// A file was chosen for this field: guard the count limit, validate the
    /// extension against the accept filter, ship the file and handle the
    /// response. The count guard runs before any transport is attempted.
    ///
    /// Shipping holds no borrow of the manager, so selections on other
    /// fields and deletions stay usable while this one is in flight; drive
    /// `submit` / `handle_response` directly to interleave them.
    pub async fn select(&mut self, id: &str, file_name: &str, data: Bytes) {
        let Some(request) = self.submit(id, file_name, data) else {
            return;
        };
        let transport = Arc::clone(&self.transport);
        let raw = transport.send(&request.endpoint, request.payload).await;
        self.handle_response(id, &raw);
    }

    /// Guard and validate a selection, then hand back the prepared transport
    /// request with the field parked in `AwaitingResponse`. Returns `None`
    /// when the selection never reaches the server (read-only field, count
    /// limit, missing or rejected extension). Finish the attempt by feeding
    /// the raw response body to `handle_response`.
    pub fn submit(&mut self, id: &str, file_name: &str, data: Bytes) -> Option<UploadRequest> {
        let (name, limit, count, accept, read_only) = {
            let rec = self.registry.get(id);
            (
                rec.display_name.clone(),
                rec.config.multi,
                rec.files.len() as u32,
                rec.accept.clone(),
                rec.read_only,
            )
        };
        if read_only {
            log::debug!("selection on read-only field {id} ignored");
            return None;
        }
        if count >= limit {
            let err = UploadError::LimitExceeded { limit };
            (self.events.error)(&name, err.code(), &err.to_string());
            return None;
        }

        self.registry.get_mut(id).phase = Phase::Validating;
        let ext = sys_pathutil::file_ext(file_name).to_string();
        if ext.is_empty() {
            // A name without an extension never starts a submission.
            self.registry.get_mut(id).phase = Phase::Idle;
            return None;
        }
        if accept != "*" {
            let accepted = match accept_pattern(&accept) {
                Ok(re) => re.is_match(&ext),
                Err(e) => {
                    log::warn!("accept filter {accept:?} did not compile: {e}");
                    false
                }
            };
            if !accepted {
                self.registry.get_mut(id).phase = Phase::Idle;
                let err = UploadError::UnsupportedType { ext };
                (self.events.error)(&name, err.code(), &err.to_string());
                return None;
            }
        }

        self.registry.get_mut(id).phase = Phase::Submitting;
        let payload = match self.build_payload(id, file_name, data) {
            Ok(p) => p,
            Err(e) => {
                self.registry.get_mut(id).phase = Phase::Idle;
                log::error!("field {id} config did not serialize: {e}");
                return None;
            }
        };
        self.registry.get_mut(id).phase = Phase::AwaitingResponse;
        Some(UploadRequest {
            endpoint: self.params.upload.clone(),
            payload,
        })
    }

    /// The upload request: serialized config (with the field id under
    /// `field`), global extra fields, then the file keyed by the field id.
    fn build_payload(
        &self,
        id: &str,
        file_name: &str,
        data: Bytes,
    ) -> Result<MultipartPayload, serde_json::Error> {
        let rec = self.registry.get(id);
        let mut config = match serde_json::to_value(&rec.config)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        config.insert("field".to_string(), Value::String(id.to_string()));
        let mut fields = vec![(
            "config".to_string(),
            serde_json::to_string(&Value::Object(config))?,
        )];
        for (k, v) in &self.params.formdata {
            fields.push((k.clone(), v.clone()));
        }
        let content_type = mime_guess::from_path(file_name)
            .first_or_octet_stream()
            .to_string();
        Ok(MultipartPayload {
            fields,
            file: FilePart {
                name: id.to_string(),
                file_name: file_name.to_string(),
                content_type,
                data,
            },
        })
    }

    /// Interpret a raw response body and return the field to `Idle`.
    /// Non-negative codes attach the stored file; negative codes and
    /// malformed bodies report through `error`. `complete` fires either way.
    pub fn handle_response(&mut self, id: &str, raw: &str) {
        let name = self.registry.get(id).display_name.clone();
        match serde_json::from_str::<ServerReply>(raw) {
            Ok(reply) if reply.code >= 0 && reply.file.is_some() => {
                let file = reply.file.unwrap_or_default();
                let token = self.attach(id, &file);
                (self.events.valid)(&name, &file, reply.size.unwrap_or(0), reply.image);
                (self.events.complete)(&name, raw, Some(&token));
            }
            Ok(reply) if reply.code >= 0 => {
                // Success without a stored path is as unusable as garbage.
                let err = UploadError::ResponseParseFailure { raw: raw.to_string() };
                (self.events.error)(&name, err.code(), &err.to_string());
                (self.events.complete)(&name, raw, None);
            }
            Ok(reply) => {
                let err = UploadError::ServerRejected {
                    code: reply.code,
                    message: status_message(reply.code).to_string(),
                };
                (self.events.error)(&name, err.code(), &err.to_string());
                (self.events.complete)(&name, raw, None);
            }
            Err(_) => {
                let err = UploadError::ResponseParseFailure { raw: raw.to_string() };
                (self.events.error)(&name, err.code(), &err.to_string());
                (self.events.complete)(&name, raw, None);
            }
        }
        self.registry.get_mut(id).phase = Phase::Idle;
    }

    /// Append a stored file to the field and render its list item.
    /// Returns the fresh item token.
    pub fn attach(&mut self, id: &str, file: &str) -> String {
        let token = random_token();
        let (config, read_only) = {
            let rec = self.registry.get(id);
            (rec.config.clone(), rec.read_only)
        };
        self.renderer.attach_item(id, &token, file, &config, read_only);
        self.registry.get_mut(id).files.push(FileEntry {
            token: token.clone(),
            path: file.to_string(),
        });
        self.update(id);
        token
    }

    /// User-initiated removal. Independent of the submission lifecycle:
    /// drops the item, removes the first matching list entry, fires the
    /// fire-and-forget server notification and recomputes the status.
    pub fn delete(&mut self, id: &str, file: &str, token: &str) {
        if self.registry.get(id).read_only {
            log::debug!("delete on read-only field {id} ignored");
            return;
        }
        self.renderer.remove_item(id, token);
        let rec = self.registry.get_mut(id);
        if let Some(pos) = rec.files.iter().position(|f| f.path == file) {
            rec.files.remove(pos);
        }
        if !self.params.delete.is_empty() {
            let mut url = self.params.delete.clone();
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(&format!("file={}", url_encode(file)));
            url.push_str("&ajax=//");
            for (k, v) in &self.params.formdata {
                url.push_str(&format!("&{}={}", url_encode(k), url_encode(v)));
            }
            self.transport.notify_delete(&url);
        }
        self.update(id);
    }

    /// Recompute and publish the advisory `full`/`unmet` flag.
    pub fn update(&mut self, id: &str) {
        let status = self.registry.get(id).status();
        self.renderer.publish_status(id, status);
    }
}
