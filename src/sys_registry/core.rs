//! Field records and the registry that owns them. No HTTP types here.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::sys_pathutil;

/// Opaque token identifying one bound field for its whole lifetime.
pub type FieldId = String;

/// How attached files are presented: a plain file list or thumbnails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderModel {
    #[default]
    List,
    Pics,
}

/// Advisory flag reporting whether a field has reached its attachment limit.
/// Not an enforcement mechanism; the selection guard is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldStatus {
    Full,
    Unmet,
}

impl FieldStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldStatus::Full => "full",
            FieldStatus::Unmet => "unmet",
        }
    }
}

/// Lifecycle phase of a field's current submission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Validating,
    Submitting,
    AwaitingResponse,
}

fn default_multi() -> u32 {
    1
}

/// Per-field configuration: the recognized keys plus passthrough keys
/// (`remote`, `crop`, `thumb`, `watermark`, ...) that are forwarded to the
/// server verbatim and have no client-side effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConfig {
    /// Maximum number of attached files, always at least 1.
    #[serde(default = "default_multi")]
    pub multi: u32,
    #[serde(default)]
    pub model: RenderModel,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for FieldConfig {
    fn default() -> Self {
        FieldConfig {
            multi: 1,
            model: RenderModel::List,
            extra: Map::new(),
        }
    }
}

impl FieldConfig {
    /// Merge per-field overrides over the defaults. Shallow: later keys win
    /// on exact matches, nested objects are replaced, not merged.
    pub fn merged(overrides: &Map<String, Value>) -> Result<FieldConfig, serde_json::Error> {
        let base = serde_json::to_value(FieldConfig::default())?;
        let base = base.as_object().cloned().unwrap_or_default();
        let joined = sys_pathutil::merge(&[&base, overrides]);
        serde_json::from_value(Value::Object(joined))
    }
}

/// One attached file and the token tying it to its rendered list item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub token: String,
    pub path: String,
}

/// Everything known about one bound field.
#[derive(Debug, Clone)]
pub struct FieldRecord {
    pub id: FieldId,
    /// Original input name, used in callback reporting.
    pub display_name: String,
    /// Ordered attached files; the source of truth for the field's value.
    pub files: Vec<FileEntry>,
    pub config: FieldConfig,
    /// MIME pattern list, `"*"` meaning unrestricted.
    pub accept: String,
    /// A read-only field accepts no new uploads and no deletions.
    pub read_only: bool,
    pub phase: Phase,
}

impl FieldRecord {
    pub fn file_paths(&self) -> Vec<String> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }

    /// The field's value flattened to the `||`-delimited form string.
    pub fn value(&self) -> String {
        self.files
            .iter()
            .fold(String::new(), |acc, f| sys_pathutil::list_append(&acc, &f.path))
    }

    pub fn status(&self) -> FieldStatus {
        if self.read_only || self.files.len() as u32 == self.config.multi {
            FieldStatus::Full
        } else {
            FieldStatus::Unmet
        }
    }
}

/// 13 lowercase hex chars, the shape of the original widget's random ids.
pub fn random_token() -> String {
    let n: u64 = rand::random();
    format!("{:013x}", n >> 12)
}

/// Owned mapping from field id to field record. One per upload manager;
/// nothing process-wide.
#[derive(Debug, Default)]
pub struct FieldRegistry {
    fields: HashMap<FieldId, FieldRecord>,
}

impl FieldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a record for a newly bound field and return its fresh id.
    pub fn register(
        &mut self,
        display_name: &str,
        accept: Option<&str>,
        overrides: Option<&Map<String, Value>>,
        read_only: bool,
    ) -> Result<FieldId, serde_json::Error> {
        let config = match overrides {
            Some(map) => FieldConfig::merged(map)?,
            None => FieldConfig::default(),
        };
        let mut id = format!("file{}", random_token());
        while self.fields.contains_key(&id) {
            id = format!("file{}", random_token());
        }
        self.fields.insert(
            id.clone(),
            FieldRecord {
                id: id.clone(),
                display_name: display_name.to_string(),
                files: Vec::new(),
                config,
                accept: accept.unwrap_or("*").to_string(),
                read_only,
                phase: Phase::Idle,
            },
        );
        Ok(id)
    }

    /// Look up a record. An unknown id is a caller bug, not a runtime
    /// condition, and aborts loudly.
    pub fn get(&self, id: &str) -> &FieldRecord {
        match self.fields.get(id) {
            Some(rec) => rec,
            None => panic!("lookup of unregistered field id {id:?}"),
        }
    }

    pub fn get_mut(&mut self, id: &str) -> &mut FieldRecord {
        match self.fields.get_mut(id) {
            Some(rec) => rec,
            None => panic!("lookup of unregistered field id {id:?}"),
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
