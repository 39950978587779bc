use std::fs;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::PersistError;
use crate::ids::ModelId;
use crate::model::{AnyModel, ModelExt};

/// One model's persisted state: its type tag, its id, and its fields with
/// every reference field reduced to target ids.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "$type")]
    pub type_tag: String,
    #[serde(rename = "$id")]
    pub id: ModelId,
    pub fields: serde_json::Value,
}

impl Envelope {
    pub fn from_model<M: AnyModel + ?Sized>(model: &M) -> Result<Self, PersistError> {
        let fields = model.to_fields().map_err(|e| PersistError::Malformed {
            id: model.id().clone(),
            message: e.to_string(),
        })?;
        Ok(Envelope {
            type_tag: model.type_tag().to_string(),
            id: model.id().clone(),
            fields,
        })
    }

    /// `<id>.json`, or an error when the id would escape the directory.
    pub fn file_name(&self) -> Result<String, PersistError> {
        let id = self.id.as_str();
        let invalid = id.is_empty()
            || id == "."
            || id == ".."
            || id.contains(['/', '\\', '\0']);
        if invalid {
            return Err(PersistError::InvalidFileName(self.id.clone()));
        }
        Ok(format!("{}.json", id))
    }
}

/// Compact form: fields travel as JSON text since bitcode has no
/// self-describing values.
#[derive(Serialize, Deserialize)]
struct CompactEnvelope {
    type_tag: String,
    id: String,
    fields: String,
}

/// Many envelopes in save order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub envelopes: Vec<Envelope>,
}

impl Bundle {
    pub fn new(envelopes: Vec<Envelope>) -> Self {
        Bundle { envelopes }
    }

    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }

    pub fn get(&self, id: &ModelId) -> Option<&Envelope> {
        self.envelopes.iter().find(|envelope| &envelope.id == id)
    }

    pub fn ids(&self) -> Vec<ModelId> {
        self.envelopes.iter().map(|e| e.id.clone()).collect()
    }

    pub fn to_json(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, PersistError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, PersistError> {
        let compact = self
            .envelopes
            .iter()
            .map(|envelope| -> Result<CompactEnvelope, PersistError> {
                Ok(CompactEnvelope {
                    type_tag: envelope.type_tag.clone(),
                    id: envelope.id.to_string(),
                    fields: serde_json::to_string(&envelope.fields)?,
                })
            })
            .collect::<Result<Vec<_>, PersistError>>()?;
        Ok(bitcode::serialize(&compact)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PersistError> {
        let compact: Vec<CompactEnvelope> = bitcode::deserialize(bytes)?;
        let envelopes = compact
            .into_iter()
            .map(|entry| -> Result<Envelope, PersistError> {
                let id = ModelId::from(entry.id);
                let fields = serde_json::from_str(&entry.fields).map_err(|e| {
                    PersistError::Malformed {
                        id: id.clone(),
                        message: e.to_string(),
                    }
                })?;
                Ok(Envelope {
                    type_tag: entry.type_tag,
                    id,
                    fields,
                })
            })
            .collect::<Result<Vec<_>, PersistError>>()?;
        Ok(Bundle { envelopes })
    }

    pub fn to_base64(&self) -> Result<String, PersistError> {
        Ok(STANDARD.encode(self.to_bytes()?))
    }

    pub fn from_base64(text: &str) -> Result<Self, PersistError> {
        let bytes = STANDARD.decode(text.trim())?;
        Self::from_bytes(&bytes)
    }

    /// Writes one `<id>.json` file per envelope into `dir`, creating it if
    /// needed. Files of models not in the bundle are left alone.
    pub fn write_dir(&self, dir: impl AsRef<Path>, pretty: bool) -> Result<Vec<PathBuf>, PersistError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;

        let mut written = Vec::with_capacity(self.envelopes.len());
        for envelope in &self.envelopes {
            let path = dir.join(envelope.file_name()?);
            let json = if pretty {
                serde_json::to_string_pretty(envelope)?
            } else {
                serde_json::to_string(envelope)?
            };
            fs::write(&path, json).map_err(|e| io_error(&path, e))?;
            written.push(path);
        }

        debug!(dir = %dir.display(), count = written.len(), "wrote model files");
        Ok(written)
    }

    /// Reads every `*.json` file in `dir`, ordered by file name.
    pub fn read_dir(dir: impl AsRef<Path>) -> Result<Self, PersistError> {
        let dir = dir.as_ref();
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir).map_err(|e| io_error(dir, e))? {
            let path = entry.map_err(|e| io_error(dir, e))?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut envelopes = Vec::with_capacity(paths.len());
        for path in paths {
            let json = fs::read_to_string(&path).map_err(|e| io_error(&path, e))?;
            let envelope: Envelope = serde_json::from_str(&json).map_err(|e| {
                let stem = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                PersistError::Malformed {
                    id: ModelId::from(stem),
                    message: e.to_string(),
                }
            })?;
            envelopes.push(envelope);
        }

        debug!(dir = %dir.display(), count = envelopes.len(), "read model files");
        Ok(Bundle { envelopes })
    }
}

impl FromIterator<Envelope> for Bundle {
    fn from_iter<I: IntoIterator<Item = Envelope>>(iter: I) -> Self {
        Bundle {
            envelopes: iter.into_iter().collect(),
        }
    }
}

fn io_error(path: &Path, err: std::io::Error) -> PersistError {
    PersistError::Io {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}
