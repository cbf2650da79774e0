//! Large Message Objects.
//!
//! A message field whose JSON form reaches the size limit is written to
//! `<config_root>/temp/robots/<robot_id>/<id>.lmo` and replaced in the message
//! by a small reference record. Reading the message back swaps references for
//! the stored data.
//!
//! All behaviour is gated on the host advertising LMO support; without it the
//! store is a pass-through.

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{Error, Result};

pub const LMO_MAGIC: i64 = 0x1343B7E;
pub const LMO_VERSION: u8 = 0x01;
/// Default spill threshold, in serialized bytes.
pub const LMO_LIMIT: usize = 256 * 1024;
/// Bytes of the serialized value kept in the reference as a preview.
///
/// The cut never splits a UTF-8 character, so a head can be up to three
/// bytes shorter when a multibyte character straddles the boundary.
pub const LMO_HEAD: usize = 100;
pub const LMO_ID_LEN: usize = 26;

const ID_ALPHABET: &[u8; 32] = b"ybndrfg8ejkmcpqxot1uwisza345h769";

/// A reference record, and (only on disk) the value it stands for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LargeMessageObject {
    pub magic: i64,
    pub version: u8,
    pub id: String,
    pub head: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl LargeMessageObject {
    /// The in-message form: everything but `data`.
    pub fn to_reference(&self) -> Value {
        let mut map = Map::new();
        map.insert("magic".into(), Value::from(self.magic));
        map.insert("version".into(), Value::from(self.version));
        map.insert("id".into(), Value::from(self.id.clone()));
        map.insert("head".into(), Value::from(self.head.clone()));
        map.insert("size".into(), Value::from(self.size));
        Value::Object(map)
    }
}

/// 16 random bytes in a 32-symbol alphabet, 26 symbols long.
pub fn new_id() -> String {
    let bytes: [u8; 16] = rand::random();
    encode_id(&bytes)
}

fn encode_id(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(LMO_ID_LEN);
    let mut acc: u32 = 0;
    let mut bits = 0;
    for b in bytes {
        acc = (acc << 8) | u32::from(*b);
        bits += 8;
        while bits >= 5 {
            out.push(ID_ALPHABET[((acc >> (bits - 5)) & 0x1f) as usize] as char);
            bits -= 5;
        }
        acc &= (1 << bits) - 1;
    }
    if bits > 0 {
        out.push(ID_ALPHABET[((acc << (5 - bits)) & 0x1f) as usize] as char);
    }
    out.truncate(LMO_ID_LEN);
    out
}

/// True iff `id` could have come from [`new_id`].
pub fn valid_id(id: &str) -> bool {
    id.len() == LMO_ID_LEN && id.bytes().all(|b| ID_ALPHABET.contains(&b))
}

/// True iff `value` is an object whose `magic` equals [`LMO_MAGIC`], whether
/// the number was decoded as an integer or a float.
pub fn is_reference(value: &Value) -> bool {
    let Some(magic) = value.as_object().and_then(|m| m.get("magic")) else {
        return false;
    };
    match (magic.as_i64(), magic.as_f64()) {
        (Some(i), _) => i == LMO_MAGIC,
        (None, Some(f)) => f == LMO_MAGIC as f64,
        _ => false,
    }
}

/// The directory spilled values for `robot_id` live in.
pub fn robot_dir(config_root: &Path, robot_id: &str) -> PathBuf {
    config_root.join("temp").join("robots").join(robot_id)
}

/// File-backed spillover for one robot.
#[derive(Debug, Clone)]
pub struct LmoStore {
    enabled: bool,
    limit: usize,
    dir: PathBuf,
}

impl LmoStore {
    /// `enabled` is the host's LMO capability flag.
    pub fn new(enabled: bool, limit: usize, dir: impl Into<PathBuf>) -> Self {
        Self {
            enabled,
            limit,
            dir: dir.into(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `None` for ids that could escape the robot directory.
    fn file_for(&self, id: &str) -> Option<PathBuf> {
        valid_id(id).then(|| self.dir.join(format!("{id}.lmo")))
    }

    /// Spills `value` to disk if it is large enough and returns the reference.
    ///
    /// `Ok(None)` means the value stays inline: either LMO is disabled or the
    /// serialized value is under the limit.
    pub fn serialize(&self, value: &Value) -> Result<Option<LargeMessageObject>> {
        if !self.enabled {
            return Ok(None);
        }
        let data = serde_json::to_vec(value)?;
        if data.len() < self.limit {
            return Ok(None);
        }

        let id = new_id();
        let head = head_of(&data);
        let mut lmo = LargeMessageObject {
            magic: LMO_MAGIC,
            version: LMO_VERSION,
            id,
            head,
            size: data.len() as u64,
            data: Some(value.clone()),
        };

        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{}.lmo", lmo.id));
        fs::write(&path, serde_json::to_vec(&lmo)?)?;
        debug!(id = %lmo.id, size = lmo.size, path = %path.display(), "spilled large message object");

        lmo.data = None;
        Ok(Some(lmo))
    }

    /// Loads the value stored under `id`.
    ///
    /// A missing file or a malformed id is [`Error::LmoNotFound`]; the caller
    /// found a reference and needs the data behind it.
    pub fn deserialize(&self, id: &str) -> Result<Value> {
        let Some(path) = self.file_for(id) else {
            warn!(%id, "rejecting large message object id");
            return Err(Error::LmoNotFound(id.to_owned()));
        };
        let content = fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::LmoNotFound(id.to_owned()),
            _ => Error::Serialization(format!("reading {}: {e}", path.display())),
        })?;
        let lmo: LargeMessageObject = serde_json::from_slice(&content)?;
        Ok(lmo.data.unwrap_or(Value::Null))
    }

    /// Resolves a reference value found in a message.
    pub fn resolve(&self, reference: &Value) -> Result<Value> {
        let id = reference
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::Serialization("large message object reference has no id".into())
            })?;
        self.deserialize(id)
    }

    /// Replaces every oversized top-level field with its reference.
    pub fn pack_message(&self, msg: &mut Map<String, Value>) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        for value in msg.values_mut() {
            if let Some(lmo) = self.serialize(value)? {
                *value = lmo.to_reference();
            }
        }
        Ok(())
    }

    /// Replaces every top-level reference with the stored value.
    pub fn unpack_message(&self, msg: &mut Map<String, Value>) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        for value in msg.values_mut() {
            if is_reference(value) && value.get("id").and_then(Value::as_str).is_some() {
                *value = self.resolve(value)?;
            }
        }
        Ok(())
    }

    /// [`pack_message`](Self::pack_message) on raw message bytes.
    ///
    /// Messages smaller than the limit cannot hold an oversized field and are
    /// returned untouched.
    pub fn pack_message_bytes(&self, bytes: Vec<u8>) -> Result<Vec<u8>> {
        if !self.enabled || bytes.len() < self.limit {
            return Ok(bytes);
        }
        let mut msg: Map<String, Value> = serde_json::from_slice(&bytes)?;
        self.pack_message(&mut msg)?;
        Ok(serde_json::to_vec(&msg)?)
    }

    /// [`unpack_message`](Self::unpack_message) on raw message bytes.
    pub fn unpack_message_bytes(&self, bytes: Vec<u8>) -> Result<Vec<u8>> {
        if !self.enabled {
            return Ok(bytes);
        }
        let mut msg: Map<String, Value> = serde_json::from_slice(&bytes)?;
        self.unpack_message(&mut msg)?;
        Ok(serde_json::to_vec(&msg)?)
    }

    /// Removes the file behind `id`. Failures are logged and ignored.
    pub fn delete_by_id(&self, id: &str) {
        let Some(path) = self.file_for(id) else {
            warn!(%id, "not deleting large message object with a malformed id");
            return;
        };
        if let Err(err) = fs::remove_file(path) {
            if err.kind() != ErrorKind::NotFound {
                warn!(%id, error = %err, "could not delete large message object");
            }
        }
    }
}

/// The first [`LMO_HEAD`] bytes of `data`, shortened to a character boundary.
fn head_of(data: &[u8]) -> String {
    let mut end = data.len().min(LMO_HEAD);
    while end > 0 && std::str::from_utf8(&data[..end]).is_err() {
        end -= 1;
    }
    String::from_utf8_lossy(&data[..end]).into_owned()
}
