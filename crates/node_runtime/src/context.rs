use serde_json::Value;
use tracing::debug;

use crate::{document::PathDocument, error::Result};

/// A byte-to-byte step applied by [`Context::get_raw`] / [`Context::set_raw`].
///
/// Callers use these to request LMO unpacking on read or packing on write
/// without the context knowing about the spillover store.
pub type RawTransform<'a> = &'a (dyn Fn(Vec<u8>) -> Result<Vec<u8>> + Send + Sync);

/// What node code sees of the message it is handling.
pub trait Context: Send + Sync {
    /// The message id captured when the context was built.
    fn id(&self) -> &str;
    fn set(&mut self, path: &str, value: Value);
    fn get(&self, path: &str) -> Option<Value>;
    fn get_string(&self, path: &str) -> String;
    fn get_bool(&self, path: &str) -> bool;
    fn get_int(&self, path: &str) -> i64;
    fn get_float(&self, path: &str) -> f64;
    /// The raw message, passed through `transforms` in order.
    fn get_raw(&self, transforms: &[RawTransform<'_>]) -> Result<Vec<u8>>;
    /// Replaces the whole message with `bytes` after passing them through
    /// `transforms` in order.
    fn set_raw(&mut self, bytes: Vec<u8>, transforms: &[RawTransform<'_>]) -> Result<()>;
    fn is_empty(&self) -> bool;
}

/// The [`Context`] built for every inbound message.
///
/// Holds the parsed document and its raw bytes and keeps the two in step:
/// every `set` re-serializes, every `set_raw` re-parses.
#[derive(Debug, Clone, Default)]
pub struct MessageContext {
    id: String,
    raw: Vec<u8>,
    doc: PathDocument,
}

impl MessageContext {
    /// Builds a context from raw message bytes.
    ///
    /// Bytes that do not parse as a JSON object leave the context empty; no
    /// error is raised.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        let mut ctx = Self::default();
        ctx.replace_raw(data.into());
        ctx.id = ctx.doc.get_string("id");
        ctx
    }

    pub fn document(&self) -> &PathDocument {
        &self.doc
    }

    fn replace_raw(&mut self, data: Vec<u8>) {
        if data.is_empty() {
            self.doc = PathDocument::new();
            self.raw = data;
            return;
        }
        match PathDocument::parse(&data) {
            Ok(doc) => {
                self.doc = doc;
                self.raw = data;
            }
            Err(err) => {
                debug!(error = %err, len = data.len(), "message did not parse, using an empty document");
                self.doc = PathDocument::new();
                self.raw = Vec::new();
            }
        }
    }
}

impl Context for MessageContext {
    fn id(&self) -> &str {
        &self.id
    }

    fn set(&mut self, path: &str, value: Value) {
        self.doc.set(path, value);
        self.raw = self.doc.to_bytes();
    }

    fn get(&self, path: &str) -> Option<Value> {
        self.doc.get(path)
    }

    fn get_string(&self, path: &str) -> String {
        self.doc.get_string(path)
    }

    fn get_bool(&self, path: &str) -> bool {
        self.doc.get_bool(path)
    }

    fn get_int(&self, path: &str) -> i64 {
        self.doc.get_int(path)
    }

    fn get_float(&self, path: &str) -> f64 {
        self.doc.get_float(path)
    }

    fn get_raw(&self, transforms: &[RawTransform<'_>]) -> Result<Vec<u8>> {
        let mut out = if self.raw.is_empty() {
            self.doc.to_bytes()
        } else {
            self.raw.clone()
        };
        for transform in transforms {
            out = transform(out)?;
        }
        Ok(out)
    }

    fn set_raw(&mut self, bytes: Vec<u8>, transforms: &[RawTransform<'_>]) -> Result<()> {
        let mut data = bytes;
        for transform in transforms {
            data = transform(data)?;
        }
        self.replace_raw(data);
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.raw.is_empty() || self.doc.is_empty()
    }
}
