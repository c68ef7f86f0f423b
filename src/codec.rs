//! Codec registry: content-type keyed decode/encode functions.
//!
//! Expectations consult decoders when matching decoded bodies; the response
//! resolver consults encoders when a response body is a (content-type, value)
//! pair. A missing decoder makes a body matcher fail closed; a missing encoder
//! is a configuration error at response-build time.

use crate::error::CodecError;
use crate::request::{media_type, parse_query_string};
use serde_json::Value;
use std::sync::{Arc, RwLock};

/// Decodes raw body bytes into a matchable value.
pub type Decoder = Arc<dyn Fn(&[u8]) -> Result<Value, CodecError> + Send + Sync>;

/// Encodes a configured value into response body bytes.
pub type Encoder = Arc<dyn Fn(&Value) -> Result<Vec<u8>, CodecError> + Send + Sync>;

/// Registry of decoders and encoders keyed by media type.
///
/// Media types are compared without parameters and case-insensitively, so a
/// decoder registered for `application/json` handles
/// `Application/JSON; charset=utf-8`. Registration may happen after
/// expectations are declared; lookups always see the latest registration.
#[derive(Default)]
pub struct CodecRegistry {
    decoders: RwLock<Vec<(String, Decoder)>>,
    encoders: RwLock<Vec<(String, Encoder)>>,
}

impl CodecRegistry {
    /// Empty registry with no codecs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the stock codecs for `application/json`,
    /// `text/plain`, and `application/x-www-form-urlencoded`.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register_decoder("application/json", json_decoder());
        registry.register_encoder("application/json", json_encoder());
        registry.register_decoder("text/plain", text_decoder());
        registry.register_encoder("text/plain", text_encoder());
        registry.register_decoder("application/x-www-form-urlencoded", form_decoder());
        registry.register_encoder("application/x-www-form-urlencoded", form_encoder());
        registry
    }

    /// Register (or replace) the decoder for a content type.
    pub fn register_decoder(&self, content_type: &str, decoder: Decoder) {
        let key = media_type(content_type);
        let mut decoders = self.decoders.write().expect("codec registry poisoned");
        if let Some(entry) = decoders.iter_mut().find(|(ct, _)| *ct == key) {
            entry.1 = decoder;
        } else {
            decoders.push((key, decoder));
        }
    }

    /// Register (or replace) the encoder for a content type.
    pub fn register_encoder(&self, content_type: &str, encoder: Encoder) {
        let key = media_type(content_type);
        let mut encoders = self.encoders.write().expect("codec registry poisoned");
        if let Some(entry) = encoders.iter_mut().find(|(ct, _)| *ct == key) {
            entry.1 = encoder;
        } else {
            encoders.push((key, encoder));
        }
    }

    /// Find the decoder for a content type, if one is registered.
    pub fn decoder(&self, content_type: &str) -> Option<Decoder> {
        let key = media_type(content_type);
        self.decoders
            .read()
            .expect("codec registry poisoned")
            .iter()
            .find(|(ct, _)| *ct == key)
            .map(|(_, d)| Arc::clone(d))
    }

    /// Find the encoder for a content type, if one is registered.
    pub fn encoder(&self, content_type: &str) -> Option<Encoder> {
        let key = media_type(content_type);
        self.encoders
            .read()
            .expect("codec registry poisoned")
            .iter()
            .find(|(ct, _)| *ct == key)
            .map(|(_, e)| Arc::clone(e))
    }

    /// Decode the bytes with the decoder for `content_type`, or `None` when no
    /// decoder is registered or the decoder fails. Used by body matchers,
    /// which fail closed rather than erroring.
    pub fn try_decode(&self, content_type: &str, bytes: &[u8]) -> Option<Value> {
        let decoder = self.decoder(content_type)?;
        decoder(bytes).ok()
    }
}

/// Stock decoder: parse the body as JSON.
pub fn json_decoder() -> Decoder {
    Arc::new(|bytes| {
        serde_json::from_slice(bytes).map_err(|e| CodecError::new(format!("invalid json: {}", e)))
    })
}

/// Stock encoder: serialize the value as JSON.
pub fn json_encoder() -> Encoder {
    Arc::new(|value| {
        serde_json::to_vec(value).map_err(|e| CodecError::new(format!("json encode: {}", e)))
    })
}

/// Stock decoder: UTF-8 text becomes a string value.
pub fn text_decoder() -> Decoder {
    Arc::new(|bytes| {
        std::str::from_utf8(bytes)
            .map(|s| Value::String(s.to_string()))
            .map_err(|e| CodecError::new(format!("invalid utf-8: {}", e)))
    })
}

/// Stock encoder: a string value becomes its UTF-8 bytes; other values render
/// as JSON text.
pub fn text_encoder() -> Encoder {
    Arc::new(|value| match value {
        Value::String(s) => Ok(s.clone().into_bytes()),
        other => serde_json::to_vec(other).map_err(|e| CodecError::new(e.to_string())),
    })
}

/// Stock decoder: url-encoded form fields become a string-valued object.
pub fn form_decoder() -> Decoder {
    Arc::new(|bytes| {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| CodecError::new(format!("invalid utf-8: {}", e)))?;
        let mut object = serde_json::Map::new();
        for (name, value) in parse_query_string(text) {
            object.insert(name, Value::String(value));
        }
        Ok(Value::Object(object))
    })
}

/// Stock encoder: a string-valued object becomes url-encoded form fields.
pub fn form_encoder() -> Encoder {
    Arc::new(|value| {
        let object = value
            .as_object()
            .ok_or_else(|| CodecError::new("form body must be an object"))?;
        let mut fields = Vec::with_capacity(object.len());
        for (name, value) in object {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            fields.push(format!("{}={}", urlencode(name), urlencode(&rendered)));
        }
        Ok(fields.join("&").into_bytes())
    })
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b' ' => out.push('+'),
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_ignores_parameters_and_case() {
        let registry = CodecRegistry::with_defaults();
        assert!(registry.decoder("Application/JSON; charset=utf-8").is_some());
        assert!(registry.encoder("TEXT/PLAIN").is_some());
        assert!(registry.decoder("application/xml").is_none());
    }

    #[test]
    fn test_registration_replaces_existing() {
        let registry = CodecRegistry::with_defaults();
        registry.register_decoder(
            "application/json",
            Arc::new(|_| Ok(Value::String("fixed".to_string()))),
        );

        let decoded = registry.try_decode("application/json", b"{}").unwrap();
        assert_eq!(decoded, json!("fixed"));
    }

    #[test]
    fn test_json_round_trip() {
        let registry = CodecRegistry::with_defaults();
        let original = json!({"name": "stan", "count": 3});

        let bytes = registry.encoder("application/json").unwrap()(&original).unwrap();
        let decoded = registry.try_decode("application/json", &bytes).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_form_round_trip() {
        let registry = CodecRegistry::with_defaults();
        let original = json!({"name": "John Doe", "tag": "a&b"});

        let bytes = registry.encoder("application/x-www-form-urlencoded").unwrap()(&original)
            .unwrap();
        let decoded = registry
            .try_decode("application/x-www-form-urlencoded", &bytes)
            .unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_try_decode_fails_closed() {
        let registry = CodecRegistry::with_defaults();
        assert!(registry.try_decode("application/json", b"not json").is_none());
        assert!(registry.try_decode("application/xml", b"<x/>").is_none());
    }

    #[test]
    fn test_text_encoder_passes_strings_through() {
        let encoder = text_encoder();
        assert_eq!(encoder(&json!("hi")).unwrap(), b"hi");
    }
}
