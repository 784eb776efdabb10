// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Serialization adapter between host values and JSON text.
//
// The codec works on `serde_json::Value` so it can live behind a trait object;
// typed helpers come from `JsonCodecExt`.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Pluggable JSON text encoder/decoder.
pub trait JsonCodec: Send + Sync {
    fn encode(&self, value: &Value) -> serde_json::Result<String>;
    fn decode(&self, text: &str) -> serde_json::Result<Value>;
}

/// Compact `serde_json` output. Used unless a bridge is given another codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerdeJsonCodec;

impl JsonCodec for SerdeJsonCodec {
    fn encode(&self, value: &Value) -> serde_json::Result<String> {
        serde_json::to_string(value)
    }

    fn decode(&self, text: &str) -> serde_json::Result<Value> {
        serde_json::from_str(text)
    }
}

/// Typed conversions on top of any [`JsonCodec`].
pub trait JsonCodecExt: JsonCodec {
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> serde_json::Result<String> {
        self.encode(&serde_json::to_value(value)?)
    }

    fn deserialize<T: DeserializeOwned>(&self, text: &str) -> serde_json::Result<T> {
        serde_json::from_value(self.decode(text)?)
    }
}

impl<C: JsonCodec + ?Sized> JsonCodecExt for C {}
