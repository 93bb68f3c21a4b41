// Copyright 2024. The Anycall Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

use bytes::Bytes;
use thiserror::Error;

use super::message::RpcMessage;

/// Pluggable encoding of [`RpcMessage`]s to and from opaque byte strings.
///
/// A codec must round-trip all four message kinds and any values user
/// callables accept or return. Both peers of a call must use the same codec.
pub trait ValueCodec: Send + Sync + 'static {
    fn encode(&self, message: &RpcMessage) -> Result<Bytes, CodecError>;
    fn decode(&self, payload: &[u8]) -> Result<RpcMessage, CodecError>;
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode rpc message: {0}")]
    Encode(anyhow::Error),
    #[error("failed to decode rpc message: {0}")]
    Decode(anyhow::Error),
}

/// The default codec: messages as JSON.
#[derive(Clone, Debug, Default)]
pub struct JsonCodec;

impl ValueCodec for JsonCodec {
    fn encode(&self, message: &RpcMessage) -> Result<Bytes, CodecError> {
        serde_json::to_vec(message)
            .map(Bytes::from)
            .map_err(|err| CodecError::Encode(err.into()))
    }

    fn decode(&self, payload: &[u8]) -> Result<RpcMessage, CodecError> {
        serde_json::from_slice(payload).map_err(|err| CodecError::Decode(err.into()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::rpc::message::CallId;

    #[test]
    fn json_codec_round_trips() {
        let codec = JsonCodec;
        let message = RpcMessage::CallReturn {
            call_id: CallId::random(),
            retval: json!({"greeting": "Hello World!"}),
        };
        let bytes = codec.encode(&message).unwrap();
        let decoded = codec.decode(&bytes).unwrap();
        match decoded {
            RpcMessage::CallReturn { retval, .. } => {
                assert_eq!(retval, json!({"greeting": "Hello World!"}))
            },
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn garbage_fails_to_decode() {
        let err = JsonCodec.decode(b"\x00\x01not json").unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
    }
}
