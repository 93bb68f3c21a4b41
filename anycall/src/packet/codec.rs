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

use std::sync::Arc;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::{
    error::PacketError,
    types::{Packet, TypeRegistry, TypeTag},
};

/// Default upper bound on a single frame's payload.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

const LENGTH_WIDTH: usize = 4;
const HEADER_LEN: usize = TypeTag::WIDTH + LENGTH_WIDTH;

/// Encodes and decodes packets on a single byte stream.
///
/// Used through `tokio_util::codec::Framed`. Decoding resolves the type tag
/// against the registry the codec was built with; an unknown tag or an
/// oversized frame is an error, and any decode error is fatal to the stream.
#[derive(Clone, Debug)]
pub struct PacketCodec {
    registry: Arc<TypeRegistry>,
    max_frame_size: usize,
}

impl PacketCodec {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }
}

impl Decoder for PacketCodec {
    type Error = PacketError;
    type Item = Packet;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, PacketError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        // Peek the header without consuming until the whole frame is buffered
        let mut tag_buf = [0u8; TypeTag::WIDTH];
        tag_buf.copy_from_slice(&src[..TypeTag::WIDTH]);
        let tag = TypeTag::from_be_bytes(tag_buf);

        let mut len_buf = [0u8; LENGTH_WIDTH];
        len_buf.copy_from_slice(&src[TypeTag::WIDTH..HEADER_LEN]);
        let length = u32::from_be_bytes(len_buf) as usize;

        if length > self.max_frame_size {
            return Err(PacketError::MaxFrameSizeExceeded {
                size: length,
                max: self.max_frame_size,
            });
        }

        if src.len() < HEADER_LEN + length {
            src.reserve(HEADER_LEN + length - src.len());
            return Ok(None);
        }

        let type_name = self
            .registry
            .resolve(tag)
            .cloned()
            .ok_or(PacketError::UnknownTypeTag { tag })?;

        src.advance(HEADER_LEN);
        let payload = src.split_to(length).freeze();
        Ok(Some(Packet { type_name, payload }))
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = PacketError;

    fn encode(&mut self, packet: Packet, dst: &mut BytesMut) -> Result<(), PacketError> {
        if packet.payload.len() > self.max_frame_size {
            return Err(PacketError::MaxFrameSizeExceeded {
                size: packet.payload.len(),
                max: self.max_frame_size,
            });
        }
        let tag = TypeTag::derive(packet.type_name.as_str());
        match self.registry.resolve(tag) {
            Some(registered) if registered.as_str() == packet.type_name.as_str() => {},
            _ => {
                return Err(PacketError::UnregisteredType {
                    name: packet.type_name,
                })
            },
        }

        dst.reserve(HEADER_LEN + packet.payload.len());
        dst.put_u32(tag.as_u32());
        dst.put_u32(packet.payload.len() as u32);
        dst.put_slice(&packet.payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn codec_with(names: &[&str]) -> PacketCodec {
        let mut registry = TypeRegistry::new();
        for name in names {
            registry.register(name).unwrap();
        }
        PacketCodec::new(Arc::new(registry))
    }

    #[test]
    fn it_round_trips_a_packet() {
        let mut codec = codec_with(&["greeting"]);
        let mut buf = BytesMut::new();
        codec
            .encode(Packet::new("greeting", Bytes::from_static(b"hello")), &mut buf)
            .unwrap();

        let packet = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(packet.type_name.as_str(), "greeting");
        assert_eq!(&packet.payload[..], b"hello");
        assert!(buf.is_empty());
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn it_decodes_back_to_back_frames() {
        let mut codec = codec_with(&["a", "b"]);
        let mut buf = BytesMut::new();
        codec.encode(Packet::new("a", Bytes::from_static(b"1")), &mut buf).unwrap();
        codec.encode(Packet::new("b", Bytes::from_static(b"22")), &mut buf).unwrap();

        let first = codec.decode(&mut buf).unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.type_name.as_str(), "a");
        assert_eq!(second.type_name.as_str(), "b");
        assert_eq!(&second.payload[..], b"22");
    }

    #[test]
    fn it_waits_for_a_complete_frame() {
        let mut codec = codec_with(&["greeting"]);
        let mut full = BytesMut::new();
        codec
            .encode(Packet::new("greeting", Bytes::from_static(b"hello world")), &mut full)
            .unwrap();

        // Feed the frame one byte at a time; only the final byte yields a packet
        let mut buf = BytesMut::new();
        let total = full.len();
        for (i, byte) in full.iter().enumerate() {
            buf.put_u8(*byte);
            let decoded = codec.decode(&mut buf).unwrap();
            if i + 1 < total {
                assert!(decoded.is_none());
            } else {
                assert_eq!(&decoded.unwrap().payload[..], b"hello world");
            }
        }
    }

    #[test]
    fn unknown_tag_is_fatal() {
        let mut sender = codec_with(&["only-i-know-this"]);
        let mut buf = BytesMut::new();
        sender
            .encode(Packet::new("only-i-know-this", Bytes::from_static(b"x")), &mut buf)
            .unwrap();

        let mut receiver = codec_with(&["something-else"]);
        match receiver.decode(&mut buf) {
            Err(PacketError::UnknownTypeTag { .. }) => {},
            other => panic!("expected UnknownTypeTag, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn unregistered_type_cannot_be_sent() {
        let mut codec = codec_with(&["known"]);
        let mut buf = BytesMut::new();
        let result = codec.encode(Packet::new("unknown", Bytes::new()), &mut buf);
        match result {
            Err(PacketError::UnregisteredType { name }) => assert_eq!(name.as_str(), "unknown"),
            other => panic!("expected UnregisteredType, got {:?}", other),
        }
    }

    #[test]
    fn oversize_frames_are_rejected() {
        let mut codec = codec_with(&["big"]).with_max_frame_size(8);
        let mut buf = BytesMut::new();
        let result = codec.encode(Packet::new("big", Bytes::from(vec![0u8; 9])), &mut buf);
        assert!(matches!(result, Err(PacketError::MaxFrameSizeExceeded { size: 9, max: 8 })));

        // A forged oversize header is rejected on decode as well
        let mut forged = BytesMut::new();
        forged.put_u32(TypeTag::derive("big").as_u32());
        forged.put_u32(9);
        let result = codec.decode(&mut forged);
        assert!(matches!(result, Err(PacketError::MaxFrameSizeExceeded { size: 9, max: 8 })));
    }
}
