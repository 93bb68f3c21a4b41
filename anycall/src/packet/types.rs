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

use std::{collections::HashMap, fmt, sync::Arc};

use blake2::{Blake2b512, Digest};
use bytes::Bytes;

use super::error::PacketError;

/// Name of a packet type. Cheap to clone.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeName(Arc<str>);

impl TypeName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TypeName {
    fn from(name: &str) -> Self {
        Self(Arc::from(name))
    }
}

/// The fixed-width wire tag of a packet type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeTag(u32);

impl TypeTag {
    pub const WIDTH: usize = 4;

    /// Derive the tag for a type name: the first four bytes of the
    /// BLAKE2b-512 digest of the name, interpreted big-endian. All peers must
    /// agree on this derivation for their tags to line up on the wire.
    pub fn derive(name: &str) -> Self {
        let digest = Blake2b512::digest(name.as_bytes());
        let mut buf = [0u8; Self::WIDTH];
        buf.copy_from_slice(&digest[..Self::WIDTH]);
        Self(u32::from_be_bytes(buf))
    }

    pub fn from_be_bytes(bytes: [u8; Self::WIDTH]) -> Self {
        Self(u32::from_be_bytes(bytes))
    }

    pub fn to_be_bytes(self) -> [u8; Self::WIDTH] {
        self.0.to_be_bytes()
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// A single decoded packet.
#[derive(Clone, Debug)]
pub struct Packet {
    pub type_name: TypeName,
    pub payload: Bytes,
}

impl Packet {
    pub fn new<T: Into<TypeName>>(type_name: T, payload: Bytes) -> Self {
        Self {
            type_name: type_name.into(),
            payload,
        }
    }
}

/// The set of packet types a stream understands.
///
/// Registration is idempotent for the same name; two distinct names hashing
/// to the same tag is a [`PacketError::TagCollision`]. The registry is frozen
/// (shared behind an `Arc`) once the owning pool opens.
#[derive(Clone, Debug, Default)]
pub struct TypeRegistry {
    by_tag: HashMap<TypeTag, TypeName>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn register(&mut self, name: &str) -> Result<TypeTag, PacketError> {
        let tag = TypeTag::derive(name);
        match self.by_tag.get(&tag) {
            Some(existing) if existing.as_str() == name => Ok(tag),
            Some(existing) => Err(PacketError::TagCollision {
                first: existing.clone(),
                second: name.into(),
                tag,
            }),
            None => {
                self.by_tag.insert(tag, name.into());
                Ok(tag)
            },
        }
    }

    pub fn resolve(&self, tag: TypeTag) -> Option<&TypeName> {
        self.by_tag.get(&tag)
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.resolve(TypeTag::derive(name))
            .map(|existing| existing.as_str() == name)
            .unwrap_or(false)
    }
}
