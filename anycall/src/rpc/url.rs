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

use std::{fmt, str::FromStr};

use thiserror::Error;
use uuid::Uuid;

use super::function::FunctionId;
use crate::peer::PeerId;

pub const URL_SCHEME: &str = "anycall";

/// The sole externalization of a callable reference:
/// `anycall://<peer-id>/functions/<function-id-hex>`.
///
/// The peer id must not contain `/`; the function id is 32 lowercase hex
/// characters.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FunctionUrl {
    peer: PeerId,
    function_id: FunctionId,
}

impl FunctionUrl {
    pub fn new(peer: PeerId, function_id: FunctionId) -> Self {
        Self { peer, function_id }
    }

    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    pub fn function_id(&self) -> FunctionId {
        self.function_id
    }
}

impl fmt::Display for FunctionUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/functions/{}", URL_SCHEME, self.peer, self.function_id)
    }
}

impl FromStr for FunctionUrl {
    type Err = UrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix(URL_SCHEME)
            .and_then(|rest| rest.strip_prefix("://"))
            .ok_or(UrlError::InvalidScheme)?;
        let (peer, path) = rest.split_once('/').ok_or(UrlError::InvalidPath)?;
        if peer.is_empty() {
            return Err(UrlError::EmptyPeerId);
        }
        let hex = path.strip_prefix("functions/").ok_or(UrlError::InvalidPath)?;
        if hex.contains('/') {
            return Err(UrlError::InvalidPath);
        }
        if hex.len() != 32 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(UrlError::InvalidFunctionId);
        }
        let uuid = Uuid::try_parse(hex).map_err(|_| UrlError::InvalidFunctionId)?;
        Ok(Self {
            peer: PeerId::from(peer),
            function_id: FunctionId::from_uuid(uuid),
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UrlError {
    #[error("not an anycall url")]
    InvalidScheme,
    #[error("not a url for a remote function")]
    InvalidPath,
    #[error("peer id segment is empty")]
    EmptyPeerId,
    #[error("function id is not 32 hex characters")]
    InvalidFunctionId,
}
