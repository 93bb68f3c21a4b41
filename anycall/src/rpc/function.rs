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

use std::{collections::HashMap, fmt, future::Future, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message::{RpcFailure, Value};

/// Stable identifier of a registered callable. Allocated the first time a
/// function's url is requested and permanent for the lifetime of the system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionId(Uuid);

impl FunctionId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub(crate) fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The reserved id of the liveness probe function. Deterministic, so
    /// every process uses the same id without coordination.
    pub(crate) fn ping() -> Self {
        Self(Uuid::new_v5(&Uuid::NAMESPACE_URL, b"ping"))
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Arguments of a single invocation: a positional list and a string-keyed
/// mapping.
#[derive(Clone, Debug, Default)]
pub struct CallArgs {
    pub args: Vec<Value>,
    pub kwargs: HashMap<String, Value>,
}

impl CallArgs {
    pub fn new(args: Vec<Value>, kwargs: HashMap<String, Value>) -> Self {
        Self { args, kwargs }
    }

    pub fn positional(args: Vec<Value>) -> Self {
        Self {
            args,
            kwargs: HashMap::new(),
        }
    }

    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    pub fn kwarg(&self, name: &str) -> Option<&Value> {
        self.kwargs.get(name)
    }

    /// Positional-or-keyword lookup: the argument at `index` if given
    /// positionally, otherwise the keyword argument `name`.
    pub fn get(&self, index: usize, name: &str) -> Option<&Value> {
        self.arg(index).or_else(|| self.kwarg(name))
    }
}

/// A local procedure that can be invoked from remote.
#[async_trait]
pub trait RpcCallable: Send + Sync {
    async fn call(&self, args: CallArgs) -> Result<Value, RpcFailure>;
}

/// A registrable callable.
///
/// Registration identity is the underlying allocation: clones of one
/// `RpcFunction` map to the same function id, two `RpcFunction`s built from
/// the same closure do not.
#[derive(Clone)]
pub struct RpcFunction {
    inner: Arc<dyn RpcCallable>,
}

impl RpcFunction {
    /// Wrap an async closure.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(CallArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, RpcFailure>> + Send + 'static,
    {
        Self {
            inner: Arc::new(FnCallable { f }),
        }
    }

    pub fn from_callable<C: RpcCallable + 'static>(callable: C) -> Self {
        Self {
            inner: Arc::new(callable),
        }
    }

    pub(crate) async fn call(&self, args: CallArgs) -> Result<Value, RpcFailure> {
        self.inner.call(args).await
    }

    pub(crate) fn registry_key(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }
}

impl fmt::Debug for RpcFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RpcFunction({:#x})", self.registry_key())
    }
}

struct FnCallable<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> RpcCallable for FnCallable<F>
where
    F: Fn(CallArgs) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, RpcFailure>> + Send + 'static,
{
    async fn call(&self, args: CallArgs) -> Result<Value, RpcFailure> {
        (self.f)(args).await
    }
}

/// Bidirectional map of function ids to callables.
#[derive(Default)]
pub(crate) struct FunctionRegistry {
    by_id: HashMap<FunctionId, RpcFunction>,
    ids_by_key: HashMap<usize, FunctionId>,
}

impl FunctionRegistry {
    /// The id of `function`, allocating one on first sight. Idempotent for
    /// the same callable reference.
    pub fn get_or_assign(&mut self, function: &RpcFunction) -> FunctionId {
        if let Some(id) = self.ids_by_key.get(&function.registry_key()) {
            return *id;
        }
        let id = FunctionId::random();
        self.by_id.insert(id, function.clone());
        self.ids_by_key.insert(function.registry_key(), id);
        id
    }

    pub fn get(&self, id: FunctionId) -> Option<RpcFunction> {
        self.by_id.get(&id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn hello() -> RpcFunction {
        RpcFunction::new(|_args| async move { Ok(json!("Hello World!")) })
    }

    #[test]
    fn id_assignment_is_idempotent_per_function() {
        let mut registry = FunctionRegistry::default();
        let f = hello();
        let id1 = registry.get_or_assign(&f);
        let id2 = registry.get_or_assign(&f);
        let id3 = registry.get_or_assign(&f.clone());
        assert_eq!(id1, id2);
        assert_eq!(id1, id3);
    }

    #[test]
    fn distinct_functions_get_distinct_ids() {
        let mut registry = FunctionRegistry::default();
        let id1 = registry.get_or_assign(&hello());
        let id2 = registry.get_or_assign(&hello());
        assert_ne!(id1, id2);
    }

    #[test]
    fn unknown_id_resolves_to_none() {
        let registry = FunctionRegistry::default();
        assert!(registry.get(FunctionId::random()).is_none());
    }

    #[test]
    fn ping_id_is_deterministic() {
        assert_eq!(FunctionId::ping(), FunctionId::ping());
        assert_ne!(FunctionId::ping(), FunctionId::random());
    }

    #[tokio::test]
    async fn call_args_support_positional_or_keyword() {
        let args = CallArgs::new(
            vec![json!("World")],
            [("polite".to_string(), json!(true))].into_iter().collect(),
        );
        assert_eq!(args.get(0, "entity"), Some(&json!("World")));
        assert_eq!(args.get(1, "polite"), Some(&json!(true)));
        assert_eq!(args.get(2, "missing"), None);

        let f = RpcFunction::new(|args: CallArgs| async move {
            let entity = args
                .get(0, "entity")
                .and_then(Value::as_str)
                .unwrap_or("nobody")
                .to_owned();
            Ok(json!(format!("Hello {}!", entity)))
        });
        let result = f.call(CallArgs::positional(vec![json!("World")])).await.unwrap();
        assert_eq!(result, json!("Hello World!"));
    }
}
