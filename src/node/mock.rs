//! Scripted in-memory node for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use super::{GraphQl, JsonRpc, NodeError, RpcCall};

enum Reply {
    Ready(Result<Value, NodeError>),
    /// Never answers; the caller must drop the request future.
    Hang,
}

/// Answers queued replies per method and records every request it sees.
/// A request with no queued reply fails with a transport error.
#[derive(Default)]
pub(crate) struct MockNode {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    batch_replies: Mutex<VecDeque<Vec<Result<Value, NodeError>>>>,
    graphql_replies: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<RpcCall>>,
    batches: Mutex<Vec<Vec<RpcCall>>>,
    queries: Mutex<Vec<String>>,
}

impl MockNode {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn expect(&self, method: &str, reply: Value) {
        self.push(method, Reply::Ready(Ok(reply)));
    }

    pub fn expect_err(&self, method: &str, err: NodeError) {
        self.push(method, Reply::Ready(Err(err)));
    }

    pub fn expect_hang(&self, method: &str) {
        self.push(method, Reply::Hang);
    }

    pub fn expect_batch(&self, replies: Vec<Result<Value, NodeError>>) {
        self.batch_replies.lock().unwrap().push_back(replies);
    }

    pub fn expect_query(&self, body: &str) {
        self.graphql_replies
            .lock()
            .unwrap()
            .push_back(body.to_string());
    }

    fn push(&self, method: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry(method.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn calls(&self) -> Vec<RpcCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.method).collect()
    }

    pub fn batches(&self) -> Vec<Vec<RpcCall>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    /// Total round trips issued through either capability.
    pub fn round_trips(&self) -> usize {
        self.calls.lock().unwrap().len()
            + self.batches.lock().unwrap().len()
            + self.queries.lock().unwrap().len()
    }
}

#[async_trait]
impl JsonRpc for MockNode {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, NodeError> {
        self.calls
            .lock()
            .unwrap()
            .push(RpcCall::new(method, params));

        let reply = self
            .replies
            .lock()
            .unwrap()
            .get_mut(method)
            .and_then(|queue| queue.pop_front());

        match reply {
            Some(Reply::Ready(result)) => result,
            Some(Reply::Hang) => std::future::pending().await,
            None => Err(NodeError::Transport(format!("unexpected call {}", method))),
        }
    }

    async fn batch_call(
        &self,
        calls: Vec<RpcCall>,
    ) -> Result<Vec<Result<Value, NodeError>>, NodeError> {
        self.batches.lock().unwrap().push(calls);

        self.batch_replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| NodeError::Transport("unexpected batch".to_string()))
    }
}

#[async_trait]
impl GraphQl for MockNode {
    async fn query(&self, query: &str) -> Result<String, NodeError> {
        self.queries.lock().unwrap().push(query.to_string());

        self.graphql_replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| NodeError::Transport("unexpected query".to_string()))
    }
}
