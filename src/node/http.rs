use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, error};

use super::types::{JsonRpcRequest, JsonRpcResponse};
use super::{GraphQl, JsonRpc, NodeError, RpcCall};

/// reqwest-backed gateway to a running gmet node.
#[derive(Debug)]
pub struct HttpNode {
    http_client: Client,
    rpc_url: String,
    graphql_url: String,
    next_id: AtomicU64,
}

impl HttpNode {
    /// Create a client for the node at `node_url`. GraphQL is served under
    /// `<node_url>/graphql`.
    pub fn new(node_url: &str) -> Self {
        let rpc_url = node_url.trim_end_matches('/').to_string();
        let graphql_url = format!("{}/graphql", rpc_url);
        Self {
            http_client: Client::new(),
            rpc_url,
            graphql_url,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn post<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<reqwest::Response, NodeError> {
        let response = self
            .http_client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| if e.is_timeout() { NodeError::Timeout } else { NodeError::Http(e) })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("gmet returned HTTP {}: {}", status, body);
            return Err(NodeError::Transport(format!("HTTP {} - {}", status, body)));
        }

        Ok(response)
    }
}

fn into_result(response: JsonRpcResponse) -> Result<Value, NodeError> {
    if let Some(err) = response.error {
        error!("gmet RPC error: code={}, message={}", err.code, err.message);
        return Err(NodeError::Rpc {
            code: err.code,
            message: err.message,
        });
    }
    Ok(response.result.unwrap_or(Value::Null))
}

#[async_trait]
impl JsonRpc for HttpNode {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, NodeError> {
        debug!("Sending gmet RPC request: method={}", method);

        let request = JsonRpcRequest::new(self.next_id(), method, params);
        let response: JsonRpcResponse = self
            .post(&self.rpc_url, &request)
            .await?
            .json()
            .await?;

        into_result(response)
    }

    async fn batch_call(
        &self,
        calls: Vec<RpcCall>,
    ) -> Result<Vec<Result<Value, NodeError>>, NodeError> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }
        debug!("Sending gmet RPC batch: size={}", calls.len());

        let requests: Vec<JsonRpcRequest> = calls
            .iter()
            .map(|c| JsonRpcRequest::new(self.next_id(), &c.method, c.params.clone()))
            .collect();

        let responses: Vec<JsonRpcResponse> = self
            .post(&self.rpc_url, &requests)
            .await?
            .json()
            .await?;

        // The node may answer out of order; realign by id and drop unanswered slots.
        let mut by_id: HashMap<u64, JsonRpcResponse> = responses
            .into_iter()
            .filter_map(|r| r.id.map(|id| (id, r)))
            .collect();

        Ok(requests
            .iter()
            .filter_map(|req| by_id.remove(&req.id))
            .map(into_result)
            .collect())
    }
}

#[async_trait]
impl GraphQl for HttpNode {
    async fn query(&self, query: &str) -> Result<String, NodeError> {
        debug!("Sending gmet GraphQL query: len={}", query.len());

        let body = serde_json::json!({ "query": query });
        let text = self.post(&self.graphql_url, &body).await?.text().await?;
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graphql_url_derived_from_node_url() {
        let node = HttpNode::new("http://localhost:8588/");
        assert_eq!(node.rpc_url(), "http://localhost:8588");
        assert_eq!(node.graphql_url, "http://localhost:8588/graphql");
    }

    #[test]
    fn test_rpc_error_is_surfaced() {
        let response: JsonRpcResponse = serde_json::from_value(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 7,
            "error": { "code": -32000, "message": "header not found" }
        }))
        .unwrap();

        match into_result(response) {
            Err(NodeError::Rpc { code, message }) => {
                assert_eq!(code, -32000);
                assert_eq!(message, "header not found");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_missing_result_is_null() {
        let response: JsonRpcResponse =
            serde_json::from_value(serde_json::json!({ "jsonrpc": "2.0", "id": 1, "result": null }))
                .unwrap();
        assert_eq!(into_result(response).unwrap(), Value::Null);
    }
}
