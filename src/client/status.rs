use serde_json::{json, Map, Value};
use tracing::debug;

use super::{hash_hex, timestamp_millis, Client};
use crate::error::ClientError;
use crate::node::{GraphQl, JsonRpc, PeerInfo, RpcHeader, SyncProgress};
use crate::types::{BlockIdentifier, NetworkStatus, Peer, SyncStatus};

impl<R: JsonRpc, G: GraphQl> Client<R, G> {
    /// Current head, sync progress and peers.
    ///
    /// A node without a head yet yields [`ClientError::BlockNotFound`].
    pub async fn status(&self) -> Result<NetworkStatus, ClientError> {
        let header = self.latest_header().await?;
        let timestamp = timestamp_millis(header.timestamp, "eth_getBlockByNumber")?;

        let sync_status = self.sync_status().await?;
        let peers = if self.skip_admin_calls {
            Vec::new()
        } else {
            self.peers().await?
        };

        Ok(NetworkStatus {
            current_block_identifier: BlockIdentifier {
                index: header.number.to::<u64>(),
                hash: hash_hex(&header.hash),
            },
            current_block_timestamp: timestamp,
            sync_status,
            peers,
        })
    }

    /// Identifier of block 0 on the connected network.
    pub async fn genesis_block_identifier(&self) -> Result<BlockIdentifier, ClientError> {
        let header = self.header(json!("0x0")).await?;
        Ok(BlockIdentifier {
            index: header.number.to::<u64>(),
            hash: hash_hex(&header.hash),
        })
    }

    async fn latest_header(&self) -> Result<RpcHeader, ClientError> {
        self.header(json!("latest")).await
    }

    async fn header(&self, number: Value) -> Result<RpcHeader, ClientError> {
        debug!("eth_getBlockByNumber: header {}", number);
        let raw = self
            .rpc
            .call("eth_getBlockByNumber", vec![number, json!(false)])
            .await
            .map_err(ClientError::upstream("eth_getBlockByNumber"))?;
        if raw.is_null() {
            return Err(ClientError::BlockNotFound);
        }
        serde_json::from_value(raw).map_err(ClientError::decode("eth_getBlockByNumber"))
    }

    async fn sync_status(&self) -> Result<Option<SyncStatus>, ClientError> {
        let raw = self
            .rpc
            .call("eth_syncing", vec![])
            .await
            .map_err(ClientError::upstream("eth_syncing"))?;

        match raw {
            Value::Bool(false) | Value::Null => Ok(None),
            raw => {
                let progress: SyncProgress =
                    serde_json::from_value(raw).map_err(ClientError::decode("eth_syncing"))?;
                Ok(Some(SyncStatus {
                    current_index: progress.current_block.to::<u64>(),
                    target_index: progress.highest_block.to::<u64>(),
                }))
            }
        }
    }

    async fn peers(&self) -> Result<Vec<Peer>, ClientError> {
        let raw = self
            .rpc
            .call("admin_peers", vec![])
            .await
            .map_err(ClientError::upstream("admin_peers"))?;
        let infos: Vec<PeerInfo> = if raw.is_null() {
            Vec::new()
        } else {
            serde_json::from_value(raw).map_err(ClientError::decode("admin_peers"))?
        };

        Ok(infos.into_iter().map(peer).collect())
    }
}

fn peer(info: PeerInfo) -> Peer {
    let mut metadata = Map::new();
    metadata.insert("caps".to_string(), json!(info.caps));
    metadata.insert("enode".to_string(), json!(info.enode));
    metadata.insert("enr".to_string(), json!(info.enr));
    metadata.insert("name".to_string(), json!(info.name));
    metadata.insert("protocols".to_string(), info.protocols);
    Peer {
        peer_id: info.id,
        metadata,
    }
}
