//! A `ChainClient` backed by an alloy websocket provider

use alloy::{
    network::TransactionBuilder,
    providers::{DynProvider, Provider, ProviderBuilder, WsConnect},
    rpc::types::{Header, TransactionRequest},
};
use alloy_primitives::{Address, Bytes};
use async_trait::async_trait;
use futures_util::stream;
use tokio::sync::broadcast::error::RecvError;
use tracing::info;

use super::{BlockHeader, ChainClient, ClientError, HeadSubscription, SubscriptionError};

/// A websocket connection to a chain node
#[derive(Clone)]
pub struct WsChainClient {
    /// The underlying provider
    provider: DynProvider,
}

impl WsChainClient {
    /// Connect to the node at the given websocket URL
    pub async fn connect(rpc_websocket_url: &str) -> Result<Self, ClientError> {
        let conn = WsConnect::new(rpc_websocket_url);
        let provider = ProviderBuilder::new()
            .connect_ws(conn)
            .await
            .map_err(err_str!(ClientError::Connection))?;

        info!("connected to chain node via websocket");
        Ok(Self::from_provider(DynProvider::new(provider)))
    }

    /// Wrap an existing provider
    ///
    /// The provider must be backed by a pubsub transport for head
    /// subscriptions to work.
    pub fn from_provider(provider: DynProvider) -> Self {
        Self { provider }
    }
}

impl From<&Header> for BlockHeader {
    fn from(header: &Header) -> Self {
        Self { number: header.number, hash: header.hash, timestamp: header.timestamp }
    }
}

#[async_trait]
impl ChainClient for WsChainClient {
    async fn chain_id(&self) -> Result<u64, ClientError> {
        self.provider.get_chain_id().await.map_err(ClientError::rpc)
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, ClientError> {
        self.provider.get_code_at(address).await.map_err(ClientError::rpc)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ClientError> {
        let tx = TransactionRequest::default().with_to(to).with_input(data);
        self.provider.call(tx).await.map_err(ClientError::rpc)
    }

    async fn suggest_gas_price(&self) -> Result<u128, ClientError> {
        self.provider.get_gas_price().await.map_err(ClientError::rpc)
    }

    async fn subscribe_new_heads(&self) -> Result<HeadSubscription, ClientError> {
        let subscription = self
            .provider
            .subscribe_blocks()
            .await
            .map_err(err_str!(ClientError::Subscription))?;

        // A lagged receiver is a subscription-level error; a closed channel
        // means the pubsub service is gone and ends the stream
        let heads = stream::unfold(subscription, |mut subscription| async move {
            match subscription.recv().await {
                Ok(header) => Some((Ok(BlockHeader::from(&header)), subscription)),
                Err(RecvError::Lagged(skipped)) => {
                    Some((Err(SubscriptionError::Lagged(skipped)), subscription))
                },
                Err(RecvError::Closed) => None,
            }
        });

        Ok(Box::pin(heads))
    }
}
