//! Application context, built once in `main` and handed to the session and
//! the API explicitly.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use crate::chain::{RegistryReader, RegistryWriter, TokenReader, TransferWatcher, WalletConnector};
use crate::config::Config;
use crate::prepare::PrepareClient;
use crate::rpc::{EvmChain, RpcClient};

pub struct AppContext {
    pub config: Config,
    pub wallet: Arc<dyn WalletConnector>,
    pub registry: Arc<dyn RegistryReader>,
    pub writer: Arc<dyn RegistryWriter>,
    pub token: Arc<dyn TokenReader>,
    pub transfers: Arc<dyn TransferWatcher>,
    pub prepare: PrepareClient,
}

impl AppContext {
    /// Wire every collaborator to the JSON-RPC endpoints in `config`.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        let chain = Arc::new(EvmChain::new(
            RpcClient::new(client.clone(), config.rpc_url.clone()),
            RpcClient::new(client.clone(), config.wallet_rpc_url.clone()),
            config.contract_address,
            config.usdc_address,
        ));
        let prepare = PrepareClient::new(client, config.platform_api_url.clone());

        Ok(Self {
            config,
            wallet: chain.clone(),
            registry: chain.clone(),
            writer: chain.clone(),
            token: chain.clone(),
            transfers: chain,
            prepare,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.config.poll_interval_secs.max(1))
    }
}
