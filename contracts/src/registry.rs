use alloy::network::EthereumWallet;
use alloy::primitives::{Address, B256, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::signers::k256::ecdsa::SigningKey;
use alloy::signers::local::LocalSigner;
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;
use tracing::debug;

use blockrelay_common::signer::BlockSigner;
use blockrelay_common::types::{BlockAddedEvent, CycleInfo, Signature, SignedBlock};

use crate::sol::{IBlockRegistry, IConsensus};
use crate::{call, transport, ConsensusClient, ContractError, RegistryClient, RegistrySignedBlock};

pub(crate) fn parse_url(rpc_url: &str) -> Result<Url, ContractError> {
    Url::parse(rpc_url).map_err(|_| ContractError::InvalidUrl(rpc_url.to_string()))
}

pub(crate) fn local_signer(signer: &BlockSigner) -> LocalSigner<SigningKey> {
    signer.signing_key().clone().into()
}

pub(crate) fn topic(value: u64) -> B256 {
    B256::from(U256::from(value))
}

/// Block registry reached over alloy.
pub struct AlloyRegistry {
    address: Address,
    rpc_url: Url,
    signer: Option<LocalSigner<SigningKey>>,
}

impl AlloyRegistry {
    pub fn new(
        address: Address, rpc_url: &str, signer: Option<&BlockSigner>,
    ) -> Result<Self, ContractError> {
        Ok(Self { address, rpc_url: parse_url(rpc_url)?, signer: signer.map(local_signer) })
    }
}

fn to_sol_block(block: &SignedBlock) -> IBlockRegistry::SignedBlock {
    IBlockRegistry::SignedBlock {
        signature: IBlockRegistry::Signature { r: block.signature.r, vs: block.signature.vs },
        chainId: U256::from(block.chain_id),
        rlpHeader: block.rlp_header.clone(),
        cycleEnd: U256::from(block.cycle_end),
        validators: block.validators.clone(),
    }
}

#[async_trait]
impl RegistryClient for AlloyRegistry {
    async fn rpc_list(&self) -> Result<Vec<(u64, String)>, ContractError> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.clone());
        let registry = IBlockRegistry::new(self.address, provider);
        let entries = registry.getRPCs().call().await.map_err(call)?._0;
        Ok(entries.into_iter().map(|e| (e.chainId.saturating_to::<u64>(), e.rpc)).collect())
    }

    async fn add_signed_blocks(&self, blocks: &[SignedBlock]) -> Result<B256, ContractError> {
        let signer = self.signer.clone().ok_or(ContractError::MissingSigner)?;
        let wallet = EthereumWallet::from(signer);
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(wallet)
            .on_http(self.rpc_url.clone());
        let registry = IBlockRegistry::new(self.address, provider);

        let blocks: Vec<_> = blocks.iter().map(to_sol_block).collect();
        let tx_hash = registry
            .addSignedBlocks(blocks)
            .send()
            .await
            .map_err(call)?
            .watch()
            .await
            .map_err(transport)?;
        Ok(tx_hash)
    }

    async fn head(&self) -> Result<u64, ContractError> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.clone());
        provider.get_block_number().await.map_err(transport)
    }

    async fn block_added_events(
        &self, chain_id: u64, block_number: Option<u64>, from: u64, to: u64,
    ) -> Result<Vec<BlockAddedEvent>, ContractError> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.clone());
        let registry = IBlockRegistry::new(self.address, provider);
        let mut filter =
            registry.BlockAdded_filter().from_block(from).to_block(to).topic2(topic(chain_id));
        if let Some(number) = block_number {
            filter = filter.topic3(topic(number));
        }
        let logs = filter.query().await.map_err(transport)?;
        debug!(chain_id, from, to, events = logs.len(), "BlockAdded events fetched");

        Ok(logs
            .into_iter()
            .map(|(event, log)| BlockAddedEvent {
                validator: event.validator,
                chain_id: event.chainId.saturating_to(),
                block_number: event.blockNumber.saturating_to(),
                block_hash: event.rlpHeaderHash,
                payload: event.payload,
                validators: event.validators,
                cycle_end: event.cycleEnd.saturating_to(),
                signature: Signature { r: event.r, vs: event.vs },
                registry_block: log.block_number.unwrap_or_default(),
            })
            .collect())
    }

    async fn signed_block(
        &self, chain_id: u64, number: u64,
    ) -> Result<Option<RegistrySignedBlock>, ContractError> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.clone());
        let registry = IBlockRegistry::new(self.address, provider);
        let res = registry
            .getSignedBlock(U256::from(chain_id), U256::from(number))
            .call()
            .await
            .map_err(call)?;
        if res.blockHash.is_zero() {
            return Ok(None);
        }
        Ok(Some(RegistrySignedBlock {
            block_hash: res.blockHash,
            signatures: res
                .signatures
                .into_iter()
                .map(|s| Signature { r: s.r, vs: s.vs })
                .collect(),
            cycle_end: res.cycleEnd.saturating_to(),
            validators: res.validators,
        }))
    }
}

/// Consensus contract reached over alloy.
pub struct AlloyConsensus {
    address: Address,
    rpc_url: Url,
}

impl AlloyConsensus {
    pub fn new(address: Address, rpc_url: &str) -> Result<Self, ContractError> {
        Ok(Self { address, rpc_url: parse_url(rpc_url)? })
    }
}

#[async_trait]
impl ConsensusClient for AlloyConsensus {
    async fn cycle_info(&self) -> Result<CycleInfo, ContractError> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.clone());
        let consensus = IConsensus::new(self.address, provider);
        let cycle_start = consensus.getCurrentCycleStartBlock().call().await.map_err(call)?._0;
        let cycle_end = consensus.getCurrentCycleEndBlock().call().await.map_err(call)?._0;
        let validators = consensus.getValidators().call().await.map_err(call)?._0;
        Ok(CycleInfo {
            cycle_start: cycle_start.saturating_to(),
            cycle_end: cycle_end.saturating_to(),
            validators,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Bytes;

    #[test]
    fn should_convert_signed_block() {
        let block = SignedBlock {
            chain_id: 122,
            rlp_header: Bytes::from_static(&[0xc0]),
            block_hash: B256::repeat_byte(1),
            signature: Signature { r: B256::repeat_byte(2), vs: B256::repeat_byte(3) },
            cycle_end: 77,
            validators: vec![Address::repeat_byte(4)],
        };
        let sol = to_sol_block(&block);
        assert_eq!(sol.chainId, U256::from(122));
        assert_eq!(sol.cycleEnd, U256::from(77));
        assert_eq!(sol.signature.vs, B256::repeat_byte(3));
        assert_eq!(sol.validators, vec![Address::repeat_byte(4)]);
    }

    #[test]
    fn topics_are_left_padded() {
        let t = topic(0x7a);
        assert_eq!(t[31], 0x7a);
        assert!(t[..31].iter().all(|b| *b == 0));
    }

    #[test]
    fn rejects_bad_urls() {
        assert!(matches!(
            AlloyConsensus::new(Address::ZERO, "not a url"),
            Err(ContractError::InvalidUrl(_))
        ));
    }
}
