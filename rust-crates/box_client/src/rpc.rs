use crate::{
    chain::ContractReader,
    error::ProviderError,
    inventory::BoxRecord,
};
use alloy_primitives::{
    Address,
    Bytes,
    U256,
};
use alloy_provider::{
    DynProvider,
    Provider,
};
use alloy_transport::TransportError;
use box_abi::MysteryBoxNFT::{
    self,
    MysteryBoxNFTInstance,
};

impl From<TransportError> for ProviderError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::ErrorResp(payload) => {
                ProviderError::from_code(payload.code, payload.message.to_string())
            }
            other => ProviderError::Transport(other.to_string()),
        }
    }
}

impl From<alloy_contract::Error> for ProviderError {
    fn from(err: alloy_contract::Error) -> Self {
        match err {
            alloy_contract::Error::TransportError(err) => err.into(),
            other => ProviderError::Rpc {
                code: None,
                message: other.to_string(),
            },
        }
    }
}

/// Contract reads over JSON-RPC.
#[derive(Clone, Debug)]
pub struct RpcContractReader {
    contract: MysteryBoxNFTInstance<DynProvider>,
}

impl RpcContractReader {
    pub fn new(address: Address, provider: DynProvider) -> Self {
        Self {
            contract: MysteryBoxNFT::new(address, provider),
        }
    }
}

impl ContractReader for RpcContractReader {
    fn address(&self) -> Address {
        *self.contract.address()
    }

    async fn name(&self) -> Result<String, ProviderError> {
        Ok(self.contract.name().call().await?)
    }

    async fn symbol(&self) -> Result<String, ProviderError> {
        Ok(self.contract.symbol().call().await?)
    }

    async fn box_price(&self) -> Result<U256, ProviderError> {
        Ok(self.contract.boxPrice().call().await?)
    }

    async fn max_supply(&self) -> Result<U256, ProviderError> {
        Ok(self.contract.maxSupply().call().await?)
    }

    async fn mint_paused(&self) -> Result<bool, ProviderError> {
        Ok(self.contract.mintPaused().call().await?)
    }

    async fn total_supply(&self) -> Result<U256, ProviderError> {
        Ok(self.contract.totalSupply().call().await?)
    }

    async fn balance_of(&self, owner: Address) -> Result<U256, ProviderError> {
        Ok(self.contract.balanceOf(owner).call().await?)
    }

    async fn owner_of(&self, token_id: u64) -> Result<Address, ProviderError> {
        Ok(self.contract.ownerOf(U256::from(token_id)).call().await?)
    }

    async fn get_box(&self, token_id: u64) -> Result<BoxRecord, ProviderError> {
        let data = self.contract.getBox(U256::from(token_id)).call().await?;
        Ok(BoxRecord {
            is_opened: data.isOpened,
            rarity: data.decryptedRarity,
            variant_id: data.decryptedMetadataId,
            minted_at: data.mintedAt.saturating_to(),
            opened_at: data.openedAt.saturating_to(),
        })
    }

    async fn code(&self) -> Result<Bytes, ProviderError> {
        Ok(self
            .contract
            .provider()
            .get_code_at(*self.contract.address())
            .await?)
    }
}
