use crate::{
    error::{
        ClientError,
        ProviderError,
        classify_read,
    },
    inventory::{
        BoxRecord,
        MysteryBox,
    },
};
use alloy_primitives::{
    Address,
    Bytes,
    U256,
};
use std::future::Future;

/// Read-only access to the box contract's view functions.
pub trait ContractReader {
    fn address(&self) -> Address;
    fn name(&self) -> impl Future<Output = Result<String, ProviderError>>;
    fn symbol(&self) -> impl Future<Output = Result<String, ProviderError>>;
    fn box_price(&self) -> impl Future<Output = Result<U256, ProviderError>>;
    fn max_supply(&self) -> impl Future<Output = Result<U256, ProviderError>>;
    fn mint_paused(&self) -> impl Future<Output = Result<bool, ProviderError>>;
    fn total_supply(&self) -> impl Future<Output = Result<U256, ProviderError>>;
    fn balance_of(
        &self,
        owner: Address,
    ) -> impl Future<Output = Result<U256, ProviderError>>;
    fn owner_of(
        &self,
        token_id: u64,
    ) -> impl Future<Output = Result<Address, ProviderError>>;
    fn get_box(
        &self,
        token_id: u64,
    ) -> impl Future<Output = Result<BoxRecord, ProviderError>>;
    /// Runtime code deployed at the contract address.
    fn code(&self) -> impl Future<Output = Result<Bytes, ProviderError>>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractInfo {
    pub name: String,
    pub symbol: String,
    pub unit_price: U256,
    pub total_minted: u64,
    /// Zero means unlimited.
    pub max_supply: u64,
    pub mint_paused: bool,
}

impl ContractInfo {
    pub fn is_unlimited(&self) -> bool {
        self.max_supply == 0
    }

    pub fn sold_out(&self) -> bool {
        !self.is_unlimited() && self.total_minted >= self.max_supply
    }
}

#[derive(Clone, Debug)]
pub struct ChainReadClient<R> {
    reader: R,
}

impl<R: ContractReader> ChainReadClient<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    pub fn address(&self) -> Address {
        self.reader.address()
    }

    pub async fn name(&self) -> Result<String, ClientError> {
        self.reader.name().await.map_err(classify_read)
    }

    pub async fn symbol(&self) -> Result<String, ClientError> {
        self.reader.symbol().await.map_err(classify_read)
    }

    pub async fn unit_price(&self) -> Result<U256, ClientError> {
        self.reader.box_price().await.map_err(classify_read)
    }

    pub async fn total_minted(&self) -> Result<u64, ClientError> {
        let total = self.reader.total_supply().await.map_err(classify_read)?;
        Ok(total.saturating_to())
    }

    pub async fn max_supply(&self) -> Result<u64, ClientError> {
        let max = self.reader.max_supply().await.map_err(classify_read)?;
        Ok(max.saturating_to())
    }

    pub async fn mint_paused(&self) -> Result<bool, ClientError> {
        self.reader.mint_paused().await.map_err(classify_read)
    }

    pub async fn balance_of(&self, owner: Address) -> Result<u64, ClientError> {
        let balance = self.reader.balance_of(owner).await.map_err(classify_read)?;
        Ok(balance.saturating_to())
    }

    pub async fn owner_of(&self, token_id: u64) -> Result<Address, ClientError> {
        self.reader.owner_of(token_id).await.map_err(classify_read)
    }

    pub async fn box_record(&self, token_id: u64) -> Result<MysteryBox, ClientError> {
        let record = self.reader.get_box(token_id).await.map_err(classify_read)?;
        MysteryBox::from_record(token_id, record)
    }

    /// The fields shown on the mint panel, read together.
    pub async fn contract_info(&self) -> Result<ContractInfo, ClientError> {
        let (name, symbol, unit_price, total_minted, max_supply, mint_paused) = futures::try_join!(
            self.name(),
            self.symbol(),
            self.unit_price(),
            self.total_minted(),
            self.max_supply(),
            self.mint_paused(),
        )?;
        Ok(ContractInfo {
            name,
            symbol,
            unit_price,
            total_minted,
            max_supply,
            mint_paused,
        })
    }

    pub async fn ensure_deployed(&self) -> Result<Bytes, ClientError> {
        let code = self.reader.code().await.map_err(classify_read)?;
        if code.is_empty() {
            return Err(ClientError::ContractNotDeployed {
                address: self.address(),
            });
        }
        Ok(code)
    }
}
