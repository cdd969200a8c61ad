use alloy_primitives::{
    Address,
    Log,
    U256,
};
use alloy_sol_types::{
    SolEvent,
    sol,
};

sol! {
    #[sol(rpc)]
    #[derive(Debug, PartialEq, Eq)]
    contract MysteryBoxNFT {
        struct BoxData {
            bytes32 encryptedRarity;
            bytes32 encryptedMetadataId;
            uint8 decryptedRarity;
            uint32 decryptedMetadataId;
            bool isOpened;
            uint256 mintedAt;
            uint256 openedAt;
        }

        event BoxMinted(
            uint256 indexed tokenId,
            address indexed owner,
            bytes32 encryptedRarity,
            bytes32 encryptedMetadataId
        );
        event BoxOpened(
            uint256 indexed tokenId,
            address indexed owner,
            uint8 rarity,
            uint32 metadataId
        );

        function name() external view returns (string memory);
        function symbol() external view returns (string memory);
        function boxPrice() external view returns (uint256);
        function maxSupply() external view returns (uint256);
        function mintPaused() external view returns (bool);
        function totalSupply() external view returns (uint256);
        function balanceOf(address owner) external view returns (uint256);
        function ownerOf(uint256 tokenId) external view returns (address);
        function getBox(uint256 tokenId) external view returns (BoxData memory);

        function mintBox() external payable;
        function openBox(uint256 tokenId) external;
    }
}

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

/// Box lifecycle events emitted by the contract, with on-chain integer
/// widths preserved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BoxEvent {
    Minted {
        token_id: U256,
        owner: Address,
    },
    Opened {
        token_id: U256,
        owner: Address,
        rarity: u8,
        metadata_id: u32,
    },
}

impl BoxEvent {
    pub fn token_id(&self) -> U256 {
        match self {
            BoxEvent::Minted { token_id, .. } | BoxEvent::Opened { token_id, .. } => {
                *token_id
            }
        }
    }
}

/// Try to read a single log as one of the box events. Anything that does not
/// match a known signature yields `None`.
pub fn decode_box_event(log: &Log) -> Option<BoxEvent> {
    if let Ok(minted) = MysteryBoxNFT::BoxMinted::decode_log_data(&log.data) {
        return Some(BoxEvent::Minted {
            token_id: minted.tokenId,
            owner: minted.owner,
        });
    }
    if let Ok(opened) = MysteryBoxNFT::BoxOpened::decode_log_data(&log.data) {
        return Some(BoxEvent::Opened {
            token_id: opened.tokenId,
            owner: opened.owner,
            rarity: opened.rarity,
            metadata_id: opened.metadataId,
        });
    }
    None
}

/// Decode the box events emitted by `contract`, silently dropping logs from
/// other addresses and logs that don't decode.
pub fn decode_box_events<'a>(
    logs: impl IntoIterator<Item = &'a Log>,
    contract: Address,
) -> Vec<BoxEvent> {
    logs.into_iter()
        .filter(|log| log.address == contract)
        .filter_map(decode_box_event)
        .collect()
}
