use alloy_primitives::{
    Address,
    B256,
    Bytes,
    Log,
    LogData,
    U256,
};
use alloy_sol_types::SolEvent;

use crate::MysteryBoxNFT;

/// Log emitted by `contract` for a freshly minted box. The encrypted fields
/// are filled with fixed placeholder bytes.
pub fn box_minted_log(contract: Address, token_id: u64, owner: Address) -> Log {
    let event = MysteryBoxNFT::BoxMinted {
        tokenId: U256::from(token_id),
        owner,
        encryptedRarity: B256::repeat_byte(0xaa),
        encryptedMetadataId: B256::repeat_byte(0xbb),
    };
    Log {
        address: contract,
        data: event.encode_log_data(),
    }
}

pub fn box_opened_log(
    contract: Address,
    token_id: u64,
    owner: Address,
    rarity: u8,
    metadata_id: u32,
) -> Log {
    let event = MysteryBoxNFT::BoxOpened {
        tokenId: U256::from(token_id),
        owner,
        rarity,
        metadataId: metadata_id,
    };
    Log {
        address: contract,
        data: event.encode_log_data(),
    }
}

/// A log whose topic matches none of the box events, such as a `Transfer`
/// from an unrelated token contract.
pub fn unrelated_log(contract: Address) -> Log {
    Log {
        address: contract,
        data: LogData::new_unchecked(
            vec![B256::repeat_byte(0x11)],
            Bytes::from_static(&[0u8; 32]),
        ),
    }
}
