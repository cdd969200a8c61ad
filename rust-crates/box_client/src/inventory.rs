use crate::error::ClientError;
use alloy_primitives::Address;
use std::{
    collections::BTreeMap,
    fmt,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

impl Rarity {
    pub const ALL: [Rarity; 5] = [
        Rarity::Common,
        Rarity::Uncommon,
        Rarity::Rare,
        Rarity::Epic,
        Rarity::Legendary,
    ];

    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        Self::ALL.get(usize::from(ordinal)).copied()
    }

    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Rarity::Common => "Common",
            Rarity::Uncommon => "Uncommon",
            Rarity::Rare => "Rare",
            Rarity::Epic => "Epic",
            Rarity::Legendary => "Legendary",
        }
    }

    /// Published drop odds in percent.
    pub fn odds_percent(self) -> u8 {
        match self {
            Rarity::Common => 50,
            Rarity::Uncommon => 30,
            Rarity::Rare => 15,
            Rarity::Epic => 4,
            Rarity::Legendary => 1,
        }
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw box record as returned by the contract's `getBox`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BoxRecord {
    pub is_opened: bool,
    pub rarity: u8,
    pub variant_id: u32,
    pub minted_at: u64,
    pub opened_at: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reveal {
    pub rarity: Rarity,
    pub variant_id: u32,
    pub opened_at: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MysteryBox {
    pub token_id: u64,
    pub minted_at: u64,
    pub reveal: Option<Reveal>,
}

impl MysteryBox {
    pub fn unopened(token_id: u64, minted_at: u64) -> Self {
        Self {
            token_id,
            minted_at,
            reveal: None,
        }
    }

    /// Validate a raw record. The decrypted fields of an unopened box are
    /// placeholders and are ignored.
    pub fn from_record(token_id: u64, record: BoxRecord) -> Result<Self, ClientError> {
        if !record.is_opened {
            return Ok(Self::unopened(token_id, record.minted_at));
        }
        let rarity = Rarity::from_ordinal(record.rarity).ok_or_else(|| {
            ClientError::InvalidBoxRecord {
                token_id,
                reason: format!("rarity ordinal {} out of range", record.rarity),
            }
        })?;
        Ok(Self {
            token_id,
            minted_at: record.minted_at,
            reveal: Some(Reveal {
                rarity,
                variant_id: record.variant_id,
                opened_at: record.opened_at,
            }),
        })
    }

    pub fn is_opened(&self) -> bool {
        self.reveal.is_some()
    }

    pub fn rarity(&self) -> Option<Rarity> {
        self.reveal.map(|reveal| reveal.rarity)
    }
}

/// Boxes owned by one account, in discovery order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Inventory {
    account: Address,
    boxes: Vec<MysteryBox>,
}

impl Inventory {
    pub fn new(account: Address) -> Self {
        Self {
            account,
            boxes: Vec::new(),
        }
    }

    pub fn account(&self) -> Address {
        self.account
    }

    pub fn push(&mut self, mystery_box: MysteryBox) {
        match self
            .boxes
            .iter_mut()
            .find(|existing| existing.token_id == mystery_box.token_id)
        {
            Some(existing) => *existing = mystery_box,
            None => self.boxes.push(mystery_box),
        }
    }

    pub fn get(&self, token_id: u64) -> Option<&MysteryBox> {
        self.boxes.iter().find(|b| b.token_id == token_id)
    }

    pub fn get_mut(&mut self, token_id: u64) -> Option<&mut MysteryBox> {
        self.boxes.iter_mut().find(|b| b.token_id == token_id)
    }

    pub fn boxes(&self) -> &[MysteryBox] {
        &self.boxes
    }

    pub fn token_ids(&self) -> Vec<u64> {
        self.boxes.iter().map(|b| b.token_id).collect()
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn opened_count(&self) -> usize {
        self.boxes.iter().filter(|b| b.is_opened()).count()
    }

    pub fn unopened_count(&self) -> usize {
        self.len() - self.opened_count()
    }

    /// Equality ignoring discovery order.
    pub fn same_contents(&self, other: &Inventory) -> bool {
        let by_id = |inventory: &Inventory| {
            inventory
                .boxes
                .iter()
                .map(|b| (b.token_id, b.clone()))
                .collect::<BTreeMap<_, _>>()
        };
        self.account == other.account && by_id(self) == by_id(other)
    }
}
