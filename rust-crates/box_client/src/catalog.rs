use crate::{
    chain::ContractInfo,
    inventory::{
        Inventory,
        MysteryBox,
        Rarity,
    },
    orchestrator::{
        PendingRegistry,
        TxKind,
    },
    session::Session,
};
use alloy_primitives::{
    U256,
    utils::format_ether,
};
use chrono::{
    DateTime,
    Utc,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MintPanel {
    pub name: String,
    pub symbol: String,
    pub price_eth: String,
    pub minted: u64,
    pub supply_label: String,
    pub paused: bool,
    pub sold_out: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoxRow {
    pub token_id: u64,
    pub label: String,
    pub variant_id: Option<u32>,
    pub minted_at: String,
    pub opened_at: Option<String>,
    pub can_open: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogView {
    pub session: Session,
    pub mint_panel: Option<MintPanel>,
    pub can_mint: bool,
    pub boxes: Vec<BoxRow>,
    pub opened_count: usize,
    pub unopened_count: usize,
    pub odds: Vec<(Rarity, u8)>,
    pub last_error: Option<String>,
}

pub fn format_price(wei: U256) -> String {
    let formatted = format_ether(wei);
    if formatted.contains('.') {
        formatted
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    } else {
        formatted
    }
}

pub fn format_timestamp(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| secs.to_string())
}

fn box_row(mystery_box: &MysteryBox, pending: &PendingRegistry) -> BoxRow {
    let open_pending = pending.is_pending(TxKind::Open, Some(mystery_box.token_id));
    BoxRow {
        token_id: mystery_box.token_id,
        label: mystery_box
            .rarity()
            .map(|rarity| rarity.name().to_string())
            .unwrap_or_else(|| "Unopened".to_string()),
        variant_id: mystery_box.reveal.map(|reveal| reveal.variant_id),
        minted_at: format_timestamp(mystery_box.minted_at),
        opened_at: mystery_box
            .reveal
            .map(|reveal| format_timestamp(reveal.opened_at)),
        can_open: !mystery_box.is_opened() && !open_pending,
    }
}

pub fn build(
    session: &Session,
    info: Option<&ContractInfo>,
    inventory: Option<&Inventory>,
    pending: &PendingRegistry,
    last_error: Option<&str>,
) -> CatalogView {
    let mint_panel = info.map(|info| MintPanel {
        name: info.name.clone(),
        symbol: info.symbol.clone(),
        price_eth: format_price(info.unit_price),
        minted: info.total_minted,
        supply_label: if info.is_unlimited() {
            "unlimited".to_string()
        } else {
            info.max_supply.to_string()
        },
        paused: info.mint_paused,
        sold_out: info.sold_out(),
    });
    let can_mint = session.is_connected()
        && info.is_some_and(|info| !info.mint_paused && !info.sold_out())
        && !pending.is_pending(TxKind::Mint, None);

    let boxes: Vec<BoxRow> = inventory
        .map(|inventory| {
            inventory
                .boxes()
                .iter()
                .map(|b| box_row(b, pending))
                .collect()
        })
        .unwrap_or_default();

    CatalogView {
        session: session.clone(),
        mint_panel,
        can_mint,
        opened_count: inventory.map_or(0, Inventory::opened_count),
        unopened_count: inventory.map_or(0, Inventory::unopened_count),
        boxes,
        odds: Rarity::ALL
            .iter()
            .map(|rarity| (*rarity, rarity.odds_percent()))
            .collect(),
        last_error: last_error.map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        inventory::Reveal,
        session::SessionStatus,
    };
    use alloy_primitives::Address;

    fn connected() -> Session {
        Session {
            account: Some(Address::repeat_byte(1)),
            chain_id: Some(31_337),
            status: SessionStatus::Connected,
        }
    }

    fn info() -> ContractInfo {
        ContractInfo {
            name: "Mystery Box NFT".to_string(),
            symbol: "MBX".to_string(),
            unit_price: U256::from(100_000_000_000_000u64),
            total_minted: 12,
            max_supply: 0,
            mint_paused: false,
        }
    }

    #[test]
    fn build__formats_mint_panel() {
        // given
        let pending = PendingRegistry::new();

        // when
        let view = build(&connected(), Some(&info()), None, &pending, None);

        // then
        let panel = view.mint_panel.unwrap();
        assert_eq!(panel.price_eth, "0.0001");
        assert_eq!(panel.supply_label, "unlimited");
        assert_eq!(panel.minted, 12);
        assert!(view.can_mint);
        assert_eq!(view.odds[0], (Rarity::Common, 50));
        assert_eq!(view.odds[4], (Rarity::Legendary, 1));
    }

    #[test]
    fn build__mint_disabled_while_paused_or_pending() {
        // given
        let pending = PendingRegistry::new();
        let paused = ContractInfo {
            mint_paused: true,
            ..info()
        };

        // when
        let paused_view = build(&connected(), Some(&paused), None, &pending, None);
        let _guard = pending.begin(TxKind::Mint, None).unwrap();
        let pending_view = build(&connected(), Some(&info()), None, &pending, None);

        // then
        assert!(!paused_view.can_mint);
        assert!(!pending_view.can_mint);
    }

    #[test]
    fn build__sold_out_supply_blocks_mint() {
        let pending = PendingRegistry::new();
        let sold_out = ContractInfo {
            max_supply: 12,
            ..info()
        };

        let view = build(&connected(), Some(&sold_out), None, &pending, None);

        assert!(!view.can_mint);
        assert_eq!(view.mint_panel.unwrap().supply_label, "12");
    }

    #[test]
    fn build__rows_reflect_reveal_and_pending_open() {
        // given
        let pending = PendingRegistry::new();
        let mut inventory = Inventory::new(Address::repeat_byte(1));
        inventory.push(MysteryBox::unopened(1, 0));
        inventory.push(MysteryBox::unopened(2, 0));
        inventory.push(MysteryBox {
            token_id: 3,
            minted_at: 0,
            reveal: Some(Reveal {
                rarity: Rarity::Rare,
                variant_id: 8,
                opened_at: 86_400,
            }),
        });
        let _guard = pending.begin(TxKind::Open, Some(2)).unwrap();

        // when
        let view = build(&connected(), None, Some(&inventory), &pending, None);

        // then
        assert_eq!(view.opened_count, 1);
        assert_eq!(view.unopened_count, 2);
        assert!(view.boxes[0].can_open);
        assert!(!view.boxes[1].can_open);
        assert_eq!(view.boxes[2].label, "Rare");
        assert_eq!(view.boxes[2].variant_id, Some(8));
        assert_eq!(
            view.boxes[2].opened_at.as_deref(),
            Some("1970-01-02 00:00:00 UTC")
        );
        assert_eq!(view.boxes[0].label, "Unopened");
    }

    #[test]
    fn format_price__trims_trailing_zeros() {
        assert_eq!(format_price(U256::from(1_000_000_000_000_000_000u64)), "1");
        assert_eq!(format_price(U256::from(1_500_000_000_000_000_000u64)), "1.5");
    }
}
