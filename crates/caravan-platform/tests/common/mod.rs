#![allow(dead_code)]

use caravan_core::{Asset, BookingRequest, User};
use caravan_platform::{Marketplace, MarketplaceConfig};
use chrono::NaiveDate;
use rust_decimal::Decimal;

pub struct World {
    pub market: Marketplace,
    pub host: User,
    pub guest: User,
    pub asset: Asset,
}

pub fn day(offset: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 1).unwrap() + chrono::Days::new(u64::from(offset))
}

pub fn config_with_fee(percent: Decimal) -> MarketplaceConfig {
    MarketplaceConfig {
        platform_fee_percent: percent,
        ..MarketplaceConfig::default()
    }
}

pub async fn world(config: &MarketplaceConfig, guest_balance: Decimal) -> World {
    let market = Marketplace::in_memory(config).unwrap();
    let host = market
        .register_user("Test Host", "host@example.com", true, Decimal::ZERO)
        .await
        .unwrap();
    let guest = market
        .register_user("Test Guest", "guest@example.com", false, guest_balance)
        .await
        .unwrap();
    let asset = market
        .register_asset(host.id, "Test Caravan", 4, "Test Location")
        .await
        .unwrap();
    World {
        market,
        host,
        guest,
        asset,
    }
}

pub fn booking(w: &World, start: u32, end: u32, base_price: Decimal) -> BookingRequest {
    BookingRequest {
        renter_id: w.guest.id,
        asset_id: w.asset.id,
        start_date: day(start),
        end_date: day(end),
        base_price,
    }
}
