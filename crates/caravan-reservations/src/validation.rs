use caravan_core::{
    Asset, AssetId, AssetStatus, MarketError, Result, Stores, User, UserId,
};
use chrono::NaiveDate;

/// Read-only checks run before a booking touches any state.
#[derive(Clone)]
pub struct ValidationGate {
    stores: Stores,
}

impl ValidationGate {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    pub async fn ensure_user(&self, user_id: UserId) -> Result<User> {
        self.stores
            .users
            .get(user_id)
            .await?
            .ok_or_else(|| MarketError::not_found("User", user_id))
    }

    pub async fn ensure_host(&self, user_id: UserId) -> Result<User> {
        self.stores
            .users
            .get(user_id)
            .await?
            .filter(|user| user.is_host)
            .ok_or_else(|| MarketError::not_found("Host", user_id))
    }

    pub async fn ensure_asset(&self, asset_id: AssetId) -> Result<Asset> {
        self.stores
            .assets
            .get(asset_id)
            .await?
            .ok_or_else(|| MarketError::not_found("Asset", asset_id))
    }

    pub fn ensure_bookable(&self, asset: &Asset) -> Result<()> {
        match asset.status {
            AssetStatus::Available => Ok(()),
            AssetStatus::Maintenance => Err(MarketError::AssetUnavailable(asset.id)),
        }
    }

    pub fn ensure_date_range(&self, start: NaiveDate, end: NaiveDate) -> Result<()> {
        if start > end {
            return Err(MarketError::InvalidDateRange { start, end });
        }
        Ok(())
    }

    /// Fails when an active reservation on the asset intersects `[start, end]`.
    pub async fn ensure_no_overlap(
        &self,
        asset_id: AssetId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<()> {
        let clash = self
            .stores
            .reservations
            .overlapping(asset_id, start, end)
            .await?
            .into_iter()
            .any(|reservation| reservation.status.is_active());

        if clash {
            return Err(MarketError::DuplicateBooking {
                asset_id,
                start,
                end,
            });
        }
        Ok(())
    }
}
