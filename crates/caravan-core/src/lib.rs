pub mod bus;
pub mod error;
pub mod events;
pub mod locks;
pub mod models;
pub mod policies;
pub mod storage;

pub use bus::{DeliveryReport, EventBus, Subscriber};
pub use error::{MarketError, Result};
pub use events::{DomainEvent, DomainEventKind, EventPayload, EventSource};
pub use locks::KeyedLocks;
pub use models::{
    Asset, AssetId, AssetStatus, BookingRequest, MONEY_SCALE, Payment, PaymentId, PaymentStatus,
    Reservation, ReservationId, ReservationStatus, Settlement, SettlementId, User, UserId,
};
pub use policies::{
    FLEXIBLE_REFUND, FeeStrategy, NO_DISCOUNT, NO_FEE, NoDiscount, NoFee, PercentageDiscount,
    PercentageFee, PricingStrategy, RefundStrategy, TieredRefund, clamp_amount,
};
pub use storage::{
    Entity, PaymentPredicate, PaymentRepository, Repository, ReservationRepository, Stores,
};
