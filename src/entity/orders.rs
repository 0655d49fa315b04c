use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub delivery_street: String,
    pub delivery_city: String,
    pub delivery_state: String,
    pub delivery_pincode: String,
    pub payment_method: Option<PaymentMethod>,
    pub payment_status: PaymentStatus,
    pub placed_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id"
    )]
    Users,
    #[sea_orm(has_many = "super::order_items::Entity")]
    OrderItems,
    #[sea_orm(has_one = "super::payments::Entity")]
    Payments,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl Related<super::order_items::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl Related<super::payments::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Order lifecycle. PENDING → CONFIRMED → SHIPPED → DELIVERED, with
/// CANCELLED reachable from PENDING and CONFIRMED only. No skipping.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "CONFIRMED")]
    Confirmed,
    #[sea_orm(string_value = "PROCESSING")]
    Processing,
    #[sea_orm(string_value = "SHIPPED")]
    Shipped,
    #[sea_orm(string_value = "DELIVERED")]
    Delivered,
    #[sea_orm(string_value = "CANCELLED")]
    Cancelled,
    #[sea_orm(string_value = "REFUNDED")]
    Refunded,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Refunded => "REFUNDED",
        };
        f.write_str(s)
    }
}

impl OrderStatus {
    pub fn confirm(self) -> Result<Self, AppError> {
        self.require(OrderStatus::Pending, "confirm")?;
        Ok(OrderStatus::Confirmed)
    }

    pub fn ship(self) -> Result<Self, AppError> {
        self.require(OrderStatus::Confirmed, "ship")?;
        Ok(OrderStatus::Shipped)
    }

    pub fn deliver(self) -> Result<Self, AppError> {
        self.require(OrderStatus::Shipped, "deliver")?;
        Ok(OrderStatus::Delivered)
    }

    pub fn cancel(self) -> Result<Self, AppError> {
        if !self.is_cancellable() {
            return Err(AppError::InvalidStateTransition(format!(
                "Cannot cancel order in status {self}"
            )));
        }
        Ok(OrderStatus::Cancelled)
    }

    /// True only while the order has not left the warehouse.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Confirmed)
    }

    fn require(self, required: OrderStatus, action: &str) -> Result<(), AppError> {
        if self != required {
            return Err(AppError::InvalidStateTransition(format!(
                "Cannot {action} order in status {self}, required {required}"
            )));
        }
        Ok(())
    }
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "SUCCESS")]
    Success,
    #[sea_orm(string_value = "FAILED")]
    Failed,
    #[sea_orm(string_value = "REFUNDED")]
    Refunded,
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Refunded => "REFUNDED",
        };
        f.write_str(s)
    }
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(30))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    #[sea_orm(string_value = "COD")]
    Cod,
    #[sea_orm(string_value = "CARD")]
    Card,
    #[sea_orm(string_value = "UPI")]
    Upi,
    #[sea_orm(string_value = "NET_BANKING")]
    NetBanking,
    #[sea_orm(string_value = "WALLET")]
    Wallet,
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentMethod::Cod => "COD",
            PaymentMethod::Card => "CARD",
            PaymentMethod::Upi => "UPI",
            PaymentMethod::NetBanking => "NET_BANKING",
            PaymentMethod::Wallet => "WALLET",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::OrderStatus;
    use crate::error::AppError;

    #[test]
    fn happy_path_runs_in_order() {
        let status = OrderStatus::Pending;
        let status = status.confirm().unwrap();
        assert_eq!(status, OrderStatus::Confirmed);
        let status = status.ship().unwrap();
        assert_eq!(status, OrderStatus::Shipped);
        let status = status.deliver().unwrap();
        assert_eq!(status, OrderStatus::Delivered);
    }

    #[test]
    fn confirming_twice_fails() {
        let confirmed = OrderStatus::Pending.confirm().unwrap();
        assert!(matches!(
            confirmed.confirm(),
            Err(AppError::InvalidStateTransition(_))
        ));
    }

    #[test]
    fn skipping_states_fails() {
        assert!(OrderStatus::Pending.ship().is_err());
        assert!(OrderStatus::Pending.deliver().is_err());
        assert!(OrderStatus::Confirmed.deliver().is_err());
    }

    #[test]
    fn cancel_allowed_only_before_shipping() {
        assert_eq!(
            OrderStatus::Pending.cancel().unwrap(),
            OrderStatus::Cancelled
        );
        assert_eq!(
            OrderStatus::Confirmed.cancel().unwrap(),
            OrderStatus::Cancelled
        );
        assert!(matches!(
            OrderStatus::Shipped.cancel(),
            Err(AppError::InvalidStateTransition(_))
        ));
        assert!(matches!(
            OrderStatus::Delivered.cancel(),
            Err(AppError::InvalidStateTransition(_))
        ));
    }

    #[test]
    fn cancellable_predicate() {
        assert!(OrderStatus::Pending.is_cancellable());
        assert!(OrderStatus::Confirmed.is_cancellable());
        assert!(!OrderStatus::Shipped.is_cancellable());
        assert!(!OrderStatus::Delivered.is_cancellable());
        assert!(!OrderStatus::Cancelled.is_cancellable());
    }

    #[test]
    fn terminal_states_reject_everything() {
        for status in [OrderStatus::Cancelled, OrderStatus::Refunded] {
            assert!(status.confirm().is_err());
            assert!(status.ship().is_err());
            assert!(status.deliver().is_err());
        }
    }
}
