use chrono::{DateTime, Utc};
use common::Kobo;
use rust_decimal::Decimal;
use sqlx::FromRow;
use uuid::Uuid;

use crate::domain::entities::{
    BankAccount, Provider, Referral, Reservation, ReservationState, TaskKind, TaskStatus,
    TransactionTask, User, VasTransaction, VasTransactionStatus, VasTransactionType, Wallet,
    WalletStatus,
};
use crate::domain::error::WalletError;
use crate::domain::types::{ReservationId, TaskId, TransactionId, UserId, WalletId};

#[derive(Debug, FromRow)]
pub struct WalletModel {
    pub id: Uuid,
    pub user_id: Uuid,
    pub balance: i64,
    pub reserved_amount: i64,
    pub account_reference: Option<String>,
    pub accounts: serde_json::Value,
    pub status: WalletStatus,
    pub pin_hash: Option<String>,
    pub pin_salt: Option<String>,
    pub pin_attempts: i32,
    pub pin_locked_until: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<WalletModel> for Wallet {
    type Error = WalletError;

    fn try_from(m: WalletModel) -> Result<Self, Self::Error> {
        let accounts: Vec<BankAccount> = serde_json::from_value(m.accounts)
            .map_err(|e| WalletError::Repository(format!("corrupt accounts column: {}", e)))?;

        Ok(Self {
            id: WalletId(m.id),
            user_id: UserId(m.user_id),
            balance: Kobo(m.balance),
            reserved_amount: Kobo(m.reserved_amount),
            account_reference: m.account_reference,
            accounts,
            status: m.status,
            pin_hash: m.pin_hash,
            pin_salt: m.pin_salt,
            pin_attempts: m.pin_attempts,
            pin_locked_until: m.pin_locked_until,
            version: m.version,
            created_at: m.created_at,
            updated_at: m.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct ReservationModel {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub transaction_id: Uuid,
    pub state: ReservationState,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl From<ReservationModel> for Reservation {
    fn from(m: ReservationModel) -> Self {
        Self {
            id: ReservationId(m.id),
            user_id: UserId(m.user_id),
            amount: Kobo(m.amount),
            transaction_id: TransactionId(m.transaction_id),
            state: m.state,
            created_at: m.created_at,
            resolved_at: m.resolved_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct VasTransactionModel {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tx_type: VasTransactionType,
    pub subtype: Option<String>,
    pub network: Option<String>,
    pub phone_number: Option<String>,
    pub data_plan_id: Option<String>,
    pub data_plan_name: Option<String>,
    pub amount: i64,
    pub selling_price: i64,
    pub total_amount: i64,
    pub status: VasTransactionStatus,
    pub failure_reason: Option<String>,
    pub provider: Option<Provider>,
    pub request_id: String,
    pub transaction_reference: String,
    pub provider_cost: Option<i64>,
    pub provider_commission: Option<i64>,
    pub provider_commission_rate: Option<Decimal>,
    pub gateway_fee: i64,
    pub net_margin: Option<i64>,
    pub is_premium_user: bool,
    pub needs_reconciliation: bool,
    pub settlement_failed: bool,
    pub emergency_pricing: bool,
    pub provider_confirmed: bool,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<VasTransactionModel> for VasTransaction {
    fn from(m: VasTransactionModel) -> Self {
        Self {
            id: TransactionId(m.id),
            user_id: UserId(m.user_id),
            tx_type: m.tx_type,
            subtype: m.subtype,
            network: m.network,
            phone_number: m.phone_number,
            data_plan_id: m.data_plan_id,
            data_plan_name: m.data_plan_name,
            amount: Kobo(m.amount),
            selling_price: Kobo(m.selling_price),
            total_amount: Kobo(m.total_amount),
            status: m.status,
            failure_reason: m.failure_reason,
            provider: m.provider,
            request_id: m.request_id,
            transaction_reference: m.transaction_reference,
            provider_cost: m.provider_cost.map(Kobo),
            provider_commission: m.provider_commission.map(Kobo),
            provider_commission_rate: m.provider_commission_rate,
            gateway_fee: Kobo(m.gateway_fee),
            net_margin: m.net_margin.map(Kobo),
            is_premium_user: m.is_premium_user,
            needs_reconciliation: m.needs_reconciliation,
            settlement_failed: m.settlement_failed,
            emergency_pricing: m.emergency_pricing,
            provider_confirmed: m.provider_confirmed,
            metadata: m.metadata,
            created_at: m.created_at,
            completed_at: m.completed_at,
            expires_at: m.expires_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct TransactionTaskModel {
    pub id: Uuid,
    pub kind: TaskKind,
    pub transaction_id: Uuid,
    pub payload: serde_json::Value,
    pub status: TaskStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub next_run_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TransactionTaskModel> for TransactionTask {
    fn from(m: TransactionTaskModel) -> Self {
        Self {
            id: TaskId(m.id),
            kind: m.kind,
            transaction_id: TransactionId(m.transaction_id),
            payload: m.payload,
            status: m.status,
            attempts: m.attempts,
            last_error: m.last_error,
            lease_expires_at: m.lease_expires_at,
            next_run_at: m.next_run_at,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct UserModel {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub is_admin: bool,
    pub is_subscribed: bool,
    pub subscription_plan: Option<String>,
    pub subscription_end_date: Option<DateTime<Utc>>,
    pub ficore_credit_balance: Decimal,
    pub withdrawable_balance: i64,
    pub first_deposit_completed: bool,
    pub referral_count: i32,
    pub created_at: DateTime<Utc>,
}

impl From<UserModel> for User {
    fn from(m: UserModel) -> Self {
        Self {
            id: UserId(m.id),
            email: m.email,
            full_name: m.full_name,
            is_admin: m.is_admin,
            is_subscribed: m.is_subscribed,
            subscription_plan: m.subscription_plan,
            subscription_end_date: m.subscription_end_date,
            ficore_credit_balance: m.ficore_credit_balance,
            withdrawable_balance: Kobo(m.withdrawable_balance),
            first_deposit_completed: m.first_deposit_completed,
            referral_count: m.referral_count,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct ReferralModel {
    pub id: Uuid,
    pub referrer_id: Uuid,
    pub referee_id: Uuid,
    pub status: String,
    pub deposit_bonus_granted: bool,
    pub vas_share_active: bool,
    pub vas_share_expires_at: Option<DateTime<Utc>>,
    pub first_deposit_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<ReferralModel> for Referral {
    fn from(m: ReferralModel) -> Self {
        Self {
            id: m.id,
            referrer_id: UserId(m.referrer_id),
            referee_id: UserId(m.referee_id),
            status: m.status,
            deposit_bonus_granted: m.deposit_bonus_granted,
            vas_share_active: m.vas_share_active,
            vas_share_expires_at: m.vas_share_expires_at,
            first_deposit_at: m.first_deposit_at,
            created_at: m.created_at,
        }
    }
}
