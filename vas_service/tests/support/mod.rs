//! Mocks compartidos de los puertos del dominio para las pruebas de
//! integración a nivel de handler.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::Kobo;
use mockall::mock;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use vas_service::api::AppState;
use vas_service::domain::entities::{
    AdminAction, BankAccount, CorporateRevenueEntry, DataPlan, NetworkInfo, Notification,
    Referral, ReferralPayout, Reservation, TaskKind, TransactionTask, UnmatchedFunding, User,
    VasTransaction, VasTransactionStatus, VasTransactionType, Wallet,
};
use vas_service::domain::error::{LedgerError, ProviderError, TaskError, WalletError};
use vas_service::domain::gateways::{
    BankAccountProvider, BillerCategory, BillsProvider, ReservedAccountDetails, VendProvider,
    VendSuccess,
};
use vas_service::domain::repository::{
    AdminAuditLog, BalanceChange, EconomicsFields, FundingInsert, NotificationSender,
    ReferralStore, RevenueLedger, SuccessFields, TaskQueue, TransactionLedger, UserStore,
    WalletStore,
};
use vas_service::domain::types::{ReservationId, TaskId, TransactionId, UserId};
use vas_service::use_cases::{
    admin_adjust::AdminAdjustUseCase, buy_airtime::BuyAirtimeUseCase, buy_data::BuyDataUseCase,
    catalog::CatalogUseCase, create_wallet::CreateWalletUseCase, get_balance::GetBalanceUseCase,
    list_transactions::ListTransactionsUseCase, manage_pin::ManagePinUseCase,
    pending_tasks::PendingTasksUseCase, process_webhook::ProcessWebhookUseCase,
};

#[allow(dead_code)]
pub const WEBHOOK_SECRET: &str = "integration-test-secret";

mock! {
    pub WalletStoreImpl {}

    #[async_trait]
    impl WalletStore for WalletStoreImpl {
        async fn create(&self, wallet: Wallet) -> Result<Wallet, WalletError>;
        async fn find(&self, user_id: UserId) -> Result<Option<Wallet>, WalletError>;
        async fn get(&self, user_id: UserId) -> Result<Wallet, WalletError>;
        async fn credit_balance(
            &self,
            user_id: UserId,
            amount: Kobo,
            reference: &str,
            description: &str,
        ) -> Result<BalanceChange, WalletError>;
        async fn debit_balance(
            &self,
            user_id: UserId,
            amount: Kobo,
            reference: &str,
            description: &str,
        ) -> Result<BalanceChange, WalletError>;
        async fn reserve(
            &self,
            user_id: UserId,
            amount: Kobo,
            transaction_id: TransactionId,
        ) -> Result<ReservationId, WalletError>;
        async fn commit_reservation(&self, reservation_id: ReservationId) -> Result<(), WalletError>;
        async fn release_reservation(&self, reservation_id: ReservationId) -> Result<(), WalletError>;
        async fn find_reservation(
            &self,
            reservation_id: ReservationId,
        ) -> Result<Option<Reservation>, WalletError>;
        async fn available_balance(&self, user_id: UserId) -> Result<Kobo, WalletError>;
        async fn update_accounts(
            &self,
            user_id: UserId,
            account_reference: &str,
            accounts: &[BankAccount],
        ) -> Result<(), WalletError>;
        async fn set_pin(&self, user_id: UserId, hash: &str, salt: &str) -> Result<(), WalletError>;
        async fn record_pin_failure(
            &self,
            user_id: UserId,
            attempts: i32,
            locked_until: Option<DateTime<Utc>>,
        ) -> Result<(), WalletError>;
        async fn reset_pin_attempts(&self, user_id: UserId) -> Result<(), WalletError>;
        async fn clear_pin(&self, user_id: UserId) -> Result<(), WalletError>;
        async fn release_stale_reservations(
            &self,
            older_than: DateTime<Utc>,
        ) -> Result<u64, WalletError>;
    }
}

mock! {
    pub TransactionLedgerImpl {}

    #[async_trait]
    impl TransactionLedger for TransactionLedgerImpl {
        async fn create_in_progress(&self, tx: VasTransaction) -> Result<TransactionId, LedgerError>;
        async fn mark_success(
            &self,
            id: TransactionId,
            fields: SuccessFields,
        ) -> Result<(), LedgerError>;
        async fn mark_failed(&self, id: TransactionId, reason: &str) -> Result<(), LedgerError>;
        async fn update_economics(
            &self,
            id: TransactionId,
            economics: EconomicsFields,
        ) -> Result<(), LedgerError>;
        async fn set_needs_reconciliation(&self, id: TransactionId) -> Result<(), LedgerError>;
        async fn set_settlement_failed(&self, id: TransactionId) -> Result<(), LedgerError>;
        async fn insert_funding(&self, tx: VasTransaction) -> Result<FundingInsert, LedgerError>;
        async fn confirm_provider_webhook(
            &self,
            reference: &str,
            metadata: serde_json::Value,
        ) -> Result<Option<VasTransaction>, LedgerError>;
        async fn find_by_id(&self, id: TransactionId) -> Result<Option<VasTransaction>, LedgerError>;
        async fn find_by_reference(
            &self,
            reference: &str,
        ) -> Result<Option<VasTransaction>, LedgerError>;
        async fn find_recent_success(
            &self,
            user_id: UserId,
            tx_type: VasTransactionType,
            amount: Kobo,
            phone_number: &str,
            window_minutes: i64,
        ) -> Result<Option<VasTransaction>, LedgerError>;
        async fn find_in_flight(
            &self,
            user_id: UserId,
            tx_type: VasTransactionType,
            amount: Kobo,
            phone_number: &str,
            window_minutes: i64,
        ) -> Result<Option<VasTransaction>, LedgerError>;
        async fn promote_funding(
            &self,
            id: TransactionId,
            amount_paid: Kobo,
            metadata: serde_json::Value,
        ) -> Result<(), LedgerError>;
        async fn list_for_user(
            &self,
            user_id: UserId,
            offset: i64,
            limit: i64,
        ) -> Result<(Vec<VasTransaction>, i64), LedgerError>;
        async fn statuses_for_references(
            &self,
            user_id: UserId,
            references: Vec<String>,
        ) -> Result<Vec<(String, Option<VasTransactionStatus>)>, LedgerError>;
        async fn find_pending_kyc(
            &self,
            reference: &str,
        ) -> Result<Option<VasTransaction>, LedgerError>;
        async fn record_unmatched_funding(
            &self,
            event: UnmatchedFunding,
        ) -> Result<(), LedgerError>;
    }
}

mock! {
    pub TaskQueueImpl {}

    #[async_trait]
    impl TaskQueue for TaskQueueImpl {
        async fn enqueue(
            &self,
            kind: TaskKind,
            transaction_id: TransactionId,
            payload: serde_json::Value,
        ) -> Result<TaskId, TaskError>;
        async fn claim_next(&self, lease_seconds: i64) -> Result<Option<TransactionTask>, TaskError>;
        async fn complete(&self, task_id: TaskId) -> Result<(), TaskError>;
        async fn retry_later(
            &self,
            task_id: TaskId,
            attempts: i32,
            error: &str,
            next_run_at: DateTime<Utc>,
        ) -> Result<(), TaskError>;
        async fn fail(&self, task_id: TaskId, error: &str) -> Result<(), TaskError>;
        async fn release_expired_leases(&self) -> Result<u64, TaskError>;
        async fn pending_for_user(&self, user_id: UserId) -> Result<Vec<TransactionTask>, TaskError>;
    }
}

mock! {
    pub BillsProviderImpl {}

    #[async_trait]
    impl BillsProvider for BillsProviderImpl {
        async fn vend_airtime(
            &self,
            network: &str,
            amount: Kobo,
            phone_number: &str,
            request_id: &str,
        ) -> Result<VendSuccess, ProviderError>;
        async fn vend_data(
            &self,
            network: &str,
            plan_code: &str,
            phone_number: &str,
            request_id: &str,
        ) -> Result<VendSuccess, ProviderError>;
        async fn list_networks(
            &self,
            category: BillerCategory,
        ) -> Result<Vec<NetworkInfo>, ProviderError>;
        async fn list_data_plans(&self, network: &str) -> Result<Vec<DataPlan>, ProviderError>;
    }
}

mock! {
    pub VendProviderImpl {}

    #[async_trait]
    impl VendProvider for VendProviderImpl {
        async fn vend_airtime(
            &self,
            network: &str,
            amount: Kobo,
            phone_number: &str,
            request_id: &str,
        ) -> Result<VendSuccess, ProviderError>;
        async fn vend_data(
            &self,
            network: &str,
            plan_code: &str,
            phone_number: &str,
            request_id: &str,
        ) -> Result<VendSuccess, ProviderError>;
        async fn list_data_plans(&self, network: &str) -> Result<Vec<DataPlan>, ProviderError>;
    }
}

mock! {
    pub BankAccountProviderImpl {}

    #[async_trait]
    impl BankAccountProvider for BankAccountProviderImpl {
        async fn create_reserved_account(
            &self,
            account_reference: &str,
            account_name: &str,
            customer_email: &str,
        ) -> Result<ReservedAccountDetails, ProviderError>;
        async fn fetch_reserved_account(
            &self,
            account_reference: &str,
        ) -> Result<ReservedAccountDetails, ProviderError>;
    }
}

mock! {
    pub RevenueLedgerImpl {}

    #[async_trait]
    impl RevenueLedger for RevenueLedgerImpl {
        async fn record(&self, entry: CorporateRevenueEntry) -> Result<(), LedgerError>;
    }
}

mock! {
    pub ReferralStoreImpl {}

    #[async_trait]
    impl ReferralStore for ReferralStoreImpl {
        async fn find_for_referee(&self, referee: UserId) -> Result<Option<Referral>, LedgerError>;
        async fn find_active_share(
            &self,
            referee: UserId,
            now: DateTime<Utc>,
        ) -> Result<Option<Referral>, LedgerError>;
        async fn activate(
            &self,
            referral_id: Uuid,
            share_expires_at: DateTime<Utc>,
        ) -> Result<(), LedgerError>;
        async fn record_payout(&self, payout: ReferralPayout) -> Result<(), LedgerError>;
    }
}

mock! {
    pub UserStoreImpl {}

    #[async_trait]
    impl UserStore for UserStoreImpl {
        async fn find(&self, user_id: UserId) -> Result<Option<User>, LedgerError>;
        async fn find_by_email(&self, email: &str) -> Result<Option<User>, LedgerError>;
        async fn mark_first_deposit(&self, user_id: UserId) -> Result<(), LedgerError>;
        async fn grant_ficore_credits(
            &self,
            user_id: UserId,
            amount: Decimal,
            description: &str,
        ) -> Result<(), LedgerError>;
        async fn increment_withdrawable(
            &self,
            user_id: UserId,
            amount: Kobo,
        ) -> Result<(), LedgerError>;
        async fn increment_referral_count(&self, user_id: UserId) -> Result<(), LedgerError>;
    }
}

mock! {
    pub NotificationSenderImpl {}

    #[async_trait]
    impl NotificationSender for NotificationSenderImpl {
        async fn notify(&self, notification: Notification) -> Result<(), LedgerError>;
    }
}

mock! {
    pub AdminAuditLogImpl {}

    #[async_trait]
    impl AdminAuditLog for AdminAuditLogImpl {
        async fn record(&self, action: AdminAction) -> Result<(), LedgerError>;
    }
}

/// Juego completo de mocks con el que se arma un `AppState` de prueba.
/// Cada prueba configura solo los puertos de su flujo; lo demás queda con
/// mocks vacíos que entran en pánico si algo inesperado los toca.
pub struct TestPorts {
    pub wallet: MockWalletStoreImpl,
    pub ledger: MockTransactionLedgerImpl,
    pub tasks: MockTaskQueueImpl,
    pub monnify: MockBillsProviderImpl,
    pub peyflex: MockVendProviderImpl,
    pub accounts: MockBankAccountProviderImpl,
    pub revenue: MockRevenueLedgerImpl,
    pub referrals: MockReferralStoreImpl,
    pub users: MockUserStoreImpl,
    pub notifications: MockNotificationSenderImpl,
    pub audit: MockAdminAuditLogImpl,
}

impl TestPorts {
    pub fn new() -> Self {
        Self {
            wallet: MockWalletStoreImpl::new(),
            ledger: MockTransactionLedgerImpl::new(),
            tasks: MockTaskQueueImpl::new(),
            monnify: MockBillsProviderImpl::new(),
            peyflex: MockVendProviderImpl::new(),
            accounts: MockBankAccountProviderImpl::new(),
            revenue: MockRevenueLedgerImpl::new(),
            referrals: MockReferralStoreImpl::new(),
            users: MockUserStoreImpl::new(),
            notifications: MockNotificationSenderImpl::new(),
            audit: MockAdminAuditLogImpl::new(),
        }
    }

    pub fn into_state(self) -> Arc<AppState> {
        let wallet: Arc<MockWalletStoreImpl> = Arc::new(self.wallet);
        let ledger: Arc<MockTransactionLedgerImpl> = Arc::new(self.ledger);
        let tasks: Arc<MockTaskQueueImpl> = Arc::new(self.tasks);
        let monnify: Arc<MockBillsProviderImpl> = Arc::new(self.monnify);
        let peyflex: Arc<MockVendProviderImpl> = Arc::new(self.peyflex);
        let accounts: Arc<MockBankAccountProviderImpl> = Arc::new(self.accounts);
        let revenue: Arc<MockRevenueLedgerImpl> = Arc::new(self.revenue);
        let referrals: Arc<MockReferralStoreImpl> = Arc::new(self.referrals);
        let users: Arc<MockUserStoreImpl> = Arc::new(self.users);
        let notifications: Arc<MockNotificationSenderImpl> = Arc::new(self.notifications);
        let audit: Arc<MockAdminAuditLogImpl> = Arc::new(self.audit);

        Arc::new(AppState {
            create_wallet: CreateWalletUseCase::new(
                wallet.clone(),
                users.clone(),
                accounts.clone(),
            ),
            get_balance: GetBalanceUseCase::new(wallet.clone(), accounts.clone()),
            buy_airtime: BuyAirtimeUseCase::new(
                wallet.clone(),
                ledger.clone(),
                tasks.clone(),
                monnify.clone(),
                peyflex.clone(),
            ),
            buy_data: BuyDataUseCase::new(
                wallet.clone(),
                ledger.clone(),
                tasks.clone(),
                monnify.clone(),
                peyflex.clone(),
            ),
            catalog: CatalogUseCase::new(monnify.clone(), peyflex.clone()),
            webhook: ProcessWebhookUseCase::new(
                WEBHOOK_SECRET.to_string(),
                wallet.clone(),
                ledger.clone(),
                revenue.clone(),
                referrals.clone(),
                users.clone(),
                notifications.clone(),
            ),
            pin: ManagePinUseCase::new(wallet.clone(), audit.clone()),
            transactions: ListTransactionsUseCase::new(ledger.clone()),
            pending_tasks: PendingTasksUseCase::new(tasks.clone()),
            admin_adjust: AdminAdjustUseCase::new(wallet.clone(), ledger.clone(), audit.clone()),
        })
    }
}

// No todos los binarios de prueba usan todos los helpers.
#[allow(dead_code)]
pub fn user_headers(user_id: UserId) -> axum::http::HeaderMap {
    let mut headers = axum::http::HeaderMap::new();
    headers.insert("x-user-id", user_id.0.to_string().parse().unwrap());
    headers
}
