use anyhow::Context;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::FmtSubscriber;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use vas_service::{
    api::{purchase_routes, wallet_routes, AppState},
    config::Config,
    infrastructure::{
        gateways::{monnify::MonnifyGateway, peyflex::PeyflexGateway},
        persistence::{
            audit_repository::{
                PostgresAdminAuditLog, PostgresMismatchLog, PostgresNotificationSender,
            },
            referral_repository::PostgresReferralStore,
            revenue_repository::{PostgresLedgerEventSink, PostgresRevenueLedger},
            task_repository::PostgresTaskQueue,
            transaction_repository::PostgresTransactionLedger,
            user_repository::PostgresUserStore,
            wallet_repository::PostgresWalletStore,
        },
    },
    jobs::{
        settlement::SettlementWorker,
        sweeper::{LeaseSweeper, ReservationSweeper},
    },
    use_cases::{
        admin_adjust::AdminAdjustUseCase, buy_airtime::BuyAirtimeUseCase,
        buy_data::BuyDataUseCase, catalog::CatalogUseCase, create_wallet::CreateWalletUseCase,
        get_balance::GetBalanceUseCase, list_transactions::ListTransactionsUseCase,
        manage_pin::ManagePinUseCase, pending_tasks::PendingTasksUseCase,
        process_webhook::ProcessWebhookUseCase, settle_transaction::SettleTransactionUseCase,
    },
};

#[derive(OpenApi)]
#[openapi(
    paths(
        vas_service::api::wallet_routes::create_wallet,
        vas_service::api::wallet_routes::wallet_balance,
        vas_service::api::wallet_routes::current_balance,
        vas_service::api::wallet_routes::funding_webhook,
        vas_service::api::wallet_routes::pin_setup,
        vas_service::api::wallet_routes::pin_validate,
        vas_service::api::wallet_routes::pin_change,
        vas_service::api::wallet_routes::pin_status,
        vas_service::api::wallet_routes::pin_admin_reset,
        vas_service::api::wallet_routes::all_transactions,
        vas_service::api::wallet_routes::sync_transactions,
        vas_service::api::wallet_routes::pending_tasks,
        vas_service::api::wallet_routes::admin_refund,
        vas_service::api::wallet_routes::admin_deduct,
        vas_service::api::purchase_routes::buy_airtime,
        vas_service::api::purchase_routes::buy_data,
        vas_service::api::purchase_routes::networks,
        vas_service::api::purchase_routes::data_plans,
        vas_service::api::purchase_routes::data_plan_types,
    ),
    components(schemas(
        vas_service::api::wallet_routes::PinSetupRequest,
        vas_service::api::wallet_routes::PinValidateRequest,
        vas_service::api::wallet_routes::PinChangeRequest,
        vas_service::api::wallet_routes::PinAdminResetRequest,
        vas_service::api::wallet_routes::SyncRequest,
        vas_service::api::wallet_routes::AdminAdjustmentRequest,
        vas_service::api::purchase_routes::BuyAirtimeRequest,
        vas_service::api::purchase_routes::BuyDataRequest,
        vas_service::api::response::ApiResponse<serde_json::Value>
    ))
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Cargar variables de entorno
    dotenv().ok();

    // 2. Configurar Logging/Tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(tracing::Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("Starting VAS Service...");

    let config = Config::from_env().context("missing or invalid environment configuration")?;

    // 3. Configurar Conexión a Base de Datos
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("failed to connect to the database")?;

    info!("Connected to Database");

    // 4. Instanciar Dependencias (Infraestructura)
    let wallet_store = Arc::new(PostgresWalletStore::new(pool.clone()));
    let ledger = Arc::new(PostgresTransactionLedger::new(pool.clone()));
    let task_queue = Arc::new(PostgresTaskQueue::new(pool.clone()));
    let revenue = Arc::new(PostgresRevenueLedger::new(pool.clone()));
    let bookkeeping = Arc::new(PostgresLedgerEventSink::new(pool.clone()));
    let referrals = Arc::new(PostgresReferralStore::new(pool.clone()));
    let users = Arc::new(PostgresUserStore::new(pool.clone()));
    let mismatches = Arc::new(PostgresMismatchLog::new(pool.clone()));
    let notifications = Arc::new(PostgresNotificationSender::new(pool.clone()));
    let audit = Arc::new(PostgresAdminAuditLog::new(pool.clone()));

    let monnify = Arc::new(MonnifyGateway::new(
        config.monnify_base_url.clone(),
        config.monnify_api_key.clone(),
        config.monnify_secret_key.clone(),
        config.monnify_contract_code.clone(),
    ));
    let peyflex = Arc::new(PeyflexGateway::new(
        config.peyflex_base_url.clone(),
        config.peyflex_api_token.clone(),
    ));

    // 5. Instanciar Casos de Uso
    let settle = Arc::new(SettleTransactionUseCase::new(
        wallet_store.clone(),
        ledger.clone(),
        revenue.clone(),
        bookkeeping.clone(),
        referrals.clone(),
        users.clone(),
        mismatches.clone(),
        notifications.clone(),
    ));

    let app_state = Arc::new(AppState {
        create_wallet: CreateWalletUseCase::new(
            wallet_store.clone(),
            users.clone(),
            monnify.clone(),
        ),
        get_balance: GetBalanceUseCase::new(wallet_store.clone(), monnify.clone()),
        buy_airtime: BuyAirtimeUseCase::new(
            wallet_store.clone(),
            ledger.clone(),
            task_queue.clone(),
            monnify.clone(),
            peyflex.clone(),
        ),
        buy_data: BuyDataUseCase::new(
            wallet_store.clone(),
            ledger.clone(),
            task_queue.clone(),
            monnify.clone(),
            peyflex.clone(),
        ),
        catalog: CatalogUseCase::new(monnify.clone(), peyflex.clone()),
        webhook: ProcessWebhookUseCase::new(
            config.monnify_secret_key.clone(),
            wallet_store.clone(),
            ledger.clone(),
            revenue.clone(),
            referrals.clone(),
            users.clone(),
            notifications.clone(),
        ),
        pin: ManagePinUseCase::new(wallet_store.clone(), audit.clone()),
        transactions: ListTransactionsUseCase::new(ledger.clone()),
        pending_tasks: PendingTasksUseCase::new(task_queue.clone()),
        admin_adjust: AdminAdjustUseCase::new(wallet_store.clone(), ledger.clone(), audit.clone()),
    });

    // 6. Iniciar Background Jobs
    // Workers de liquidación: drenan la cola cada segundo.
    for worker_index in 0..config.settlement_workers {
        let worker = SettlementWorker::new(
            task_queue.clone(),
            ledger.clone(),
            notifications.clone(),
            settle.clone(),
        );
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
            info!("Settlement worker {} started", worker_index);
            loop {
                interval.tick().await;
                worker.run().await;
            }
        });
    }

    // Barrido de leases vencidos cada 30 segundos.
    {
        let sweeper = LeaseSweeper::new(task_queue.clone());
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));
            loop {
                interval.tick().await;
                sweeper.run().await;
            }
        });
    }

    // Barrido de reservas viejas cada minuto.
    {
        let sweeper = ReservationSweeper::new(wallet_store.clone());
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                interval.tick().await;
                sweeper.run().await;
            }
        });
    }

    info!("Background Job Scheduler started");

    // 7. Configurar Rutas y Servidor HTTP
    let app = wallet_routes::routes(app_state.clone())
        .merge(purchase_routes::routes(app_state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    let addr = format!("{}:{}", config.host, config.port);
    info!("HTTP Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
