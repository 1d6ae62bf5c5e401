mod support;

use axum::extract::State;
use axum::response::IntoResponse;
use common::{reference as refs, Kobo};
use hmac::{Hmac, Mac};
use sha2::Sha512;
use support::{TestPorts, WEBHOOK_SECRET};

use vas_service::api::wallet_routes::funding_webhook;
use vas_service::domain::entities::{User, VasTransaction};
use vas_service::domain::repository::{BalanceChange, FundingInsert};
use vas_service::domain::types::UserId;

fn sign(body: &str) -> String {
    let mut mac = Hmac::<Sha512>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn webhook_headers(signature: &str) -> axum::http::HeaderMap {
    let mut headers = axum::http::HeaderMap::new();
    headers.insert("monnify-signature", signature.parse().unwrap());
    headers
}

fn funding_body(user: UserId, amount: &str, reference: &str) -> String {
    serde_json::json!({
        "eventType": "SUCCESSFUL_TRANSACTION",
        "eventData": {
            "amountPaid": amount,
            "transactionReference": reference,
            "product": {
                "type": "RESERVED_ACCOUNT",
                "reference": refs::account_reference(user.0),
            }
        }
    })
    .to_string()
}

fn plain_user(id: UserId) -> User {
    User {
        id,
        email: "ada@example.com".to_string(),
        full_name: "Ada Obi".to_string(),
        is_admin: false,
        is_subscribed: false,
        subscription_plan: None,
        subscription_end_date: None,
        ficore_credit_balance: rust_decimal::Decimal::ZERO,
        withdrawable_balance: Kobo::ZERO,
        first_deposit_completed: true,
        referral_count: 0,
        created_at: chrono::Utc::now(),
    }
}

#[tokio::test]
async fn test_webhook_with_bad_signature_is_401_and_untouched() {
    let ports = TestPorts::new(); // sin expectativas: nada debe tocarse
    let state = ports.into_state();

    let user = UserId::new();
    let body = funding_body(user, "1000.00", "MFY-REF-1");

    let result = funding_webhook(
        State(state),
        webhook_headers("0badc0de"),
        axum::body::Bytes::from(body),
    )
    .await;

    let response = result.expect_err("must be rejected").into_response();
    assert_eq!(response.status(), axum::http::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_funding_webhook_credits_with_fee_split() {
    // Escenario de referencia: ₦1,000 → cuota ₦30, acreditado ₦970.
    let mut ports = TestPorts::new();
    let user = UserId::new();

    ports
        .ledger
        .expect_confirm_provider_webhook()
        .returning(|_, _| Ok(None));
    ports
        .ledger
        .expect_find_by_reference()
        .returning(|_| Ok(None));
    ports
        .users
        .expect_find()
        .returning(|id| Ok(Some(plain_user(id))));
    ports
        .ledger
        .expect_insert_funding()
        .withf(|tx| tx.amount == Kobo(97_000) && tx.gateway_fee == Kobo(1_600))
        .times(1)
        .returning(|tx| Ok(FundingInsert::Inserted(tx.id)));
    ports
        .wallet
        .expect_credit_balance()
        .withf(|_, amount, reference, _| *amount == Kobo(97_000) && reference == "FICORE_WH_xyz")
        .times(1)
        .returning(|_, amount, _, _| Ok(BalanceChange::Applied { new_balance: amount }));
    ports
        .revenue
        .expect_record()
        .withf(|entry| entry.category == "DEPOSIT_FEE" && entry.net_revenue == Some(Kobo(1_400)))
        .times(1)
        .returning(|_| Ok(()));
    ports.wallet.expect_get().returning(|id| {
        let mut w = vas_service::domain::entities::Wallet::new(id);
        w.balance = Kobo(97_000);
        Ok(w)
    });
    ports.notifications.expect_notify().returning(|_| Ok(()));

    let state = ports.into_state();
    let body = funding_body(user, "1000.00", "FICORE_WH_xyz");
    let signature = sign(&body);

    let result = funding_webhook(
        State(state),
        webhook_headers(&signature),
        axum::body::Bytes::from(body),
    )
    .await;

    let axum::Json(response) = result.expect("webhook must be accepted");
    assert!(response.success);
    assert_eq!(
        response.message.as_deref(),
        Some("Wallet funded successfully")
    );
}

#[tokio::test]
async fn test_replaying_the_same_signed_body_is_a_noop() {
    let mut ports = TestPorts::new();
    let user = UserId::new();

    ports
        .ledger
        .expect_confirm_provider_webhook()
        .returning(|_, _| Ok(None));
    // El primer procesamiento dejó la fila SUCCESS.
    ports.ledger.expect_find_by_reference().returning(move |r| {
        Ok(Some(VasTransaction::new_funding(
            user,
            Kobo(97_000),
            Kobo(100_000),
            Kobo(1_600),
            false,
            r.to_string(),
            serde_json::json!({}),
        )))
    });
    // Nada más: sin créditos, sin filas nuevas.

    let state = ports.into_state();
    let body = funding_body(user, "1000.00", "FICORE_WH_xyz");
    let signature = sign(&body);

    let result = funding_webhook(
        State(state),
        webhook_headers(&signature),
        axum::body::Bytes::from(body),
    )
    .await;

    let axum::Json(response) = result.expect("replay must be acknowledged");
    assert!(response.success);
    assert_eq!(response.message.as_deref(), Some("Already processed"));
}

#[tokio::test]
async fn test_vas_confirmation_updates_row_without_credit() {
    let mut ports = TestPorts::new();
    let user = UserId::new();

    ports
        .ledger
        .expect_confirm_provider_webhook()
        .times(1)
        .returning(move |r, _| {
            Ok(Some(VasTransaction::new_purchase(
                user,
                vas_service::domain::entities::VasTransactionType::AIRTIME,
                "MTN".to_string(),
                "08031234567".to_string(),
                Kobo(20_000),
                r.to_string(),
            )))
        });
    // Sin expectativas de wallet: un webhook VAS jamás acredita.

    let state = ports.into_state();
    let body = funding_body(user, "200.00", "FICORE_AIRTIME_ref");
    let signature = sign(&body);

    let result = funding_webhook(
        State(state),
        webhook_headers(&signature),
        axum::body::Bytes::from(body),
    )
    .await;

    let axum::Json(response) = result.expect("confirmation must be accepted");
    assert_eq!(
        response.message.as_deref(),
        Some("VAS confirmation processed")
    );
}

#[tokio::test]
async fn test_small_deposit_is_rejected_with_400() {
    let mut ports = TestPorts::new();
    let user = UserId::new();

    ports
        .ledger
        .expect_confirm_provider_webhook()
        .returning(|_, _| Ok(None));
    ports
        .ledger
        .expect_find_by_reference()
        .returning(|_| Ok(None));
    ports
        .users
        .expect_find()
        .returning(|id| Ok(Some(plain_user(id))));

    let state = ports.into_state();
    // ₦20 no cubre la cuota de ₦30.
    let body = funding_body(user, "20.00", "FICORE_WH_tiny");
    let signature = sign(&body);

    let result = funding_webhook(
        State(state),
        webhook_headers(&signature),
        axum::body::Bytes::from(body),
    )
    .await;

    let response = result.expect_err("must be rejected").into_response();
    assert_eq!(response.status(), axum::http::StatusCode::BAD_REQUEST);
}
