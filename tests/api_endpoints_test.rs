use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use adfund::api::{self, USER_ID_HEADER, USER_ROLE_HEADER};
use adfund::external::{FixedCode, MemoryBlobStore};
use adfund::{init_db, BalanceTarget, Currency, FundingService, Ledger, Money, Repository, Role, TimeMs, WalletBucket};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;
use uuid::Uuid;

struct TestApp {
    app: axum::Router,
    funding: FundingService,
    _temp: TempDir,
}

async fn setup_test_app() -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let funding = FundingService::new(Arc::new(Repository::new(pool)))
        .with_codes(Arc::new(FixedCode(Money::from_units(123))))
        .with_blob_store(Arc::new(MemoryBlobStore::new(1024)));
    let app = api::create_router(api::AppState::new(funding.clone()).with_max_upload_bytes(4096));

    TestApp {
        app,
        funding,
        _temp: temp_dir,
    }
}

#[derive(Clone, Copy)]
enum As {
    Nobody,
    Client(Uuid),
    Admin,
}

async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    who: As,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    match who {
        As::Nobody => {}
        As::Client(id) => {
            builder = builder
                .header(USER_ID_HEADER, id.to_string())
                .header(USER_ROLE_HEADER, "client");
        }
        As::Admin => {
            builder = builder
                .header(USER_ID_HEADER, Uuid::new_v4().to_string())
                .header(USER_ROLE_HEADER, "admin");
        }
    }
    let req = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn client(funding: &FundingService) -> Uuid {
    let email = format!("{}@example.com", Uuid::new_v4().simple());
    funding
        .create_user(&email, "Client", Role::Client)
        .await
        .unwrap()
        .id
}

async fn approved_account(app: &axum::Router, user_id: Uuid) -> String {
    let (status, request) = send(
        app,
        "POST",
        "/v1/account-requests",
        As::Client(user_id),
        Some(json!({
            "account_name": "Holiday Promo",
            "currency": "IDR",
            "platform": "google",
            "gmail": "ads@example.com",
            "website": "https://example.com"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{request}");

    let (status, approved) = send(
        app,
        "PUT",
        &format!("/v1/account-requests/{}/status", request["id"].as_str().unwrap()),
        As::Admin,
        Some(json!({ "status": "approved", "fee_percentage": "5" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{approved}");
    approved["ad_account_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    let test_app = setup_test_app().await;
    let (status, body) = send(&test_app.app, "GET", "/health", As::Nobody, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = send(&test_app.app, "GET", "/ready", As::Nobody, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let test_app = setup_test_app().await;
    let (status, body) = send(&test_app.app, "GET", "/v1/wallet", As::Nobody, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_wallet_topup_over_http() {
    let test_app = setup_test_app().await;
    let app = &test_app.app;
    let user_id = client(&test_app.funding).await;

    let (status, receipt) = send(
        app,
        "POST",
        "/v1/wallet-topups",
        As::Client(user_id),
        Some(json!({ "amount": "100000", "currency": "IDR", "payment_method": "bank_transfer" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{receipt}");
    assert_eq!(receipt["unique_code"], "123.00");
    assert_eq!(receipt["total_with_unique_code"], "100123.00");
    let id = receipt["request_id"].as_str().unwrap().to_string();

    let req = Request::builder()
        .method("POST")
        .uri(format!("/v1/wallet-topups/{}/proof", id))
        .header(USER_ID_HEADER, user_id.to_string())
        .header(USER_ROLE_HEADER, "client")
        .header(header::CONTENT_TYPE, "image/png")
        .body(Body::from(vec![0x89, b'P', b'N', b'G']))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // Clients may not verify their own payments.
    let (status, _) = send(
        app,
        "POST",
        &format!("/v1/wallet-topups/{}/verify", id),
        As::Client(user_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, verified) = send(
        app,
        "POST",
        &format!("/v1/wallet-topups/{}/verify", id),
        As::Admin,
        Some(json!({ "admin_notes": "matched on statement" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{verified}");
    assert_eq!(verified["status"], "verified");

    let (status, wallet) = send(app, "GET", "/v1/wallet", As::Client(user_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(wallet["main_idr"], "100000.00");

    let (status, again) = send(
        app,
        "POST",
        &format!("/v1/wallet-topups/{}/verify", id),
        As::Admin,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(again["retryable"], false);

    let (status, txs) = send(
        app,
        "GET",
        "/v1/transactions?type=wallet_topup&status=completed",
        As::Client(user_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(txs.as_array().unwrap().len(), 1);

    let (status, notes) = send(app, "GET", "/v1/notifications?unread_only=true", As::Client(user_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(notes
        .as_array()
        .unwrap()
        .iter()
        .any(|n| n["type"] == "wallet_topup_verified"));
}

#[tokio::test]
async fn test_oversized_or_wrong_type_proof_is_bad_request() {
    let test_app = setup_test_app().await;
    let app = &test_app.app;
    let user_id = client(&test_app.funding).await;
    let (_, receipt) = send(
        app,
        "POST",
        "/v1/wallet-topups",
        As::Client(user_id),
        Some(json!({ "amount": 50, "currency": "USD", "payment_method": "wire" })),
    )
    .await;
    let id = receipt["request_id"].as_str().unwrap().to_string();

    let req = Request::builder()
        .method("POST")
        .uri(format!("/v1/wallet-topups/{}/proof", id))
        .header(USER_ID_HEADER, user_id.to_string())
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("not an image"))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = Request::builder()
        .method("POST")
        .uri(format!("/v1/wallet-topups/{}/proof", id))
        .header(USER_ID_HEADER, user_id.to_string())
        .header(header::CONTENT_TYPE, "image/png")
        .body(Body::from(vec![0u8; 2048]))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_duplicate_withdrawal_is_conflict() {
    let test_app = setup_test_app().await;
    let app = &test_app.app;
    let user_id = client(&test_app.funding).await;
    let account_id = approved_account(app, user_id).await;

    let body = json!({ "ad_account_id": account_id, "currency": "IDR" });
    let (status, _) = send(app, "POST", "/v1/withdrawals", As::Client(user_id), Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, err) = send(app, "POST", "/v1/withdrawals", As::Client(user_id), Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(err["error"].as_str().unwrap().contains("unresolved withdrawal"));
}

#[tokio::test]
async fn test_transfer_without_funds_is_unprocessable() {
    let test_app = setup_test_app().await;
    let app = &test_app.app;
    let user_id = client(&test_app.funding).await;
    let account_id = approved_account(app, user_id).await;

    let mut tx = test_app.funding.repo().begin().await.unwrap();
    Ledger::new(None, TimeMs::now())
        .credit(
            &mut tx,
            BalanceTarget::Wallet {
                user_id,
                bucket: WalletBucket::main(Currency::Idr),
            },
            Money::from_units(1_000),
        )
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let (status, transfer) = send(
        app,
        "POST",
        "/v1/transfers",
        As::Client(user_id),
        Some(json!({ "ad_account_id": account_id, "amount": "5000" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{transfer}");
    assert_eq!(transfer["fee"], "250.00");
    assert_eq!(transfer["total"], "5250.00");

    let (status, _) = send(
        app,
        "PUT",
        &format!("/v1/transfers/{}/status", transfer["id"].as_str().unwrap()),
        As::Admin,
        Some(json!({ "status": "approved" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (_, wallet) = send(app, "GET", "/v1/wallet", As::Client(user_id), None).await;
    assert_eq!(wallet["main_idr"], "1000.00");
    let (_, stored) = send(
        app,
        "GET",
        &format!("/v1/transfers/{}", transfer["id"].as_str().unwrap()),
        As::Client(user_id),
        None,
    )
    .await;
    assert_eq!(stored["status"], "pending");
}

#[tokio::test]
async fn test_invoice_is_pdf() {
    let test_app = setup_test_app().await;
    let app = &test_app.app;
    let user_id = client(&test_app.funding).await;
    approved_account(app, user_id).await;

    let (_, txs) = send(app, "GET", "/v1/transactions", As::Client(user_id), None).await;
    let tx_id = txs[0]["id"].as_str().unwrap().to_string();

    let req = Request::builder()
        .method("GET")
        .uri(format!("/v1/transactions/{}/invoice", tx_id))
        .header(USER_ID_HEADER, user_id.to_string())
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/pdf"
    );
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(bytes.starts_with(b"%PDF-"));

    let stranger = client(&test_app.funding).await;
    let (status, _) = send(
        app,
        "GET",
        &format!("/v1/transactions/{}/invoice", tx_id),
        As::Client(stranger),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
