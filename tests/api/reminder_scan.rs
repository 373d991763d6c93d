use abandoned_reminders::domain::ReminderMarker;
use abandoned_reminders::domain::SubscriptionStatus;
use abandoned_reminders::store::CustomerRecord;
use chrono::Duration;
use chrono::Utc;
use serde_json::json;
use serde_json::Value;
use wiremock::matchers::method;
use wiremock::matchers::path;
use wiremock::Mock;
use wiremock::ResponseTemplate;

use crate::helpers::spawn_app;
use crate::helpers::user;
use crate::helpers::with_attributes;
use crate::helpers::CHECKOUT_URL;
use crate::helpers::FALLBACK_URL;
use crate::helpers::MXN_PRICE;
use crate::helpers::USD_PRICE;

fn hours(h: i64) -> Duration { Duration::hours(h) }

#[tokio::test]
async fn eligible_users_get_exactly_one_reminder() {
    let app = spawn_app().await;
    app.mount_identities(vec![user("a", hours(25)), user("b", hours(29))])
        .await;
    app.mount_checkout().await;

    let resp = app.run_scan().await;
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body,
        json!({
            "status": "success",
            "count": 2,
            "processed": ["a@example.com", "b@example.com"],
        })
    );

    let mail = app.store.mail();
    assert_eq!(mail.len(), 2);
    assert_eq!(mail[0].to, "a@example.com");
    assert_eq!(mail[0].template.name, "reminder-abandoned-reg");
    assert_eq!(mail[0].data_str("displayName"), Some("User a"));
    assert_eq!(mail[0].data_str("checkoutUrl"), Some(CHECKOUT_URL));

    let marker = app.store.marker("a").unwrap();
    assert_eq!(marker.email, "a@example.com");
    assert_eq!(marker.plan, USD_PRICE);
    assert!(app.store.marker("b").is_some());
}

#[tokio::test]
async fn get_triggers_a_scan_too() {
    let app = spawn_app().await;
    app.mount_identities(vec![user("a", hours(25))]).await;
    app.mount_checkout().await;

    let resp = app.run_scan_with_get().await;
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(app.store.mail().len(), 1);
}

#[tokio::test]
async fn users_outside_the_window_are_not_reminded() {
    let app = spawn_app().await;
    app.mount_identities(vec![
        user("too-old", hours(31)),
        user("too-new", hours(23)),
        user("just-now", Duration::minutes(1)),
        user("last-week", hours(24 * 7)),
    ])
    .await;
    app.mount_checkout().await;

    let body: Value = app.run_scan().await.json().await.unwrap();
    assert_eq!(body["count"], 0);
    assert_eq!(body["processed"], json!([]));
    assert!(app.store.mail().is_empty());
    assert!(app.store.markers().is_empty());
}

#[tokio::test]
async fn subscribed_opted_out_and_reminded_users_are_skipped() {
    let app = spawn_app().await;
    app.store.insert_subscription("active", SubscriptionStatus::Active);
    app.store
        .insert_subscription("trialing", SubscriptionStatus::Trialing);
    app.store
        .insert_subscription("canceled", SubscriptionStatus::Canceled);
    app.store.insert_marker(ReminderMarker {
        user_id: "reminded".to_string(),
        sent_at: Utc::now() - hours(1),
        email: "reminded@example.com".to_string(),
        plan: USD_PRICE.to_string(),
    });
    app.mount_identities(vec![
        user("active", hours(25)),
        user("trialing", hours(25)),
        user("canceled", hours(25)),
        user("reminded", hours(25)),
        with_attributes(
            user("opted-out", hours(25)),
            json!({ "marketingOptOut": true }),
        ),
    ])
    .await;
    app.mount_checkout().await;

    let body: Value = app.run_scan().await.json().await.unwrap();
    assert_eq!(body["processed"], json!(["canceled@example.com"]));
    let mail = app.store.mail();
    assert_eq!(mail.len(), 1);
    assert_eq!(mail[0].to, "canceled@example.com");
}

#[tokio::test]
async fn second_scan_sends_nothing() {
    let app = spawn_app().await;
    app.mount_identities(vec![user("a", hours(25)), user("b", hours(26))])
        .await;
    app.mount_checkout().await;

    let first: Value = app.run_scan().await.json().await.unwrap();
    let second: Value = app.run_scan().await.json().await.unwrap();

    assert_eq!(first["count"], 2);
    assert_eq!(second["count"], 0);
    assert_eq!(second["processed"], json!([]));
    assert_eq!(app.store.mail().len(), 2);
}

#[tokio::test]
async fn overlapping_scans_send_each_reminder_once() {
    let app = spawn_app().await;
    let users = (0..20).map(|i| user(&format!("u{i}"), hours(25))).collect();
    app.mount_identities(users).await;
    app.mount_checkout().await;

    let (first, second) = tokio::join!(app.run_scan(), app.run_scan());
    let first: Value = first.json().await.unwrap();
    let second: Value = second.json().await.unwrap();

    let total = first["count"].as_u64().unwrap() + second["count"].as_u64().unwrap();
    assert_eq!(total, 20);
    assert_eq!(app.store.mail().len(), 20);
    assert_eq!(app.store.markers().len(), 20);
}

#[tokio::test]
async fn mexico_gets_the_mxn_price() {
    let app = spawn_app().await;
    app.mount_identities(vec![
        with_attributes(user("mx", hours(25)), json!({ "country": "MX" })),
        with_attributes(user("us", hours(25)), json!({ "country": "US" })),
        with_attributes(user("lower", hours(25)), json!({ "country": "mx" })),
        user("unknown", hours(25)),
    ])
    .await;
    app.mount_checkout().await;

    app.run_scan().await;

    let bodies = app.checkout_bodies().await;
    assert_eq!(bodies.len(), 4);
    let price_of = |user: &str| {
        let body = bodies
            .iter()
            .find(|b| b.contains(&format!("client_reference_id={user}&")))
            .unwrap();
        match body.contains(MXN_PRICE) {
            true => MXN_PRICE,
            false => USD_PRICE,
        }
    };
    assert_eq!(price_of("mx"), MXN_PRICE);
    assert_eq!(price_of("us"), USD_PRICE);
    assert_eq!(price_of("lower"), USD_PRICE);
    assert_eq!(price_of("unknown"), USD_PRICE);
    assert_eq!(app.store.marker("mx").unwrap().plan, MXN_PRICE);
}

#[tokio::test]
async fn known_customers_check_out_as_themselves() {
    let app = spawn_app().await;
    app.store.insert_customer(CustomerRecord {
        user_id: "a".to_string(),
        stripe_id: Some("cus_a".to_string()),
        email: None,
    });
    app.mount_identities(vec![user("a", hours(25)), user("b", hours(25))])
        .await;
    app.mount_checkout().await;

    app.run_scan().await;

    let bodies = app.checkout_bodies().await;
    let a = bodies
        .iter()
        .find(|b| b.contains("client_reference_id=a&"))
        .unwrap();
    let b = bodies
        .iter()
        .find(|b| b.contains("client_reference_id=b&"))
        .unwrap();
    assert!(a.contains("customer=cus_a"));
    assert!(!a.contains("customer_email"));
    assert!(b.contains("customer_email=b%40example.com"));
}

#[tokio::test]
async fn checkout_failure_falls_back_to_static_link() {
    let app = spawn_app().await;
    app.mount_identities(vec![user("a", hours(25))]).await;
    Mock::given(method("POST"))
        .and(path("/v1/checkout/sessions"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&app.stripe_server)
        .await;

    let resp = app.run_scan().await;
    assert_eq!(resp.status().as_u16(), 200);

    let mail = app.store.mail();
    assert_eq!(mail.len(), 1);
    assert_eq!(mail[0].data_str("checkoutUrl"), Some(FALLBACK_URL));
    assert!(app.store.marker("a").is_some());
}

#[tokio::test]
async fn every_page_is_scanned() {
    let app = spawn_app().await;
    app.mount_identity_pages(vec![
        vec![user("a", hours(25)), user("old", hours(40))],
        vec![],
        vec![user("b", hours(27))],
    ])
    .await;
    app.mount_checkout().await;

    let body: Value = app.run_scan().await.json().await.unwrap();
    assert_eq!(body["processed"], json!(["a@example.com", "b@example.com"]));
}

#[tokio::test]
async fn listing_failure_is_a_500() {
    let app = spawn_app().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&app.identity_server)
        .await;

    let resp = app.run_scan().await;
    assert_eq!(resp.status().as_u16(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "error");
    assert!(body["message"].as_str().unwrap().contains("list identities"));
    assert!(app.store.mail().is_empty());
}

#[tokio::test]
async fn users_without_usable_email_are_skipped() {
    let app = spawn_app().await;
    let mut no_email = user("no-email", hours(25));
    no_email["email"] = Value::Null;
    let mut bad_email = user("bad-email", hours(25));
    bad_email["email"] = json!("not-an-email");
    app.mount_identities(vec![no_email, bad_email, user("ok", hours(25))])
        .await;
    app.mount_checkout().await;

    let body: Value = app.run_scan().await.json().await.unwrap();
    assert_eq!(body["processed"], json!(["ok@example.com"]));
}

#[tokio::test]
async fn a_corrupt_user_record_does_not_abort_the_scan() {
    let app = spawn_app().await;
    let mut corrupt = user("corrupt", hours(25));
    corrupt["createdAt"] = json!("not-a-number");
    app.mount_identities(vec![corrupt, user("ok", hours(25))])
        .await;
    app.mount_checkout().await;

    let resp = app.run_scan().await;
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["processed"], json!(["ok@example.com"]));
    assert!(app.store.marker("corrupt").is_none());
}
