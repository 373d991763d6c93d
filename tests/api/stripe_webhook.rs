use abandoned_reminders::domain::DisplayName;
use abandoned_reminders::store::CustomerRecord;
use abandoned_reminders::store::UserProfile;
use chrono::Utc;
use serde_json::json;
use serde_json::Value;
use wiremock::matchers::method;
use wiremock::Mock;
use wiremock::ResponseTemplate;

use crate::helpers::sign;
use crate::helpers::spawn_app;
use crate::helpers::subscription_created;
use crate::helpers::TestApp;
use crate::helpers::ADMIN_EMAIL;

async fn app_with_customer() -> TestApp {
    let app = spawn_app().await;
    app.store.insert_customer(CustomerRecord {
        user_id: "u1".to_string(),
        stripe_id: Some("cus_1".to_string()),
        email: Some("billing@example.com".to_string()),
    });
    app.store.insert_profile(UserProfile {
        user_id: "u1".to_string(),
        email: Some("ana@example.com".to_string()),
        display_name: Some("Ana".to_string()),
    });
    app
}

async fn assert_rejected(resp: reqwest::Response) {
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "error");
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn new_subscription_sends_welcome_and_admin_mail() {
    let app = app_with_customer().await;
    app.mount_customer(Some("Ana Live")).await;

    let resp = app
        .post_signed_webhook(&subscription_created(json!("cus_1")))
        .await;
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "status": "success" }));

    let mail = app.store.mail();
    assert_eq!(mail.len(), 2);

    let welcome = &mail[0];
    assert_eq!(welcome.to, "ana@example.com");
    assert_eq!(welcome.template.name, "welcome-subscription");
    assert_eq!(welcome.data_str("displayName"), Some("Ana Live"));
    assert!(welcome.data_str("planLabel").is_some());

    let admin = &mail[1];
    assert_eq!(admin.to, ADMIN_EMAIL);
    assert_eq!(admin.template.name, "admin-new-subscription");
    assert_eq!(admin.data_str("customerName"), Some("Ana Live"));
    assert_eq!(admin.data_str("customerEmail"), Some("ana@example.com"));
    assert_eq!(admin.data_str("subscriptionId"), Some("sub_test"));
    assert!(admin.data_str("createdAt").unwrap().ends_with("UTC"));
}

#[tokio::test]
async fn stored_name_is_used_when_the_provider_has_none() {
    let app = app_with_customer().await;
    app.mount_customer(None).await;

    app.post_signed_webhook(&subscription_created(json!("cus_1")))
        .await;

    assert_eq!(app.store.mail()[0].data_str("displayName"), Some("Ana"));
}

#[tokio::test]
async fn provider_lookup_failure_still_notifies() {
    let app = app_with_customer().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&app.stripe_server)
        .await;

    let resp = app
        .post_signed_webhook(&subscription_created(json!("cus_1")))
        .await;

    assert_eq!(resp.status().as_u16(), 200);
    let mail = app.store.mail();
    assert_eq!(mail.len(), 2);
    assert_eq!(mail[0].data_str("displayName"), Some("Ana"));
}

#[tokio::test]
async fn fallback_name_and_embedded_email() {
    let app = spawn_app().await;
    app.store.insert_customer(CustomerRecord {
        user_id: "u2".to_string(),
        stripe_id: Some("cus_2".to_string()),
        email: None,
    });
    app.mount_customer(None).await;
    let customer = json!({ "id": "cus_2", "email": "embedded@example.com", "name": null });

    app.post_signed_webhook(&subscription_created(customer))
        .await;

    let mail = app.store.mail();
    assert_eq!(mail[0].to, "embedded@example.com");
    assert_eq!(mail[0].data_str("displayName"), Some(DisplayName::FALLBACK));
    assert_eq!(mail[1].data_str("customerEmail"), Some("embedded@example.com"));
}

#[tokio::test]
async fn no_usable_email_writes_nothing() {
    let app = spawn_app().await;
    app.store.insert_customer(CustomerRecord {
        user_id: "u3".to_string(),
        stripe_id: Some("cus_3".to_string()),
        email: None,
    });
    app.mount_customer(Some("Nobody")).await;

    let resp = app
        .post_signed_webhook(&subscription_created(json!("cus_3")))
        .await;

    assert_eq!(resp.status().as_u16(), 200);
    assert!(app.store.mail().is_empty());
}

#[tokio::test]
async fn unknown_customer_is_a_no_op() {
    let app = app_with_customer().await;
    app.mount_customer(Some("Stranger")).await;

    let resp = app
        .post_signed_webhook(&subscription_created(json!("cus_unknown")))
        .await;

    assert_eq!(resp.status().as_u16(), 200);
    assert!(app.store.mail().is_empty());
}

#[tokio::test]
async fn other_event_types_are_ignored() {
    let app = app_with_customer().await;
    for event_type in [
        "customer.subscription.updated",
        "customer.subscription.deleted",
        "invoice.paid",
        "checkout.session.completed",
    ] {
        let body = json!({
            "id": "evt_other",
            "type": event_type,
            "data": { "object": { "id": "obj_1", "customer": "cus_1" } },
        })
        .to_string();

        let resp = app.post_signed_webhook(&body).await;
        assert_eq!(resp.status().as_u16(), 200, "{event_type}");
    }
    assert!(app.store.mail().is_empty());
}

#[tokio::test]
async fn bad_signatures_are_rejected() {
    let app = app_with_customer().await;
    let body = subscription_created(json!("cus_1"));
    let now = Utc::now().timestamp();

    let cases = [
        None,
        Some("".to_string()),
        Some("garbage".to_string()),
        Some(format!("t={now}")),
        Some(format!("t={now},v1=deadbeef")),
        // signed for another body
        Some(sign("{}", now)),
        // stale
        Some(sign(&body, now - 3600)),
    ];
    for signature in cases {
        assert_rejected(app.post_webhook(&body, signature).await).await;
    }
    assert!(app.store.mail().is_empty());
}

#[tokio::test]
async fn malformed_payloads_are_rejected() {
    let app = app_with_customer().await;

    for body in [
        "not json".to_string(),
        json!({ "id": "evt_1" }).to_string(),
        // subscription object without a customer
        json!({
            "id": "evt_1",
            "type": "customer.subscription.created",
            "data": { "object": { "id": "sub_1" } },
        })
        .to_string(),
    ] {
        assert_rejected(app.post_signed_webhook(&body).await).await;
    }
    assert!(app.store.mail().is_empty());
}
