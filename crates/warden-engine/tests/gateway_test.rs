//! Integration tests for the tenant-scoped query gateway.

mod common;

use serde_json::json;
use uuid::Uuid;
use warden_core::error::WardenError;
use warden_core::models::organization::SubscriptionTier;
use warden_core::models::record::{Filter, FilterOp};
use warden_engine::QuerySpec;

use common::harness;

#[tokio::test]
async fn reads_never_cross_organizations() {
    let h = harness().await;
    let (_, acme) = h.organization("acme", SubscriptionTier::Starter).await;
    let (_, globex) = h.organization("globex", SubscriptionTier::Starter).await;

    for amount in [100, 250] {
        h.gateway
            .insert(&acme, "claim", json!({"status": "open", "amount": amount}))
            .await
            .unwrap();
    }
    h.gateway
        .insert(&globex, "claim", json!({"status": "open", "amount": 999}))
        .await
        .unwrap();

    let rows = h
        .gateway
        .execute(&acme, QuerySpec::table("claim"))
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.organization_id == acme.organization_id()));

    let rows = h
        .gateway
        .execute(
            &globex,
            QuerySpec::table("claim").filter(Filter::eq("status", "open")),
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].data["amount"], json!(999));
}

#[tokio::test]
async fn selection_filters_and_limit_apply() {
    let h = harness().await;
    let (_, ctx) = h.organization("acme", SubscriptionTier::Starter).await;

    for (address, units) in [("1 Main St", 2), ("9 Elm St", 12), ("4 Oak Ave", 30)] {
        h.gateway
            .insert(&ctx, "property", json!({"address": address, "units": units, "owner": "x"}))
            .await
            .unwrap();
    }

    let rows = h
        .gateway
        .execute(
            &ctx,
            QuerySpec::table("property")
                .select(["address"])
                .filter(Filter::new("units", FilterOp::Gte, 10))
                .limit(1),
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    let data = rows[0].data.as_object().unwrap();
    assert_eq!(data.len(), 1);
    assert!(data.contains_key("address"));
}

#[tokio::test]
async fn tables_off_the_allow_list_are_rejected() {
    let h = harness().await;
    let (_, ctx) = h.organization("acme", SubscriptionTier::Starter).await;

    for table in ["organization", "organization_membership", "_migration", "user"] {
        let err = h
            .gateway
            .execute(&ctx, QuerySpec::table(table))
            .await
            .unwrap_err();
        assert!(matches!(err, WardenError::InvalidTable(ref t) if t == table), "{err:?}");
    }

    let err = h
        .gateway
        .insert(&ctx, "organization", json!({"name": "evil"}))
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::InvalidTable(_)), "{err:?}");
}

#[tokio::test]
async fn malformed_field_names_are_rejected() {
    let h = harness().await;
    let (_, ctx) = h.organization("acme", SubscriptionTier::Starter).await;

    let err = h
        .gateway
        .execute(
            &ctx,
            QuerySpec::table("claim").filter(Filter::eq("status OR 1=1", "x")),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::Validation { .. }), "{err:?}");

    let err = h
        .gateway
        .execute(&ctx, QuerySpec::table("claim").select(["data.*"]))
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::Validation { .. }), "{err:?}");
}

#[tokio::test]
async fn writes_are_confined_to_the_callers_organization() {
    let h = harness().await;
    let (_, acme) = h.organization("acme", SubscriptionTier::Starter).await;
    let (_, globex) = h.organization("globex", SubscriptionTier::Starter).await;

    let record = h
        .gateway
        .insert(&acme, "policy", json!({"number": "P-100", "premium": 1200}))
        .await
        .unwrap();
    assert_eq!(record.organization_id, acme.organization_id());

    let err = h
        .gateway
        .update(&globex, "policy", record.id, json!({"premium": 0}))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    let err = h
        .gateway
        .delete(&globex, "policy", record.id)
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let updated = h
        .gateway
        .update(&acme, "policy", record.id, json!({"premium": 1500}))
        .await
        .unwrap();
    assert_eq!(updated.data["premium"], json!(1500));
    assert_eq!(updated.data["number"], json!("P-100"));

    h.gateway.delete(&acme, "policy", record.id).await.unwrap();
    let err = h
        .gateway
        .delete(&acme, "policy", Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}
