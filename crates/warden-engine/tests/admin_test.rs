//! Integration tests for tenant administration.

mod common;

use std::collections::BTreeMap;

use serde_json::json;
use uuid::Uuid;
use warden_core::error::WardenError;
use warden_core::models::membership::{MemberRole, MembershipStatus};
use warden_core::models::organization::{Resource, SubscriptionTier};
use warden_core::models::permission::Capability;
use warden_core::repository::{MembershipRepository, OrganizationRepository};
use warden_engine::{CacheKey, EngineConfig, OrgSelector, TenantAdmin};

use common::{harness, new_organization};

#[tokio::test]
async fn initialization_applies_tier_defaults() {
    let h = harness().await;
    let owner = Uuid::new_v4();

    let (org, membership) = h
        .admin
        .initialize_organization(new_organization("Acme", SubscriptionTier::Professional), owner)
        .await
        .unwrap();

    assert_eq!(org.code, "acme");
    assert_eq!(org.limits, SubscriptionTier::Professional.default_limits());
    assert_eq!(org.usage.users, 1);
    assert_eq!(org.feature_flags.get("bulk_import"), Some(&true));
    assert_eq!(membership.role, MemberRole::Owner);
    assert!(membership.is_active());

    let err = h
        .admin
        .initialize_organization(new_organization("acme", SubscriptionTier::Free), Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::AlreadyExists { .. }), "{err:?}");

    let mut invalid = new_organization("x", SubscriptionTier::Free);
    invalid.primary_domain = "localhost".into();
    let err = h
        .admin
        .initialize_organization(invalid, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::Validation { .. }), "{err:?}");
}

#[tokio::test]
async fn organization_is_reachable_by_code_and_domain() {
    let h = harness().await;
    let (org, _) = h.organization("acme", SubscriptionTier::Starter).await;
    let directory = h.resolver.directory();

    assert_eq!(directory.by_code("ACME").await.unwrap().id, org.id);
    assert_eq!(directory.by_domain("Acme.Example").await.unwrap().id, org.id);
    assert!(directory.by_domain("www.acme.example").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn deactivated_organization_is_hidden_but_kept() {
    let h = harness().await;
    let (org, owner) = h.organization("o2", SubscriptionTier::Starter).await;

    h.admin.deactivate_organization(&owner).await.unwrap();

    let err = h.resolver.directory().by_id(org.id).await.unwrap_err();
    assert!(err.is_not_found());
    let err = h.resolver.directory().by_code("o2").await.unwrap_err();
    assert!(err.is_not_found());

    let row = h.organizations.get_by_id(org.id).await.unwrap();
    assert!(!row.is_active);
}

#[tokio::test]
async fn members_need_the_right_capabilities() {
    let h = harness().await;
    let (org, owner) = h.organization("acme", SubscriptionTier::Starter).await;
    let viewer = Uuid::new_v4();
    h.admin.add_member(&owner, viewer, MemberRole::Viewer).await.unwrap();
    let viewer_ctx = h.resolver.resolve(viewer, Some(org.id)).await.unwrap();

    let err = h
        .admin
        .add_member(&viewer_ctx, Uuid::new_v4(), MemberRole::Member)
        .await
        .unwrap_err();
    assert!(
        matches!(err, WardenError::PermissionDenied { ref capability } if capability == "users.invite"),
        "{err:?}"
    );

    let err = h
        .admin
        .update_settings(&viewer_ctx, json!({"theme": "dark"}))
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::PermissionDenied { .. }), "{err:?}");

    let err = h.admin.deactivate_organization(&viewer_ctx).await.unwrap_err();
    assert!(matches!(err, WardenError::PermissionDenied { .. }), "{err:?}");
}

#[tokio::test]
async fn only_owners_manage_the_owner_role() {
    let h = harness().await;
    let (org, owner) = h.organization("acme", SubscriptionTier::Starter).await;
    let admin = Uuid::new_v4();
    h.admin.add_member(&owner, admin, MemberRole::Admin).await.unwrap();
    let admin_ctx = h.resolver.resolve(admin, Some(org.id)).await.unwrap();

    let err = h
        .admin
        .set_role(&admin_ctx, admin, MemberRole::Owner)
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::PermissionDenied { .. }), "{err:?}");

    let err = h
        .admin
        .set_role(&admin_ctx, owner.user_id(), MemberRole::Member)
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::PermissionDenied { .. }), "{err:?}");

    // Admins cannot grant what they do not hold.
    let err = h
        .admin
        .add_override(&admin_ctx, admin, Capability::BillingManage)
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::PermissionDenied { .. }), "{err:?}");

    let promoted = h
        .admin
        .set_role(&owner, admin, MemberRole::Owner)
        .await
        .unwrap();
    assert_eq!(promoted.role, MemberRole::Owner);
}

#[tokio::test]
async fn invitation_flow() {
    let h = harness().await;
    let (org, owner) = h.organization("acme", SubscriptionTier::Starter).await;
    let invitee = Uuid::new_v4();

    let token = h
        .admin
        .invite_member(&owner, invitee, MemberRole::Manager)
        .await
        .unwrap();
    let pending = h.memberships.get(invitee, org.id).await.unwrap();
    assert_eq!(pending.status, MembershipStatus::Invited);
    assert_ne!(pending.invitation.as_ref().unwrap().token_hash, token);
    assert!(matches!(
        h.resolver.resolve(invitee, Some(org.id)).await.unwrap_err(),
        WardenError::NotAMember { .. }
    ));

    let err = h
        .admin
        .accept_invitation(invitee, org.id, "wrong-token")
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::InvalidInvitation), "{err:?}");

    let accepted = h
        .admin
        .accept_invitation(invitee, org.id, &token)
        .await
        .unwrap();
    assert!(accepted.is_active());
    assert!(accepted.invitation.is_none());
    assert_eq!(
        h.admin.quota().usage(org.id, Resource::Users).await.unwrap().current,
        2
    );

    let context = h.resolver.resolve(invitee, Some(org.id)).await.unwrap();
    assert_eq!(context.role(), MemberRole::Manager);

    let err = h
        .admin
        .accept_invitation(invitee, org.id, &token)
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::InvalidInvitation), "{err:?}");
}

#[tokio::test]
async fn deactivation_frees_a_seat_and_allows_readding() {
    let h = harness().await;
    let (org, owner) = h.organization("acme", SubscriptionTier::Free).await;
    let user = Uuid::new_v4();

    h.admin.add_member(&owner, user, MemberRole::Member).await.unwrap();
    let context = h.resolver.resolve(user, Some(org.id)).await.unwrap();
    assert_eq!(context.role(), MemberRole::Member);

    let err = h
        .admin
        .add_member(&owner, user, MemberRole::Member)
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::AlreadyExists { .. }), "{err:?}");

    let deactivated = h.admin.deactivate_membership(&owner, user).await.unwrap();
    assert_eq!(deactivated.status, MembershipStatus::Deactivated);
    assert_eq!(deactivated.deactivated_by, Some(owner.user_id()));
    assert!(h.cache.get(&CacheKey::new(user, Some(org.id))).is_none());
    assert!(matches!(
        h.resolver.resolve(user, Some(org.id)).await.unwrap_err(),
        WardenError::NotAMember { .. }
    ));
    assert_eq!(
        h.admin.quota().usage(org.id, Resource::Users).await.unwrap().current,
        1
    );

    let readded = h.admin.add_member(&owner, user, MemberRole::Viewer).await.unwrap();
    assert!(readded.is_active());
    assert_eq!(readded.role, MemberRole::Viewer);
    assert!(readded.deactivated_at.is_none());
}

#[tokio::test]
async fn organization_changes_invalidate_every_cached_context() {
    let h = harness().await;
    let (org, owner) = h.organization("acme", SubscriptionTier::Starter).await;
    let member = Uuid::new_v4();
    h.admin.add_member(&owner, member, MemberRole::Member).await.unwrap();
    h.resolver.resolve(member, Some(org.id)).await.unwrap();
    h.resolver.resolve(member, None).await.unwrap();
    assert_eq!(h.cache.len(), 3);

    let updated = h
        .admin
        .update_feature_flags(&owner, BTreeMap::from([("sso".to_string(), true)]))
        .await
        .unwrap();
    assert_eq!(updated.feature_flags.get("sso"), Some(&true));
    // Tier defaults were stored at initialization and survive the merge.
    assert_eq!(updated.feature_flags.get("ai_assistant"), Some(&true));
    assert!(h.cache.is_empty());

    let context = h.resolver.resolve(member, None).await.unwrap();
    assert!(context.feature_enabled("sso"));
    assert!(
        h.cache
            .get(&CacheKey {
                user_id: member,
                selector: OrgSelector::Default,
            })
            .is_some()
    );

    let updated = h
        .admin
        .update_settings(&owner, json!({"timezone": "UTC"}))
        .await
        .unwrap();
    assert_eq!(updated.settings["timezone"], json!("UTC"));
    let err = h
        .admin
        .update_settings(&owner, json!(["not", "an", "object"]))
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::Validation { .. }), "{err:?}");
}

#[tokio::test]
async fn deactivation_with_a_drifted_counter_still_revokes_access() {
    let h = harness().await;
    let (org, owner) = h.organization("acme", SubscriptionTier::Starter).await;
    let admin = Uuid::new_v4();
    h.admin.add_member(&owner, admin, MemberRole::Admin).await.unwrap();
    let context = h.resolver.resolve(admin, Some(org.id)).await.unwrap();
    assert!(context.can(Capability::UsersDelete));

    // The counter no longer reflects the memberships; decrementing it
    // is refused by the store.
    h.admin
        .quota()
        .reconcile_usage(org.id, Resource::Users, 0)
        .await
        .unwrap();

    let deactivated = h.admin.deactivate_membership(&owner, admin).await.unwrap();
    assert_eq!(deactivated.status, MembershipStatus::Deactivated);
    assert!(h.cache.get(&CacheKey::new(admin, Some(org.id))).is_none());
    assert!(matches!(
        h.resolver.resolve(admin, Some(org.id)).await.unwrap_err(),
        WardenError::NotAMember { .. }
    ));
    assert_eq!(
        h.admin.quota().usage(org.id, Resource::Users).await.unwrap().current,
        0
    );
}

#[tokio::test]
async fn unrepresentable_invitation_ttl_is_rejected_before_writing() {
    let h = harness().await;
    let (org, owner) = h.organization("acme", SubscriptionTier::Starter).await;
    let admin = TenantAdmin::new(
        h.organizations.clone(),
        h.memberships.clone(),
        h.cache.clone(),
        EngineConfig {
            invitation_ttl_secs: u64::MAX,
            ..Default::default()
        },
    );
    let invitee = Uuid::new_v4();

    let err = admin
        .invite_member(&owner, invitee, MemberRole::Member)
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::Validation { .. }), "{err:?}");
    assert!(h.memberships.get(invitee, org.id).await.unwrap_err().is_not_found());
}
