mod common;

use bytes::Bytes;
use chrono::{Duration, Utc};
use filevault_core::{
    GrantPrincipal, GrantSpec, NewNode, PermissionType, RetentionConfig, Visibility,
};

fn read_spec(
    node_id: uuid::Uuid,
    bob: filevault_core::UserId,
    alice: filevault_core::UserId,
) -> GrantSpec {
    GrantSpec {
        node_id,
        principal: GrantPrincipal::User(bob),
        permission_type: PermissionType::Read,
        expires_at: None,
        granted_by: alice,
    }
}

#[tokio::test]
async fn regrant_reactivates_instead_of_duplicating() -> anyhow::Result<()> {
    let vault = common::vault().await?;
    let alice = common::user();
    let bob = common::user();

    let file = vault
        .tree
        .create_file(NewNode::file("a.txt", None, alice), Bytes::from_static(b"x"))
        .await?;

    let first = vault.grants.grant(read_spec(file.id(), bob, alice)).await?;
    let second = vault.grants.grant(read_spec(file.id(), bob, alice)).await?;
    assert_eq!(first.id(), second.id());
    assert_eq!(vault.grants.list_active(file.id()).await?.len(), 1);

    // Revoke, then grant again with a new expiry: same row comes back.
    vault
        .grants
        .revoke(file.id(), GrantPrincipal::User(bob), None, alice)
        .await?;
    assert!(vault.grants.list_active(file.id()).await?.is_empty());

    let expires = Utc::now() + Duration::days(7);
    let third = vault
        .grants
        .grant(GrantSpec {
            expires_at: Some(expires),
            ..read_spec(file.id(), bob, alice)
        })
        .await?;
    assert_eq!(third.id(), first.id());
    assert_eq!(third.expires_at, Some(expires));
    assert_eq!(vault.grants.list_active(file.id()).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn grant_and_revoke_keep_cached_visibility_in_step() -> anyhow::Result<()> {
    let vault = common::vault().await?;
    let alice = common::user();
    let bob = common::user();
    let group = filevault_core::GroupId::generate();

    let file = vault
        .tree
        .create_file(NewNode::file("b.txt", None, alice), Bytes::from_static(b"x"))
        .await?;
    assert_eq!(file.visibility, Visibility::Private);

    vault.grants.grant(read_spec(file.id(), bob, alice)).await?;
    let file = vault.tree.require_active(file.id()).await?;
    assert_eq!(file.visibility, Visibility::UserShared);

    vault
        .grants
        .grant(GrantSpec {
            principal: GrantPrincipal::Group(group),
            ..read_spec(file.id(), bob, alice)
        })
        .await?;

    // User grants outrank group grants in the cache; drop the user
    // grant and the node degrades to group-shared, then to private.
    vault
        .grants
        .revoke(file.id(), GrantPrincipal::User(bob), None, alice)
        .await?;
    let file = vault.tree.require_active(file.id()).await?;
    assert_eq!(file.visibility, Visibility::GroupShared);

    vault
        .grants
        .revoke(file.id(), GrantPrincipal::Group(group), None, alice)
        .await?;
    let file = vault.tree.require_active(file.id()).await?;
    assert_eq!(file.visibility, Visibility::Private);
    Ok(())
}

#[tokio::test]
async fn scoped_revoke_leaves_other_types_alone() -> anyhow::Result<()> {
    let vault = common::vault().await?;
    let alice = common::user();
    let bob = common::user();

    let file = vault
        .tree
        .create_file(NewNode::file("c.txt", None, alice), Bytes::from_static(b"x"))
        .await?;
    for permission_type in [PermissionType::Read, PermissionType::Write] {
        vault
            .grants
            .grant(GrantSpec {
                permission_type,
                ..read_spec(file.id(), bob, alice)
            })
            .await?;
    }

    let revoked = vault
        .grants
        .revoke(
            file.id(),
            GrantPrincipal::User(bob),
            Some(&[PermissionType::Write]),
            alice,
        )
        .await?;
    assert_eq!(revoked, 1);

    let active = vault.grants.list_active(file.id()).await?;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].permission_type, PermissionType::Read);

    // Revoking something that was never granted is a no-op.
    let revoked = vault
        .grants
        .revoke(
            file.id(),
            GrantPrincipal::User(bob),
            Some(&[PermissionType::Admin]),
            alice,
        )
        .await?;
    assert_eq!(revoked, 0);
    Ok(())
}

#[tokio::test]
async fn recompute_visibility_is_idempotent_and_public_is_sticky() -> anyhow::Result<()> {
    let vault = common::vault().await?;
    let alice = common::user();
    let bob = common::user();

    let file = vault
        .tree
        .create_file(NewNode::file("d.txt", None, alice), Bytes::from_static(b"x"))
        .await?;
    vault.grants.grant(read_spec(file.id(), bob, alice)).await?;

    let once = vault.visibility.recompute_visibility(file.id()).await?;
    let twice = vault.visibility.recompute_visibility(file.id()).await?;
    assert_eq!(once, twice);
    assert_eq!(once, Visibility::UserShared);

    // Public never degrades on recompute, only on an explicit set.
    vault
        .visibility
        .set_visibility(file.id(), Visibility::Public, alice)
        .await?;
    assert_eq!(
        vault.visibility.recompute_visibility(file.id()).await?,
        Visibility::Public
    );
    let downgraded = vault
        .visibility
        .set_visibility(file.id(), Visibility::Private, alice)
        .await?;
    // The active grant immediately pulls it back to user-shared.
    assert_eq!(downgraded, Visibility::UserShared);
    Ok(())
}

#[tokio::test]
async fn retention_sweep_deactivates_then_purges_in_pages() -> anyhow::Result<()> {
    let vault = common::vault().await?;
    let alice = common::user();

    let file = vault
        .tree
        .create_file(NewNode::file("e.txt", None, alice), Bytes::from_static(b"x"))
        .await?;
    let users: Vec<_> = (0..5).map(|_| common::user()).collect();
    for user in &users {
        vault
            .grants
            .grant(GrantSpec {
                expires_at: Some(Utc::now() - Duration::hours(1)),
                ..read_spec(file.id(), *user, alice)
            })
            .await?;
    }

    // Tiny pages to force several passes in one run.
    let retention = RetentionConfig {
        page_size: 2,
        ..RetentionConfig::default()
    };
    let deactivated = vault.grants.deactivate_expired(&retention).await?;
    assert_eq!(deactivated, 5);
    assert!(vault.grants.list_active(file.id()).await?.is_empty());

    // A second run finds nothing.
    assert_eq!(vault.grants.deactivate_expired(&retention).await?, 0);

    // Purge with a future cutoff removes all the inactive rows; a
    // fresh grant for one of the users then inserts a brand new row.
    let purged = vault
        .grants
        .purge_inactive_older_than(Utc::now() + Duration::seconds(1), &retention)
        .await?;
    assert_eq!(purged, 5);
    assert_eq!(
        vault
            .grants
            .purge_inactive_older_than(Utc::now(), &retention)
            .await?,
        0
    );
    Ok(())
}
