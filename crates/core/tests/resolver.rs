mod common;

use bytes::Bytes;
use chrono::{Duration, Utc};
use filevault_core::{
    GrantPrincipal, GrantSpec, NewNode, PermissionType, Visibility,
};

#[tokio::test]
async fn anonymous_owner_and_superuser_short_circuits() -> anyhow::Result<()> {
    let vault = common::vault().await?;
    let alice = common::user();
    let root = common::user();

    let file = vault
        .tree
        .create_file(
            NewNode::file("private.txt", None, alice),
            Bytes::from_static(b"x"),
        )
        .await?;

    assert!(!vault.resolver.can_read(&file, None).await?);
    assert!(vault.resolver.can_admin(&file, Some(alice)).await?);

    assert!(!vault.resolver.can_read(&file, Some(root)).await?);
    vault.directory.add_superuser(root);
    assert!(vault.resolver.can_admin(&file, Some(root)).await?);
    Ok(())
}

#[tokio::test]
async fn write_grant_implies_read_but_not_delete() -> anyhow::Result<()> {
    let vault = common::vault().await?;
    let alice = common::user();
    let bob = common::user();

    let file = vault
        .tree
        .create_file(
            NewNode::file("draft.md", None, alice),
            Bytes::from_static(b"wip"),
        )
        .await?;
    assert!(!vault.resolver.can_read(&file, Some(bob)).await?);

    vault
        .grants
        .grant(GrantSpec {
            node_id: file.id(),
            principal: GrantPrincipal::User(bob),
            permission_type: PermissionType::Write,
            expires_at: None,
            granted_by: alice,
        })
        .await?;

    let file = vault.tree.require_active(file.id()).await?;
    assert!(vault.resolver.can_read(&file, Some(bob)).await?);
    assert!(vault.resolver.can_write(&file, Some(bob)).await?);
    assert!(!vault.resolver.can_delete(&file, Some(bob)).await?);
    assert!(!vault.resolver.can_share(&file, Some(bob)).await?);

    let effective = vault.resolver.effective_permissions(&file, Some(bob)).await?;
    assert_eq!(
        effective.into_iter().collect::<Vec<_>>(),
        vec![PermissionType::Read, PermissionType::Write]
    );
    Ok(())
}

#[tokio::test]
async fn expired_grant_falls_through_to_visibility() -> anyhow::Result<()> {
    let vault = common::vault().await?;
    let alice = common::user();
    let bob = common::user();

    let file = vault
        .tree
        .create_file(
            NewNode::file("timed.txt", None, alice),
            Bytes::from_static(b"x"),
        )
        .await?;
    let grant = vault
        .grants
        .grant(GrantSpec {
            node_id: file.id(),
            principal: GrantPrincipal::User(bob),
            permission_type: PermissionType::Read,
            expires_at: Some(Utc::now() - Duration::hours(1)),
            granted_by: alice,
        })
        .await?;

    // The row exists and is still flagged active, but it no longer
    // counts.
    assert!(*grant.is_active);
    assert!(!grant.is_valid(Utc::now()));

    let file = vault.tree.require_active(file.id()).await?;
    assert!(!vault.resolver.can_read(&file, Some(bob)).await?);

    // The visibility fallback still works on its own.
    vault
        .visibility
        .set_shared_users(file.id(), &[bob], alice)
        .await?;
    let file = vault.tree.require_active(file.id()).await?;
    assert_eq!(file.visibility, Visibility::UserShared);
    assert!(vault.resolver.can_read(&file, Some(bob)).await?);
    Ok(())
}

#[tokio::test]
async fn best_group_grant_is_the_max_across_all_groups() -> anyhow::Result<()> {
    let vault = common::vault().await?;
    let alice = common::user();
    let bob = common::user();
    let readers = filevault_core::GroupId::generate();
    let admins = filevault_core::GroupId::generate();

    let file = vault
        .tree
        .create_file(
            NewNode::file("plan.txt", None, alice),
            Bytes::from_static(b"x"),
        )
        .await?;
    for (group, permission) in [
        (readers, PermissionType::Read),
        (admins, PermissionType::Admin),
    ] {
        vault
            .grants
            .grant(GrantSpec {
                node_id: file.id(),
                principal: GrantPrincipal::Group(group),
                permission_type: permission,
                expires_at: None,
                granted_by: alice,
            })
            .await?;
    }

    let file = vault.tree.require_active(file.id()).await?;
    vault.directory.add_membership(bob, readers);
    assert!(vault.resolver.can_read(&file, Some(bob)).await?);
    assert!(!vault.resolver.can_delete(&file, Some(bob)).await?);

    vault.directory.add_membership(bob, admins);
    assert!(vault.resolver.can_delete(&file, Some(bob)).await?);
    assert!(vault.resolver.can_admin(&file, Some(bob)).await?);

    vault.directory.remove_membership(bob, admins);
    assert!(!vault.resolver.can_admin(&file, Some(bob)).await?);
    Ok(())
}

#[tokio::test]
async fn public_visibility_grants_every_permission() -> anyhow::Result<()> {
    let vault = common::vault().await?;
    let alice = common::user();
    let stranger = common::user();

    let file = vault
        .tree
        .create_file(
            NewNode::file("announce.txt", None, alice).with_visibility(Visibility::Public),
            Bytes::from_static(b"x"),
        )
        .await?;

    for permission in PermissionType::all() {
        assert!(
            vault
                .resolver
                .can_access(&file, Some(stranger), permission)
                .await?,
            "public node should allow {permission}"
        );
    }
    // Anonymous requests are still denied.
    assert!(!vault.resolver.can_read(&file, None).await?);
    Ok(())
}

#[tokio::test]
async fn effective_permissions_come_from_grants_not_visibility() -> anyhow::Result<()> {
    let vault = common::vault().await?;
    let alice = common::user();
    let bob = common::user();
    let stranger = common::user();
    let editors = filevault_core::GroupId::generate();

    let file = vault
        .tree
        .create_file(
            NewNode::file("handbook.md", None, alice).with_visibility(Visibility::Public),
            Bytes::from_static(b"x"),
        )
        .await?;

    // The public fallback lets the stranger in, but grants nothing.
    assert!(vault.resolver.can_read(&file, Some(stranger)).await?);
    let effective = vault
        .resolver
        .effective_permissions(&file, Some(stranger))
        .await?;
    assert!(effective.is_empty());

    // Owner short-circuits to everything.
    let effective = vault.resolver.effective_permissions(&file, Some(alice)).await?;
    assert_eq!(effective, PermissionType::all());

    // Held grants union across the user and group channels.
    vault
        .grants
        .grant(GrantSpec {
            node_id: file.id(),
            principal: GrantPrincipal::User(bob),
            permission_type: PermissionType::Write,
            expires_at: None,
            granted_by: alice,
        })
        .await?;
    vault
        .grants
        .grant(GrantSpec {
            node_id: file.id(),
            principal: GrantPrincipal::Group(editors),
            permission_type: PermissionType::Share,
            expires_at: None,
            granted_by: alice,
        })
        .await?;
    vault.directory.add_membership(bob, editors);

    let file = vault.tree.require_active(file.id()).await?;
    let effective = vault.resolver.effective_permissions(&file, Some(bob)).await?;
    assert_eq!(
        effective.into_iter().collect::<Vec<_>>(),
        vec![
            PermissionType::Read,
            PermissionType::Write,
            PermissionType::Share
        ]
    );
    Ok(())
}

#[tokio::test]
async fn group_shared_visibility_requires_membership_overlap() -> anyhow::Result<()> {
    let vault = common::vault().await?;
    let alice = common::user();
    let bob = common::user();
    let carol = common::user();
    let designers = filevault_core::GroupId::generate();

    let file = vault
        .tree
        .create_file(
            NewNode::file("mockup.png", None, alice),
            Bytes::from_static(b"x"),
        )
        .await?;
    vault
        .visibility
        .set_shared_groups(file.id(), &[designers], alice)
        .await?;
    let file = vault.tree.require_active(file.id()).await?;
    assert_eq!(file.visibility, Visibility::GroupShared);

    vault.directory.add_membership(bob, designers);
    assert!(vault.resolver.can_read(&file, Some(bob)).await?);
    assert!(!vault.resolver.can_read(&file, Some(carol)).await?);
    Ok(())
}

#[tokio::test]
async fn copy_does_not_carry_explicit_grants() -> anyhow::Result<()> {
    let vault = common::vault().await?;
    let alice = common::user();
    let bob = common::user();

    let file = vault
        .tree
        .create_file(
            NewNode::file("secret.txt", None, alice),
            Bytes::from_static(b"x"),
        )
        .await?;
    vault
        .grants
        .grant(GrantSpec {
            node_id: file.id(),
            principal: GrantPrincipal::User(bob),
            permission_type: PermissionType::Read,
            expires_at: None,
            granted_by: alice,
        })
        .await?;

    let file = vault.tree.require_active(file.id()).await?;
    assert!(vault.resolver.can_read(&file, Some(bob)).await?);

    let copy = vault.tree.copy_node(file.id(), None, alice).await?;
    // The copy kept the coarse visibility but none of the grants, and
    // Bob is not in its shared-user set.
    assert_eq!(copy.visibility, file.visibility);
    assert!(vault.grants.list_active(copy.id()).await?.is_empty());
    assert!(!vault.resolver.can_read(&copy, Some(bob)).await?);
    Ok(())
}
