mod common;

use bytes::Bytes;
use filevault_core::{
    determine_sharing, CoreError, GrantPrincipal, GroupId, NewNode, PermissionType, Visibility,
};

#[tokio::test]
async fn explicit_visibility_request_wins() -> anyhow::Result<()> {
    let vault = common::vault().await?;
    let alice = common::user();
    let bob = common::user();

    let parent = vault
        .tree
        .create_node(NewNode::directory("drop", None, alice))
        .await?;
    let decision = determine_sharing(
        &vault.db,
        Some(&parent),
        Visibility::UserShared,
        &[bob],
        &[],
    )
    .await?;
    assert_eq!(decision.visibility, Visibility::UserShared);
    assert_eq!(decision.shared_users, vec![bob]);
    assert!(decision.shared_groups.is_empty());
    Ok(())
}

#[tokio::test]
async fn private_child_inherits_group_shared_parent() -> anyhow::Result<()> {
    let vault = common::vault().await?;
    let alice = common::user();
    let bob = common::user();
    let designers = GroupId::generate();

    let dir = vault
        .tree
        .create_node(NewNode::directory("designs", None, alice))
        .await?;
    vault
        .visibility
        .set_shared_groups(dir.id(), &[designers], alice)
        .await?;
    let dir = vault.tree.require_active(dir.id()).await?;
    assert_eq!(dir.visibility, Visibility::GroupShared);

    // The owner drops a file in with no sharing requested; it stays
    // visible to the group the folder was shared with.
    let decision =
        determine_sharing(&vault.db, Some(&dir), Visibility::Private, &[], &[]).await?;
    assert_eq!(decision.visibility, Visibility::GroupShared);
    assert_eq!(decision.shared_groups, vec![designers]);

    let child = vault
        .tree
        .create_file_with_sharing(
            NewNode::file("logo.svg", Some(dir.id()), alice),
            &decision,
            Bytes::from_static(b"<svg/>"),
        )
        .await?;
    assert_eq!(child.visibility, Visibility::GroupShared);

    vault.directory.add_membership(bob, designers);
    assert!(vault.resolver.can_read(&child, Some(bob)).await?);
    Ok(())
}

#[tokio::test]
async fn private_child_under_private_parent_stays_private() -> anyhow::Result<()> {
    let vault = common::vault().await?;
    let alice = common::user();

    let dir = vault
        .tree
        .create_node(NewNode::directory("vault", None, alice))
        .await?;
    let decision =
        determine_sharing(&vault.db, Some(&dir), Visibility::Private, &[], &[]).await?;
    assert_eq!(decision.visibility, Visibility::Private);
    assert!(decision.shared_users.is_empty());
    assert!(decision.shared_groups.is_empty());

    let rootless = determine_sharing(&vault.db, None, Visibility::Private, &[], &[]).await?;
    assert_eq!(rootless.visibility, Visibility::Private);
    Ok(())
}

#[tokio::test]
async fn recursive_share_covers_the_subtree_and_is_idempotent() -> anyhow::Result<()> {
    let vault = common::vault().await?;
    let alice = common::user();
    let bob = common::user();

    let dir = vault
        .tree
        .create_node(NewNode::directory("project", None, alice))
        .await?;
    let sub = vault
        .tree
        .create_node(NewNode::directory("notes", Some(dir.id()), alice))
        .await?;
    let file = vault
        .tree
        .create_file(
            NewNode::file("todo.txt", Some(sub.id()), alice),
            Bytes::from_static(b"x"),
        )
        .await?;

    let report = vault
        .sharing
        .share_recursively(
            dir.id(),
            GrantPrincipal::User(bob),
            &[PermissionType::Read],
            None,
            alice,
        )
        .await?;
    assert_eq!(report.succeeded.len(), 3);
    assert!(report.failed.is_empty());

    for node_id in [dir.id(), sub.id(), file.id()] {
        assert_eq!(vault.grants.list_active(node_id).await?.len(), 1);
    }
    let file = vault.tree.require_active(file.id()).await?;
    assert!(vault.resolver.can_read(&file, Some(bob)).await?);

    // Re-running re-touches the same three grants, no duplicates.
    let again = vault
        .sharing
        .share_recursively(
            dir.id(),
            GrantPrincipal::User(bob),
            &[PermissionType::Read],
            None,
            alice,
        )
        .await?;
    assert_eq!(again.succeeded.len(), 3);
    for node_id in [dir.id(), sub.id(), file.id()] {
        assert_eq!(vault.grants.list_active(node_id).await?.len(), 1);
    }
    Ok(())
}

#[tokio::test]
async fn recursive_unshare_reverses_it() -> anyhow::Result<()> {
    let vault = common::vault().await?;
    let alice = common::user();
    let bob = common::user();

    let dir = vault
        .tree
        .create_node(NewNode::directory("handoff", None, alice))
        .await?;
    let file = vault
        .tree
        .create_file(
            NewNode::file("spec.pdf", Some(dir.id()), alice),
            Bytes::from_static(b"x"),
        )
        .await?;

    vault
        .sharing
        .share_recursively(
            dir.id(),
            GrantPrincipal::User(bob),
            &[PermissionType::Read, PermissionType::Write],
            None,
            alice,
        )
        .await?;

    let report = vault
        .sharing
        .unshare_recursively(dir.id(), GrantPrincipal::User(bob), None, alice)
        .await?;
    assert_eq!(report.revoked, 4);
    assert!(report.failed.is_empty());

    let file = vault.tree.require_active(file.id()).await?;
    assert!(!vault.resolver.can_read(&file, Some(bob)).await?);
    assert_eq!(file.visibility, Visibility::Private);
    Ok(())
}

#[tokio::test]
async fn recursive_share_requires_share_capability() -> anyhow::Result<()> {
    let vault = common::vault().await?;
    let alice = common::user();
    let stranger = common::user();
    let bob = common::user();

    let dir = vault
        .tree
        .create_node(NewNode::directory("mine", None, alice))
        .await?;
    let err = vault
        .sharing
        .share_recursively(
            dir.id(),
            GrantPrincipal::User(bob),
            &[PermissionType::Read],
            None,
            stranger,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::PermissionDenied { .. }));

    // A share-type grant is enough; a write-type grant is not.
    vault
        .grants
        .grant(filevault_core::GrantSpec {
            node_id: dir.id(),
            principal: GrantPrincipal::User(stranger),
            permission_type: PermissionType::Write,
            expires_at: None,
            granted_by: alice,
        })
        .await?;
    assert!(vault
        .sharing
        .share_recursively(
            dir.id(),
            GrantPrincipal::User(bob),
            &[PermissionType::Read],
            None,
            stranger,
        )
        .await
        .is_err());

    vault
        .grants
        .grant(filevault_core::GrantSpec {
            node_id: dir.id(),
            principal: GrantPrincipal::User(stranger),
            permission_type: PermissionType::Share,
            expires_at: None,
            granted_by: alice,
        })
        .await?;
    let report = vault
        .sharing
        .share_recursively(
            dir.id(),
            GrantPrincipal::User(bob),
            &[PermissionType::Read],
            None,
            stranger,
        )
        .await?;
    assert_eq!(report.succeeded.len(), 1);
    Ok(())
}
