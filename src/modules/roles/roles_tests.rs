//
// Copyright (c) 2025 The Warden Identity Management Project contributors
//
// This file is part of the Warden Identity Management Project
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use std::collections::BTreeSet;

use crate::modules::acl::{ObjectIdentity, Permission, Sid};
use crate::modules::auth::Authentication;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::WardenResult;
use crate::modules::roles::names::{ROLE_ADMIN, ROLE_USER};
use crate::modules::roles::payload::{RoleCreateRequest, RoleUpdateRequest};
use crate::modules::testing::{admin, login, register, warden};

fn request(name: &str) -> RoleCreateRequest {
    RoleCreateRequest {
        name: name.into(),
        description: Some("test role".into()),
        members: BTreeSet::new(),
    }
}

#[tokio::test]
async fn friends_role_grants_its_principal() -> WardenResult<()> {
    let (warden, _) = warden().await?;
    register(&warden, "alice").await?;
    register(&warden, "bob").await?;

    let first = warden.roles.create_friends_role("alice").await?;
    let again = warden.roles.create_friends_role("alice").await?;
    let bobs = warden.roles.create_friends_role("bob").await?;
    assert_eq!(first.name, again.name);
    assert_eq!(first.name, "ROLE_FRIENDS_alice");
    assert_ne!(first.name, bobs.name);
    assert_eq!(first.owner.as_deref(), Some("alice"));

    let acl = warden.acl.read_acl(&first).await?;
    let granted = acl.permissions_of(&Sid::principal("alice"));
    for permission in [Permission::Administration, Permission::Create, Permission::Read] {
        assert!(granted.contains(&permission), "missing {}", permission);
    }
    assert!(acl.permissions_of(&Sid::principal("bob")).is_empty());
    Ok(())
}

#[tokio::test]
async fn friends_can_read_the_profile() -> WardenResult<()> {
    let (warden, _) = warden().await?;
    let alice = register(&warden, "alice").await?;
    register(&warden, "bob").await?;

    let bob = login(&warden, "bob").await?;
    assert!(warden.profiles.read(&bob, "alice").await.unwrap_err().is_forbidden());

    warden
        .roles
        .add_members(&alice, "ROLE_FRIENDS_alice", &["bob".to_string()])
        .await?;
    let bob = login(&warden, "bob").await?;
    assert!(bob.has_authority("ROLE_FRIENDS_alice"));
    let view = warden.profiles.read(&bob, "alice").await?;
    assert_eq!(view.uid, "alice");
    Ok(())
}

#[tokio::test]
async fn custom_roles_belong_to_their_creator() -> WardenResult<()> {
    let (warden, _) = warden().await?;
    let alice = register(&warden, "alice").await?;
    let bob = register(&warden, "bob").await?;

    let first = warden
        .roles
        .create_custom_role(&alice, Some("book club".into()))
        .await?;
    let second = warden.roles.create_custom_role(&alice, None).await?;
    assert_ne!(first.name, second.name);
    assert!(first.name.starts_with("ROLE_CUSTOM_alice_"));

    let acl = warden.acl.read_acl(&first).await?;
    assert_eq!(acl.owner, Sid::principal("alice"));
    assert_eq!(acl.permissions_of(&Sid::principal("alice")).len(), 4);

    let mine = warden.roles.list_custom_roles(&alice).await?;
    assert_eq!(mine.len(), 2);
    assert!(warden.roles.list_custom_roles(&bob).await?.is_empty());

    warden
        .roles
        .add_members(&alice, &first.name, &["bob".to_string()])
        .await?;
    let err = warden
        .roles
        .add_members(&bob, &first.name, &["mallory".to_string()])
        .await
        .unwrap_err();
    assert!(err.is_forbidden());

    warden.roles.delete(&alice, &second.name).await?;
    assert!(!warden.roles.exists_by_name(&second.name).await?);
    Ok(())
}

#[tokio::test]
async fn custom_roles_need_a_user_authority() -> WardenResult<()> {
    let (warden, _) = warden().await?;
    let stranger = Authentication::new("stranger", Vec::<String>::new());
    let err = warden
        .roles
        .create_custom_role(&stranger, None)
        .await
        .unwrap_err();
    assert!(err.is_forbidden());
    Ok(())
}

#[tokio::test]
async fn default_roles_cannot_be_deleted() -> WardenResult<()> {
    let (warden, _) = warden().await?;
    for name in [ROLE_ADMIN, ROLE_USER, "ROLE_SYSTEM"] {
        let err = warden.roles.delete(&admin(), name).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);
        assert!(warden.roles.exists_by_name(name).await?);
    }
    Ok(())
}

#[tokio::test]
async fn role_lifecycle() -> WardenResult<()> {
    let (warden, _) = warden().await?;
    let root = admin();

    warden.roles.create(&root, request("ROLE_EDITORS")).await?;
    let err = warden
        .roles
        .create(&root, request("ROLE_EDITORS"))
        .await
        .unwrap_err();
    assert!(err.is_already_exists());
    assert_eq!(
        warden
            .roles
            .create(&root, request("1bad name"))
            .await
            .unwrap_err()
            .code(),
        ErrorCode::InvalidParameter
    );

    let updated = warden
        .roles
        .update(
            &root,
            "ROLE_EDITORS",
            RoleUpdateRequest {
                description: Some("Edits things".into()),
                members: Some(BTreeSet::from(["dave".to_string(), "erin".to_string()])),
            },
        )
        .await?;
    assert_eq!(updated.description.as_deref(), Some("Edits things"));
    assert_eq!(updated.members.len(), 2);

    warden
        .roles
        .remove_members(&root, "ROLE_EDITORS", &["dave".to_string()])
        .await?;
    warden
        .roles
        .update_members(&root, "ROLE_EDITORS", &["frank".to_string()])
        .await?;
    let role = warden.roles.read(&root, "ROLE_EDITORS").await?;
    assert_eq!(role.members, BTreeSet::from(["frank".to_string()]));
    assert_eq!(
        warden
            .roles
            .find_role_names_by_member_and_prefix("frank", "ROLE_EDIT")
            .await?,
        vec!["ROLE_EDITORS".to_string()]
    );

    warden.roles.delete(&root, "ROLE_EDITORS").await?;
    assert!(warden
        .acl
        .find_acl(&ObjectIdentity::role("ROLE_EDITORS"))
        .await?
        .is_none());
    Ok(())
}

#[tokio::test]
async fn listing_only_shows_readable_roles() -> WardenResult<()> {
    let (warden, _) = warden().await?;
    let alice = register(&warden, "alice").await?;
    warden.roles.create(&admin(), request("ROLE_HIDDEN")).await?;

    let visible: Vec<String> = warden
        .roles
        .list(&alice)
        .await?
        .into_iter()
        .map(|r| r.name)
        .collect();
    assert!(visible.contains(&"ROLE_FRIENDS_alice".to_string()));
    assert!(!visible.contains(&"ROLE_HIDDEN".to_string()));

    let everything = warden.roles.list(&admin()).await?;
    assert!(everything.iter().any(|r| r.name == "ROLE_HIDDEN"));
    Ok(())
}

#[tokio::test]
async fn initialize_seeds_configured_roles_once() -> WardenResult<()> {
    let (warden, _) = warden().await?;
    for name in ["ROLE_SYSTEM", "ROLE_ADMIN", "ROLE_ACL_ADMIN", "ROLE_USER"] {
        assert!(warden.roles.exists_by_name(name).await?);
    }
    let (seeded, healed) = warden.roles.initialize().await?;
    assert_eq!((seeded, healed), (0, 0));
    Ok(())
}
