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
use crate::modules::allocator::domain::DomainCreateRequest;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::WardenResult;
use crate::modules::groups::{
    GroupCreateRequest, GroupSambaRequest, GroupUpdateRequest, DOMAIN_GROUP_TYPE,
};
use crate::modules::identity::directory::PosixSettings;
use crate::modules::testing::{admin, directory_user, register, warden};

fn request(name: &str, gid: Option<u32>) -> GroupCreateRequest {
    GroupCreateRequest {
        name: name.into(),
        gid_number: gid,
        description: Some("test group".into()),
        members: BTreeSet::new(),
        samba: None,
    }
}

#[tokio::test]
async fn gids_are_allocated_or_checked() -> WardenResult<()> {
    let (warden, _) = warden().await?;
    let root = admin();
    warden
        .domains
        .create(
            &root,
            DomainCreateRequest {
                name: "EXAMPLE".into(),
                sid: "S-1-5-21-1-2-3".into(),
                rid_base: Some(1000),
                next_uid: Some(2000),
                next_gid: Some(2000),
                is_default: true,
            },
        )
        .await?;

    let staff = warden.groups.create(&root, request("staff", None)).await?;
    assert_eq!(staff.gid_number, 2000);
    let fixed = warden.groups.create(&root, request("ops", Some(2001))).await?;
    assert_eq!(fixed.gid_number, 2001);

    // 2001 is taken, so the counter moves past it
    let next = warden.groups.create(&root, request("dev", None)).await?;
    assert_eq!(next.gid_number, 2002);

    let clash = warden
        .groups
        .create(&root, request("other", Some(2000)))
        .await
        .unwrap_err();
    assert!(clash.is_already_exists());
    let duplicate = warden
        .groups
        .create(&root, request("staff", None))
        .await
        .unwrap_err();
    assert!(duplicate.is_already_exists());
    let invalid = warden
        .groups
        .create(&root, request("bad name", None))
        .await
        .unwrap_err();
    assert_eq!(invalid.code(), ErrorCode::InvalidParameter);
    Ok(())
}

#[tokio::test]
async fn samba_group_sid_is_derived_and_unique() -> WardenResult<()> {
    let (warden, _) = warden().await?;
    let root = admin();
    warden
        .domains
        .create(
            &root,
            DomainCreateRequest {
                name: "EXAMPLE".into(),
                sid: "S-1-5-21-1-2-3".into(),
                rid_base: Some(1000),
                next_uid: Some(500),
                next_gid: Some(500),
                is_default: true,
            },
        )
        .await?;

    let mut with_samba = request("finance", Some(600));
    with_samba.samba = Some(GroupSambaRequest::default());
    let group = warden.groups.create(&root, with_samba).await?;
    let samba = group.samba.unwrap();
    assert_eq!(samba.sid, "S-1-5-21-1-2-3-2201");
    assert_eq!(samba.domain_name, "EXAMPLE");
    assert_eq!(samba.group_type, DOMAIN_GROUP_TYPE);

    let mut clash = request("finance2", Some(601));
    clash.samba = Some(GroupSambaRequest {
        sid: Some("S-1-5-21-1-2-3-2201".into()),
        ..Default::default()
    });
    assert!(warden
        .groups
        .create(&root, clash)
        .await
        .unwrap_err()
        .is_already_exists());

    let moved = warden
        .groups
        .update(
            &root,
            "finance",
            GroupUpdateRequest {
                gid_number: Some(700),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(moved.gid_number, 700);
    assert_eq!(moved.samba.unwrap().sid, "S-1-5-21-1-2-3-2401");
    Ok(())
}

#[tokio::test]
async fn primary_groups_are_protected() -> WardenResult<()> {
    let (warden, stores) = warden().await?;
    let root = admin();
    warden.groups.create(&root, request("users", Some(100))).await?;

    let mut member = directory_user("pat");
    member.posix = Some(PosixSettings {
        uid_number: 1500,
        gid_number: 100,
        ..Default::default()
    });
    stores.users.insert(member).await?;

    let err = warden.groups.delete(&root, "users").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidParameter);
    let err = warden
        .groups
        .update(
            &root,
            "users",
            GroupUpdateRequest {
                gid_number: Some(101),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidParameter);

    stores.users.delete("pat").await?;
    warden.groups.delete(&root, "users").await?;
    assert!(warden.groups.find("users").await?.is_none());
    assert!(warden
        .acl
        .find_acl(&ObjectIdentity::group("users"))
        .await?
        .is_none());
    Ok(())
}

#[tokio::test]
async fn personal_group_is_administered_by_its_user() -> WardenResult<()> {
    let (warden, _) = warden().await?;
    let alice = register(&warden, "alice").await?;

    let group = warden.groups.create_personal_group("alice", Some(9000)).await?;
    assert_eq!(group.name, "alice");
    assert_eq!(group.owner.as_deref(), Some("alice"));
    assert!(group.members.contains("alice"));
    let again = warden.groups.create_personal_group("alice", None).await?;
    assert_eq!(again.gid_number, 9000);

    let acl = warden.acl.read_acl(&group).await?;
    assert_eq!(acl.owner, Sid::principal("alice"));
    assert!(acl.has_entry(&Sid::principal("alice"), Permission::Administration));

    warden
        .groups
        .add_members(&alice, "alice", &["bob".to_string()])
        .await?;
    let read = warden.groups.read(&alice, "alice").await?;
    assert!(read.members.contains("bob"));

    warden
        .groups
        .create(&admin(), request("shared", None))
        .await?;
    let err = warden
        .groups
        .create_personal_group("shared", None)
        .await
        .unwrap_err();
    assert!(err.is_already_exists());

    let visible = warden.groups.list(&alice).await?;
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].name, "alice");
    Ok(())
}

#[tokio::test]
async fn forget_user_clears_memberships() -> WardenResult<()> {
    let (warden, _) = warden().await?;
    let root = admin();
    let mut team = request("team", None);
    team.members = BTreeSet::from(["quinn".to_string(), "riley".to_string()]);
    warden.groups.create(&root, team).await?;
    warden.groups.create_personal_group("quinn", None).await?;

    assert_eq!(warden.groups.forget_user("quinn").await?, 2);
    let team = warden.groups.read(&root, "team").await?;
    assert_eq!(team.members, BTreeSet::from(["riley".to_string()]));
    assert!(warden.groups.find("quinn").await?.is_none());

    warden
        .groups
        .remove_members(&root, "team", &["riley".to_string()])
        .await?;
    assert!(warden.groups.read(&root, "team").await?.members.is_empty());
    Ok(())
}
