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

use crate::modules::acl::ObjectIdentity;
use crate::modules::clients::{ClientCreateRequest, ClientUpdateRequest};
use crate::modules::error::code::ErrorCode;
use crate::modules::error::WardenResult;
use crate::modules::roles::names::{ROLE_OAUTH2_CLIENT, ROLE_READ_ALL_PROFILES};
use crate::modules::testing::{admin, register, warden};

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn request(client_id: &str) -> ClientCreateRequest {
    ClientCreateRequest {
        client_id: client_id.into(),
        client_secret: "s3cret-value".into(),
        display_name: Some("Portal".into()),
        scopes: set(&["profile", "email"]),
        redirect_uris: set(&["https://portal.example.org/callback"]),
        grant_types: set(&["authorization_code", "refresh_token"]),
        roles: BTreeSet::new(),
        access_token_validity_secs: Some(3600),
        auto_approve: false,
    }
}

#[tokio::test]
async fn created_clients_join_the_client_role() -> WardenResult<()> {
    let (warden, stores) = warden().await?;
    let mut portal = request("portal");
    portal.roles = set(&[ROLE_READ_ALL_PROFILES]);

    let view = warden.clients.create(&admin(), portal).await?;
    assert_eq!(view.roles, set(&[ROLE_OAUTH2_CLIENT, ROLE_READ_ALL_PROFILES]));

    let stored = stores.clients.find("portal").await?.unwrap();
    assert_ne!(stored.client_secret, "s3cret-value");
    assert!(warden.clients.verify_secret("portal", "s3cret-value").await?);
    assert!(!warden.clients.verify_secret("portal", "wrong-value").await?);
    assert!(!warden.clients.verify_secret("nobody", "s3cret-value").await?);

    assert!(warden
        .acl
        .find_acl(&ObjectIdentity::client("portal"))
        .await?
        .is_some());
    Ok(())
}

#[tokio::test]
async fn invalid_requests_are_rejected() -> WardenResult<()> {
    let (warden, _) = warden().await?;
    let root = admin();

    let mut short_secret = request("portal");
    short_secret.client_secret = "short".into();
    let mut bad_grant = request("portal");
    bad_grant.grant_types = set(&["magic"]);
    let mut fragment = request("portal");
    fragment.redirect_uris = set(&["https://portal.example.org/cb#frag"]);
    let mut no_redirect = request("portal");
    no_redirect.redirect_uris = BTreeSet::new();
    let mut bad_id = request("portal");
    bad_id.client_id = "x".into();

    for invalid in [short_secret, bad_grant, fragment, no_redirect, bad_id] {
        let err = warden.clients.create(&root, invalid).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidParameter);
    }

    let mut unknown_role = request("portal");
    unknown_role.roles = set(&["ROLE_DOES_NOT_EXIST"]);
    let err = warden.clients.create(&root, unknown_role).await.unwrap_err();
    assert!(err.is_not_found());

    let mut machine = request("machine");
    machine.redirect_uris = BTreeSet::new();
    machine.grant_types = set(&["client_credentials"]);
    warden.clients.create(&root, machine).await?;
    let err = warden
        .clients
        .create(&root, request("machine"))
        .await
        .unwrap_err();
    assert!(err.is_already_exists());
    Ok(())
}

#[tokio::test]
async fn update_syncs_roles_but_keeps_the_client_role() -> WardenResult<()> {
    let (warden, _) = warden().await?;
    let root = admin();
    let mut portal = request("portal");
    portal.roles = set(&[ROLE_READ_ALL_PROFILES]);
    warden.clients.create(&root, portal).await?;

    let view = warden
        .clients
        .update(
            &root,
            "portal",
            ClientUpdateRequest {
                roles: Some(BTreeSet::new()),
                client_secret: Some("rotated-secret".into()),
                auto_approve: Some(true),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(view.roles, set(&[ROLE_OAUTH2_CLIENT]));
    assert!(view.auto_approve);
    assert!(warden.clients.verify_secret("portal", "rotated-secret").await?);

    let err = warden
        .clients
        .update(
            &root,
            "portal",
            ClientUpdateRequest {
                redirect_uris: Some(BTreeSet::new()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidParameter);
    Ok(())
}

#[tokio::test]
async fn deleting_a_client_cleans_up() -> WardenResult<()> {
    let (warden, _) = warden().await?;
    let root = admin();
    warden.clients.create(&root, request("portal")).await?;

    let alice = register(&warden, "alice").await?;
    assert!(warden.clients.list(&alice).await?.is_empty());
    assert!(warden
        .clients
        .read(&alice, "portal")
        .await
        .unwrap_err()
        .is_forbidden());
    assert_eq!(warden.clients.list(&root).await?.len(), 1);

    warden.clients.delete(&root, "portal").await?;
    assert!(warden
        .roles
        .find_role_names_by_member("portal")
        .await?
        .is_empty());
    assert!(warden
        .acl
        .find_acl(&ObjectIdentity::client("portal"))
        .await?
        .is_none());
    Ok(())
}

#[tokio::test]
async fn client_ids_cannot_reuse_user_names() -> WardenResult<()> {
    let (warden, stores) = warden().await?;
    let root = admin();
    register(&warden, "alice").await?;
    let before = warden.roles.find_role_names_by_member("alice").await?;

    let err = warden
        .clients
        .create(&root, request("alice"))
        .await
        .unwrap_err();
    assert!(err.is_already_exists());
    assert!(!stores.clients.exists("alice").await?);
    assert!(warden
        .acl
        .find_acl(&ObjectIdentity::client("alice"))
        .await?
        .is_none());
    assert_eq!(warden.roles.find_role_names_by_member("alice").await?, before);
    assert!(!before.iter().any(|role| role == ROLE_OAUTH2_CLIENT));

    let err = warden
        .clients
        .create(&root, request("system"))
        .await
        .unwrap_err();
    assert!(err.is_already_exists());
    Ok(())
}
