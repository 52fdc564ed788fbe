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

use futures::future::try_join_all;

use crate::modules::allocator::{compute_sid, SidKind};
use crate::modules::allocator::domain::{DomainCreateRequest, DomainUpdateRequest};
use crate::modules::context::Stores;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::WardenResult;
use crate::modules::identity::directory::PosixSettings;
use crate::modules::settings::WardenConfig;
use crate::modules::testing::{admin, directory_user, warden, warden_with};

fn domain(name: &str, sid: &str, next: u32, is_default: bool) -> DomainCreateRequest {
    DomainCreateRequest {
        name: name.into(),
        sid: sid.into(),
        rid_base: Some(1000),
        next_uid: Some(next),
        next_gid: Some(next),
        is_default,
    }
}

#[tokio::test]
async fn sequential_uids_increase_by_one() -> WardenResult<()> {
    let (warden, _) = warden().await?;
    warden
        .domains
        .create(&admin(), domain("EXAMPLE", "S-1-5-21-1-2-3", 5000, true))
        .await?;

    let mut issued = Vec::new();
    for _ in 0..10 {
        issued.push(warden.allocator.next_uid_number().await?);
    }
    assert_eq!(issued, (5000..5010).collect::<Vec<u32>>());

    let stored = warden.domains.find("EXAMPLE").await?.unwrap();
    assert_eq!(stored.next_uid, 5010);
    assert_eq!(stored.next_gid, 5000);
    Ok(())
}

#[tokio::test]
async fn sid_is_rid_base_plus_twice_the_id() -> WardenResult<()> {
    assert_eq!(
        compute_sid("S-1-5-21-X", 1000, 5, SidKind::User),
        "S-1-5-21-X-1010"
    );

    let (warden, _) = warden().await?;
    warden
        .domains
        .create(&admin(), domain("EXAMPLE", "S-1-5-21-7-8-9", 100, true))
        .await?;
    assert_eq!(
        warden.allocator.samba_sid(5, Some("EXAMPLE"), SidKind::User).await?,
        "S-1-5-21-7-8-9-1010"
    );
    assert_eq!(
        warden.allocator.samba_sid(5, Some("S-1-5-21-7-8-9"), SidKind::User).await?,
        "S-1-5-21-7-8-9-1010"
    );
    assert_eq!(
        warden.allocator.samba_sid(5, Some("UNKNOWN"), SidKind::User).await?,
        "S-1-5-21-0-0-0-1010"
    );
    assert_eq!(
        warden.allocator.samba_sid(5, Some("EXAMPLE"), SidKind::Group).await?,
        "S-1-5-21-7-8-9-1011"
    );
    Ok(())
}

#[tokio::test]
async fn concurrent_allocations_never_repeat() -> WardenResult<()> {
    let (warden, _) = warden().await?;
    warden
        .domains
        .create(&admin(), domain("EXAMPLE", "S-1-5-21-1-2-3", 7000, true))
        .await?;

    let issued = try_join_all((0..8).map(|_| warden.allocator.next_gid_number())).await?;
    let distinct: BTreeSet<u32> = issued.iter().copied().collect();
    assert_eq!(distinct.len(), 8);
    assert_eq!(distinct, (7000..7008).collect());

    let stored = warden.domains.find("EXAMPLE").await?.unwrap();
    assert_eq!(stored.next_gid, 7008);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn domain_updates_never_rewind_the_counter() -> WardenResult<()> {
    // every writer may lose each round to all the others
    let config = WardenConfig {
        allocation_retries: 128,
        ..Default::default()
    };
    let (warden, _) = warden_with(Stores::in_memory()?, config).await?;
    let root = admin();
    warden
        .domains
        .create(&root, domain("EXAMPLE", "S-1-5-21-1-2-3", 7000, true))
        .await?;

    let allocations = try_join_all((0..20).map(|_| warden.allocator.next_uid_number()));
    let updates = try_join_all((0..20).map(|i| {
        warden.domains.update(
            &root,
            "EXAMPLE",
            DomainUpdateRequest {
                is_default: Some(true),
                rid_base: Some(1000 + (i % 2)),
                ..Default::default()
            },
        )
    }));
    let (issued, _) = futures::try_join!(allocations, updates)?;

    let distinct: BTreeSet<u32> = issued.iter().copied().collect();
    assert_eq!(distinct.len(), 20);
    assert_eq!(distinct, (7000..7020).collect());
    let stored = warden.domains.find("EXAMPLE").await?.unwrap();
    assert_eq!(stored.next_uid, 7020);
    assert!(stored.is_default);
    Ok(())
}

#[tokio::test]
async fn numbers_in_use_are_skipped() -> WardenResult<()> {
    let (warden, stores) = warden().await?;
    warden
        .domains
        .create(&admin(), domain("EXAMPLE", "S-1-5-21-1-2-3", 3000, true))
        .await?;
    let mut holder = directory_user("holder");
    holder.posix = Some(PosixSettings {
        uid_number: 3000,
        gid_number: 3000,
        ..Default::default()
    });
    stores.users.insert(holder).await?;

    assert_eq!(warden.allocator.next_uid_number().await?, 3001);
    Ok(())
}

#[tokio::test]
async fn without_domains_the_transient_counter_is_used() -> WardenResult<()> {
    let (warden, stores) = warden().await?;
    let first = warden.allocator.next_uid_number().await?;
    let second = warden.allocator.next_uid_number().await?;
    assert!(first >= 10_000);
    assert_eq!(second, first + 1);
    assert!(stores.domains.find_all().await?.is_empty());

    let resolved = warden.domains.default_domain().await?;
    assert!(resolved.transient);
    assert_eq!(resolved.domain.name, "WARDEN");
    Ok(())
}

#[tokio::test]
async fn default_domain_resolution_order() -> WardenResult<()> {
    let config = WardenConfig {
        samba_domain: Some("SECOND".into()),
        ..Default::default()
    };
    let (warden, _) = warden_with(Stores::in_memory()?, config).await?;
    let root = admin();

    warden
        .domains
        .create(&root, domain("FIRST", "S-1-5-21-1-1-1", 100, false))
        .await?;
    assert_eq!(warden.domains.default_domain().await?.domain.name, "FIRST");

    warden
        .domains
        .create(&root, domain("SECOND", "S-1-5-21-2-2-2", 100, false))
        .await?;
    assert_eq!(warden.domains.default_domain().await?.domain.name, "SECOND");

    warden
        .domains
        .update(
            &root,
            "FIRST",
            DomainUpdateRequest {
                is_default: Some(true),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(warden.domains.default_domain().await?.domain.name, "FIRST");

    warden
        .domains
        .update(
            &root,
            "SECOND",
            DomainUpdateRequest {
                is_default: Some(true),
                ..Default::default()
            },
        )
        .await?;
    assert!(!warden.domains.find("FIRST").await?.unwrap().is_default);
    assert_eq!(warden.domains.default_domain().await?.domain.name, "SECOND");
    Ok(())
}

#[tokio::test]
async fn domain_names_and_sids_are_unique() -> WardenResult<()> {
    let (warden, _) = warden().await?;
    let root = admin();
    warden
        .domains
        .create(&root, domain("EXAMPLE", "S-1-5-21-1-2-3", 100, true))
        .await?;

    let same_name = warden
        .domains
        .create(&root, domain("EXAMPLE", "S-1-5-21-9-9-9", 100, false))
        .await
        .unwrap_err();
    assert!(same_name.is_already_exists());
    let same_sid = warden
        .domains
        .create(&root, domain("OTHER", "S-1-5-21-1-2-3", 100, false))
        .await
        .unwrap_err();
    assert!(same_sid.is_already_exists());
    let bad_sid = warden
        .domains
        .create(&root, domain("OTHER", "not-a-sid", 100, false))
        .await
        .unwrap_err();
    assert_eq!(bad_sid.code(), ErrorCode::InvalidParameter);

    warden.domains.delete(&root, "EXAMPLE").await?;
    assert!(warden.domains.list(&root).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn supplied_uid_must_be_free() -> WardenResult<()> {
    let (warden, stores) = warden().await?;
    let mut holder = directory_user("holder");
    holder.posix = Some(PosixSettings {
        uid_number: 4242,
        gid_number: 4242,
        ..Default::default()
    });
    stores.users.insert(holder).await?;

    warden.allocator.ensure_uid_available(4242, "holder").await?;
    warden.allocator.ensure_uid_available(4243, "other").await?;
    let err = warden
        .allocator
        .ensure_uid_available(4242, "other")
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidParameter);
    Ok(())
}
