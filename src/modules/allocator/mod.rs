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

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::modules::allocator::domain::{SambaDomain, SambaDomainService};
use crate::modules::database::Repository;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::WardenResult;
use crate::modules::groups::UserGroup;
use crate::modules::identity::directory::DirectoryUser;
use crate::modules::settings::WardenConfig;
use crate::{raise_error, utc_now};

pub mod domain;

#[cfg(test)]
mod allocator_tests;

/// Upper bound of occupied numbers skipped in one allocation.
const MAX_SKIPPED: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Counter {
    Uid,
    Gid,
}

impl Counter {
    fn get(&self, domain: &SambaDomain) -> u32 {
        match self {
            Counter::Uid => domain.next_uid,
            Counter::Gid => domain.next_gid,
        }
    }

    fn set(&self, domain: &mut SambaDomain, value: u32) {
        match self {
            Counter::Uid => domain.next_uid = value,
            Counter::Gid => domain.next_gid = value,
        }
    }
}

/// Which half of the RID space a SID is drawn from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SidKind {
    User,
    Group,
}

/// `<prefix>-<rid_base + 2 * id>` for users, one above that for groups, so a
/// user and a group with the same number never share a SID.
pub fn compute_sid(prefix: &str, rid_base: u32, id: u32, kind: SidKind) -> String {
    let rid = rid_base as u64 + 2 * id as u64;
    match kind {
        SidKind::User => format!("{}-{}", prefix, rid),
        SidKind::Group => format!("{}-{}", prefix, rid + 1),
    }
}

/// Issues POSIX UID/GID numbers from the default domain's counters and
/// derives Samba SIDs.
pub struct IdentifierAllocator {
    domains: Arc<SambaDomainService>,
    users: Arc<dyn Repository<DirectoryUser>>,
    groups: Arc<dyn Repository<UserGroup>>,
    config: Arc<WardenConfig>,
    transient_uid: AtomicU32,
    transient_gid: AtomicU32,
}

impl IdentifierAllocator {
    pub fn new(
        domains: Arc<SambaDomainService>,
        users: Arc<dyn Repository<DirectoryUser>>,
        groups: Arc<dyn Repository<UserGroup>>,
        config: Arc<WardenConfig>,
    ) -> Self {
        let seed = domain::transient_seed(utc_now!() / 1000);
        Self {
            domains,
            users,
            groups,
            config,
            transient_uid: AtomicU32::new(seed),
            transient_gid: AtomicU32::new(seed),
        }
    }

    pub async fn next_uid_number(&self) -> WardenResult<u32> {
        for _ in 0..MAX_SKIPPED {
            let value = self.take(Counter::Uid).await?;
            if !self.uid_in_use(value, None).await? {
                return Ok(value);
            }
            debug!("UID {} already taken, drawing again", value);
        }
        Err(raise_error!(
            "No free UID number found.".into(),
            ErrorCode::InternalError
        ))
    }

    pub async fn next_gid_number(&self) -> WardenResult<u32> {
        for _ in 0..MAX_SKIPPED {
            let value = self.take(Counter::Gid).await?;
            if !self.gid_in_use(value).await? {
                return Ok(value);
            }
            debug!("GID {} already taken, drawing again", value);
        }
        Err(raise_error!(
            "No free GID number found.".into(),
            ErrorCode::InternalError
        ))
    }

    /// Returns the counter value and stores its successor with a
    /// compare-and-save, retrying on conflicting writers.
    async fn take(&self, counter: Counter) -> WardenResult<u32> {
        let mut conflicts: u16 = 0;
        loop {
            let resolved = self.domains.default_domain().await?;
            if resolved.transient {
                let atomic = match counter {
                    Counter::Uid => &self.transient_uid,
                    Counter::Gid => &self.transient_gid,
                };
                return Ok(atomic.fetch_add(1, Ordering::SeqCst));
            }

            let current = resolved.domain;
            let value = counter.get(&current);
            let next = value.checked_add(1).ok_or_else(|| {
                raise_error!(
                    format!("{:?} counter of domain '{}' is exhausted", counter, current.name),
                    ErrorCode::InternalError
                )
            })?;
            let mut updated = current.clone();
            counter.set(&mut updated, next);
            updated.updated_at = utc_now!();

            if self
                .domains
                .repository()
                .compare_and_save(current, updated)
                .await?
            {
                return Ok(value);
            }

            conflicts += 1;
            if conflicts >= self.config.allocation_retries {
                return Err(raise_error!(
                    format!("Gave up allocating a {:?} after {} conflicts", counter, conflicts),
                    ErrorCode::InternalError
                ));
            }
            debug!("{:?} counter changed concurrently, retry {}", counter, conflicts);
        }
    }

    async fn uid_in_use(&self, uid_number: u32, except: Option<&str>) -> WardenResult<bool> {
        let except = except.map(str::to_string);
        let holders = self
            .users
            .find_by(Box::new(move |u: &DirectoryUser| {
                u.uid_number() == Some(uid_number) && except.as_deref() != Some(u.uid.as_str())
            }))
            .await?;
        Ok(!holders.is_empty())
    }

    async fn gid_in_use(&self, gid_number: u32) -> WardenResult<bool> {
        let holders = self
            .groups
            .find_by(Box::new(move |g: &UserGroup| g.gid_number == gid_number))
            .await?;
        Ok(!holders.is_empty())
    }

    /// Rejects a caller-supplied UID held by another principal. Keeping
    /// one's own number is fine.
    pub async fn ensure_uid_available(&self, uid_number: u32, principal: &str) -> WardenResult<()> {
        if self.uid_in_use(uid_number, Some(principal)).await? {
            return Err(raise_error!(
                format!("UID number {} is already in use.", uid_number),
                ErrorCode::InvalidParameter
            ));
        }
        Ok(())
    }

    /// SID of `id` in the domain named (or identified) by `domain`, or in the
    /// default domain. Unknown domains fall back to the configured prefix and
    /// RID base.
    pub async fn samba_sid(
        &self,
        id: u32,
        domain: Option<&str>,
        kind: SidKind,
    ) -> WardenResult<String> {
        let resolved = match domain {
            Some(key) => self.domains.find_by_name_or_sid(key).await?,
            None => Some(self.domains.default_domain().await?.domain),
        };
        let (prefix, rid_base) = match resolved {
            Some(domain) if !domain.sid.trim().is_empty() => (domain.sid, domain.rid_base),
            _ => (
                self.config.samba_sid_prefix.clone(),
                self.config.samba_rid_base,
            ),
        };
        Ok(compute_sid(&prefix, rid_base, id, kind))
    }

    /// Rejects `sid` when a user or group other than `owner` (of `kind`)
    /// already carries it.
    pub async fn ensure_sid_free(&self, sid: &str, kind: SidKind, owner: &str) -> WardenResult<()> {
        let probe = sid.to_string();
        let except = owner.to_string();
        let users = self
            .users
            .find_by(Box::new(move |u: &DirectoryUser| {
                u.samba.as_ref().map(|s| s.sid.as_str()) == Some(probe.as_str())
                    && !(kind == SidKind::User && u.uid == except)
            }))
            .await?;
        if let Some(user) = users.first() {
            return Err(raise_error!(
                format!("SID '{}' is already used by user '{}'.", sid, user.uid),
                ErrorCode::AlreadyExists
            ));
        }

        let probe = sid.to_string();
        let except = owner.to_string();
        let groups = self
            .groups
            .find_by(Box::new(move |g: &UserGroup| {
                g.samba.as_ref().map(|s| s.sid.as_str()) == Some(probe.as_str())
                    && !(kind == SidKind::Group && g.name == except)
            }))
            .await?;
        if let Some(group) = groups.first() {
            return Err(raise_error!(
                format!("SID '{}' is already used by group '{}'.", sid, group.name),
                ErrorCode::AlreadyExists
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sid_formula() {
        assert_eq!(compute_sid("S-1-5-21-X", 1000, 5, SidKind::User), "S-1-5-21-X-1010");
        assert_eq!(compute_sid("S-1-5-21-X", 1000, 5, SidKind::Group), "S-1-5-21-X-1011");
        assert_eq!(compute_sid("S-1-5-21-X", 1000, 0, SidKind::User), "S-1-5-21-X-1000");
        assert_eq!(
            compute_sid("S-1", u32::MAX, u32::MAX, SidKind::Group),
            format!("S-1-{}", u32::MAX as u64 * 3 + 1)
        );
    }
}
