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

use serde::{Deserialize, Serialize};

use crate::modules::acl::SubAttribute;
use crate::modules::allocator::SidKind;
use crate::modules::attributes::posix::PosixSettingsRequest;
use crate::modules::attributes::AttributeService;
use crate::modules::auth::Authentication;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::WardenResult;
use crate::modules::identity::directory::{DirectoryUser, SambaSettings, DEFAULT_ACCT_FLAGS};
use crate::{raise_error, utc_now};

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct SambaSettingsRequest {
    /// Domain name or SID; the default domain when absent.
    pub domain: Option<String>,
    pub sid: Option<String>,
    pub acct_flags: Option<String>,
}

impl SambaSettingsRequest {
    pub fn validate(&self) -> WardenResult<()> {
        if let Some(flags) = &self.acct_flags {
            if !(flags.starts_with('[') && flags.ends_with(']')) {
                return Err(raise_error!(
                    format!("Invalid Samba account flags '{}'.", flags),
                    ErrorCode::InvalidParameter
                ));
            }
        }
        Ok(())
    }
}

impl AttributeService {
    pub async fn apply_samba(
        &self,
        auth: &Authentication,
        uid: &str,
        request: SambaSettingsRequest,
    ) -> WardenResult<SambaSettings> {
        let user = self.gate_apply(auth, uid, SubAttribute::SambaSettings).await?;
        request.validate()?;
        self.store_samba(auth, user, request).await
    }

    pub async fn update_samba(
        &self,
        auth: &Authentication,
        uid: &str,
        request: SambaSettingsRequest,
    ) -> WardenResult<SambaSettings> {
        let user = self.gate_update(auth, uid, SubAttribute::SambaSettings).await?;
        request.validate()?;
        self.store_samba(auth, user, request).await
    }

    /// POSIX defaults are applied first when missing. The primary group SID
    /// is derived again on every write.
    async fn store_samba(
        &self,
        auth: &Authentication,
        user: DirectoryUser,
        request: SambaSettingsRequest,
    ) -> WardenResult<SambaSettings> {
        let posix = match &user.posix {
            Some(posix) => posix.clone(),
            None => {
                self.resolve_posix(auth, &user, PosixSettingsRequest::default())
                    .await?
            }
        };
        let current = user.samba.as_ref();

        let domain = match request.domain.as_deref() {
            Some(key) => self.domains.find_by_name_or_sid(key).await?.ok_or_else(|| {
                raise_error!(
                    format!("Samba domain '{}' not found.", key),
                    ErrorCode::ResourceNotFound
                )
            })?,
            None => match current {
                Some(samba) => match self.domains.find(&samba.domain_name).await? {
                    Some(domain) => domain,
                    None => self.domains.default_domain().await?.domain,
                },
                None => self.domains.default_domain().await?.domain,
            },
        };

        let same_domain = current.map(|s| s.domain_name == domain.name).unwrap_or(false);
        let sid = match request.sid {
            Some(sid) if !sid.trim().is_empty() => sid.trim().to_string(),
            _ => match current {
                Some(samba) if same_domain => samba.sid.clone(),
                _ => {
                    self.allocator
                        .samba_sid(posix.uid_number, Some(&domain.name), SidKind::User)
                        .await?
                }
            },
        };
        self.allocator
            .ensure_sid_free(&sid, SidKind::User, &user.uid)
            .await?;

        let primary_group_sid = self
            .primary_group_sid(posix.gid_number, &domain.name)
            .await?;
        let settings = SambaSettings {
            sid,
            domain_name: domain.name,
            primary_group_sid,
            acct_flags: request
                .acct_flags
                .or_else(|| current.map(|s| s.acct_flags.clone()))
                .unwrap_or_else(|| DEFAULT_ACCT_FLAGS.to_string()),
            pwd_last_set: current
                .map(|s| s.pwd_last_set)
                .unwrap_or_else(|| utc_now!() / 1000),
        };

        let stored = settings.clone();
        self.reconciler
            .write_through(&user.uid, |user| {
                user.posix = Some(posix);
                user.samba = Some(settings);
                Ok(())
            })
            .await?;
        Ok(stored)
    }

    /// The group's own Samba SID, else one derived from its GID in `domain`.
    /// `None` when no group has that GID.
    pub(crate) async fn primary_group_sid(
        &self,
        gid_number: u32,
        domain: &str,
    ) -> WardenResult<Option<String>> {
        let Some(group) = self.groups.find_by_gid(gid_number).await? else {
            return Ok(None);
        };
        match group.samba {
            Some(samba) => Ok(Some(samba.sid)),
            None => Ok(Some(
                self.allocator
                    .samba_sid(gid_number, Some(domain), SidKind::Group)
                    .await?,
            )),
        }
    }

    pub async fn read_samba(&self, auth: &Authentication, uid: &str) -> WardenResult<SambaSettings> {
        let user = self.gate_read(auth, uid, SubAttribute::SambaSettings).await?;
        user.samba
            .ok_or_else(|| Self::missing(uid, SubAttribute::SambaSettings))
    }

    pub async fn remove_samba(&self, auth: &Authentication, uid: &str) -> WardenResult<()> {
        self.gate_remove(auth, uid, SubAttribute::SambaSettings).await?;
        self.reconciler
            .write_through(uid, |user| {
                user.samba = None;
                Ok(())
            })
            .await?;
        Ok(())
    }
}
