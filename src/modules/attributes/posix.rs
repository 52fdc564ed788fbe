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
use tracing::info;

use crate::modules::acl::SubAttribute;
use crate::modules::attributes::AttributeService;
use crate::modules::auth::Authentication;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::{WardenError, WardenResult};
use crate::modules::identity::directory::{DirectoryUser, PosixSettings};
use crate::raise_error;

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct PosixSettingsRequest {
    pub uid_number: Option<u32>,
    pub gid_number: Option<u32>,
    pub gecos: Option<String>,
    pub home_directory: Option<String>,
    pub login_shell: Option<String>,
}

impl PosixSettingsRequest {
    pub fn validate(&self) -> WardenResult<()> {
        for (field, value) in [
            ("home directory", &self.home_directory),
            ("login shell", &self.login_shell),
        ] {
            if let Some(path) = value {
                if !path.starts_with('/') {
                    return Err(raise_error!(
                        format!("The {} must be an absolute path, got '{}'.", field, path),
                        ErrorCode::InvalidParameter
                    ));
                }
            }
        }
        if self.uid_number == Some(0) || self.gid_number == Some(0) {
            return Err(raise_error!(
                "UID and GID 0 are reserved.".into(),
                ErrorCode::InvalidParameter
            ));
        }
        Ok(())
    }
}

impl AttributeService {
    pub async fn apply_posix(
        &self,
        auth: &Authentication,
        uid: &str,
        request: PosixSettingsRequest,
    ) -> WardenResult<PosixSettings> {
        let user = self.gate_apply(auth, uid, SubAttribute::PosixSettings).await?;
        request.validate()?;
        self.store_posix(auth, &user, request).await
    }

    pub async fn update_posix(
        &self,
        auth: &Authentication,
        uid: &str,
        request: PosixSettingsRequest,
    ) -> WardenResult<PosixSettings> {
        let user = self.gate_update(auth, uid, SubAttribute::PosixSettings).await?;
        request.validate()?;
        self.store_posix(auth, &user, request).await
    }

    async fn store_posix(
        &self,
        auth: &Authentication,
        user: &DirectoryUser,
        request: PosixSettingsRequest,
    ) -> WardenResult<PosixSettings> {
        let posix = self.resolve_posix(auth, user, request).await?;
        let primary_group_sid = match &user.samba {
            Some(samba) => {
                self.primary_group_sid(posix.gid_number, &samba.domain_name)
                    .await?
            }
            None => None,
        };

        let stored = posix.clone();
        self.reconciler
            .write_through(&user.uid, |user| {
                user.posix = Some(posix);
                if let Some(samba) = user.samba.as_mut() {
                    samba.primary_group_sid = primary_group_sid;
                }
                Ok(())
            })
            .await?;
        Ok(stored)
    }

    /// Completes `request` with the current values, then with defaults:
    /// an allocated UID, the personal group, the display name as GECOS,
    /// `<home base>/<uid>` and the configured shell.
    pub(crate) async fn resolve_posix(
        &self,
        auth: &Authentication,
        user: &DirectoryUser,
        request: PosixSettingsRequest,
    ) -> WardenResult<PosixSettings> {
        let current = user.posix.as_ref();

        let uid_number = match request.uid_number {
            Some(number) => {
                self.allocator.ensure_uid_available(number, &user.uid).await?;
                number
            }
            None => match current {
                Some(posix) => posix.uid_number,
                None => self.allocator.next_uid_number().await?,
            },
        };

        let gid_number = match request.gid_number {
            Some(number) => {
                if self.groups.find_by_gid(number).await?.is_none() {
                    return Err(raise_error!(
                        format!("No group with GID {} exists.", number),
                        ErrorCode::ResourceNotFound
                    ));
                }
                number
            }
            None => match current {
                Some(posix) => posix.gid_number,
                None => self.personal_group_gid(auth, &user.uid).await?,
            },
        };

        Ok(PosixSettings {
            uid_number,
            gid_number,
            gecos: request
                .gecos
                .or_else(|| current.map(|p| p.gecos.clone()))
                .unwrap_or_else(|| user.display_name.clone()),
            home_directory: request
                .home_directory
                .or_else(|| current.map(|p| p.home_directory.clone()))
                .unwrap_or_else(|| format!("{}/{}", self.config.home_directory_base, user.uid)),
            login_shell: request
                .login_shell
                .or_else(|| current.map(|p| p.login_shell.clone()))
                .unwrap_or_else(|| self.config.login_shell.clone()),
        })
    }

    async fn personal_group_gid(&self, auth: &Authentication, uid: &str) -> WardenResult<u32> {
        let group = self
            .system
            .run_as_system(auth, "personal group creation", |_system| async move {
                self.groups.create_personal_group(uid, None).await
            })
            .await?;
        info!("Using personal group '{}' (GID {}) for '{}'", group.name, group.gid_number, uid);
        Ok(group.gid_number)
    }

    pub async fn read_posix(&self, auth: &Authentication, uid: &str) -> WardenResult<PosixSettings> {
        let user = self.gate_read(auth, uid, SubAttribute::PosixSettings).await?;
        user.posix
            .ok_or_else(|| Self::missing(uid, SubAttribute::PosixSettings))
    }

    /// Samba settings depend on POSIX settings, so they have to go first.
    pub async fn remove_posix(&self, auth: &Authentication, uid: &str) -> WardenResult<()> {
        let user = self.gate_remove(auth, uid, SubAttribute::PosixSettings).await?;
        if user.samba.is_some() {
            return Err(raise_error!(
                format!("Remove the Samba settings of '{}' first.", uid),
                ErrorCode::InvalidParameter
            ));
        }
        self.reconciler
            .write_through(uid, |user| {
                if user.samba.is_some() {
                    return Err::<(), WardenError>(raise_error!(
                        format!("Remove the Samba settings of '{}' first.", user.uid),
                        ErrorCode::InvalidParameter
                    ));
                }
                user.posix = None;
                Ok(())
            })
            .await?;
        Ok(())
    }
}
