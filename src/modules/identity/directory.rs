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

use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};

use crate::modules::acl::{EntityType, ObjectIdentity, Securable};
use crate::modules::database::Keyed;

/// Samba account flags of a plain user account.
pub const DEFAULT_ACCT_FLAGS: &str = "[U          ]";

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct MailSettings {
    pub aliases: BTreeSet<String>,
    pub forward_to: BTreeSet<String>,
    pub quota_bytes: Option<u64>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct OrganisationSettings {
    pub organisation: Option<String>,
    pub department: Option<String>,
    pub title: Option<String>,
    pub employee_number: Option<String>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct PosixSettings {
    pub uid_number: u32,
    pub gid_number: u32,
    pub gecos: String,
    pub home_directory: String,
    pub login_shell: String,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct SambaSettings {
    pub sid: String,
    pub domain_name: String,
    /// Derived from the POSIX primary group on every write.
    pub primary_group_sid: Option<String>,
    pub acct_flags: String,
    pub pwd_last_set: i64,
}

/// Authoritative directory record of a user.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[native_model(id = 1, version = 1)]
#[native_db]
pub struct DirectoryUser {
    #[primary_key]
    pub uid: String,
    pub display_name: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub password: Option<String>,
    pub language: Option<String>,
    pub time_zone: Option<String>,
    pub mail: Option<MailSettings>,
    pub organisation: Option<OrganisationSettings>,
    pub posix: Option<PosixSettings>,
    pub samba: Option<SambaSettings>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl DirectoryUser {
    pub fn uid_number(&self) -> Option<u32> {
        self.posix.as_ref().map(|p| p.uid_number)
    }

    pub fn gid_number(&self) -> Option<u32> {
        self.posix.as_ref().map(|p| p.gid_number)
    }
}

impl Keyed for DirectoryUser {
    fn natural_key(&self) -> String {
        self.uid.clone()
    }
}

impl Securable for DirectoryUser {
    fn object_identity(&self) -> ObjectIdentity {
        ObjectIdentity::of(EntityType::UserProfile, &self.uid)
    }
}
