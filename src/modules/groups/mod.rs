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
use std::sync::{Arc, LazyLock};

use native_db::*;
use native_model::{native_model, Model};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::modules::acl::engine::AclEngine;
use crate::modules::acl::policy::{Authorizer, Operation};
use crate::modules::acl::{EntityType, ObjectIdentity, Permission, Securable, Sid};
use crate::modules::allocator::domain::SambaDomainService;
use crate::modules::allocator::{IdentifierAllocator, SidKind};
use crate::modules::auth::Authentication;
use crate::modules::database::{Keyed, Repository};
use crate::modules::error::code::ErrorCode;
use crate::modules::error::WardenResult;
use crate::modules::identity::directory::DirectoryUser;
use crate::{raise_error, utc_now};

#[cfg(test)]
mod groups_tests;

/// Samba "domain group" type.
pub const DOMAIN_GROUP_TYPE: u32 = 2;

static GROUP_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]{0,63}$").expect("valid group name regex")
});

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct GroupSambaSettings {
    pub sid: String,
    pub domain_name: String,
    pub group_type: u32,
    pub display_name: Option<String>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[native_model(id = 2, version = 1)]
#[native_db]
pub struct UserGroup {
    #[primary_key]
    pub name: String,
    #[secondary_key(unique)]
    pub gid_number: u32,
    pub description: Option<String>,
    pub members: BTreeSet<String>,
    pub samba: Option<GroupSambaSettings>,
    /// Set for personal groups created alongside POSIX settings.
    pub owner: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Keyed for UserGroup {
    fn natural_key(&self) -> String {
        self.name.clone()
    }
}

impl Securable for UserGroup {
    fn object_identity(&self) -> ObjectIdentity {
        ObjectIdentity::of(EntityType::UserGroup, &self.name)
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct GroupSambaRequest {
    /// Domain name or SID; the default domain when absent.
    pub domain: Option<String>,
    pub sid: Option<String>,
    pub group_type: Option<u32>,
    pub display_name: Option<String>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct GroupCreateRequest {
    pub name: String,
    pub gid_number: Option<u32>,
    pub description: Option<String>,
    pub members: BTreeSet<String>,
    pub samba: Option<GroupSambaRequest>,
}

impl GroupCreateRequest {
    pub fn validate(&self) -> WardenResult<()> {
        validate_group_name(&self.name)
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct GroupUpdateRequest {
    pub description: Option<String>,
    pub gid_number: Option<u32>,
    pub members: Option<BTreeSet<String>>,
}

pub fn validate_group_name(name: &str) -> WardenResult<()> {
    if !GROUP_NAME.is_match(name.trim()) {
        return Err(raise_error!(
            format!("Invalid group name '{}'.", name),
            ErrorCode::InvalidParameter
        ));
    }
    Ok(())
}

pub struct GroupService {
    groups: Arc<dyn Repository<UserGroup>>,
    users: Arc<dyn Repository<DirectoryUser>>,
    allocator: Arc<IdentifierAllocator>,
    domains: Arc<SambaDomainService>,
    acl: Arc<AclEngine>,
    authorizer: Arc<Authorizer>,
}

impl GroupService {
    pub fn new(
        groups: Arc<dyn Repository<UserGroup>>,
        users: Arc<dyn Repository<DirectoryUser>>,
        allocator: Arc<IdentifierAllocator>,
        domains: Arc<SambaDomainService>,
        acl: Arc<AclEngine>,
        authorizer: Arc<Authorizer>,
    ) -> Self {
        Self {
            groups,
            users,
            allocator,
            domains,
            acl,
            authorizer,
        }
    }

    pub async fn find(&self, name: &str) -> WardenResult<Option<UserGroup>> {
        self.groups.find(name).await
    }

    pub async fn find_by_gid(&self, gid_number: u32) -> WardenResult<Option<UserGroup>> {
        Ok(self
            .groups
            .find_by(Box::new(move |g: &UserGroup| g.gid_number == gid_number))
            .await?
            .into_iter()
            .next())
    }

    async fn get(&self, name: &str) -> WardenResult<UserGroup> {
        self.groups.find(name).await?.ok_or_else(|| {
            raise_error!(
                format!("Group '{}' not found.", name),
                ErrorCode::ResourceNotFound
            )
        })
    }

    pub async fn read(&self, auth: &Authentication, name: &str) -> WardenResult<UserGroup> {
        self.authorizer
            .authorize(auth, Operation::ReadGroup, Some(&ObjectIdentity::group(name)))
            .await?;
        self.get(name).await
    }

    pub async fn create(
        &self,
        auth: &Authentication,
        request: GroupCreateRequest,
    ) -> WardenResult<UserGroup> {
        self.authorizer
            .authorize(auth, Operation::CreateGroup, None)
            .await?;
        request.validate()?;
        self.insert_group(request, None).await
    }

    async fn insert_group(
        &self,
        request: GroupCreateRequest,
        owner: Option<&str>,
    ) -> WardenResult<UserGroup> {
        let name = request.name.trim().to_string();
        if self.groups.exists(&name).await? {
            return Err(raise_error!(
                format!("Group '{}' already exists.", name),
                ErrorCode::AlreadyExists
            ));
        }

        let gid_number = match request.gid_number {
            Some(gid) => {
                self.ensure_gid_free(gid, None).await?;
                gid
            }
            None => self.allocator.next_gid_number().await?,
        };

        let samba = match request.samba {
            Some(samba) => Some(self.resolve_samba(samba, gid_number, None).await?),
            None => None,
        };

        let now = utc_now!();
        let group = self
            .groups
            .insert(UserGroup {
                name,
                gid_number,
                description: request.description,
                members: request.members,
                samba,
                owner: owner.map(str::to_string),
                created_at: now,
                updated_at: now,
            })
            .await?;
        self.acl
            .ensure_acl(&group, owner.map(Sid::principal), None, false)
            .await?;
        info!("Created group '{}' with GID {}", group.name, group.gid_number);
        Ok(group)
    }

    async fn ensure_gid_free(&self, gid_number: u32, except: Option<&str>) -> WardenResult<()> {
        if let Some(holder) = self.find_by_gid(gid_number).await? {
            if except != Some(holder.name.as_str()) {
                return Err(raise_error!(
                    format!("GID {} is already used by group '{}'.", gid_number, holder.name),
                    ErrorCode::AlreadyExists
                ));
            }
        }
        Ok(())
    }

    async fn resolve_samba(
        &self,
        request: GroupSambaRequest,
        gid_number: u32,
        except: Option<&str>,
    ) -> WardenResult<GroupSambaSettings> {
        let domain = match &request.domain {
            Some(key) => self.domains.find_by_name_or_sid(key).await?.ok_or_else(|| {
                raise_error!(
                    format!("Samba domain '{}' not found.", key),
                    ErrorCode::ResourceNotFound
                )
            })?,
            None => self.domains.default_domain().await?.domain,
        };
        let sid = match request.sid {
            Some(sid) if !sid.trim().is_empty() => sid.trim().to_string(),
            _ => {
                self.allocator
                    .samba_sid(gid_number, Some(&domain.name), SidKind::Group)
                    .await?
            }
        };

        self.allocator
            .ensure_sid_free(&sid, SidKind::Group, except.unwrap_or_default())
            .await?;

        Ok(GroupSambaSettings {
            sid,
            domain_name: domain.name,
            group_type: request.group_type.unwrap_or(DOMAIN_GROUP_TYPE),
            display_name: request.display_name,
        })
    }

    pub async fn update(
        &self,
        auth: &Authentication,
        name: &str,
        request: GroupUpdateRequest,
    ) -> WardenResult<UserGroup> {
        self.authorizer
            .authorize(auth, Operation::UpdateGroup, Some(&ObjectIdentity::group(name)))
            .await?;
        let mut group = self.get(name).await?;
        if let Some(gid_number) = request.gid_number {
            if gid_number != group.gid_number {
                self.ensure_gid_free(gid_number, Some(name)).await?;
                if self.primary_group_users(group.gid_number).await? > 0 {
                    return Err(raise_error!(
                        format!("Group '{}' is a primary group; its GID cannot change.", name),
                        ErrorCode::InvalidParameter
                    ));
                }
                group.gid_number = gid_number;
                if let Some(samba) = group.samba.take() {
                    let request = GroupSambaRequest {
                        domain: Some(samba.domain_name),
                        sid: None,
                        group_type: Some(samba.group_type),
                        display_name: samba.display_name,
                    };
                    group.samba = Some(self.resolve_samba(request, gid_number, Some(name)).await?);
                }
            }
        }
        if let Some(description) = request.description {
            group.description = Some(description).filter(|d| !d.trim().is_empty());
        }
        if let Some(members) = request.members {
            group.members = members;
        }
        group.updated_at = utc_now!();
        self.groups.save(group).await
    }

    async fn primary_group_users(&self, gid_number: u32) -> WardenResult<usize> {
        Ok(self
            .users
            .find_by(Box::new(move |u: &DirectoryUser| u.gid_number() == Some(gid_number)))
            .await?
            .len())
    }

    /// Refused while a user still has the group as primary group.
    pub async fn delete(&self, auth: &Authentication, name: &str) -> WardenResult<()> {
        self.authorizer
            .authorize(auth, Operation::DeleteGroup, Some(&ObjectIdentity::group(name)))
            .await?;
        let group = self.get(name).await?;
        self.remove_group(&group).await
    }

    async fn remove_group(&self, group: &UserGroup) -> WardenResult<()> {
        let users = self.primary_group_users(group.gid_number).await?;
        if users > 0 {
            return Err(raise_error!(
                format!(
                    "Group '{}' is the primary group of {} user(s).",
                    group.name, users
                ),
                ErrorCode::InvalidParameter
            ));
        }
        self.groups.delete(&group.name).await?;
        self.acl.delete_acls(group, true).await?;
        info!("Deleted group '{}'", group.name);
        Ok(())
    }

    pub async fn list(&self, auth: &Authentication) -> WardenResult<Vec<UserGroup>> {
        self.authorizer
            .authorize(auth, Operation::ListGroups, None)
            .await?;
        let groups = self.groups.find_all().await?;
        self.heal(&groups).await?;
        let mut visible = Vec::new();
        for group in groups {
            if self
                .authorizer
                .permits(auth, &group.object_identity(), Permission::Read)
                .await?
            {
                visible.push(group);
            }
        }
        Ok(visible)
    }

    async fn heal(&self, groups: &[UserGroup]) -> WardenResult<usize> {
        let mut healed = 0;
        for group in groups {
            let owner = group.owner.as_deref().map(Sid::principal);
            if self.acl.ensure_acl(group, owner, None, false).await?.1 {
                healed += 1;
            }
        }
        Ok(healed)
    }

    pub async fn heal_acls(&self) -> WardenResult<usize> {
        let groups = self.groups.find_all().await?;
        self.heal(&groups).await
    }

    pub async fn add_members(
        &self,
        auth: &Authentication,
        name: &str,
        members: &[String],
    ) -> WardenResult<UserGroup> {
        self.authorizer
            .authorize(auth, Operation::ManageGroupMembers, Some(&ObjectIdentity::group(name)))
            .await?;
        let mut group = self.get(name).await?;
        group.members.extend(members.iter().cloned());
        group.updated_at = utc_now!();
        self.groups.save(group).await
    }

    pub async fn remove_members(
        &self,
        auth: &Authentication,
        name: &str,
        members: &[String],
    ) -> WardenResult<UserGroup> {
        self.authorizer
            .authorize(auth, Operation::ManageGroupMembers, Some(&ObjectIdentity::group(name)))
            .await?;
        let mut group = self.get(name).await?;
        for member in members {
            group.members.remove(member);
        }
        group.updated_at = utc_now!();
        self.groups.save(group).await
    }

    /// Personal group of `uid`, named after it and administered by it.
    pub async fn create_personal_group(
        &self,
        uid: &str,
        gid_number: Option<u32>,
    ) -> WardenResult<UserGroup> {
        if let Some(existing) = self.groups.find(uid).await? {
            if existing.owner.as_deref() == Some(uid) {
                return Ok(existing);
            }
            return Err(raise_error!(
                format!("Group '{}' already exists and belongs to someone else.", uid),
                ErrorCode::AlreadyExists
            ));
        }
        let request = GroupCreateRequest {
            name: uid.to_string(),
            gid_number,
            description: Some(format!("Personal group of {}", uid)),
            members: BTreeSet::from([uid.to_string()]),
            samba: None,
        };
        let group = self.insert_group(request, Some(uid)).await?;
        self.acl
            .grant(
                &group,
                &Sid::principal(uid),
                &[Permission::Administration, Permission::Read, Permission::Write],
            )
            .await?;
        Ok(group)
    }

    /// Removes `uid` from every member set and drops its personal group
    /// unless someone else still uses it as primary group.
    pub async fn forget_user(&self, uid: &str) -> WardenResult<usize> {
        let member = uid.to_string();
        let joined = self
            .groups
            .find_by(Box::new(move |g: &UserGroup| g.members.contains(&member)))
            .await?;
        let changed = joined.len();
        for mut group in joined {
            group.members.remove(uid);
            group.updated_at = utc_now!();
            self.groups.save(group).await?;
        }

        if let Some(personal) = self.groups.find(uid).await? {
            if personal.owner.as_deref() == Some(uid)
                && self.primary_group_users(personal.gid_number).await? == 0
            {
                self.remove_group(&personal).await?;
            }
        }
        Ok(changed)
    }
}
