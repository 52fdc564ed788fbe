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
use std::fmt;

use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};

use crate::modules::database::Keyed;

pub mod engine;
pub mod evaluator;
pub mod policy;


/// Security identity an ACE is granted to.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Sid {
    /// A named user or OAuth2 client.
    Principal(String),
    /// A granted authority, i.e. a role name.
    Authority(String),
}

impl Sid {
    pub fn principal(name: impl Into<String>) -> Self {
        Sid::Principal(name.into())
    }

    pub fn authority(name: impl Into<String>) -> Self {
        Sid::Authority(name.into())
    }

    pub fn name(&self) -> &str {
        match self {
            Sid::Principal(name) | Sid::Authority(name) => name,
        }
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sid::Principal(name) => write!(f, "principal:{}", name),
            Sid::Authority(name) => write!(f, "authority:{}", name),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Permission {
    Administration,
    Create,
    Read,
    Write,
    Delete,
}

impl Permission {
    /// The full set in the order new ACLs receive it.
    pub const ALL: [Permission; 5] = [
        Permission::Administration,
        Permission::Create,
        Permission::Delete,
        Permission::Read,
        Permission::Write,
    ];
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Permission::Administration => "ADMINISTRATION",
            Permission::Create => "CREATE",
            Permission::Read => "READ",
            Permission::Write => "WRITE",
            Permission::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControlEntry {
    pub permission: Permission,
    pub sid: Sid,
    pub granting: bool,
}

impl AccessControlEntry {
    pub fn grant(permission: Permission, sid: Sid) -> Self {
        Self {
            permission,
            sid,
            granting: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    UserProfile,
    Role,
    OAuth2Client,
    SambaDomain,
    UserGroup,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::UserProfile => "UserProfile",
            EntityType::Role => "Role",
            EntityType::OAuth2Client => "OAuth2Client",
            EntityType::SambaDomain => "SambaDomain",
            EntityType::UserGroup => "UserGroup",
        }
    }
}

/// Profile parts that carry their own ACL.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubAttribute {
    MailSettings,
    OrganisationSettings,
    PosixSettings,
    SambaSettings,
}

impl SubAttribute {
    pub const ALL: [SubAttribute; 4] = [
        SubAttribute::MailSettings,
        SubAttribute::OrganisationSettings,
        SubAttribute::PosixSettings,
        SubAttribute::SambaSettings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubAttribute::MailSettings => "mailSettings",
            SubAttribute::OrganisationSettings => "organisationSettings",
            SubAttribute::PosixSettings => "posixSettings",
            SubAttribute::SambaSettings => "sambaSettings",
        }
    }
}

/// `(type, primary key)` address of a securable entity or sub-attribute.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectIdentity {
    pub type_id: String,
    pub identifier: String,
}

impl ObjectIdentity {
    pub fn new(type_id: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            type_id: type_id.into(),
            identifier: identifier.into(),
        }
    }

    pub fn of(entity_type: EntityType, identifier: impl Into<String>) -> Self {
        Self::new(entity_type.as_str(), identifier)
    }

    /// `UserProfile#posixSettings` style identity, keyed by the owner's key.
    pub fn attribute(
        entity_type: EntityType,
        attribute: SubAttribute,
        identifier: impl Into<String>,
    ) -> Self {
        Self::new(
            format!("{}#{}", entity_type.as_str(), attribute.as_str()),
            identifier,
        )
    }

    pub fn profile(uid: impl Into<String>) -> Self {
        Self::of(EntityType::UserProfile, uid)
    }

    pub fn role(name: impl Into<String>) -> Self {
        Self::of(EntityType::Role, name)
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self::of(EntityType::UserGroup, name)
    }

    pub fn domain(name: impl Into<String>) -> Self {
        Self::of(EntityType::SambaDomain, name)
    }

    pub fn client(client_id: impl Into<String>) -> Self {
        Self::of(EntityType::OAuth2Client, client_id)
    }

    pub fn is_attribute(&self) -> bool {
        self.type_id.contains('#')
    }

    /// Store key. Type ids never contain `:`, so the first `:` splits.
    pub fn key(&self) -> String {
        format!("{}:{}", self.type_id, self.identifier)
    }
}

impl fmt::Display for ObjectIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.type_id, self.identifier)
    }
}

/// Anything the engine can resolve to an `ObjectIdentity`.
pub trait Securable {
    fn object_identity(&self) -> ObjectIdentity;
}

impl Securable for ObjectIdentity {
    fn object_identity(&self) -> ObjectIdentity {
        self.clone()
    }
}

impl<T: Securable + ?Sized> Securable for &T {
    fn object_identity(&self) -> ObjectIdentity {
        (**self).object_identity()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[native_model(id = 21, version = 1)]
#[native_db(primary_key(pk -> String))]
pub struct AclRecord {
    pub object: ObjectIdentity,
    pub owner: Sid,
    pub parent: Option<ObjectIdentity>,
    /// Key of `parent`, empty for root ACLs. Indexed for cascading deletes.
    #[secondary_key]
    pub parent_key: String,
    pub entries: Vec<AccessControlEntry>,
    pub entries_inheriting: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl AclRecord {
    fn pk(&self) -> String {
        self.object.key()
    }

    pub fn has_entry(&self, sid: &Sid, permission: Permission) -> bool {
        self.entries
            .iter()
            .any(|e| e.granting && &e.sid == sid && e.permission == permission)
    }

    /// Appends granting entries that are not present yet; returns how many
    /// were added.
    pub fn grant(&mut self, sid: &Sid, permissions: &[Permission]) -> usize {
        let mut added = 0;
        for permission in permissions {
            if !self.has_entry(sid, *permission) {
                self.entries
                    .push(AccessControlEntry::grant(*permission, sid.clone()));
                added += 1;
            }
        }
        added
    }

    pub fn revoke(&mut self, sid: &Sid, permissions: &[Permission]) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|e| !(&e.sid == sid && permissions.contains(&e.permission)));
        before - self.entries.len()
    }

    pub fn permissions_of(&self, sid: &Sid) -> BTreeSet<Permission> {
        self.entries
            .iter()
            .filter(|e| e.granting && &e.sid == sid)
            .map(|e| e.permission)
            .collect()
    }
}

impl Keyed for AclRecord {
    fn natural_key(&self) -> String {
        self.pk()
    }
}

impl Securable for AclRecord {
    fn object_identity(&self) -> ObjectIdentity {
        self.object.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> AclRecord {
        AclRecord {
            object: ObjectIdentity::role("ROLE_X"),
            owner: Sid::principal("alice"),
            parent: None,
            parent_key: String::new(),
            entries: vec![],
            entries_inheriting: false,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn attribute_identity_uses_composite_type() {
        let oid = ObjectIdentity::attribute(
            EntityType::UserProfile,
            SubAttribute::PosixSettings,
            "alice",
        );
        assert_eq!(oid.type_id, "UserProfile#posixSettings");
        assert_eq!(oid.identifier, "alice");
        assert!(oid.is_attribute());
        assert_eq!(oid.key(), "UserProfile#posixSettings:alice");
    }

    #[test]
    fn identifiers_may_contain_separators() {
        let a = ObjectIdentity::role("a:b");
        let b = ObjectIdentity::new("Role:a", "b");
        assert_eq!(a.key(), "Role:a:b");
        // type ids come from EntityType and never contain ':'
        assert!(!EntityType::Role.as_str().contains(':'));
        assert_ne!(a, b);
    }

    #[test]
    fn grant_skips_existing_entries() {
        let mut acl = record();
        let sid = Sid::principal("alice");
        assert_eq!(acl.grant(&sid, &[Permission::Read, Permission::Write]), 2);
        assert_eq!(acl.grant(&sid, &[Permission::Read]), 0);
        assert_eq!(acl.entries.len(), 2);
        assert_eq!(acl.revoke(&sid, &[Permission::Read]), 1);
        assert_eq!(
            acl.permissions_of(&sid),
            BTreeSet::from([Permission::Write])
        );
    }
}
