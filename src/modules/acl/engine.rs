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

use std::sync::Arc;

use tracing::{debug, info};

use crate::modules::acl::{
    AclRecord, EntityType, ObjectIdentity, Permission, Securable, Sid, SubAttribute,
};
use crate::modules::database::Repository;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::WardenResult;
use crate::modules::settings::WardenConfig;
use crate::{raise_error, utc_now};

/// Creates, mutates and removes ACL records. Evaluation lives in
/// `AclEvaluator`.
pub struct AclEngine {
    acls: Arc<dyn Repository<AclRecord>>,
    config: Arc<WardenConfig>,
}

impl AclEngine {
    pub fn new(acls: Arc<dyn Repository<AclRecord>>, config: Arc<WardenConfig>) -> Self {
        Self { acls, config }
    }

    pub fn system_sid(&self) -> Sid {
        Sid::principal(&self.config.system_principal)
    }

    pub async fn find_acl(&self, entity: &impl Securable) -> WardenResult<Option<AclRecord>> {
        self.acls.find(&entity.object_identity().key()).await
    }

    pub async fn read_acl(&self, entity: &impl Securable) -> WardenResult<AclRecord> {
        let oid = entity.object_identity();
        self.acls.find(&oid.key()).await?.ok_or_else(|| {
            raise_error!(
                format!("No ACL exists for {}", oid),
                ErrorCode::ResourceNotFound
            )
        })
    }

    /// Creates and persists the ACL of `entity`.
    ///
    /// The owner is `owner` when given, else the parent's owner, else the
    /// system principal. Non-inheriting ACLs start with the full permission
    /// set for every admin and system role. Fails with `AlreadyExists` when
    /// the entity already has an ACL and with `ResourceNotFound` when the
    /// named parent has none.
    pub async fn init_acl(
        &self,
        entity: &impl Securable,
        owner: Option<Sid>,
        parent: Option<&ObjectIdentity>,
        entries_inheriting: bool,
    ) -> WardenResult<AclRecord> {
        let object = entity.object_identity();
        let parent_acl = match parent {
            Some(parent) => Some(self.read_acl(parent).await?),
            None => None,
        };

        let owner = owner
            .or_else(|| parent_acl.as_ref().map(|p| p.owner.clone()))
            .unwrap_or_else(|| self.system_sid());

        let now = utc_now!();
        let mut record = AclRecord {
            object,
            owner,
            parent: parent_acl.as_ref().map(|p| p.object.clone()),
            parent_key: parent_acl
                .as_ref()
                .map(|p| p.object.key())
                .unwrap_or_default(),
            entries: Vec::new(),
            entries_inheriting,
            created_at: now,
            updated_at: now,
        };

        if !entries_inheriting {
            for role in self.config.privileged_roles() {
                record.grant(&Sid::authority(role), &Permission::ALL);
            }
        }

        let record = self.acls.insert(record).await?;
        debug!("Created ACL for {} owned by {}", record.object, record.owner);
        Ok(record)
    }

    /// Returns the existing ACL or creates one. The flag tells whether this
    /// call created it. Losing a concurrent creation race is not an error.
    pub async fn ensure_acl(
        &self,
        entity: &impl Securable,
        owner: Option<Sid>,
        parent: Option<&ObjectIdentity>,
        entries_inheriting: bool,
    ) -> WardenResult<(AclRecord, bool)> {
        if let Some(existing) = self.find_acl(entity).await? {
            return Ok((existing, false));
        }
        match self.init_acl(entity, owner, parent, entries_inheriting).await {
            Ok(record) => {
                info!("Initialized missing ACL for {}", record.object);
                Ok((record, true))
            }
            Err(e) if e.is_already_exists() => Ok((self.read_acl(entity).await?, false)),
            Err(e) => Err(e),
        }
    }

    /// Removes the ACL of `entity` and returns how many records were deleted.
    ///
    /// With `delete_children` every descendant ACL goes too; otherwise direct
    /// children are detached and become root ACLs.
    pub async fn delete_acls(
        &self,
        entity: &impl Securable,
        delete_children: bool,
    ) -> WardenResult<usize> {
        let root = entity.object_identity();
        let mut deleted = 0;
        let mut pending = vec![root.clone()];

        while let Some(current) = pending.pop() {
            let key = current.key();
            let filter_key = key.clone();
            let children = self
                .acls
                .find_by(Box::new(move |acl: &AclRecord| acl.parent_key == filter_key))
                .await?;

            for mut child in children {
                if delete_children {
                    pending.push(child.object.clone());
                } else {
                    child.parent = None;
                    child.parent_key.clear();
                    child.updated_at = utc_now!();
                    self.acls.save(child).await?;
                }
            }

            if self.acls.delete(&key).await? {
                deleted += 1;
            }
        }

        if deleted > 0 {
            info!("Deleted {} ACL(s) rooted at {}", deleted, root);
        }
        Ok(deleted)
    }

    pub async fn grant(
        &self,
        entity: &impl Securable,
        sid: &Sid,
        permissions: &[Permission],
    ) -> WardenResult<AclRecord> {
        let mut acl = self.read_acl(entity).await?;
        if acl.grant(sid, permissions) > 0 {
            acl.updated_at = utc_now!();
            acl = self.acls.save(acl).await?;
        }
        Ok(acl)
    }

    pub async fn revoke(
        &self,
        entity: &impl Securable,
        sid: &Sid,
        permissions: &[Permission],
    ) -> WardenResult<AclRecord> {
        let mut acl = self.read_acl(entity).await?;
        if acl.revoke(sid, permissions) > 0 {
            acl.updated_at = utc_now!();
            acl = self.acls.save(acl).await?;
        }
        Ok(acl)
    }

    /// Strips every entry held by `sid`, leaving a missing ACL alone.
    pub async fn revoke_all(&self, entity: &impl Securable, sid: &Sid) -> WardenResult<()> {
        if let Some(mut acl) = self.find_acl(entity).await? {
            if acl.revoke(sid, &Permission::ALL) > 0 {
                acl.updated_at = utc_now!();
                self.acls.save(acl).await?;
            }
        }
        Ok(())
    }

    pub async fn change_owner(&self, entity: &impl Securable, owner: Sid) -> WardenResult<AclRecord> {
        let mut acl = self.read_acl(entity).await?;
        if acl.owner != owner {
            acl.owner = owner;
            acl.updated_at = utc_now!();
            acl = self.acls.save(acl).await?;
        }
        Ok(acl)
    }

    /// Ensures the sub-attribute ACLs of one entity. They are parented to the
    /// entity's ACL for ownership only, never inherit, and give the owning
    /// principal READ. Returns how many were created.
    pub async fn ensure_attribute_acls(
        &self,
        entity_type: EntityType,
        identifier: &str,
        principal: &str,
    ) -> WardenResult<usize> {
        let parent = ObjectIdentity::of(entity_type, identifier);
        let owner = Sid::principal(principal);
        let mut created = 0;
        for attribute in SubAttribute::ALL {
            let oid = ObjectIdentity::attribute(entity_type, attribute, identifier);
            let (acl, fresh) = self
                .ensure_acl(&oid, Some(owner.clone()), Some(&parent), false)
                .await?;
            if !acl.has_entry(&owner, Permission::Read) {
                self.grant(&oid, &owner, &[Permission::Read]).await?;
            }
            if fresh {
                created += 1;
            }
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::error::WardenResult;
    use crate::modules::testing::acl_engine;

    #[tokio::test]
    async fn init_acl_seeds_privileged_roles() -> WardenResult<()> {
        let (engine, _) = acl_engine()?;
        let oid = ObjectIdentity::role("ROLE_TEST");
        let acl = engine.init_acl(&oid, None, None, false).await?;

        assert_eq!(acl.owner, Sid::principal("system"));
        for role in ["ROLE_ADMIN", "ROLE_ACL_ADMIN", "ROLE_SYSTEM"] {
            assert_eq!(acl.permissions_of(&Sid::authority(role)).len(), 5);
        }
        assert!(engine.init_acl(&oid, None, None, false).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn owner_falls_back_to_parent_owner() -> WardenResult<()> {
        let (engine, _) = acl_engine()?;
        let parent = ObjectIdentity::profile("alice");
        engine
            .init_acl(&parent, Some(Sid::principal("alice")), None, false)
            .await?;

        let child = ObjectIdentity::new("Custom", "child");
        let acl = engine.init_acl(&child, None, Some(&parent), true).await?;
        assert_eq!(acl.owner, Sid::principal("alice"));
        assert_eq!(acl.parent, Some(parent.clone()));
        assert!(acl.entries_inheriting);
        assert!(acl.entries.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn missing_parent_is_not_found() -> WardenResult<()> {
        let (engine, _) = acl_engine()?;
        let err = engine
            .init_acl(
                &ObjectIdentity::role("ROLE_A"),
                None,
                Some(&ObjectIdentity::role("ROLE_MISSING")),
                false,
            )
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        Ok(())
    }

    #[tokio::test]
    async fn non_cascading_delete_detaches_children() -> WardenResult<()> {
        let (engine, _) = acl_engine()?;
        let parent = ObjectIdentity::profile("alice");
        engine.init_acl(&parent, None, None, false).await?;
        engine
            .ensure_attribute_acls(EntityType::UserProfile, "alice", "alice")
            .await?;

        assert_eq!(engine.delete_acls(&parent, false).await?, 1);
        let posix = ObjectIdentity::attribute(
            EntityType::UserProfile,
            SubAttribute::PosixSettings,
            "alice",
        );
        let detached = engine.read_acl(&posix).await?;
        assert!(detached.parent.is_none());
        assert!(detached.parent_key.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn attribute_acls_grant_owner_read() -> WardenResult<()> {
        let (engine, _) = acl_engine()?;
        engine
            .init_acl(&ObjectIdentity::profile("bob"), Some(Sid::principal("bob")), None, false)
            .await?;
        let created = engine
            .ensure_attribute_acls(EntityType::UserProfile, "bob", "bob")
            .await?;
        assert_eq!(created, 4);
        assert_eq!(
            engine
                .ensure_attribute_acls(EntityType::UserProfile, "bob", "bob")
                .await?,
            0
        );

        let mail = engine
            .read_acl(&ObjectIdentity::attribute(
                EntityType::UserProfile,
                SubAttribute::MailSettings,
                "bob",
            ))
            .await?;
        assert!(!mail.entries_inheriting);
        assert_eq!(mail.parent, Some(ObjectIdentity::profile("bob")));
        assert!(mail.has_entry(&Sid::principal("bob"), Permission::Read));
        assert!(!mail.has_entry(&Sid::principal("bob"), Permission::Create));
        Ok(())
    }

    #[tokio::test]
    async fn grant_revoke_and_change_owner() -> WardenResult<()> {
        let (engine, _) = acl_engine()?;
        let oid = ObjectIdentity::group("staff");
        engine.init_acl(&oid, None, None, false).await?;

        let carol = Sid::principal("carol");
        let acl = engine
            .grant(&oid, &carol, &[Permission::Read, Permission::Write])
            .await?;
        assert!(acl.has_entry(&carol, Permission::Write));

        let acl = engine.revoke(&oid, &carol, &[Permission::Write]).await?;
        assert!(!acl.has_entry(&carol, Permission::Write));
        assert!(acl.has_entry(&carol, Permission::Read));

        let acl = engine.change_owner(&oid, carol.clone()).await?;
        assert_eq!(acl.owner, carol);
        Ok(())
    }
}
