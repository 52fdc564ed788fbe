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

use std::collections::HashSet;
use std::sync::Arc;

use tracing::warn;

use crate::modules::acl::{AclRecord, ObjectIdentity, Permission, Securable};
use crate::modules::auth::Authentication;
use crate::modules::database::Repository;
use crate::modules::error::WardenResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Granted,
    Denied,
    /// The target has no ACL at all.
    NoAcl,
}

pub struct AclEvaluator {
    acls: Arc<dyn Repository<AclRecord>>,
}

impl AclEvaluator {
    pub fn new(acls: Arc<dyn Repository<AclRecord>>) -> Self {
        Self { acls }
    }

    /// Grants on the first entry matching one of the caller's sids and the
    /// permission. The parent chain is consulted only while the current ACL
    /// has `entries_inheriting` set.
    pub async fn evaluate(
        &self,
        auth: &Authentication,
        entity: &impl Securable,
        permission: Permission,
    ) -> WardenResult<Decision> {
        let oid = entity.object_identity();
        let Some(mut acl) = self.acls.find(&oid.key()).await? else {
            return Ok(Decision::NoAcl);
        };

        let sids = auth.sids();
        let mut visited: HashSet<String> = HashSet::new();
        loop {
            visited.insert(acl.object.key());
            let matched = acl
                .entries
                .iter()
                .find(|e| e.permission == permission && sids.contains(&e.sid));
            if let Some(entry) = matched {
                return Ok(if entry.granting {
                    Decision::Granted
                } else {
                    Decision::Denied
                });
            }

            let parent = match (&acl.parent, acl.entries_inheriting) {
                (Some(parent), true) if !visited.contains(&parent.key()) => parent.clone(),
                _ => return Ok(Decision::Denied),
            };
            match self.acls.find(&parent.key()).await? {
                Some(next) => acl = next,
                None => return Ok(Decision::Denied),
            }
        }
    }

    /// `evaluate` collapsed to a boolean; a missing ACL denies.
    pub async fn has_permission(
        &self,
        auth: &Authentication,
        entity: &impl Securable,
        permission: Permission,
    ) -> WardenResult<bool> {
        match self.evaluate(auth, entity, permission).await? {
            Decision::Granted => Ok(true),
            Decision::Denied => Ok(false),
            Decision::NoAcl => {
                let oid: ObjectIdentity = entity.object_identity();
                warn!(
                    "No ACL for {} while checking {} for '{}'",
                    oid, permission, auth.name
                );
                Ok(false)
            }
        }
    }
}
