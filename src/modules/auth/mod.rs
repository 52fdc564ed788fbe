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
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::modules::acl::Sid;
use crate::modules::settings::WardenConfig;

/// The acting identity of one service call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authentication {
    pub name: String,
    pub authorities: BTreeSet<String>,
}

impl Authentication {
    pub fn new<I, S>(name: impl Into<String>, authorities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            authorities: authorities.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has_authority(&self, authority: &str) -> bool {
        self.authorities.contains(authority)
    }

    pub fn has_any_authority<S: AsRef<str>>(&self, authorities: &[S]) -> bool {
        authorities.iter().any(|a| self.has_authority(a.as_ref()))
    }

    /// Principal sid first, then one authority sid per granted role.
    pub fn sids(&self) -> Vec<Sid> {
        std::iter::once(Sid::principal(&self.name))
            .chain(self.authorities.iter().map(Sid::authority))
            .collect()
    }
}

/// Builds the elevated identity for composed internal operations.
#[derive(Clone)]
pub struct SystemContext {
    config: Arc<WardenConfig>,
}

impl SystemContext {
    pub fn new(config: Arc<WardenConfig>) -> Self {
        Self { config }
    }

    pub fn system_authentication(&self) -> Authentication {
        Authentication::new(
            self.config.system_principal.clone(),
            self.config.privileged_roles(),
        )
    }

    /// The system principal name is reserved and never registrable.
    pub fn is_system(&self, principal: &str) -> bool {
        principal == self.config.system_principal
    }

    /// Runs `f` with a fresh system identity. The caller's own
    /// `Authentication` is untouched and nothing outlives the call.
    pub async fn run_as_system<F, Fut, T>(&self, caller: &Authentication, operation: &str, f: F) -> T
    where
        F: FnOnce(Authentication) -> Fut,
        Fut: Future<Output = T>,
    {
        debug!(
            "Elevating '{}' to '{}' for {}",
            caller.name, self.config.system_principal, operation
        );
        f(self.system_authentication()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sids_start_with_principal() {
        let auth = Authentication::new("alice", ["ROLE_USER", "ROLE_ADMIN"]);
        let sids = auth.sids();
        assert_eq!(sids[0], Sid::principal("alice"));
        assert!(sids.contains(&Sid::authority("ROLE_USER")));
        assert_eq!(sids.len(), 3);
    }

    #[tokio::test]
    async fn run_as_system_is_scoped_to_the_closure() {
        let context = SystemContext::new(Arc::new(WardenConfig::default()));
        let caller = Authentication::new("bob", ["ROLE_USER"]);
        let seen = context
            .run_as_system(&caller, "test", |system| async move { system })
            .await;
        assert_eq!(seen.name, "system");
        assert!(seen.has_authority("ROLE_ADMIN"));
        assert!(seen.has_authority("ROLE_SYSTEM"));
        assert_eq!(caller.name, "bob");
        assert!(!caller.has_authority("ROLE_ADMIN"));
        assert!(context.is_system(&seen.name));
        assert!(!context.is_system(&caller.name));
    }
}
