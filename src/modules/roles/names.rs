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

use crate::modules::utils::random_suffix;

pub const ROLE_SYSTEM: &str = "ROLE_SYSTEM";
pub const ROLE_ADMIN: &str = "ROLE_ADMIN";
pub const ROLE_ACL_ADMIN: &str = "ROLE_ACL_ADMIN";
pub const ROLE_USER: &str = "ROLE_USER";
pub const ROLE_OAUTH2_CLIENT: &str = "ROLE_OAUTH2_CLIENT";
pub const ROLE_READ_ALL_PROFILES: &str = "ROLE_READ_ALL_PROFILES";

/// Roles seeded at startup that can never be deleted.
pub const DEFAULT_ROLES: [(&str, &str); 6] = [
    (ROLE_SYSTEM, "Internal system principal"),
    (ROLE_ADMIN, "Administrators"),
    (ROLE_ACL_ADMIN, "Access control administrators"),
    (ROLE_USER, "Registered users"),
    (ROLE_OAUTH2_CLIENT, "OAuth2 clients"),
    (ROLE_READ_ALL_PROFILES, "May read every user profile"),
];

pub const CUSTOM_SUFFIX_LEN: usize = 8;

/// Naming of per-principal roles. Callers treat the produced names as opaque.
pub trait RoleNames: Send + Sync {
    /// Deterministic, one per principal.
    fn friends_role(&self, principal: &str) -> String;

    /// Fresh candidate on every call; uniqueness is checked by the caller.
    fn custom_role(&self, principal: &str) -> String;

    fn custom_role_prefix(&self, principal: &str) -> String;

    fn is_friends_role(&self, name: &str) -> bool;
}

pub struct PrefixedRoleNames {
    friends_prefix: String,
    custom_prefix: String,
}

impl PrefixedRoleNames {
    pub fn new(friends_prefix: impl Into<String>, custom_prefix: impl Into<String>) -> Self {
        Self {
            friends_prefix: friends_prefix.into(),
            custom_prefix: custom_prefix.into(),
        }
    }
}

impl RoleNames for PrefixedRoleNames {
    fn friends_role(&self, principal: &str) -> String {
        format!("{}{}", self.friends_prefix, principal)
    }

    fn custom_role(&self, principal: &str) -> String {
        format!(
            "{}{}",
            self.custom_role_prefix(principal),
            random_suffix(CUSTOM_SUFFIX_LEN)
        )
    }

    fn custom_role_prefix(&self, principal: &str) -> String {
        format!("{}{}_", self.custom_prefix, principal)
    }

    fn is_friends_role(&self, name: &str) -> bool {
        name.starts_with(&self.friends_prefix)
    }
}

pub fn is_default_role(name: &str) -> bool {
    DEFAULT_ROLES.iter().any(|(role, _)| *role == name)
}
