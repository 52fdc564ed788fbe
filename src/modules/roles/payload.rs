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
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::modules::error::code::ErrorCode;
use crate::modules::error::WardenResult;
use crate::raise_error;

static ROLE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_.\-]{0,127}$").expect("valid role name regex"));

pub fn validate_role_name(name: &str) -> WardenResult<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(raise_error!(
            "Role name cannot be empty or consist only of whitespace.".into(),
            ErrorCode::InvalidParameter
        ));
    }
    if !ROLE_NAME.is_match(trimmed) {
        return Err(raise_error!(
            format!("Invalid role name '{}'.", trimmed),
            ErrorCode::InvalidParameter
        ));
    }
    Ok(())
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct RoleCreateRequest {
    pub name: String,
    pub description: Option<String>,
    pub members: BTreeSet<String>,
}

impl RoleCreateRequest {
    pub fn validate(&self) -> WardenResult<()> {
        validate_role_name(&self.name)?;
        if self.members.iter().any(|m| m.trim().is_empty()) {
            return Err(raise_error!(
                "Role members cannot be blank.".into(),
                ErrorCode::InvalidParameter
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct RoleUpdateRequest {
    pub description: Option<String>,
    pub members: Option<BTreeSet<String>>,
}

impl RoleUpdateRequest {
    pub fn validate(&self) -> WardenResult<()> {
        if self.description.is_none() && self.members.is_none() {
            return Err(raise_error!(
                "Update request must contain at least one field to modify (description or members).".into(),
                ErrorCode::InvalidParameter
            ));
        }
        if let Some(members) = &self.members {
            if members.iter().any(|m| m.trim().is_empty()) {
                return Err(raise_error!(
                    "Role members cannot be blank.".into(),
                    ErrorCode::InvalidParameter
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_names_are_checked() {
        assert!(validate_role_name("ROLE_CUSTOM_alice_ab12cd34").is_ok());
        assert!(validate_role_name("ROLE_FRIENDS_j.doe").is_ok());
        assert!(validate_role_name("  ").is_err());
        assert!(validate_role_name("1ROLE").is_err());
        assert!(validate_role_name("ROLE X").is_err());
    }

    #[test]
    fn empty_update_is_rejected() {
        let err = RoleUpdateRequest::default().validate().unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidParameter);
    }
}
