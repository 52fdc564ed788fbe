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
use std::sync::LazyLock;

use email_address::EmailAddress;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::modules::error::code::ErrorCode;
use crate::modules::error::WardenResult;
use crate::modules::identity::directory::DirectoryUser;
use crate::modules::identity::document::ProfileDocument;
use crate::raise_error;

static UID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z_][a-z0-9_.\-]{1,31}$").expect("valid uid regex"));

static MOBILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9 ]{4,20}$").expect("valid mobile regex"));

const MIN_PASSWORD_LEN: usize = 8;

fn allowed_languages() -> HashSet<&'static str> {
    [
        "ar", "da", "de", "en", "es", "fi", "fr", "it", "jp", "ko", "nl", "no", "pl", "pt", "ru",
        "sv", "zh", "zh-tw",
    ]
    .into_iter()
    .collect()
}

pub fn validate_uid(uid: &str) -> WardenResult<()> {
    if !UID.is_match(uid) {
        return Err(raise_error!(
            format!("Invalid user id '{}'.", uid),
            ErrorCode::InvalidParameter
        ));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> WardenResult<()> {
    if !EmailAddress::is_valid(email) {
        return Err(raise_error!(
            format!("Invalid email address '{}'.", email),
            ErrorCode::InvalidParameter
        ));
    }
    Ok(())
}

pub fn validate_mobile(mobile: &str) -> WardenResult<()> {
    if !MOBILE.is_match(mobile) {
        return Err(raise_error!(
            format!("Invalid mobile number '{}'.", mobile),
            ErrorCode::InvalidParameter
        ));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> WardenResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(raise_error!(
            format!("Password must have at least {} characters.", MIN_PASSWORD_LEN),
            ErrorCode::InvalidParameter
        ));
    }
    Ok(())
}

fn validate_language(language: &Option<String>) -> WardenResult<()> {
    if let Some(v) = language {
        if !allowed_languages().contains(v.as_str()) {
            return Err(raise_error!(
                format!("invalid language value: '{}'", v),
                ErrorCode::InvalidParameter
            ));
        }
    }
    Ok(())
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct ProfileCreateRequest {
    pub uid: String,
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub password: String,
    pub language: Option<String>,
    pub time_zone: Option<String>,
}

impl ProfileCreateRequest {
    pub fn validate(&self) -> WardenResult<()> {
        validate_uid(&self.uid)?;
        if let Some(email) = &self.email {
            validate_email(email)?;
        }
        if let Some(mobile) = &self.mobile {
            validate_mobile(mobile)?;
        }
        validate_password(&self.password)?;
        validate_language(&self.language)
    }

    /// Display name, falling back to "first last" and then the uid.
    pub fn resolved_display_name(&self) -> String {
        if let Some(name) = self.display_name.as_deref().map(str::trim) {
            if !name.is_empty() {
                return name.to_string();
            }
        }
        let joined = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if joined.is_empty() {
            self.uid.clone()
        } else {
            joined
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct ProfileUpdateRequest {
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub language: Option<String>,
    pub time_zone: Option<String>,
}

impl ProfileUpdateRequest {
    pub fn validate(&self) -> WardenResult<()> {
        if self.display_name.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
            && self.language.is_none()
            && self.time_zone.is_none()
        {
            return Err(raise_error!(
                "Update request must contain at least one field to modify.".into(),
                ErrorCode::InvalidParameter
            ));
        }
        if let Some(name) = &self.display_name {
            if name.trim().is_empty() {
                return Err(raise_error!(
                    "Display name cannot be blank.".into(),
                    ErrorCode::InvalidParameter
                ));
            }
        }
        validate_language(&self.language)
    }

    pub fn apply(self, user: &mut DirectoryUser) {
        if let Some(display_name) = self.display_name {
            user.display_name = display_name.trim().to_string();
        }
        if self.first_name.is_some() {
            user.first_name = crate::modules::utils::normalize(self.first_name);
        }
        if self.last_name.is_some() {
            user.last_name = crate::modules::utils::normalize(self.last_name);
        }
        if self.language.is_some() {
            user.language = self.language;
        }
        if self.time_zone.is_some() {
            user.time_zone = crate::modules::utils::normalize(self.time_zone);
        }
    }
}

/// What profile reads return: the document plus the roles of the user.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ProfileView {
    pub uid: String,
    pub display_name: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub language: Option<String>,
    pub time_zone: Option<String>,
    pub organisation: Option<String>,
    pub department: Option<String>,
    pub roles: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ProfileView {
    pub fn new(document: ProfileDocument, roles: Vec<String>) -> Self {
        Self {
            uid: document.uid,
            display_name: document.display_name,
            first_name: document.first_name,
            last_name: document.last_name,
            email: document.email,
            mobile: document.mobile,
            language: document.language,
            time_zone: document.time_zone,
            organisation: document.organisation,
            department: document.department,
            roles,
            created_at: document.created_at,
            updated_at: document.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ProfileCreateRequest {
        ProfileCreateRequest {
            uid: "alice".into(),
            first_name: Some("Alice".into()),
            last_name: Some("Liddell".into()),
            email: Some("alice@example.org".into()),
            password: "rabbit-hole".into(),
            ..Default::default()
        }
    }

    #[test]
    fn valid_request_passes() {
        assert!(request().validate().is_ok());
        assert_eq!(request().resolved_display_name(), "Alice Liddell");
    }

    #[test]
    fn rejects_bad_fields() {
        let mut r = request();
        r.uid = "Alice Smith".into();
        assert!(r.validate().is_err());

        let mut r = request();
        r.email = Some("not-an-email".into());
        assert_eq!(r.validate().unwrap_err().code(), ErrorCode::InvalidParameter);

        let mut r = request();
        r.password = "short".into();
        assert!(r.validate().is_err());

        let mut r = request();
        r.language = Some("xx".into());
        assert!(r.validate().is_err());
    }

    #[test]
    fn display_name_falls_back_to_uid() {
        let r = ProfileCreateRequest {
            uid: "bob".into(),
            password: "long-enough".into(),
            ..Default::default()
        };
        assert_eq!(r.resolved_display_name(), "bob");
    }
}
