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

use serde::{Deserialize, Serialize};

use crate::modules::acl::SubAttribute;
use crate::modules::attributes::AttributeService;
use crate::modules::auth::Authentication;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::WardenResult;
use crate::modules::identity::directory::MailSettings;
use crate::modules::identity::payload::validate_email;
use crate::raise_error;

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct MailSettingsRequest {
    pub aliases: BTreeSet<String>,
    pub forward_to: BTreeSet<String>,
    pub quota_bytes: Option<u64>,
}

impl MailSettingsRequest {
    pub fn validate(&self) -> WardenResult<()> {
        for address in self.aliases.iter().chain(self.forward_to.iter()) {
            validate_email(address)?;
        }
        if self.quota_bytes == Some(0) {
            return Err(raise_error!(
                "Mail quota must be positive.".into(),
                ErrorCode::InvalidParameter
            ));
        }
        Ok(())
    }

    fn into_settings(self) -> MailSettings {
        MailSettings {
            aliases: self.aliases.into_iter().map(|a| a.to_lowercase()).collect(),
            forward_to: self.forward_to,
            quota_bytes: self.quota_bytes,
        }
    }
}

impl AttributeService {
    pub async fn apply_mail(
        &self,
        auth: &Authentication,
        uid: &str,
        request: MailSettingsRequest,
    ) -> WardenResult<MailSettings> {
        self.gate_apply(auth, uid, SubAttribute::MailSettings).await?;
        request.validate()?;
        self.store_mail(uid, request.into_settings()).await
    }

    pub async fn update_mail(
        &self,
        auth: &Authentication,
        uid: &str,
        request: MailSettingsRequest,
    ) -> WardenResult<MailSettings> {
        self.gate_update(auth, uid, SubAttribute::MailSettings).await?;
        request.validate()?;
        self.store_mail(uid, request.into_settings()).await
    }

    async fn store_mail(&self, uid: &str, settings: MailSettings) -> WardenResult<MailSettings> {
        let stored = settings.clone();
        self.reconciler
            .write_through(uid, |user| {
                user.mail = Some(settings);
                Ok(())
            })
            .await?;
        Ok(stored)
    }

    pub async fn read_mail(&self, auth: &Authentication, uid: &str) -> WardenResult<MailSettings> {
        let user = self.gate_read(auth, uid, SubAttribute::MailSettings).await?;
        user.mail
            .ok_or_else(|| Self::missing(uid, SubAttribute::MailSettings))
    }

    pub async fn remove_mail(&self, auth: &Authentication, uid: &str) -> WardenResult<()> {
        self.gate_remove(auth, uid, SubAttribute::MailSettings).await?;
        self.reconciler
            .write_through(uid, |user| {
                user.mail = None;
                Ok(())
            })
            .await?;
        Ok(())
    }
}
