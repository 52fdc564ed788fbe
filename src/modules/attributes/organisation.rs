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

use serde::{Deserialize, Serialize};

use crate::modules::acl::SubAttribute;
use crate::modules::attributes::AttributeService;
use crate::modules::auth::Authentication;
use crate::modules::error::WardenResult;
use crate::modules::identity::directory::OrganisationSettings;
use crate::modules::utils::normalize;

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct OrganisationSettingsRequest {
    pub organisation: Option<String>,
    pub department: Option<String>,
    pub title: Option<String>,
    pub employee_number: Option<String>,
}

impl From<OrganisationSettingsRequest> for OrganisationSettings {
    fn from(request: OrganisationSettingsRequest) -> Self {
        Self {
            organisation: normalize(request.organisation),
            department: normalize(request.department),
            title: normalize(request.title),
            employee_number: normalize(request.employee_number),
        }
    }
}

// Organisation and department are mirrored into the profile document, so
// these writes go through the reconciler like every other profile change.
impl AttributeService {
    pub async fn apply_organisation(
        &self,
        auth: &Authentication,
        uid: &str,
        request: OrganisationSettingsRequest,
    ) -> WardenResult<OrganisationSettings> {
        self.gate_apply(auth, uid, SubAttribute::OrganisationSettings)
            .await?;
        self.store_organisation(uid, request.into()).await
    }

    pub async fn update_organisation(
        &self,
        auth: &Authentication,
        uid: &str,
        request: OrganisationSettingsRequest,
    ) -> WardenResult<OrganisationSettings> {
        self.gate_update(auth, uid, SubAttribute::OrganisationSettings)
            .await?;
        self.store_organisation(uid, request.into()).await
    }

    async fn store_organisation(
        &self,
        uid: &str,
        settings: OrganisationSettings,
    ) -> WardenResult<OrganisationSettings> {
        let stored = settings.clone();
        self.reconciler
            .write_through(uid, |user| {
                user.organisation = Some(settings);
                Ok(())
            })
            .await?;
        Ok(stored)
    }

    pub async fn read_organisation(
        &self,
        auth: &Authentication,
        uid: &str,
    ) -> WardenResult<OrganisationSettings> {
        let user = self
            .gate_read(auth, uid, SubAttribute::OrganisationSettings)
            .await?;
        user.organisation
            .ok_or_else(|| Self::missing(uid, SubAttribute::OrganisationSettings))
    }

    pub async fn remove_organisation(&self, auth: &Authentication, uid: &str) -> WardenResult<()> {
        self.gate_remove(auth, uid, SubAttribute::OrganisationSettings)
            .await?;
        self.reconciler
            .write_through(uid, |user| {
                user.organisation = None;
                Ok(())
            })
            .await?;
        Ok(())
    }
}
