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

use std::fmt::Formatter;

use code::ErrorCode;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use snafu::{Location, Snafu};

pub mod code;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum WardenError {
    #[snafu(display("{message}"))]
    Generic {
        message: String,
        #[snafu(implicit)]
        location: Location,
        code: ErrorCode,
    },
    #[snafu(display("I/O error: {source}"))]
    IoError {
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },
}

pub type WardenResult<T, E = WardenError> = std::result::Result<T, E>;

impl From<std::io::Error> for WardenError {
    fn from(source: std::io::Error) -> Self {
        Self::IoError {
            source,
            location: Location::default(),
        }
    }
}

impl WardenError {
    pub fn code(&self) -> ErrorCode {
        match self {
            WardenError::Generic { code, .. } => *code,
            WardenError::IoError { .. } => ErrorCode::IoError,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.code().status()
    }

    pub fn is_not_found(&self) -> bool {
        self.code() == ErrorCode::ResourceNotFound
    }

    pub fn is_already_exists(&self) -> bool {
        self.code() == ErrorCode::AlreadyExists
    }

    pub fn is_forbidden(&self) -> bool {
        self.code() == ErrorCode::Forbidden
    }
}

/// Error body handed to whatever transport sits in front of the services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub message: String,
    pub code: u32,
}

impl From<WardenError> for ApiError {
    fn from(error: WardenError) -> Self {
        match error {
            WardenError::Generic {
                message,
                location,
                code,
            } => {
                tracing::error!(
                    "API error occurred: [{:#?}] {} at {:?}",
                    code,
                    message,
                    location
                );
                ApiError {
                    message,
                    code: code as u32,
                }
            }
            WardenError::IoError { source, location } => {
                tracing::error!("I/O error occurred: {} at {:?}", source, location);
                ApiError {
                    message: source.to_string(),
                    code: ErrorCode::IoError as u32,
                }
            }
        }
    }
}

impl ApiError {
    pub fn new(message: String, code: u32) -> Self {
        Self { message, code }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Error({}): {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}
