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

use rand::{distr::Alphanumeric, Rng};

pub mod password;

#[macro_export]
macro_rules! raise_error {
    ($message:expr, $code:expr) => {
        $crate::modules::error::WardenError::Generic {
            message: $message,
            location: snafu::Location::new(file!(), line!(), column!()),
            code: $code,
        }
    };
}

#[macro_export]
macro_rules! utc_now {
    () => {
        chrono::Utc::now().timestamp_millis()
    };
}

#[macro_export]
macro_rules! hash_password {
    ($plain:expr) => {
        $crate::modules::utils::password::hash_password($plain)
    };
}

/// Lowercase alphanumeric string of `len` characters.
pub fn random_suffix(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}

/// Trims the value and drops it when nothing is left.
pub fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
