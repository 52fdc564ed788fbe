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

use base64::{engine::general_purpose, Engine as _};
use ring::pbkdf2::{self, derive, verify};
use ring::rand::{SecureRandom, SystemRandom};
use std::num::NonZeroU32;

use crate::modules::error::code::ErrorCode;
use crate::modules::error::WardenResult;
use crate::raise_error;

const SCHEME: &str = "{PBKDF2-SHA256}";
const ITERATIONS: u32 = 100_000;
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

/// Hashes a secret into `{PBKDF2-SHA256}<iterations>$<salt>$<hash>`.
pub fn hash_password(plain: &str) -> WardenResult<String> {
    internal_hash(plain, ITERATIONS)
        .map_err(|_| raise_error!("Failed to hash password.".into(), ErrorCode::InternalError))
}

/// Constant-time comparison of `plain` against a stored hash. Malformed
/// hashes never verify.
pub fn verify_password(plain: &str, stored: &str) -> bool {
    let Some(encoded) = stored.strip_prefix(SCHEME) else {
        return false;
    };
    let mut parts = encoded.splitn(3, '$');
    let (Some(iterations), Some(salt), Some(hash)) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    let Some(iterations) = iterations.parse::<u32>().ok().and_then(NonZeroU32::new) else {
        return false;
    };
    let (Ok(salt), Ok(hash)) = (
        general_purpose::STANDARD_NO_PAD.decode(salt),
        general_purpose::STANDARD_NO_PAD.decode(hash),
    ) else {
        return false;
    };
    verify(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        &salt,
        plain.as_bytes(),
        &hash,
    )
    .is_ok()
}

fn internal_hash(plain: &str, iterations: u32) -> Result<String, ring::error::Unspecified> {
    let rng = SystemRandom::new();
    let mut salt = [0u8; SALT_LEN];
    rng.fill(&mut salt)?;
    let rounds = NonZeroU32::new(iterations).ok_or(ring::error::Unspecified)?;
    let mut hash = [0u8; HASH_LEN];
    derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        rounds,
        &salt,
        plain.as_bytes(),
        &mut hash,
    );
    Ok(format!(
        "{}{}${}${}",
        SCHEME,
        iterations,
        general_purpose::STANDARD_NO_PAD.encode(salt),
        general_purpose::STANDARD_NO_PAD.encode(hash)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hashed = internal_hash("correct horse battery", 1_000).unwrap();
        assert!(hashed.starts_with(SCHEME));
        assert!(verify_password("correct horse battery", &hashed));
        assert!(!verify_password("wrong horse", &hashed));
    }

    #[test]
    fn test_same_secret_gets_distinct_salts() {
        let a = internal_hash("secret", 1_000).unwrap();
        let b = internal_hash("secret", 1_000).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_malformed_hash_never_verifies() {
        assert!(!verify_password("secret", "plain-text"));
        assert!(!verify_password("secret", "{PBKDF2-SHA256}abc$$"));
        assert!(!verify_password("secret", "{PBKDF2-SHA256}0$AAAA$AAAA"));
    }
}
