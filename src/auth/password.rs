use pbkdf2::pbkdf2_hmac;
use sha2::Sha512;
use uuid::Uuid;

use crate::app::Result;
use crate::domain::PasswordHash;

pub const DEFAULT_ROUNDS: u32 = 10_000;

const KEY_LEN: usize = 64;

/// Hash `password` with a fresh random salt (PBKDF2-HMAC-SHA512).
pub fn hash_password(password: &str, rounds: u32) -> PasswordHash {
    let salt = hex::encode(Uuid::new_v4().as_bytes());
    let hash = hex::encode(derive(password, &salt, rounds));
    PasswordHash { hash, salt }
}

pub fn verify_password(password: &str, stored: &PasswordHash, rounds: u32) -> bool {
    let Ok(expected) = hex::decode(&stored.hash) else {
        return false;
    };
    let actual = derive(password, &stored.salt, rounds);

    expected.len() == actual.len()
        && expected
            .iter()
            .zip(actual.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

/// [`hash_password`] on the blocking pool.
pub async fn hash_password_off_thread(password: String, rounds: u32) -> Result<PasswordHash> {
    Ok(tokio::task::spawn_blocking(move || hash_password(&password, rounds)).await?)
}

/// [`verify_password`] on the blocking pool.
pub async fn verify_password_off_thread(
    password: String,
    stored: PasswordHash,
    rounds: u32,
) -> Result<bool> {
    Ok(tokio::task::spawn_blocking(move || verify_password(&password, &stored, rounds)).await?)
}

fn derive(password: &str, salt: &str, rounds: u32) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha512>(password.as_bytes(), salt.as_bytes(), rounds, &mut key);
    key
}
