//! Random token generation.
//!
//! Tokens name nodes, suffix temporary upload files and serve as generated
//! credential secrets, so they only need to be unique within a run.

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Generate a random alphanumeric token of `length` characters.
pub fn random_token(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}
