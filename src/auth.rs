//! Password hashing primitive. The core only ever calls [`verify`]; hash
//! generation backs the `genpass` CLI verb.

/// Verifies `candidate` against an adaptive salted `hash`. Never panics:
/// a malformed hash is simply treated as a non-match.
pub fn verify(hash: &str, candidate: &str) -> bool {
    bcrypt::verify(candidate, hash).unwrap_or(false)
}

pub fn hash(password: &str) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_password() {
        let hashed = hash("hunter2").unwrap();
        assert!(verify(&hashed, "hunter2"));
        assert!(!verify(&hashed, "wrong"));
    }

    #[test]
    fn malformed_hash_never_panics() {
        assert!(!verify("not-a-real-hash", "anything"));
    }
}
