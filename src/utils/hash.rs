use bcrypt::{hash, verify};

/// Hache un mot de passe en utilisant bcrypt
pub fn hash_password(password: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    hash(password, cost)
}

/// Vérifie si un mot de passe correspond à un hachage
pub fn verify_password(password: &str, hashed_password: &str) -> bool {
    verify(password, hashed_password).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_password_verifies_only_with_original() {
        let hashed = hash_password("trajet-casa-rabat", 4).unwrap();
        assert!(verify_password("trajet-casa-rabat", &hashed));
        assert!(!verify_password("autre", &hashed));
        assert!(!verify_password("trajet-casa-rabat", "pas-un-hash"));
    }
}
