use serde::{Deserialize, Serialize};

/// Rôle d'un utilisateur, stocké en texte dans la colonne `users.role`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Voyageur,
    Conducteur,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Voyageur => "voyageur",
            Role::Conducteur => "conducteur",
            Role::Admin => "admin",
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "voyageur" => Ok(Role::Voyageur),
            "conducteur" => Ok(Role::Conducteur),
            "admin" => Ok(Role::Admin),
            other => Err(format!("rôle inconnu : {other}")),
        }
    }
}

/// Statut du compte : un compte bloqué ne peut plus se connecter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Actif,
    Bloque,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Actif => "actif",
            AccountStatus::Bloque => "bloque",
        }
    }
}

impl TryFrom<String> for AccountStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "actif" => Ok(AccountStatus::Actif),
            "bloque" => Ok(AccountStatus::Bloque),
            other => Err(format!("statut de compte inconnu : {other}")),
        }
    }
}
