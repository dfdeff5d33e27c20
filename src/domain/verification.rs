//! Vérification d'identité par la CIN.
//!
//! Le statut est une colonne explicite (`users.statut_verification`).
//! Seul un administrateur fait évoluer un dossier ; le dépôt d'un nouveau
//! document par l'utilisateur remet toujours le dossier en attente.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    NonVerifie,
    EnAttente,
    Verifie,
    Rejete,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::NonVerifie => "non_verifie",
            VerificationStatus::EnAttente => "en_attente",
            VerificationStatus::Verifie => "verifie",
            VerificationStatus::Rejete => "rejete",
        }
    }

    /// Valeur historique `badge_verifie` attendue par le client
    pub fn badge_verifie(&self) -> bool {
        matches!(self, VerificationStatus::Verifie)
    }
}

impl TryFrom<String> for VerificationStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "non_verifie" => Ok(VerificationStatus::NonVerifie),
            "en_attente" => Ok(VerificationStatus::EnAttente),
            "verifie" => Ok(VerificationStatus::Verifie),
            "rejete" => Ok(VerificationStatus::Rejete),
            other => Err(format!("statut de vérification inconnu : {other}")),
        }
    }
}

/// Dépôt (ou remplacement) du document : le dossier repasse en attente
pub fn submit_document(cin_path: &str) -> Result<VerificationStatus, AppError> {
    if cin_path.trim().is_empty() {
        return Err(AppError::field("cin_path", "Le document d'identité est obligatoire"));
    }
    Ok(VerificationStatus::EnAttente)
}

/// Validation par un administrateur, y compris après un rejet
pub fn accept(current: VerificationStatus, cin_path: Option<&str>) -> Result<VerificationStatus, AppError> {
    if cin_path.is_none() {
        return Err(AppError::conflict("Aucun document d'identité n'a été déposé"));
    }
    match current {
        VerificationStatus::EnAttente | VerificationStatus::Rejete => Ok(VerificationStatus::Verifie),
        VerificationStatus::Verifie => Err(AppError::conflict("Ce compte est déjà vérifié")),
        VerificationStatus::NonVerifie => {
            Err(AppError::conflict("Aucun document d'identité n'a été déposé"))
        }
    }
}

/// Rejet d'un dossier en attente
pub fn reject(current: VerificationStatus) -> Result<VerificationStatus, AppError> {
    match current {
        VerificationStatus::EnAttente => Ok(VerificationStatus::Rejete),
        VerificationStatus::Rejete => Err(AppError::conflict("Ce document a déjà été rejeté")),
        VerificationStatus::Verifie => Err(AppError::conflict("Ce compte est déjà vérifié")),
        VerificationStatus::NonVerifie => {
            Err(AppError::conflict("Aucun document d'identité n'a été déposé"))
        }
    }
}

/// Un dossier n'apparaît dans la file d'attente admin que s'il a un document
pub fn in_review_queue(status: VerificationStatus, cin_path: Option<&str>) -> bool {
    cin_path.is_some() && status == VerificationStatus::EnAttente
}
