use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::domain::verification::VerificationStatus;
use crate::models::role::{AccountStatus, Role};
use crate::utils::validation::telephone_maroc;

/// Colonnes lues pour construire un `User`
pub const USER_COLUMNS: &str = "id, name, email, password, role, phone, photo_path, cin_path, \
                                statut_verification, statut, created_at";

/// Représente un utilisateur dans la base de données
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub password: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub phone: Option<String>,
    pub photo_path: Option<String>,
    pub cin_path: Option<String>,
    #[sqlx(try_from = "String")]
    pub statut_verification: VerificationStatus,
    #[sqlx(try_from = "String")]
    pub statut: AccountStatus,
    pub created_at: DateTime<Utc>,
}

/// Vue publique d'un utilisateur (sans le mot de passe)
#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub phone: Option<String>,
    pub photo_path: Option<String>,
    pub cin_path: Option<String>,
    pub statut_verification: VerificationStatus,
    pub badge_verifie: bool,
    pub statut: AccountStatus,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            phone: user.phone,
            photo_path: user.photo_path,
            cin_path: user.cin_path,
            badge_verifie: user.statut_verification.badge_verifie(),
            statut_verification: user.statut_verification,
            statut: user.statut,
            created_at: user.created_at,
        }
    }
}

/// Structure pour les requêtes d'inscription d'utilisateur
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterForm {
    #[validate(length(min = 2, max = 255, message = "Le nom doit contenir au moins 2 caractères"))]
    pub name: String,
    #[validate(email(message = "L'adresse email est invalide"))]
    pub email: String,
    #[validate(length(min = 8, message = "Le mot de passe doit contenir au moins 8 caractères"))]
    pub password: String,
    #[validate(must_match(other = "password", message = "La confirmation ne correspond pas"))]
    pub password_confirmation: String,
    #[validate(custom(function = "telephone_maroc"))]
    pub phone: Option<String>,
    pub role: Option<Role>,
    pub access_code: Option<String>, // Champ optionnel pour le code d'accès admin
}

/// Structure pour les requêtes de connexion d'utilisateur
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileForm {
    #[validate(length(min = 2, max = 255, message = "Le nom doit contenir au moins 2 caractères"))]
    pub name: Option<String>,
    #[validate(email(message = "L'adresse email est invalide"))]
    pub email: Option<String>,
    #[validate(custom(function = "telephone_maroc"))]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordForm {
    pub current_password: String,
    #[validate(length(min = 8, message = "Le mot de passe doit contenir au moins 8 caractères"))]
    pub password: String,
    #[validate(must_match(other = "password", message = "La confirmation ne correspond pas"))]
    pub password_confirmation: String,
}

/// Chemin d'une photo déjà stockée
#[derive(Debug, Deserialize, Validate)]
pub struct PhotoForm {
    #[validate(length(min = 1, max = 512, message = "Le chemin de la photo est invalide"))]
    pub photo_path: String,
}

/// Chemin du scan de CIN déjà stocké
#[derive(Debug, Deserialize, Validate)]
pub struct IdentityDocumentForm {
    #[validate(length(max = 512, message = "Le chemin du document est trop long"))]
    pub cin_path: String,
}

/// Modification d'un compte par un administrateur (blocage inclus)
#[derive(Debug, Deserialize, Validate)]
pub struct AdminUpdateUserForm {
    #[validate(length(min = 2, max = 255, message = "Le nom doit contenir au moins 2 caractères"))]
    pub name: Option<String>,
    #[validate(email(message = "L'adresse email est invalide"))]
    pub email: Option<String>,
    #[validate(custom(function = "telephone_maroc"))]
    pub phone: Option<String>,
    pub role: Option<Role>,
    pub statut: Option<AccountStatus>,
}

/// Filtres de la liste des utilisateurs côté administration
#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    pub role: Option<Role>,
    pub statut: Option<AccountStatus>,
    pub q: Option<String>,
}
