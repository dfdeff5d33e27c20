pub mod extract_user;
pub mod hash;
pub mod jwt;
pub mod validation;
