use once_cell::sync::Lazy;
use regex::Regex;
use validator::ValidationError;

/// Numéro marocain : 06/07/05 ou +212 suivi de 9 chiffres
pub static TELEPHONE_MAROC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\+212|0)[5-7][0-9]{8}$").expect("motif de téléphone valide"));

/// Normalise un champ texte facultatif : une chaîne vide vaut absence
pub fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Champ fourni mais vide (par opposition à un champ absent)
pub fn is_blank(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.trim().is_empty())
}

/// Téléphone facultatif : une valeur vide efface le numéro, sinon il doit être marocain
pub fn telephone_maroc(phone: &str) -> Result<(), ValidationError> {
    let phone = phone.trim();
    if phone.is_empty() || TELEPHONE_MAROC.is_match(phone) {
        return Ok(());
    }
    let mut error = ValidationError::new("telephone_maroc");
    error.message = Some("Numéro de téléphone marocain invalide".into());
    Err(error)
}

/// Motif `LIKE` insensible à la casse contenant `term` tel quel (`%` et `_` échappés)
pub fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.to_lowercase().chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_strings_become_none() {
        assert_eq!(non_empty(Some("  ")), None);
        assert_eq!(non_empty(Some(" Rabat ")), Some("Rabat".to_string()));
        assert_eq!(non_empty(None), None);
    }

    #[test]
    fn blank_is_distinct_from_absent() {
        assert!(is_blank(Some(" ")));
        assert!(!is_blank(None));
        assert!(!is_blank(Some("0612345678")));
    }

    #[test]
    fn blank_phone_is_accepted_to_clear_the_number() {
        assert!(telephone_maroc("").is_ok());
        assert!(telephone_maroc("   ").is_ok());
        assert!(telephone_maroc(" 0612345678 ").is_ok());
        assert!(telephone_maroc("+212512345678").is_ok());
        assert!(telephone_maroc("0912345678").is_err());
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(like_pattern("Casa"), "%casa%");
        assert_eq!(like_pattern("100%_sur"), r"%100\%\_sur%");
        assert_eq!(like_pattern(r"a\b"), r"%a\\b%");
    }
}
