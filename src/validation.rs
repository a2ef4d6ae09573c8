//! Field validation for request payloads.
//!
//! Collects the first failure per field and converts into
//! [`AppError::ValidationFailed`].

use chrono::NaiveDate;

use crate::error::{AppError, FieldErrors};

#[derive(Debug, Default)]
pub struct Validator {
    errors: FieldErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message` for `field` unless it already failed
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_insert_with(|| message.into());
    }

    pub fn has_error(&self, field: &str) -> bool {
        self.errors.contains_key(field)
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Trimmed non-empty value, or a "required" failure
    pub fn required<'a>(&mut self, field: &str, value: Option<&'a str>) -> Option<&'a str> {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) => Some(v),
            None => {
                self.add(field, format!("Le champ {field} est requis"));
                None
            }
        }
    }

    pub fn email(&mut self, field: &str, value: &str) {
        if !is_email(value) {
            self.add(field, "Adresse email invalide");
        }
    }

    pub fn min_len(&mut self, field: &str, value: &str, min: usize) {
        if value.chars().count() < min {
            self.add(field, format!("Au moins {min} caractères requis"));
        }
    }

    pub fn max_len(&mut self, field: &str, value: &str, max: usize) {
        if value.chars().count() > max {
            self.add(field, format!("Au plus {max} caractères autorisés"));
        }
    }

    pub fn one_of(&mut self, field: &str, value: &str, allowed: &[&str]) {
        if !allowed.iter().any(|a| a.eq_ignore_ascii_case(value)) {
            self.add(
                field,
                format!("Valeur invalide (attendu : {})", allowed.join(", ")),
            );
        }
    }

    /// Inclusive numeric range
    pub fn range(&mut self, field: &str, value: f64, min: f64, max: f64) {
        if !value.is_finite() || value < min || value > max {
            self.add(field, format!("Doit être compris entre {min} et {max}"));
        }
    }

    /// `confirmation` must equal `value`
    pub fn confirmed(&mut self, field: &str, value: &str, confirmation: Option<&str>) {
        if confirmation != Some(value) {
            self.add(field, "La confirmation ne correspond pas");
        }
    }

    /// `YYYY-MM-DD`
    pub fn date(&mut self, field: &str, value: &str) -> Option<NaiveDate> {
        match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(_) => {
                self.add(field, "Date invalide (format AAAA-MM-JJ)");
                None
            }
        }
    }

    pub fn finish(self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::ValidationFailed(self.errors))
        }
    }
}

fn is_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !value.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_first_error_per_field() {
        let mut v = Validator::new();
        assert_eq!(v.required("email", Some("  ")), None);
        v.email("email", "");
        v.min_len("password", "abc", 8);
        let err = v.finish().unwrap_err();
        match err {
            AppError::ValidationFailed(errors) => {
                assert_eq!(errors["email"], "Le champ email est requis");
                assert!(errors.contains_key("password"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn email_shapes() {
        assert!(is_email("marie.curie@ecole.fr"));
        assert!(!is_email("marie.curie"));
        assert!(!is_email("@ecole.fr"));
        assert!(!is_email("a@b"));
        assert!(!is_email("a b@ecole.fr"));
    }

    #[test]
    fn ranges_and_dates() {
        let mut v = Validator::new();
        v.range("valeur", 21.0, 0.0, 20.0);
        assert_eq!(v.date("date", "2024-02-30"), None);
        assert!(v.date("ok", "2024-02-29").is_some());
        assert!(v.has_error("valeur"));
        assert!(v.has_error("date"));
        assert!(!v.has_error("ok"));
    }

    #[test]
    fn empty_validator_passes() {
        let mut v = Validator::new();
        assert_eq!(v.required("nom", Some(" Curie ")), Some("Curie"));
        v.one_of("type", "TP", &["examen", "tp"]);
        assert!(v.finish().is_ok());
    }
}
