//! Request-level fault taxonomy.
//!
//! Every fault carries its HTTP status. Validation, auth and CSRF failures
//! are expected and rendered as-is; infrastructure faults are logged and
//! rendered with a generic message unless debug mode is on.

use std::backtrace::Backtrace;
use std::collections::BTreeMap;

use axum::http::{header, HeaderValue, Method, StatusCode};
use serde_json::{json, Value};

use crate::http::Response;
use crate::routing::RouteError;
use crate::session::SessionError;
use crate::store::StoreError;

/// Field name → message, as returned in the `errors` object
pub type FieldErrors = BTreeMap<String, String>;

/// Convenience alias for pipeline results
pub type HandlerResult = Result<Response, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Route non trouvée")]
    RouteNotFound { method: Method, path: String },

    #[error("Méthode non autorisée")]
    MethodNotAllowed { allowed: Vec<Method> },

    #[error("Authentification requise")]
    AuthenticationRequired,

    #[error("Email ou mot de passe incorrect")]
    InvalidCredentials,

    /// Token absent from the request
    #[error("Token CSRF invalide")]
    CsrfMissing,

    /// Token present but not the one bound to this session, or expired
    #[error("Token CSRF invalide")]
    CsrfInvalid,

    #[error("Accès refusé")]
    AuthorizationDenied,

    #[error("Données invalides")]
    ValidationFailed(FieldErrors),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Requête trop volumineuse")]
    PayloadTooLarge,

    #[error("Trop de requêtes")]
    TooManyRequests,

    /// Pipeline misconfiguration (CORS headers, unresolved middleware)
    #[error("middleware fault: {0}")]
    Middleware(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// Single-field validation failure
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), message.into());
        AppError::ValidationFailed(errors)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::RouteNotFound { .. } | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            AppError::AuthenticationRequired | AppError::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            AppError::CsrfMissing | AppError::ValidationFailed(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::CsrfInvalid | AppError::AuthorizationDenied => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            AppError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Store(StoreError::Duplicate(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Store(StoreError::Integrity(_)) => StatusCode::CONFLICT,
            AppError::Middleware(_)
            | AppError::Internal(_)
            | AppError::Route(_)
            | AppError::Session(_)
            | AppError::Store(StoreError::Database(_))
            | AppError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Faults that indicate a broken server rather than a bad request
    pub fn is_server_fault(&self) -> bool {
        self.status().is_server_error()
    }

    /// Message safe to show to any client
    pub fn public_message(&self) -> String {
        match self {
            AppError::Middleware(_)
            | AppError::Internal(_)
            | AppError::Route(_)
            | AppError::Session(_)
            | AppError::Store(StoreError::Database(_))
            | AppError::Json(_) => "Erreur interne du serveur".to_string(),
            AppError::Store(StoreError::NotFound(what)) => format!("{what} introuvable"),
            AppError::Store(StoreError::Duplicate(field)) => {
                format!("Valeur déjà utilisée pour {field}")
            }
            AppError::Store(StoreError::Integrity(msg)) => msg.clone(),
            other => other.to_string(),
        }
    }

    fn field_errors(&self) -> Option<Value> {
        match self {
            AppError::ValidationFailed(errors) => Some(json!(errors)),
            AppError::Store(StoreError::Duplicate(field)) => {
                Some(json!({ field.as_str(): "Cette valeur est déjà utilisée" }))
            }
            _ => None,
        }
    }

    /// Render the fault as the JSON envelope.
    ///
    /// Internal details and the rendering stack trace are only exposed when
    /// `debug` is set.
    pub fn to_response(&self, debug: bool) -> Response {
        let mut body = json!({
            "success": false,
            "message": self.public_message(),
        });
        if let Some(errors) = self.field_errors() {
            body["errors"] = errors;
        }
        if debug {
            body["debug"] = json!({
                "error": self.to_string(),
                "detail": format!("{self:?}"),
                "trace": stack_trace(),
            });
        }

        let response = Response::json(self.status(), &body);
        let AppError::MethodNotAllowed { allowed } = self else {
            return response;
        };
        let allow = allowed
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        match HeaderValue::from_str(&allow) {
            Ok(value) => response.with_header(header::ALLOW, value),
            Err(_) => response,
        }
    }
}

/// Current stack, one frame line per entry
fn stack_trace() -> Vec<String> {
    Backtrace::force_capture()
        .to_string()
        .lines()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_taxonomy() {
        assert_eq!(AppError::AuthenticationRequired.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::CsrfMissing.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(AppError::CsrfInvalid.status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::AuthorizationDenied.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::Middleware("cors".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_details_hidden_outside_debug() {
        let err = AppError::Internal("pool exhausted at db.rs:42".into());

        let body: Value = serde_json::from_slice(err.to_response(false).body()).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Erreur interne du serveur");
        assert!(body.get("debug").is_none());

        let body: Value = serde_json::from_slice(err.to_response(true).body()).unwrap();
        assert!(body["debug"]["error"]
            .as_str()
            .unwrap()
            .contains("pool exhausted"));
        assert!(!body["debug"]["trace"].as_array().unwrap().is_empty());
    }

    #[test]
    fn method_not_allowed_sets_allow_header() {
        let err = AppError::MethodNotAllowed {
            allowed: vec![Method::GET, Method::PUT],
        };
        let response = err.to_response(false);
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers().get(header::ALLOW).unwrap(), "GET, PUT");
    }

    #[test]
    fn validation_errors_are_field_keyed() {
        let err = AppError::invalid("email", "Email invalide");
        let body: Value = serde_json::from_slice(err.to_response(false).body()).unwrap();
        assert_eq!(body["errors"]["email"], "Email invalide");
    }
}
