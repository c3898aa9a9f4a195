//! Registration-time errors.
//!
//! Everything in this module is raised while routes are being registered or
//! reversed. Failing to match a path is never an error; it is reported as
//! `None` by the matching functions.

use thiserror::Error;

use crate::route::Protocol;

/// Result type for route configuration.
pub type RouteResult<T> = Result<T, RouteConfigError>;

/// A route could not be registered or reversed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteConfigError {
    /// The template does not start with `/`.
    #[error("route template must start with '/': {template:?}")]
    MissingLeadingSlash {
        /// The offending template.
        template: String,
    },

    /// The template could not be tokenized.
    #[error("malformed route template {template:?}: {reason}")]
    MalformedTemplate {
        /// The offending template.
        template: String,
        /// What went wrong.
        reason: String,
    },

    /// A placeholder names a converter that does not exist.
    #[error("unknown converter {converter:?} for parameter {name:?} in {template:?}")]
    UnknownConverter {
        /// The offending template.
        template: String,
        /// The parameter name.
        name: String,
        /// The converter tag that was not recognised.
        converter: String,
    },

    /// The same parameter name is used twice in one template.
    #[error("parameter {name:?} appears more than once in {template:?}")]
    DuplicateParameter {
        /// The offending template.
        template: String,
        /// The repeated name.
        name: String,
    },

    /// A route with the same template and protocol already exists.
    #[error("route {template:?} is already registered for {protocol}")]
    DuplicateRoute {
        /// The template.
        template: String,
        /// The protocol of both routes.
        protocol: Protocol,
    },

    /// A reverse lookup used a name that is not an identifier.
    #[error("{name:?} is not a valid parameter name")]
    InvalidParameterName {
        /// The rejected name.
        name: String,
    },

    /// A reverse lookup did not supply a parameter the template needs.
    #[error("missing parameter {name:?} for route {template:?}")]
    MissingParameter {
        /// The template being reversed.
        template: String,
        /// The missing parameter.
        name: String,
    },

    /// A reverse lookup supplied a value its converter cannot match.
    #[error("value {value:?} is not valid for parameter {name:?} of route {template:?}")]
    InvalidParameterValue {
        /// The template being reversed.
        template: String,
        /// The parameter name.
        name: String,
        /// The rendered value.
        value: String,
    },

    /// No route is registered under the given endpoint name.
    #[error("no route registered for endpoint {name:?}")]
    UnknownEndpoint {
        /// The endpoint name that was looked up.
        name: String,
    },

    /// The combination of registration options is not valid for the endpoint.
    #[error("invalid options for route {template:?}: {reason}")]
    InvalidOptions {
        /// The template being registered.
        template: String,
        /// Why the options were rejected.
        reason: String,
    },
}

impl RouteConfigError {
    /// Creates a malformed template error.
    pub fn malformed(template: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedTemplate {
            template: template.into(),
            reason: reason.into(),
        }
    }

    /// Creates an unknown endpoint error.
    pub fn unknown_endpoint(name: impl Into<String>) -> Self {
        Self::UnknownEndpoint { name: name.into() }
    }

    /// Creates an invalid options error.
    pub fn invalid_options(template: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOptions {
            template: template.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RouteConfigError::UnknownConverter {
            template: "/{x:bogus}".to_string(),
            name: "x".to_string(),
            converter: "bogus".to_string(),
        };
        assert_eq!(
            err.to_string(),
            r#"unknown converter "bogus" for parameter "x" in "/{x:bogus}""#
        );

        let err = RouteConfigError::DuplicateRoute {
            template: "/a".to_string(),
            protocol: Protocol::WebSocket,
        };
        assert!(err.to_string().ends_with("for ws"));
    }

    #[test]
    fn test_constructors() {
        assert!(matches!(
            RouteConfigError::malformed("/{", "unterminated"),
            RouteConfigError::MalformedTemplate { .. }
        ));
        assert_eq!(
            RouteConfigError::unknown_endpoint("home").to_string(),
            r#"no route registered for endpoint "home""#
        );
    }
}
