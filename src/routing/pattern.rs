//! Path pattern compilation.
//!
//! `/users/:id/notes` compiles to `^/users/(?P<id>[^/]+)/notes$`. Static
//! segments are escaped; each parameter takes a whole segment unless its
//! constraint says otherwise.

use regex::Regex;

use super::{RouteError, RouteParams};

/// Regex used for parameters without an explicit constraint
pub(crate) const DEFAULT_SEGMENT: &str = "[^/]+";

#[derive(Debug, Clone)]
enum Segment {
    Static(String),
    Param(String),
}

impl Segment {
    fn param_name(&self) -> Option<&str> {
        match self {
            Segment::Param(name) => Some(name),
            Segment::Static(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RoutePattern {
    source: String,
    segments: Vec<Segment>,
    regex: Regex,
    /// Declared parameters with an anchored check of their constraint
    params: Vec<(String, Regex)>,
}

impl RoutePattern {
    /// Compile `source` with per-parameter regex overrides
    pub(crate) fn compile(
        source: &str,
        constraints: &[(String, String)],
    ) -> Result<Self, RouteError> {
        let segments = parse(source)?;
        let source = render(&segments);

        for (param, _) in constraints {
            if !segments.iter().any(|s| s.param_name() == Some(param)) {
                return Err(RouteError::UnknownParameter {
                    pattern: source,
                    param: param.clone(),
                });
            }
        }

        let mut expr = String::from("^");
        let mut params = Vec::new();
        for segment in &segments {
            expr.push('/');
            match segment {
                Segment::Static(text) => expr.push_str(&regex::escape(text)),
                Segment::Param(name) => {
                    let constraint = constraints
                        .iter()
                        .rev()
                        .find(|(param, _)| param == name)
                        .map_or(DEFAULT_SEGMENT, |(_, re)| re.as_str());
                    expr.push_str(&format!("(?P<{name}>{constraint})"));
                    let check = Regex::new(&format!("^(?:{constraint})$"))
                        .map_err(|e| invalid(&source, e.to_string()))?;
                    params.push((name.clone(), check));
                }
            }
        }
        if segments.is_empty() {
            expr.push('/');
        }
        expr.push('$');

        let regex = Regex::new(&expr).map_err(|e| invalid(&source, e.to_string()))?;
        Ok(Self {
            source,
            segments,
            regex,
            params,
        })
    }

    /// Normalized pattern text
    pub(crate) fn source(&self) -> &str {
        &self.source
    }

    pub(crate) fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Parameters captured from `path`, or `None` if it does not match
    pub(crate) fn captures(&self, path: &str) -> Option<RouteParams> {
        let caps = self.regex.captures(path)?;
        let mut params = RouteParams::default();
        for (name, _) in &self.params {
            if let Some(value) = caps.name(name) {
                params.push(name, value.as_str());
            }
        }
        Some(params)
    }

    /// Build a concrete path from parameter values
    pub(crate) fn expand(&self, values: &[(&str, &str)]) -> Result<String, String> {
        let mut path = String::new();
        for segment in &self.segments {
            path.push('/');
            match segment {
                Segment::Static(text) => path.push_str(text),
                Segment::Param(name) => {
                    let value = values
                        .iter()
                        .find(|(key, _)| key == name)
                        .map(|(_, value)| *value)
                        .ok_or_else(|| format!("missing parameter '{name}'"))?;
                    let satisfied = self
                        .params
                        .iter()
                        .find(|(param, _)| param == name)
                        .is_some_and(|(_, check)| check.is_match(value));
                    if !satisfied {
                        return Err(format!("value for '{name}' violates its constraint"));
                    }
                    path.push_str(value);
                }
            }
        }
        if path.is_empty() {
            path.push('/');
        }
        Ok(path)
    }
}

fn parse(source: &str) -> Result<Vec<Segment>, RouteError> {
    if !source.starts_with('/') {
        return Err(invalid(source, "must start with '/'"));
    }

    let mut segments: Vec<Segment> = Vec::new();
    for part in source.split('/').filter(|p| !p.is_empty()) {
        match part.strip_prefix(':') {
            Some(name) => {
                if !is_identifier(name) {
                    return Err(invalid(source, format!("bad parameter name ':{name}'")));
                }
                if segments.iter().any(|s| s.param_name() == Some(name)) {
                    return Err(invalid(source, format!("parameter ':{name}' declared twice")));
                }
                segments.push(Segment::Param(name.to_string()));
            }
            None => segments.push(Segment::Static(part.to_string())),
        }
    }
    Ok(segments)
}

fn render(segments: &[Segment]) -> String {
    if segments.is_empty() {
        return "/".to_string();
    }
    segments
        .iter()
        .map(|segment| match segment {
            Segment::Static(text) => format!("/{text}"),
            Segment::Param(name) => format!("/:{name}"),
        })
        .collect()
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn invalid(pattern: &str, reason: impl Into<String>) -> RouteError {
    RouteError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(source: &str) -> RoutePattern {
        RoutePattern::compile(source, &[]).unwrap()
    }

    #[test]
    fn extracts_named_params_in_order() {
        let pattern = compile("/evaluations/:eval/notes/:student");
        let params = pattern.captures("/evaluations/12/notes/7").unwrap();
        assert_eq!(params.get("eval"), Some("12"));
        assert_eq!(params.at(1), Some("7"));
        assert!(pattern.captures("/evaluations/12/notes").is_none());
    }

    #[test]
    fn params_do_not_span_segments() {
        let pattern = compile("/users/:id");
        assert!(pattern.is_match("/users/42"));
        assert!(!pattern.is_match("/users/42/edit"));
    }

    #[test]
    fn static_segments_are_escaped() {
        let pattern = compile("/files/a.b");
        assert!(pattern.is_match("/files/a.b"));
        assert!(!pattern.is_match("/files/axb"));
    }

    #[test]
    fn constraint_narrows_one_param() {
        let pattern =
            RoutePattern::compile("/users/:id", &[("id".into(), r"\d+".into())]).unwrap();
        assert!(pattern.is_match("/users/42"));
        assert!(!pattern.is_match("/users/abc"));
    }

    #[test]
    fn constraint_on_unknown_param_is_rejected() {
        let err = RoutePattern::compile("/users/:id", &[("slug".into(), ".+".into())]).unwrap_err();
        assert!(matches!(err, RouteError::UnknownParameter { param, .. } if param == "slug"));
    }

    #[test]
    fn invalid_constraint_regex_is_rejected() {
        let err = RoutePattern::compile("/users/:id", &[("id".into(), "(".into())]).unwrap_err();
        assert!(matches!(err, RouteError::InvalidPattern { .. }));
    }

    #[test]
    fn malformed_patterns_are_rejected() {
        assert!(RoutePattern::compile("users", &[]).is_err());
        assert!(RoutePattern::compile("/users/:", &[]).is_err());
        assert!(RoutePattern::compile("/a/:x/b/:x", &[]).is_err());
    }

    #[test]
    fn source_is_normalized() {
        assert_eq!(compile("/users/").source(), "/users");
        assert_eq!(compile("/").source(), "/");
        assert!(compile("/").is_match("/"));
    }

    #[test]
    fn expand_checks_constraints() {
        let pattern =
            RoutePattern::compile("/users/:id", &[("id".into(), r"\d+".into())]).unwrap();
        assert_eq!(pattern.expand(&[("id", "5")]).unwrap(), "/users/5");
        assert!(pattern.expand(&[("id", "x")]).is_err());
        assert!(pattern.expand(&[]).is_err());
    }
}
