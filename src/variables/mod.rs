//! VariableEngine: resolves `${source.path}` tokens in strings and nested
//! structures (spec.md §4.3, §8, §9 "Polymorphic provider registry").
//!
//! The source uses a fixed registry mapping source name to provider
//! capability rather than any kind of dynamic class creation, per the
//! design note in spec.md §9.

mod providers;

pub use providers::{
    EnvProvider, InputProvider, MetadataProvider, PaginationProvider, VariablesProvider,
};

use indexmap::IndexMap;
use serde_json::Value as Json;
use std::collections::HashSet;
use thiserror::Error;

pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VariableError {
    #[error("variable not found: {0}")]
    NotFound(String),

    #[error("circular reference: {0}")]
    CircularReference(String),

    #[error("variable resolution error: {0}")]
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubstitutionMode {
    /// Unresolved tokens fail resolution outright.
    Strict,
    /// Unresolved tokens are left textually intact.
    Lenient,
}

/// The capability every provider exposes: `get`, `list`, `source_name`
/// (spec.md §9).
pub trait Provider: Send + Sync {
    fn source_name(&self) -> &'static str;
    fn get(&self, path: &str) -> Option<Json>;
    fn list(&self) -> Vec<String>;
}

/// Fixed registry: source name -> provider. No runtime class creation.
pub struct ProviderRegistry {
    providers: IndexMap<&'static str, Box<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: IndexMap::new(),
        }
    }

    pub fn register(mut self, provider: Box<dyn Provider>) -> Self {
        self.providers.insert(provider.source_name(), provider);
        self
    }

    pub fn get(&self, source: &str, path: &str) -> Option<Json> {
        self.providers.get(source).and_then(|p| p.get(path))
    }

    /// Builds the standard registry described in spec.md §4.3's provider
    /// table.
    pub fn standard(
        variables: Json,
        env_overrides: IndexMap<String, String>,
        env_fallback_to_process: bool,
        input: Option<Json>,
        pagination_overrides: IndexMap<String, Json>,
        metadata: IndexMap<String, Json>,
    ) -> Self {
        Self::new()
            .register(Box::new(VariablesProvider::new(variables)))
            .register(Box::new(EnvProvider::new(
                env_overrides,
                env_fallback_to_process,
            )))
            .register(Box::new(InputProvider::new(input)))
            .register(Box::new(PaginationProvider::new(pagination_overrides)))
            .register(Box::new(MetadataProvider::new(metadata)))
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Matches `${source.path}` (captured as `source.path`) and the escaped
/// form `\${...}`, which the escape-aware scanner below treats specially.
fn find_token(s: &str, from: usize) -> Option<(usize, usize, bool)> {
    let bytes = s.as_bytes();
    let mut i = from;
    while i < bytes.len() {
        if bytes[i] == b'$' && i + 1 < bytes.len() && bytes[i + 1] == b'{' {
            let escaped = i > 0 && bytes[i - 1] == b'\\';
            if let Some(end_rel) = s[i + 2..].find('}') {
                let end = i + 2 + end_rel;
                return Some((i, end, escaped));
            }
            return None;
        }
        i += 1;
    }
    None
}

fn split_source_path(token_body: &str) -> (&str, &str) {
    match token_body.split_once('.') {
        Some((src, path)) => (src, path),
        None => (token_body, ""),
    }
}

pub struct VariableEngine<'a> {
    registry: &'a ProviderRegistry,
    mode: SubstitutionMode,
    max_depth: usize,
}

impl<'a> VariableEngine<'a> {
    pub fn new(registry: &'a ProviderRegistry, mode: SubstitutionMode) -> Self {
        Self {
            registry,
            mode,
            max_depth: DEFAULT_MAX_RECURSION_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Substitutes every token in `s`. Idempotent on already-resolved
    /// strings: a second pass over the output (modulo one-pass escape
    /// unescaping) returns the same string (spec.md §8).
    pub fn substitute(&self, s: &str) -> Result<String, VariableError> {
        let mut visited = HashSet::new();
        self.substitute_inner(s, &mut visited, 0)
    }

    fn substitute_inner(
        &self,
        s: &str,
        visited: &mut HashSet<String>,
        depth: usize,
    ) -> Result<String, VariableError> {
        if depth > self.max_depth {
            return Err(VariableError::Other(format!(
                "max recursion depth ({}) exceeded",
                self.max_depth
            )));
        }

        let mut out = String::with_capacity(s.len());
        let mut cursor = 0usize;

        loop {
            match find_token(s, cursor) {
                None => {
                    out.push_str(&s[cursor..]);
                    break;
                }
                Some((start, end, escaped)) => {
                    out.push_str(&s[cursor..start]);

                    if escaped {
                        // Drop the backslash, keep the literal token text —
                        // unescaped exactly once.
                        out.pop();
                        out.push_str(&s[start..=end]);
                        cursor = end + 1;
                        continue;
                    }

                    let token_body = &s[start + 2..end];
                    let (source, path) = split_source_path(token_body);
                    let full_token = &s[start..=end];

                    if visited.contains(token_body) {
                        let chain: Vec<&str> = visited.iter().map(|s| s.as_str()).collect();
                        return Err(VariableError::CircularReference(format!(
                            "{} (chain: {})",
                            token_body,
                            chain.join(" -> ")
                        )));
                    }

                    match self.registry.get(source, path) {
                        Some(Json::String(resolved)) => {
                            visited.insert(token_body.to_string());
                            let recursed =
                                self.substitute_inner(&resolved, visited, depth + 1)?;
                            visited.remove(token_body);
                            out.push_str(&recursed);
                        }
                        Some(other) => {
                            out.push_str(&json_to_display_string(&other));
                        }
                        None => match self.mode {
                            SubstitutionMode::Strict => {
                                return Err(VariableError::NotFound(token_body.to_string()));
                            }
                            SubstitutionMode::Lenient => {
                                out.push_str(full_token);
                            }
                        },
                    }

                    cursor = end + 1;
                }
            }
        }

        Ok(out)
    }

    /// Recursively walks a nested map/list, substituting every string leaf
    /// (spec.md §4.3 "Dictionary/list substitution").
    pub fn substitute_value(&self, value: &Json) -> Result<Json, VariableError> {
        match value {
            Json::String(s) => Ok(Json::String(self.substitute(s)?)),
            Json::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.substitute_value(item)?);
                }
                Ok(Json::Array(out))
            }
            Json::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), self.substitute_value(v)?);
                }
                Ok(Json::Object(out))
            }
            other => Ok(other.clone()),
        }
    }

    /// Substitute, then best-effort coerce the result back to a richer
    /// type (spec.md §4.3 "Type coercion (optional)"). Parse failures fall
    /// back to the string.
    pub fn substitute_and_coerce(&self, s: &str) -> Result<Json, VariableError> {
        let resolved = self.substitute(s)?;
        Ok(coerce_scalar(&resolved))
    }
}

fn json_to_display_string(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        Json::Null => String::new(),
        other => other.to_string(),
    }
}

/// Best-effort scalar coercion: booleans, integers, floats, JSON
/// object/array. Falls back to the original string on any parse failure.
pub fn coerce_scalar(s: &str) -> Json {
    let trimmed = s.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" => return Json::Bool(true),
        "false" | "no" | "off" => return Json::Bool(false),
        _ => {}
    }

    if let Ok(i) = trimmed.parse::<i64>() {
        return Json::Number(i.into());
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Json::Number(n);
        }
    }
    if (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'))
    {
        if let Ok(v) = serde_json::from_str::<Json>(trimmed) {
            return v;
        }
    }

    Json::String(s.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetType {
    Bool,
    Int,
    Float,
    Str,
    List,
    Dict,
}

/// Explicit typed access (spec.md §4.3 `convert_type`).
pub fn convert_type(value: &Json, target: TargetType) -> Result<Json, VariableError> {
    match target {
        TargetType::Str => Ok(Json::String(json_to_display_string(value))),
        TargetType::Bool => match value {
            Json::Bool(b) => Ok(Json::Bool(*b)),
            Json::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(Json::Bool(true)),
                "false" | "no" | "off" | "0" => Ok(Json::Bool(false)),
                other => Err(VariableError::Other(format!("cannot coerce '{other}' to bool"))),
            },
            Json::Number(n) => Ok(Json::Bool(n.as_f64().unwrap_or(0.0) != 0.0)),
            other => Err(VariableError::Other(format!("cannot coerce {other} to bool"))),
        },
        TargetType::Int => match value {
            Json::Number(n) if n.is_i64() => Ok(value.clone()),
            Json::Number(n) => Ok(Json::Number(((n.as_f64().unwrap_or(0.0)) as i64).into())),
            Json::String(s) => s
                .trim()
                .parse::<i64>()
                .map(|i| Json::Number(i.into()))
                .map_err(|e| VariableError::Other(format!("cannot coerce '{s}' to int: {e}"))),
            Json::Bool(b) => Ok(Json::Number((*b as i64).into())),
            other => Err(VariableError::Other(format!("cannot coerce {other} to int"))),
        },
        TargetType::Float => match value {
            Json::Number(n) => Ok(Json::Number(
                serde_json::Number::from_f64(n.as_f64().unwrap_or(0.0))
                    .ok_or_else(|| VariableError::Other("not a finite float".into()))?,
            )),
            Json::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Json::Number)
                .ok_or_else(|| VariableError::Other(format!("cannot coerce '{s}' to float"))),
            other => Err(VariableError::Other(format!("cannot coerce {other} to float"))),
        },
        TargetType::List => match value {
            Json::Array(_) => Ok(value.clone()),
            Json::String(s) => Ok(Json::Array(
                s.split(',').map(|p| Json::String(p.trim().to_string())).collect(),
            )),
            other => Err(VariableError::Other(format!("cannot coerce {other} to list"))),
        },
        TargetType::Dict => match value {
            Json::Object(_) => Ok(value.clone()),
            Json::String(s) => serde_json::from_str::<Json>(s)
                .map_err(|e| VariableError::Other(format!("cannot coerce '{s}' to dict: {e}"))),
            other => Err(VariableError::Other(format!("cannot coerce {other} to dict"))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry_with(vars: Json) -> ProviderRegistry {
        ProviderRegistry::standard(
            vars,
            IndexMap::new(),
            false,
            None,
            IndexMap::new(),
            IndexMap::new(),
        )
    }

    #[test]
    fn resolves_simple_token() {
        let reg = registry_with(json!({"name": "acme"}));
        let engine = VariableEngine::new(&reg, SubstitutionMode::Strict);
        assert_eq!(engine.substitute("hello ${variables.name}").unwrap(), "hello acme");
    }

    #[test]
    fn escape_is_unescaped_once() {
        let reg = registry_with(json!({}));
        let engine = VariableEngine::new(&reg, SubstitutionMode::Lenient);
        assert_eq!(engine.substitute(r"\${variables.name}").unwrap(), "${variables.name}");
    }

    #[test]
    fn lenient_leaves_unresolved_tokens_intact() {
        let reg = registry_with(json!({}));
        let engine = VariableEngine::new(&reg, SubstitutionMode::Lenient);
        assert_eq!(
            engine.substitute("x=${variables.missing}").unwrap(),
            "x=${variables.missing}"
        );
    }

    #[test]
    fn strict_fails_on_unresolved_tokens() {
        let reg = registry_with(json!({}));
        let engine = VariableEngine::new(&reg, SubstitutionMode::Strict);
        assert_eq!(
            engine.substitute("x=${variables.missing}"),
            Err(VariableError::NotFound("variables.missing".to_string()))
        );
    }

    #[test]
    fn cycle_is_detected() {
        let reg = registry_with(json!({"a": "${variables.b}", "b": "${variables.a}"}));
        let engine = VariableEngine::new(&reg, SubstitutionMode::Strict);
        let err = engine.substitute("${variables.a}").unwrap_err();
        assert!(matches!(err, VariableError::CircularReference(_)));
    }

    #[test]
    fn idempotent_on_already_resolved_strings() {
        let reg = registry_with(json!({"name": "acme"}));
        let engine = VariableEngine::new(&reg, SubstitutionMode::Strict);
        let once = engine.substitute("${variables.name}").unwrap();
        let twice = engine.substitute(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn coercion_best_effort_falls_back_to_string() {
        assert_eq!(coerce_scalar("42"), json!(42));
        assert_eq!(coerce_scalar("3.5"), json!(3.5));
        assert_eq!(coerce_scalar("true"), json!(true));
        assert_eq!(coerce_scalar("not-a-number"), json!("not-a-number"));
    }

    #[test]
    fn convert_type_list_comma_splits() {
        let v = convert_type(&json!("a, b,c"), TargetType::List).unwrap();
        assert_eq!(v, json!(["a", "b", "c"]));
    }
}
