//! Concrete providers for the VariableEngine's fixed registry (spec.md
//! §4.3's provider table).

use super::Provider;
use indexmap::IndexMap;
use serde_json::Value as Json;

fn navigate<'a>(root: &'a Json, path: &str) -> Option<&'a Json> {
    if path.is_empty() {
        return Some(root);
    }
    let mut current = root;
    for key in path.split('.') {
        match current {
            Json::Object(map) => current = map.get(key)?,
            Json::Array(items) => {
                let idx: usize = key.parse().ok()?;
                current = items.get(idx)?;
            }
            _ => return None,
        }
    }
    Some(current)
}

fn list_paths(value: &Json, prefix: &str, out: &mut Vec<String>) {
    match value {
        Json::Object(map) => {
            for (k, v) in map {
                let path = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                list_paths(v, &path, out);
            }
        }
        _ => out.push(prefix.to_string()),
    }
}

/// `variables` — submission or resolved job variables; no fallback.
pub struct VariablesProvider {
    root: Json,
}

impl VariablesProvider {
    pub fn new(root: Json) -> Self {
        Self { root }
    }
}

impl Provider for VariablesProvider {
    fn source_name(&self) -> &'static str {
        "variables"
    }

    fn get(&self, path: &str) -> Option<Json> {
        navigate(&self.root, path).cloned()
    }

    fn list(&self) -> Vec<String> {
        let mut out = Vec::new();
        list_paths(&self.root, "", &mut out);
        out
    }
}

/// `ENV` — configured environment map, optionally falling back to the
/// process environment.
pub struct EnvProvider {
    overrides: IndexMap<String, String>,
    fallback_to_process: bool,
}

impl EnvProvider {
    pub fn new(overrides: IndexMap<String, String>, fallback_to_process: bool) -> Self {
        Self {
            overrides,
            fallback_to_process,
        }
    }
}

impl Provider for EnvProvider {
    fn source_name(&self) -> &'static str {
        "ENV"
    }

    fn get(&self, path: &str) -> Option<Json> {
        if let Some(v) = self.overrides.get(path) {
            return Some(Json::String(v.clone()));
        }
        if self.fallback_to_process {
            if let Ok(v) = std::env::var(path) {
                return Some(Json::String(v));
            }
        }
        None
    }

    fn list(&self) -> Vec<String> {
        self.overrides.keys().cloned().collect()
    }
}

/// `input` — output of the previous step of a multi-step flow; no
/// fallback.
pub struct InputProvider {
    value: Option<Json>,
}

impl InputProvider {
    pub fn new(value: Option<Json>) -> Self {
        Self { value }
    }
}

impl Provider for InputProvider {
    fn source_name(&self) -> &'static str {
        "input"
    }

    fn get(&self, path: &str) -> Option<Json> {
        self.value.as_ref().and_then(|v| navigate(v, path)).cloned()
    }

    fn list(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(v) = &self.value {
            list_paths(v, "", &mut out);
        }
        out
    }
}

/// `pagination` — counters with built-ins, caller-overridable.
pub struct PaginationProvider {
    values: IndexMap<String, Json>,
}

impl PaginationProvider {
    pub fn new(overrides: IndexMap<String, Json>) -> Self {
        let mut values = IndexMap::new();
        values.insert("current_page".to_string(), Json::from(1));
        values.insert("page_size".to_string(), Json::from(10));
        values.insert("total_pages".to_string(), Json::from(0));
        values.insert("total_items".to_string(), Json::from(0));
        values.insert("offset".to_string(), Json::from(0));
        for (k, v) in overrides {
            values.insert(k, v);
        }
        Self { values }
    }
}

impl Provider for PaginationProvider {
    fn source_name(&self) -> &'static str {
        "pagination"
    }

    fn get(&self, path: &str) -> Option<Json> {
        self.values.get(path).cloned()
    }

    fn list(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }
}

/// `metadata` — per-job meta (`job_id`, `website_id`, ...); no fallback.
pub struct MetadataProvider {
    values: IndexMap<String, Json>,
}

impl MetadataProvider {
    pub fn new(values: IndexMap<String, Json>) -> Self {
        Self { values }
    }
}

impl Provider for MetadataProvider {
    fn source_name(&self) -> &'static str {
        "metadata"
    }

    fn get(&self, path: &str) -> Option<Json> {
        self.values.get(path).cloned()
    }

    fn list(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }
}
