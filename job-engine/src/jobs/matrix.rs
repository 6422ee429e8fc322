// Matrix Expansion
// Expands argument matrices into concrete instance bindings

use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;

/// Prefix for environment entries handed to shell actions
/// (`JF_INSTANCE_<UPPERCASED_ARG>=<value>`).
pub const INSTANCE_ENV_PREFIX: &str = "JF_INSTANCE";

/// Named argument matrix: argument name -> candidate values.
///
/// The cartesian product of the value lists defines the instances of a step.
/// Keys are kept sorted so expansion and query binding are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatrixArgs(pub BTreeMap<String, Vec<String>>);

impl MatrixArgs {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of instances the matrix expands to.
    ///
    /// The empty matrix counts as one instance (the empty binding). An empty
    /// value list makes the whole product zero; configuration validation
    /// rejects that before a run starts.
    pub fn instance_count(&self) -> usize {
        self.0.values().map(|values| values.len()).product()
    }

    /// Expand into every combination of argument values.
    pub fn instances(&self) -> Vec<InstanceArgs> {
        let mut expanded = vec![InstanceArgs::default()];
        for (name, values) in &self.0 {
            let mut next = Vec::with_capacity(expanded.len() * values.len());
            for value in values {
                for bound in &expanded {
                    let mut bound = bound.clone();
                    bound.0.insert(name.clone(), value.clone());
                    next.push(bound);
                }
            }
            expanded = next;
        }
        expanded
    }
}

/// One concrete argument binding produced by matrix expansion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceArgs(pub BTreeMap<String, String>);

impl InstanceArgs {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Stable rendering used as the instance key, e.g. `{ 'x': '1', 'y': 'a' }`.
    /// The empty binding renders as `None`.
    pub fn key(&self) -> String {
        if self.0.is_empty() {
            return "None".to_string();
        }
        let pairs: Vec<String> = self
            .0
            .iter()
            .map(|(name, value)| {
                format!(
                    "'{}': '{}'",
                    name.replace('\'', "''"),
                    value.replace('\'', "''")
                )
            })
            .collect();
        format!("{{ {} }}", pairs.join(", "))
    }

    /// Environment entries for shell actions.
    pub fn as_env(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .map(|(name, value)| {
                (
                    format!("{}_{}", INSTANCE_ENV_PREFIX, name.to_uppercase()),
                    value.clone(),
                )
            })
            .collect()
    }

    /// Bind a statement body to this instance.
    ///
    /// `${name}` tokens are substituted literally; `:name` tokens become the
    /// driver's positional placeholders (`$1`, `$2`, ...) with the matching
    /// ordered argument list. Longer names are handled first so `:a` never
    /// corrupts `:ab`.
    pub fn bind_query(&self, body: &str) -> (String, Vec<String>) {
        let mut names: Vec<&String> = self.0.keys().collect();
        names.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        let mut query = body.to_string();
        let mut params = Vec::new();
        for name in names {
            let value = &self.0[name];
            query = query.replace(&format!("${{{}}}", name), value);
            let token = format!(":{}", name);
            if query.contains(&token) {
                params.push(value.clone());
                query = query.replace(&token, &format!("${}", params.len()));
            }
        }
        (query, params)
    }
}
