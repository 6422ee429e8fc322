// Connection Parameters
// libpq-style key/value connection descriptors

use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;
use std::fmt;

/// Connection parameters as a key/value map (`host`, `port`, `dbname`,
/// `user`, `password`, ...), rendered to a libpq-style connection string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dsn(pub BTreeMap<String, String>);

impl Dsn {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|v| v.as_str())
    }

    /// Render as a connection string consumable by the driver.
    pub fn connection_string(&self) -> String {
        self.0
            .iter()
            .map(|(key, value)| format!("{}='{}'", key, value.replace('\'', "\\'")))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Dsn {
    /// Masked rendering safe for logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(key, value)| {
                let shown = if key == "password" { "*****" } else { value };
                format!("{}=\"{}\"", key, shown.replace('"', "\"\""))
            })
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dsn(entries: &[(&str, &str)]) -> Dsn {
        Dsn(entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect())
    }

    #[test]
    fn connection_string_quotes_values() {
        let d = dsn(&[("host", "db1"), ("dbname", "it's")]);
        assert_eq!(d.connection_string(), "dbname='it\\'s' host='db1'");
    }

    #[test]
    fn display_masks_the_password() {
        let d = dsn(&[("user", "quartz"), ("password", "hunter2")]);
        let shown = d.to_string();
        assert!(shown.contains("password=\"*****\""));
        assert!(!shown.contains("hunter2"));
    }
}
