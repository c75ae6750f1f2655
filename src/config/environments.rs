//! Environment list loaded from a sectioned config file
//!
//! Format:
//! ```text
//! [DEFAULT]
//! tls = yes
//!
//! [staging]
//! host = staging-cache.internal
//! port = 6380
//! password = hunter2
//! ```
//!
//! Section names are environment identifiers and keep their file order.
//! Keys are case-insensitive; `key = value` and `key: value` are both
//! accepted and the value is everything after the first delimiter. Lines
//! starting with `#` or `;` are comments. Values in `[DEFAULT]` apply to
//! every section that does not set the key itself.
//!
//! The file is read with `rust-ini`; this module only maps its sections
//! onto environments.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use ini::{Ini, ParseOption, Properties};
use tracing::{debug, warn};

use super::connection_spec::ConnectionFields;
use crate::utils::ConfigError;

const DEFAULT_SECTION: &str = "DEFAULT";

/// A named, preconfigured connection target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub name: String,
    pub fields: BTreeMap<String, String>,
}

impl Environment {
    /// Name as shown in menus and confirmation prompts
    pub fn display_name(&self) -> String {
        self.name.to_uppercase()
    }

    /// `host:port` as written in the file, `N/A` for missing parts
    pub fn address_hint(&self) -> String {
        let host = self.fields.get("host").map(String::as_str).unwrap_or("N/A");
        let port = self.fields.get("port").map(String::as_str).unwrap_or("N/A");
        format!("{}:{}", host, port)
    }

    pub fn connection_fields(&self) -> ConnectionFields {
        ConnectionFields::from_section(&self.fields)
    }
}

/// All environments from one config file, in file order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentSet {
    environments: Vec<Environment>,
}

impl EnvironmentSet {
    /// Load environments from `path`
    ///
    /// A missing file is not an error: the set is empty and only custom
    /// connections are available.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(text) => {
                let set = Self::parse(&text, path)?;
                debug!("Loaded {} environments from {}", set.len(), path.display());
                Ok(set)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(
                    "Config file '{}' not found. Only custom connections will be available.",
                    path.display()
                );
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Parse config text; `path` is only used in error messages
    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let invalid = |message: String| ConfigError::Invalid {
            path: path.to_path_buf(),
            message,
        };

        // Values are taken verbatim: passwords may contain quotes or backslashes
        let options = ParseOption {
            enabled_quote: false,
            enabled_escape: false,
            ..ParseOption::default()
        };
        let ini = Ini::load_from_str_opt(text, options).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let mut defaults: BTreeMap<String, String> = BTreeMap::new();
        let mut environments: Vec<Environment> = Vec::new();

        for (section, properties) in ini.iter() {
            let fields = lowercase_keys(properties);
            match section {
                None => {
                    if let Some(key) = fields.keys().next() {
                        return Err(invalid(format!("key '{}' appears before any [section]", key)));
                    }
                }
                Some(DEFAULT_SECTION) => defaults.extend(fields),
                Some(name) => {
                    if environments.iter().any(|e| e.name == name) {
                        return Err(invalid(format!("duplicate section '{}'", name)));
                    }
                    environments.push(Environment {
                        name: name.to_string(),
                        fields,
                    });
                }
            }
        }

        for env in &mut environments {
            for (key, value) in &defaults {
                env.fields
                    .entry(key.clone())
                    .or_insert_with(|| value.clone());
            }
        }

        Ok(Self { environments })
    }

    pub fn len(&self) -> usize {
        self.environments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.environments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Environment> {
        self.environments.iter()
    }

    /// Environment by zero-based menu position
    pub fn get(&self, index: usize) -> Option<&Environment> {
        self.environments.get(index)
    }
}

fn lowercase_keys(properties: &Properties) -> BTreeMap<String, String> {
    properties
        .iter()
        .map(|(key, value)| (key.to_lowercase(), value.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    const SAMPLE: &str = r#"
# shared settings
[DEFAULT]
tls = yes
port = 6380

[staging]
host = staging-cache.internal
password: p@ss=word

; local development
[local]
host = 127.0.0.1
port = 6379
TLS = no
"#;

    fn parse(text: &str) -> Result<EnvironmentSet, ConfigError> {
        EnvironmentSet::parse(text, &PathBuf::from("test.ini"))
    }

    #[test]
    fn test_sections_in_file_order() {
        let set = parse(SAMPLE).unwrap();
        let names: Vec<_> = set.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["staging", "local"]);
        assert_eq!(set.get(0).unwrap().display_name(), "STAGING");
    }

    #[test]
    fn test_defaults_and_overrides() {
        let set = parse(SAMPLE).unwrap();
        let staging = set.get(0).unwrap();
        assert_eq!(staging.fields["port"], "6380");
        assert_eq!(staging.fields["tls"], "yes");
        // value is everything after the first delimiter
        assert_eq!(staging.fields["password"], "p@ss=word");

        let local = set.get(1).unwrap();
        assert_eq!(local.fields["port"], "6379");
        assert_eq!(local.fields["tls"], "no");
        assert_eq!(local.address_hint(), "127.0.0.1:6379");
    }

    #[test]
    fn test_address_hint_missing_fields() {
        let set = parse("[bare]\ndb = 1\n").unwrap();
        assert_eq!(set.get(0).unwrap().address_hint(), "N/A:N/A");
    }

    #[test]
    fn test_connection_fields_from_environment() {
        let set = parse(SAMPLE).unwrap();
        let fields = set.get(1).unwrap().connection_fields();
        assert_eq!(fields.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(fields.tls.as_deref(), Some("no"));
    }

    #[test]
    fn test_key_outside_section_is_rejected() {
        match parse("host = x\n[a]\nport = 1\n") {
            Err(ConfigError::Invalid { message, .. }) => assert!(message.contains("before any")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_unterminated_section_is_a_parse_error() {
        assert!(matches!(parse("[broken\n"), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_values_are_kept_verbatim() {
        let set = parse("[quoted]\npassword = \"a\\b\"\n").unwrap();
        assert_eq!(set.get(0).unwrap().fields["password"], "\"a\\b\"");
    }

    #[test]
    fn test_missing_file_yields_empty_set() {
        let dir = tempfile::tempdir().unwrap();
        let set = EnvironmentSet::load(&dir.path().join("nope.ini")).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let set = EnvironmentSet::load(file.path()).unwrap();
        assert_eq!(set.len(), 2);
    }
}
