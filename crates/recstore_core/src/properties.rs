//! Text properties files.
//!
//! A properties file holds one `name = value` pair per line. Names and
//! values are trimmed when read, so surrounding whitespace never survives
//! a round trip. Files are replaced atomically: the new contents go to a
//! temporary sibling which is then renamed over the original.

use crate::error::{CoreError, CoreResult};
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// An ordered set of named string properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: BTreeMap<String, String>,
}

impl Properties {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    /// Returns true if `name` is set.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Sets `name` to `value`, both trimmed.
    ///
    /// # Errors
    ///
    /// Returns a parameter error if the name is empty or contains `=`, or
    /// if either part contains a line break.
    pub fn set(&mut self, name: &str, value: impl AsRef<str>) -> CoreResult<()> {
        let name = name.trim();
        let value = value.as_ref().trim();
        if name.is_empty() || name.contains('=') || name.contains(['\n', '\r']) {
            return Err(CoreError::parameter(format!(
                "invalid property name: {name:?}"
            )));
        }
        if value.contains(['\n', '\r']) {
            return Err(CoreError::parameter(format!(
                "value of property {name} spans lines"
            )));
        }
        self.entries.insert(name.to_owned(), value.to_owned());
        Ok(())
    }

    /// Removes `name`, returning its old value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.entries.remove(name)
    }

    /// Iterates over all properties in name order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.entries.iter()
    }

    /// Returns the number of properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no property is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parses properties from text.
    ///
    /// Blank lines are skipped.
    ///
    /// # Errors
    ///
    /// Returns a strategy error for a line without `=` or with an empty name.
    pub fn parse(text: &str) -> CoreResult<Self> {
        let mut props = Self::new();
        for (number, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let Some((name, value)) = line.split_once('=') else {
                return Err(CoreError::strategy(format!(
                    "properties line {} has no '='",
                    number + 1
                )));
            };
            let name = name.trim();
            if name.is_empty() {
                return Err(CoreError::strategy(format!(
                    "properties line {} has no name",
                    number + 1
                )));
            }
            props
                .entries
                .insert(name.to_owned(), value.trim().to_owned());
        }
        Ok(props)
    }

    /// Renders the properties as text.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut text = String::new();
        for (name, value) in &self.entries {
            text.push_str(name);
            text.push_str(" = ");
            text.push_str(value);
            text.push('\n');
        }
        text
    }

    /// Reads a properties file.
    ///
    /// # Errors
    ///
    /// Returns a strategy error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            CoreError::strategy(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&text)
    }

    /// Atomically replaces the file at `path` with these properties.
    ///
    /// With `durable` set, the new file and its directory are fsynced
    /// before returning.
    ///
    /// # Errors
    ///
    /// Returns a strategy error if the file cannot be written or renamed.
    pub fn save(&self, path: &Path, durable: bool) -> CoreResult<()> {
        let mut temp_name = path.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp_path = Path::new(&temp_name);

        let mut file = File::create(temp_path)?;
        file.write_all(self.to_text().as_bytes())?;
        if durable {
            file.sync_all()?;
        }
        drop(file);

        fs::rename(temp_path, path)?;

        if durable {
            if let Some(parent) = path.parent() {
                sync_directory(parent)?;
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Properties {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Fsyncs a directory so renames inside it are durable.
#[cfg(unix)]
pub(crate) fn sync_directory(path: &Path) -> CoreResult<()> {
    File::open(path)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn sync_directory(_path: &Path) -> CoreResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_trims_names_and_values() {
        let props = Properties::parse("Description =  my store \n\nCount=3\nType = Archive").unwrap();
        assert_eq!(props.get("Description"), Some("my store"));
        assert_eq!(props.get("Count"), Some("3"));
        assert_eq!(props.get("Type"), Some("Archive"));
        assert_eq!(props.len(), 3);
    }

    #[test]
    fn parse_keeps_later_equals_in_value() {
        let props = Properties::parse("Formula = a=b").unwrap();
        assert_eq!(props.get("Formula"), Some("a=b"));
    }

    #[test]
    fn malformed_lines_are_strategy_errors() {
        assert!(Properties::parse("no separator").unwrap_err().is_strategy());
        assert!(Properties::parse("= value").unwrap_err().is_strategy());
    }

    #[test]
    fn set_rejects_multiline_values() {
        let mut props = Properties::new();
        assert!(props.set("Description", "a\nb").unwrap_err().is_parameter());
        assert!(props.set("a=b", "c").unwrap_err().is_parameter());
        assert!(props.set(" ", "c").unwrap_err().is_parameter());
    }

    #[test]
    fn save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".rscontrol.prop");

        let mut props = Properties::new();
        props.set("Description", "Test store").unwrap();
        props.set("Count", "0").unwrap();
        props.save(&path, true).unwrap();

        assert_eq!(Properties::load(&path).unwrap(), props);
        assert!(!dir.path().join(".rscontrol.prop.tmp").exists());

        props.set("Count", "1").unwrap();
        props.save(&path, false).unwrap();
        assert_eq!(Properties::load(&path).unwrap().get("Count"), Some("1"));
    }

    #[test]
    fn load_missing_file_is_strategy_error() {
        let dir = tempdir().unwrap();
        let err = Properties::load(&dir.path().join("absent")).unwrap_err();
        assert!(err.is_strategy());
    }
}
