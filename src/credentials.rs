//! Synthetic identities read from a delimited credential table.
//!
//! One record per line: `identity,secret[,hardware_id]`. Blank lines and
//! `#` comments are skipped. A field may be wrapped in double quotes to carry
//! the delimiter, with `""` standing for a literal quote; quoted fields do
//! not span lines. The set is loaded once and read-only afterwards.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use crate::mac::HardwareId;

pub const DEFAULT_DELIMITER: char = ',';

/// Split one record into trimmed fields, honouring double-quoted fields.
fn split_record(line: &str, delimiter: char) -> Result<Vec<String>> {
    let mut fields = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        while chars.next_if(|c| *c != delimiter && c.is_whitespace()).is_some() {}

        let mut field = String::new();
        if chars.next_if_eq(&'"').is_some() {
            loop {
                match chars.next() {
                    Some('"') if chars.next_if_eq(&'"').is_some() => field.push('"'),
                    Some('"') => break,
                    Some(c) => field.push(c),
                    None => bail!("unterminated quoted field"),
                }
            }
            while chars.next_if(|c| *c != delimiter && c.is_whitespace()).is_some() {}
            match chars.peek() {
                None => {}
                Some(c) if *c == delimiter => {}
                Some(c) => bail!("unexpected {:?} after quoted field", c),
            }
        } else {
            while let Some(c) = chars.next_if(|c| *c != delimiter) {
                field.push(c);
            }
            let trimmed = field.trim_end().len();
            field.truncate(trimmed);
        }
        fields.push(field);

        if chars.next().is_none() {
            return Ok(fields);
        }
    }
}

/// A single identity/secret pair, optionally pinned to a hardware id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub identity: String,
    pub secret: String,
    pub hardware_id: Option<HardwareId>,
}

impl Credential {
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            secret: secret.into(),
            hardware_id: None,
        }
    }

    pub fn with_hardware_id(mut self, id: HardwareId) -> Self {
        self.hardware_id = Some(id);
        self
    }
}

/// Non-empty, ordered collection of credentials with unique identities.
#[derive(Debug, Clone)]
pub struct CredentialSet {
    credentials: Vec<Credential>,
    by_identity: HashMap<String, usize>,
}

impl CredentialSet {
    /// Build a set, rejecting empty input and duplicate identities.
    pub fn new(credentials: Vec<Credential>) -> Result<Self> {
        if credentials.is_empty() {
            bail!("credential set is empty");
        }
        let mut by_identity = HashMap::with_capacity(credentials.len());
        for (idx, cred) in credentials.iter().enumerate() {
            if cred.identity.is_empty() {
                bail!("record {} has an empty identity", idx + 1);
            }
            if by_identity.insert(cred.identity.clone(), idx).is_some() {
                bail!("duplicate identity '{}'", cred.identity);
            }
        }
        Ok(Self {
            credentials,
            by_identity,
        })
    }

    /// Read and parse the credential table at `path`.
    pub fn load(path: &Path, delimiter: char) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let set = Self::parse(&content, delimiter)?;
        info!(path = %path.display(), count = set.len(), "loaded credentials");
        Ok(set)
    }

    /// Parse credential records from delimited text.
    pub fn parse(content: &str, delimiter: char) -> Result<Self> {
        let mut credentials = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();

        for (idx, raw) in content.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields = split_record(line, delimiter)
                .with_context(|| format!("line {}", line_no))?;
            if fields.len() < 2 {
                bail!("line {}: expected at least identity and secret", line_no);
            }
            if fields.len() > 3 {
                bail!("line {}: too many fields ({})", line_no, fields.len());
            }

            let identity = fields[0].as_str();
            if identity.is_empty() {
                bail!("line {}: empty identity", line_no);
            }
            if let Some(first) = seen.insert(identity.to_string(), line_no) {
                bail!(
                    "line {}: duplicate identity '{}' (first seen on line {})",
                    line_no,
                    identity,
                    first
                );
            }

            let mut cred = Credential::new(identity, fields[1].as_str());
            if let Some(raw_id) = fields.get(2).filter(|f| !f.is_empty()) {
                let id: HardwareId = raw_id
                    .parse()
                    .with_context(|| format!("line {}", line_no))?;
                cred = cred.with_hardware_id(id);
            }
            debug!(line = line_no, identity = %cred.identity, "parsed credential");
            credentials.push(cred);
        }

        Self::new(credentials)
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// Always false; an empty set cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Credential> {
        self.credentials.get(index)
    }

    pub fn by_identity(&self, identity: &str) -> Option<&Credential> {
        self.by_identity
            .get(identity)
            .and_then(|&idx| self.credentials.get(idx))
    }

    pub fn as_slice(&self) -> &[Credential] {
        &self.credentials
    }

    pub fn iter(&self) -> impl Iterator<Item = &Credential> {
        self.credentials.iter()
    }

    /// Number of credentials pinned to a static hardware id.
    pub fn pinned_count(&self) -> usize {
        self.credentials
            .iter()
            .filter(|c| c.hardware_id.is_some())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_basic_table() {
        let table = "\
# identity,secret,mac
alice,secret1
bob , secret2 , 02:00:00:00:00:01

carol,secret3,
";
        let set = CredentialSet::parse(table, ',').unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.get(0).unwrap().identity, "alice");
        assert_eq!(set.get(1).unwrap().secret, "secret2");
        assert_eq!(
            set.by_identity("bob").unwrap().hardware_id.unwrap().to_string(),
            "02:00:00:00:00:01"
        );
        assert!(set.by_identity("carol").unwrap().hardware_id.is_none());
        assert_eq!(set.pinned_count(), 1);
    }

    #[test]
    fn test_custom_delimiter() {
        let set = CredentialSet::parse("alice;pw;02-00-00-00-00-0a\n", ';').unwrap();
        assert_eq!(
            set.get(0).unwrap().hardware_id.unwrap().to_string(),
            "02:00:00:00:00:0a"
        );
    }

    #[test]
    fn test_quoted_fields_keep_delimiters() {
        let table = "\"smith, j\",\"pa,ss\"\"word\" , 02:00:00:00:00:0b\n\"bob\",plain\n";
        let set = CredentialSet::parse(table, ',').unwrap();
        assert_eq!(set.len(), 2);
        let first = set.get(0).unwrap();
        assert_eq!(first.identity, "smith, j");
        assert_eq!(first.secret, "pa,ss\"word");
        assert!(first.hardware_id.is_some());
        assert_eq!(set.get(1).unwrap().identity, "bob");
    }

    #[test]
    fn test_broken_quoting_is_rejected() {
        let err = CredentialSet::parse("alice,\"open\n", ',').unwrap_err();
        assert!(format!("{:#}", err).contains("line 1"));
        assert!(CredentialSet::parse("alice,\"pw\"x\n", ',').is_err());
    }

    #[test]
    fn test_empty_table_is_rejected() {
        let err = CredentialSet::parse("# only a comment\n\n", ',').unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_duplicate_identity_is_rejected() {
        let err = CredentialSet::parse("alice,a\nbob,b\nalice,c\n", ',').unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("duplicate identity 'alice'"), "{}", msg);
        assert!(msg.contains("line 3"), "{}", msg);
    }

    #[test]
    fn test_malformed_records_are_rejected() {
        assert!(CredentialSet::parse("alice\n", ',').is_err());
        assert!(CredentialSet::parse(",secret\n", ',').is_err());
        assert!(CredentialSet::parse("alice,pw,zz:00:00:00:00:00\n", ',').is_err());
        assert!(CredentialSet::parse("alice,pw,02:00:00:00:00:01,extra\n", ',').is_err());
    }

    #[test]
    fn test_new_rejects_empty_and_duplicates() {
        assert!(CredentialSet::new(vec![]).is_err());
        assert!(CredentialSet::new(vec![Credential::new("a", "1"), Credential::new("a", "2")]).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "user1,pass1").unwrap();
        writeln!(file, "user2,pass2").unwrap();
        let set = CredentialSet::load(file.path(), DEFAULT_DELIMITER).unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(CredentialSet::load(&dir.path().join("missing.csv"), ',').is_err());
    }
}
