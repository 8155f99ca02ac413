//! Contact roster loading: primary CSV, left-joined auxiliary CSVs, filters.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::DatasetError;
use crate::identity;

/// Join key shared by every table.
pub const EMAIL_COLUMN: &str = "email";
/// Column used by tag filters.
pub const TAG_COLUMN: &str = "tag";
/// Column holding the derived identity.
pub const UUID_COLUMN: &str = "uuid";
/// Column used as the recipient's display name.
pub const NAME_COLUMN: &str = "english_name";

/// One roster row: column name to value, in column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Contact {
    fields: Map<String, Value>,
}

impl Contact {
    /// Build a contact from `(column, value)` pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let fields = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), Value::String(v.into())))
            .collect();
        Self { fields }
    }

    pub fn email(&self) -> &str {
        self.get(EMAIL_COLUMN).unwrap_or_default()
    }

    /// Value of `column`, if present.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).and_then(Value::as_str)
    }

    /// Non-empty display name, if the roster has one.
    pub fn display_name(&self) -> Option<&str> {
        self.get(NAME_COLUMN).filter(|name| !name.trim().is_empty())
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(column.into(), Value::String(value.into()));
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

/// Email and tag inclusion filters. An empty list means no restriction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactFilter {
    pub emails: Vec<String>,
    pub tags: Vec<String>,
}

impl ContactFilter {
    pub fn matches(&self, contact: &Contact) -> bool {
        let email_ok = self.emails.is_empty() || self.emails.iter().any(|e| e == contact.email());
        let tag_ok = self.tags.is_empty()
            || contact
                .get(TAG_COLUMN)
                .is_some_and(|tag| self.tags.iter().any(|t| t == tag));
        email_ok && tag_ok
    }
}

/// A loaded roster with its header order.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    columns: Vec<String>,
    contacts: Vec<Contact>,
}

/// A single parsed CSV table.
struct Table {
    path: PathBuf,
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    fn read(path: &Path) -> Result<Self, DatasetError> {
        if !path.is_file() {
            return Err(DatasetError::NotFound(path.to_path_buf()));
        }
        let csv_err = |e: csv::Error| DatasetError::Csv {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };
        let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
        let columns: Vec<String> = reader
            .headers()
            .map_err(csv_err)?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        if !columns.iter().any(|c| c == EMAIL_COLUMN) {
            return Err(DatasetError::MissingColumn {
                path: path.to_path_buf(),
                column: EMAIL_COLUMN.into(),
            });
        }
        let rows = reader
            .records()
            .map(|record| record.map(|r| r.iter().map(str::to_string).collect()))
            .collect::<Result<Vec<Vec<String>>, _>>()
            .map_err(csv_err)?;
        Ok(Self {
            path: path.to_path_buf(),
            columns,
            rows,
        })
    }

    fn email_index(&self) -> usize {
        self.columns
            .iter()
            .position(|c| c == EMAIL_COLUMN)
            .unwrap_or_default()
    }
}

impl Dataset {
    /// Build a dataset from contacts already in memory.
    pub fn from_contacts(columns: Vec<String>, contacts: Vec<Contact>) -> Self {
        Self { columns, contacts }
    }

    /// Load the primary table, left-join each auxiliary table on `email`, then filter.
    pub fn load(
        primary: &Path,
        auxiliary: &[PathBuf],
        filter: &ContactFilter,
    ) -> Result<Self, DatasetError> {
        let table = Table::read(primary)?;
        let contacts = table
            .rows
            .iter()
            .map(|row| {
                Contact::from_pairs(
                    table
                        .columns
                        .iter()
                        .zip(row.iter())
                        .map(|(c, v)| (c.clone(), v.clone())),
                )
            })
            .collect();
        let mut dataset = Self {
            columns: table.columns,
            contacts,
        };

        for path in auxiliary {
            let aux = Table::read(path)?;
            dataset.left_join(&aux);
            tracing::debug!(path = %aux.path.display(), rows = aux.rows.len(), "Merged auxiliary data");
        }

        let total = dataset.contacts.len();
        dataset.contacts.retain(|c| filter.matches(c));
        tracing::info!(
            path = %primary.display(),
            auxiliary = auxiliary.len(),
            loaded = total,
            selected = dataset.contacts.len(),
            "Loaded contacts"
        );
        Ok(dataset)
    }

    fn left_join(&mut self, aux: &Table) {
        let key = aux.email_index();
        let mut by_email: HashMap<&str, &Vec<String>> = HashMap::new();
        for row in &aux.rows {
            if let Some(email) = row.get(key) {
                by_email.entry(email.as_str()).or_insert(row);
            }
        }

        let added: Vec<(usize, &String)> = aux
            .columns
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != key)
            .collect();
        for (_, column) in &added {
            if !self.columns.contains(*column) {
                self.columns.push((*column).clone());
            }
        }

        for contact in &mut self.contacts {
            let matched = by_email.get(contact.email()).copied();
            for (i, column) in &added {
                match matched {
                    Some(row) => {
                        let value = row.get(*i).cloned().unwrap_or_default();
                        contact.set(column.as_str(), value);
                    }
                    None if contact.get(column).is_none() => contact.set(column.as_str(), ""),
                    None => {}
                }
            }
        }
    }

    /// Set the derived `uuid` column on every contact.
    pub fn assign_identities(&mut self, namespace: &Uuid) {
        if !self.columns.iter().any(|c| c == UUID_COLUMN) {
            self.columns.push(UUID_COLUMN.into());
        }
        for contact in &mut self.contacts {
            let id = identity::derive(namespace, contact.email());
            contact.set(UUID_COLUMN, id.to_string());
        }
    }

    /// Write the dataset back as CSV, keeping header order.
    pub fn write_csv(&self, path: &Path) -> Result<(), DatasetError> {
        let csv_err = |e: csv::Error| DatasetError::Csv {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };
        let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
        writer.write_record(&self.columns).map_err(csv_err)?;
        for contact in &self.contacts {
            writer
                .write_record(self.columns.iter().map(|c| contact.get(c).unwrap_or_default()))
                .map_err(csv_err)?;
        }
        writer.flush().map_err(|e| DatasetError::Csv {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        tracing::info!(path = %path.display(), rows = self.contacts.len(), "Wrote contacts");
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn into_contacts(self) -> Vec<Contact> {
        self.contacts
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }
}

/// Every `*.csv` under `dir`, recursively, in sorted order. A missing directory yields none.
pub fn discover_auxiliary(dir: &Path) -> Result<Vec<PathBuf>, DatasetError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let pattern = dir.join("**").join("*.csv");
    let pattern = pattern.to_string_lossy();
    let mut paths: Vec<PathBuf> = glob::glob(&pattern)
        .map_err(|e| DatasetError::Pattern(e.to_string()))?
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!("Skipping unreadable auxiliary path: {e}");
                None
            }
        })
        .collect();
    paths.sort();
    Ok(paths)
}
