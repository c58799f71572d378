//! Contact Store
//!
//! Address book persisting recipient aliases and transfer history to a
//! JSON file. Contacts are created on first reference and updated on
//! every subsequent transfer. Writes are last-write-wins; in-process
//! access is serialized with a mutex, cross-process writers are not
//! coordinated.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A saved contact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactRecord {
    /// Optional alias/nickname for this address.
    pub alias: Option<String>,
    /// Number of transfers sent to this address.
    pub transfer_count: u64,
    /// When the address was first referenced.
    pub first_seen: DateTime<Utc>,
    /// When the last transfer to this address happened.
    pub last_transfer: Option<DateTime<Utc>>,
}

/// Contact with its address attached, for listings.
#[derive(Debug, Clone, Serialize)]
pub struct ContactEntry {
    pub address: String,
    #[serde(flatten)]
    pub record: ContactRecord,
}

/// Sort order for contact listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactSort {
    /// Most transfers first.
    Count,
    /// Most recently added first.
    Recent,
    /// Alphabetical by alias (address when unnamed).
    Alpha,
}

impl ContactSort {
    pub fn parse(s: &str) -> Self {
        match s {
            "recent" => Self::Recent,
            "alpha" => Self::Alpha,
            _ => Self::Count,
        }
    }
}

/// JSON-file backed address book.
pub struct ContactStore {
    path: PathBuf,
    contacts: Mutex<HashMap<String, ContactRecord>>,
}

impl ContactStore {
    /// Open the store, loading any existing file. A corrupt file is
    /// treated as empty rather than an error.
    pub fn open(path: &Path) -> Result<Self> {
        let contacts = match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("Contact store unreadable, starting empty: {}", e);
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };

        Ok(Self {
            path: path.to_path_buf(),
            contacts: Mutex::new(contacts),
        })
    }

    /// Record a transfer to `address`, creating the contact on first
    /// reference. A provided alias overwrites the stored one; `None`
    /// preserves it.
    pub fn record_transfer(&self, address: &str, alias: Option<&str>) -> Result<ContactRecord> {
        self.save(address, alias, true)
    }

    /// Save or update a contact.
    pub fn save(
        &self,
        address: &str,
        alias: Option<&str>,
        increment_count: bool,
    ) -> Result<ContactRecord> {
        let now = Utc::now();
        let record = {
            let mut contacts = self.contacts.lock();
            let record = contacts
                .entry(address.to_string())
                .or_insert_with(|| ContactRecord {
                    alias: None,
                    transfer_count: 0,
                    first_seen: now,
                    last_transfer: None,
                });

            if let Some(alias) = alias {
                if !alias.trim().is_empty() {
                    record.alias = Some(alias.trim().to_string());
                }
            }
            if increment_count {
                record.transfer_count += 1;
                record.last_transfer = Some(now);
            }

            let snapshot = record.clone();
            self.persist(&contacts)?;
            snapshot
        };

        debug!(
            "Contact saved: {} (alias={:?}, transfers={})",
            address, record.alias, record.transfer_count
        );
        Ok(record)
    }

    /// Alias for an address, if one was saved.
    pub fn alias(&self, address: &str) -> Option<String> {
        self.contacts.lock().get(address).and_then(|c| c.alias.clone())
    }

    /// Full record for an address.
    pub fn get(&self, address: &str) -> Option<ContactRecord> {
        self.contacts.lock().get(address).cloned()
    }

    /// All contacts in the requested order.
    pub fn list(&self, sort: ContactSort) -> Vec<ContactEntry> {
        let contacts = self.contacts.lock();
        let mut entries: Vec<ContactEntry> = contacts
            .iter()
            .map(|(address, record)| ContactEntry {
                address: address.clone(),
                record: record.clone(),
            })
            .collect();

        match sort {
            ContactSort::Count => {
                entries.sort_by(|a, b| b.record.transfer_count.cmp(&a.record.transfer_count));
            }
            ContactSort::Recent => {
                entries.sort_by(|a, b| b.record.first_seen.cmp(&a.record.first_seen));
            }
            ContactSort::Alpha => {
                entries.sort_by_key(|e| {
                    e.record
                        .alias
                        .clone()
                        .unwrap_or_else(|| e.address.clone())
                        .to_lowercase()
                });
            }
        }

        entries
    }

    /// Case-insensitive search over aliases and addresses.
    pub fn search(&self, query: &str) -> Vec<ContactEntry> {
        let query = query.to_lowercase();
        self.contacts
            .lock()
            .iter()
            .filter(|(address, record)| {
                address.to_lowercase().contains(&query)
                    || record
                        .alias
                        .as_ref()
                        .is_some_and(|a| a.to_lowercase().contains(&query))
            })
            .map(|(address, record)| ContactEntry {
                address: address.clone(),
                record: record.clone(),
            })
            .collect()
    }

    /// Remove a contact. Returns true when something was deleted.
    pub fn delete(&self, address: &str) -> Result<bool> {
        let mut contacts = self.contacts.lock();
        let removed = contacts.remove(address).is_some();
        if removed {
            self.persist(&contacts)?;
        }
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.contacts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.lock().is_empty()
    }

    fn persist(&self, contacts: &HashMap<String, ContactRecord>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(contacts)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("failed to write contact store {}", self.path.display()))?;
        Ok(())
    }
}
