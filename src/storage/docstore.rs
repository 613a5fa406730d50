use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};

use crate::core::error::Result;
use crate::core::types::Document;

const TABLE: TableDefinition<&str, &str> = TableDefinition::new("documents");

/// Canonical key/value store for full document bodies, backed by an
/// embedded ACID database (`docs.db`, spec §6's persisted state layout).
/// Keyed by external id so results can be resolved back to their full
/// fields after a search returns internal ids.
pub struct DocumentStore {
    db: Database,
}

impl DocumentStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::create(path)?;
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(TABLE)?;
        }
        write_txn.commit()?;
        Ok(DocumentStore { db })
    }

    pub fn put(&self, doc: &Document) -> Result<()> {
        let payload = serde_json::to_string(doc)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(TABLE)?;
            table.insert(doc.external_id.as_str(), payload.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get(&self, external_id: &str) -> Result<Option<Document>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TABLE)?;
        match table.get(external_id)? {
            Some(value) => {
                let doc: Document = serde_json::from_str(value.value())?;
                Ok(Some(doc))
            }
            None => Ok(None),
        }
    }

    pub fn sync(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::FieldValue;
    use tempfile::tempdir;

    #[test]
    fn round_trips_a_document() {
        let dir = tempdir().unwrap();
        let store = DocumentStore::open(dir.path().join("docs.db")).unwrap();

        let doc = Document::new("paper-1").with_field(
            "title",
            FieldValue::Text("Learning to Rank".to_string()),
        );
        store.put(&doc).unwrap();

        let fetched = store.get("paper-1").unwrap().unwrap();
        assert_eq!(fetched.external_id, "paper-1");
        assert!(store.get("missing").unwrap().is_none());
    }
}
