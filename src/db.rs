use crate::plate;
use crate::types::{RegistrationRecord, Result};
use log::{info, warn};
use rusqlite::types::Value;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::Path;

pub trait RegistrationStore {
    /// One keyed read by exact plate string.
    fn find(&self, plate: &str) -> Result<Option<RegistrationRecord>>;
}

pub struct SqliteStore {
    conn: Connection,
}

/// Opens the registration database read-only; the gate never writes to it.
pub fn open(path: &Path) -> Result<SqliteStore> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|e| format_err!("Unable to open db {:?}: {}", path, e))?;
    Ok(SqliteStore { conn })
}

impl SqliteStore {
    #[cfg(test)]
    pub fn from_connection(conn: Connection) -> SqliteStore {
        SqliteStore { conn }
    }
}

// Slots and phone numbers are often stored as INTEGER columns.
fn as_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(f) => Some(f.to_string()),
        Value::Text(s) => Some(s),
        Value::Blob(b) => Some(String::from_utf8_lossy(&b).into_owned()),
    }
}

impl RegistrationStore for SqliteStore {
    fn find(&self, plate: &str) -> Result<Option<RegistrationRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT slot, owner, contact FROM registered_vehicles WHERE plate_number = ?1",
                params![plate],
                |row| {
                    Ok((
                        row.get::<_, Value>(0)?,
                        row.get::<_, Value>(1)?,
                        row.get::<_, Value>(2)?,
                    ))
                },
            )
            .optional()?;
        Ok(row.and_then(|(slot, owner, contact)| {
            let slot = as_text(slot).filter(|s| !s.trim().is_empty());
            if slot.is_none() {
                warn!("Plate {} is in the db without a slot", plate);
            }
            slot.map(|slot| RegistrationRecord {
                slot,
                owner: as_text(owner),
                contact: as_text(contact),
            })
        }))
    }
}

/// Normalizes and validates `plate`, then reads its registration.
/// Invalid plates never reach the store.
pub fn lookup<S: RegistrationStore + ?Sized>(
    store: &S,
    plate: &str,
) -> Result<Option<RegistrationRecord>> {
    let plate = plate::normalize(plate);
    if !plate::is_valid(&plate) {
        info!("Ignored invalid plate format: {}", plate);
        return Ok(None);
    }
    match store.find(&plate)? {
        Some(record) => {
            info!(
                "Plate {} is REGISTERED. Assigned slot: {}, owner: {}, contact: {}",
                plate,
                record.slot,
                record.owner.as_deref().unwrap_or("-"),
                record.contact.as_deref().unwrap_or("-")
            );
            Ok(Some(record))
        }
        None => {
            info!("Plate {} is NOT REGISTERED", plate);
            Ok(None)
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;

    pub fn memory_store(rows: &[(&str, &str, &str, &str)]) -> SqliteStore {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE registered_vehicles (slot TEXT, plate_number TEXT PRIMARY KEY, owner TEXT, contact TEXT)",
            params![],
        )
        .unwrap();
        for (slot, plate, owner, contact) in rows {
            conn.execute(
                "INSERT INTO registered_vehicles (slot, plate_number, owner, contact) VALUES (?1, ?2, ?3, ?4)",
                params![slot, plate, owner, contact],
            )
            .unwrap();
        }
        SqliteStore::from_connection(conn)
    }

    struct CountingStore {
        reads: RefCell<Vec<String>>,
    }

    impl RegistrationStore for CountingStore {
        fn find(&self, plate: &str) -> Result<Option<RegistrationRecord>> {
            self.reads.borrow_mut().push(plate.to_string());
            Ok(None)
        }
    }

    #[test]
    fn finds_registered_plate() {
        let store = memory_store(&[("101", "KA05MJ1234", "Asha", "98450")]);
        let record = lookup(&store, "ka05mj1234").unwrap().unwrap();
        assert_eq!(record.slot, "101");
        assert_eq!(record.owner.as_deref(), Some("Asha"));
        assert_eq!(record.contact.as_deref(), Some("98450"));
    }

    #[test]
    fn unknown_plate_is_unregistered() {
        let store = memory_store(&[("101", "KA05MJ1234", "Asha", "98450")]);
        assert_eq!(lookup(&store, "MH12AB0001").unwrap(), None);
    }

    #[test]
    fn integer_slot_is_read_as_text() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE registered_vehicles (slot INTEGER, plate_number TEXT, owner TEXT, contact INTEGER)",
            params![],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO registered_vehicles VALUES (102, 'DL08CA5031', NULL, 9845012345)",
            params![],
        )
        .unwrap();
        let store = SqliteStore::from_connection(conn);
        let record = store.find("DL08CA5031").unwrap().unwrap();
        assert_eq!(record.slot, "102");
        assert_eq!(record.owner, None);
        assert_eq!(record.contact.as_deref(), Some("9845012345"));
    }

    #[test]
    fn empty_slot_counts_as_unregistered() {
        let store = memory_store(&[("", "KA05MJ1234", "Asha", "98450")]);
        assert_eq!(store.find("KA05MJ1234").unwrap(), None);
    }

    #[test]
    fn invalid_plate_skips_store() {
        let store = CountingStore {
            reads: RefCell::new(vec![]),
        };
        assert_eq!(lookup(&store, "KA5MJ1234").unwrap(), None);
        assert!(store.reads.borrow().is_empty());
        lookup(&store, "KA05MJ1234").unwrap();
        assert_eq!(*store.reads.borrow(), vec!["KA05MJ1234".to_string()]);
    }
}
