use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::core::error::{Error, Result};

const START_FLAG: &[u8] = b"# FILE-DICT v1\n";

/// Append-only keyed byte-record file, with an in-memory key→offset map for
/// constant-time lookup and insertion-order streaming iteration (spec §4.3).
///
/// Crash safety: a new record is appended by writing `#` followed by bytes
/// `1..n` of the encoded line, flushing, then seeking back to the first byte
/// and overwriting it with the real leading byte. A reader that crashes
/// mid-write only ever observes complete records or comment lines starting
/// with `#`.
pub struct Store {
    path: PathBuf,
    file: File,
    offsets: HashMap<String, u64>,
    insertion_order: Vec<String>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let is_new = !path.exists();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        if is_new {
            file.write_all(START_FLAG)?;
            file.flush()?;
        }

        let mut offsets = HashMap::new();
        let mut insertion_order = Vec::new();
        let mut offset: u64 = 0;
        {
            let mut reader = BufReader::new(&file);
            let mut line = Vec::new();
            loop {
                line.clear();
                let bytes_read = reader.read_until(b'\n', &mut line)?;
                if bytes_read == 0 {
                    break;
                }
                if line == b"\n" {
                    offset += line.len() as u64;
                    continue;
                }
                if line[0] != b'#' {
                    if let Some((key, _value)) = parse_line(&line) {
                        if !offsets.contains_key(&key) {
                            insertion_order.push(key.clone());
                        }
                        offsets.insert(key, offset);
                    }
                }
                offset += line.len() as u64;
            }
        }

        Ok(Store {
            path,
            file,
            offsets,
            insertion_order,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.offsets.contains_key(key)
    }

    pub fn get(&mut self, key: &str) -> Result<Option<String>> {
        let offset = match self.offsets.get(key) {
            Some(o) => *o,
            None => return Ok(None),
        };
        self.file.seek(SeekFrom::Start(offset))?;
        let mut reader = BufReader::new(&self.file);
        let mut line = Vec::new();
        reader.read_until(b'\n', &mut line)?;
        match parse_line(&line) {
            Some((_, value)) => Ok(Some(value)),
            None => Err(Error::store(format!("corrupt record at offset {}", offset))),
        }
    }

    /// Append-only write: fails if `key` is already present.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        if self.offsets.contains_key(key) {
            return Err(Error::store("store is append only: key already present"));
        }

        let encoded_key = encode_key(key);
        let mut line = format!("{}\t{}\n", encoded_key, value).into_bytes();
        if line.is_empty() {
            return Ok(());
        }

        self.file.seek(SeekFrom::End(0))?;
        let offset = self.file.stream_position()?;

        let first_byte = line[0];
        line[0] = b'#';
        self.file.write_all(&line)?;
        self.file.flush()?;

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&[first_byte])?;
        self.file.flush()?;

        self.offsets.insert(key.to_string(), offset);
        self.insertion_order.push(key.to_string());
        Ok(())
    }

    /// Stream `(key, value)` pairs in insertion order.
    pub fn iterate(&mut self) -> Result<Vec<(String, String)>> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut reader = BufReader::new(&self.file);
        let mut out = Vec::with_capacity(self.offsets.len());
        let mut line = Vec::new();
        let mut first = true;
        loop {
            line.clear();
            let bytes_read = reader.read_until(b'\n', &mut line)?;
            if bytes_read == 0 {
                break;
            }
            if first {
                // skip the start-flag header line
                first = false;
                if line == START_FLAG {
                    continue;
                }
            }
            if line == b"\n" || line[0] == b'#' {
                continue;
            }
            if let Some(pair) = parse_line(&line) {
                out.push(pair);
            }
        }
        Ok(out)
    }

    pub fn clear(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(START_FLAG)?;
        self.file.flush()?;
        self.offsets.clear();
        self.insertion_order.clear();
        Ok(())
    }

    pub fn close(self) -> Result<()> {
        Ok(())
    }
}

fn encode_key(key: &str) -> String {
    serde_json::to_string(key).unwrap_or_else(|_| format!("{:?}", key))
}

fn decode_key(encoded: &str) -> Option<String> {
    serde_json::from_str(encoded).ok()
}

fn parse_line(line: &[u8]) -> Option<(String, String)> {
    let line = std::str::from_utf8(line).ok()?;
    let line = line.strip_suffix('\n').unwrap_or(line);
    let (left, right) = line.split_once('\t')?;
    let key = decode_key(left)?;
    Some((key, right.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trips_insertion_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.dat");
        let mut store = Store::open(&path).unwrap();
        store.set("b", "2").unwrap();
        store.set("a", "1").unwrap();
        store.set("c", "3").unwrap();

        assert_eq!(store.get("a").unwrap(), Some("1".to_string()));
        assert_eq!(store.get("b").unwrap(), Some("2".to_string()));
        assert_eq!(store.get("missing").unwrap(), None);

        let items = store.iterate().unwrap();
        assert_eq!(
            items,
            vec![
                ("b".to_string(), "2".to_string()),
                ("a".to_string(), "1".to_string()),
                ("c".to_string(), "3".to_string()),
            ]
        );
    }

    #[test]
    fn append_only_rejects_duplicate_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.dat");
        let mut store = Store::open(&path).unwrap();
        store.set("a", "1").unwrap();
        assert!(store.set("a", "2").is_err());
    }

    #[test]
    fn reopening_rebuilds_offsets() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.dat");
        {
            let mut store = Store::open(&path).unwrap();
            store.set("a", "1").unwrap();
            store.set("b", "2").unwrap();
        }
        let mut reopened = Store::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.get("b").unwrap(), Some("2".to_string()));
    }

    #[test]
    fn clear_empties_the_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.dat");
        let mut store = Store::open(&path).unwrap();
        store.set("a", "1").unwrap();
        store.clear().unwrap();
        assert_eq!(store.len(), 0);
        assert_eq!(store.get("a").unwrap(), None);
    }
}
