//! Streaming access to GAR XML files.
//!
//! GAR records are attribute-only elements (`<OBJECT .../>`, `<ITEM .../>`)
//! under a single wrapper root, so the reader never materializes a document:
//! it yields one attribute map per matching element and reuses its buffer.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use quick_xml::events::Event;
use quick_xml::Reader;
use walkdir::WalkDir;

use crate::error::IngestError;

/// Decoded attributes of a single element.
pub type AttrMap = hashbrown::HashMap<String, String>;

/// Discover `.XML` files whose basename contains `pattern`, case-insensitive.
///
/// Searches `root` and, when a region code is configured, `root/<region>`.
/// Results are sorted so repeated runs scan files in a stable order.
pub fn find_files(root: &Path, pattern: &str, region_code: Option<&str>) -> Vec<PathBuf> {
    let pattern = pattern.to_uppercase();
    let mut search_dirs = vec![root.to_path_buf()];
    if let Some(region) = region_code {
        if !region.is_empty() {
            search_dirs.push(root.join(region));
        }
    }

    let mut files = Vec::new();
    for dir in search_dirs {
        if !dir.is_dir() {
            continue;
        }
        for entry in WalkDir::new(&dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_uppercase();
            if name.ends_with(".XML") && name.contains(&pattern) {
                files.push(entry.into_path());
            }
        }
    }

    files.sort();
    files
}

/// Pull reader yielding the attribute map of every element named `tag`.
pub struct ElementStream {
    path: PathBuf,
    reader: Reader<BufReader<File>>,
    buf: Vec<u8>,
    tag: Vec<u8>,
}

impl ElementStream {
    pub fn open(path: &Path, tag: &str) -> Result<Self, IngestError> {
        let reader = Reader::from_file(path)
            .map_err(|e| IngestError::source(path, format!("failed to open: {e}")))?;
        Ok(Self {
            path: path.to_path_buf(),
            reader,
            buf: Vec::new(),
            tag: tag.as_bytes().to_vec(),
        })
    }

    /// Advance to the next matching element, or `None` at end of file.
    pub fn next_element(&mut self) -> Result<Option<AttrMap>, IngestError> {
        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf) {
                // GAR records are self-closing, but accept an open tag too.
                Ok(Event::Empty(e)) | Ok(Event::Start(e)) => {
                    if e.local_name().as_ref() != self.tag.as_slice() {
                        continue;
                    }
                    let mut attrs = AttrMap::new();
                    for attr in e.attributes() {
                        let attr = attr.map_err(|err| {
                            IngestError::source(&self.path, format!("bad attribute: {err}"))
                        })?;
                        let key = String::from_utf8_lossy(attr.key.local_name().as_ref())
                            .into_owned();
                        let value = attr.decode_and_unescape_value(e.decoder()).map_err(|err| {
                            IngestError::source(&self.path, format!("bad attribute value: {err}"))
                        })?;
                        attrs.insert(key, value.into_owned());
                    }
                    return Ok(Some(attrs));
                }
                Ok(Event::Eof) => return Ok(None),
                Ok(_) => continue,
                Err(e) => {
                    return Err(IngestError::source(
                        &self.path,
                        format!("XML parse error: {e}"),
                    ))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn streams_matching_elements_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "AS_ADDR_OBJ_TEST.XML",
            r#"<?xml version="1.0" encoding="utf-8"?>
            <ADDRESSOBJECTS>
              <OBJECT ID="1" OBJECTID="100" LEVEL="4" NAME="Тестовый" ISACTUAL="1" ISACTIVE="1"/>
              <OTHER ID="2"/>
              <OBJECT ID="3" OBJECTID="200" LEVEL="6" NAME="&#1040;" ISACTUAL="1" ISACTIVE="1"/>
            </ADDRESSOBJECTS>"#,
        );

        let mut stream = ElementStream::open(&path, "OBJECT").unwrap();
        let first = stream.next_element().unwrap().unwrap();
        assert_eq!(first.get("OBJECTID").map(String::as_str), Some("100"));
        assert_eq!(first.get("LEVEL").map(String::as_str), Some("4"));

        let second = stream.next_element().unwrap().unwrap();
        assert_eq!(second.get("OBJECTID").map(String::as_str), Some("200"));
        assert_eq!(second.get("NAME").map(String::as_str), Some("А"));

        assert!(stream.next_element().unwrap().is_none());
    }

    #[test]
    fn finds_files_in_root_and_region_subdir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("01")).unwrap();
        write_file(dir.path(), "AS_ADDR_OBJ_20240101.XML", "<R/>");
        write_file(dir.path(), "as_addr_obj_lower.xml", "<R/>");
        write_file(dir.path(), "AS_HOUSES_20240101.XML", "<R/>");
        write_file(dir.path(), "AS_ADDR_OBJ.txt", "not xml");
        write_file(&dir.path().join("01"), "AS_ADDR_OBJ_REGION.XML", "<R/>");

        let found = find_files(dir.path(), "AS_ADDR_OBJ", Some("01"));
        assert_eq!(found.len(), 3);
        assert!(found.iter().all(|p| {
            let name = p.file_name().unwrap().to_string_lossy().to_uppercase();
            name.contains("AS_ADDR_OBJ") && name.ends_with(".XML")
        }));

        let none = find_files(dir.path(), "AS_STEADS", None);
        assert!(none.is_empty());
    }

    #[test]
    fn houses_pattern_also_matches_params_files() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "AS_HOUSES_20240101.XML", "<R/>");
        write_file(dir.path(), "AS_HOUSES_PARAMS_20240101.XML", "<R/>");

        // Callers staging houses must filter PARAMS out themselves.
        let found = find_files(dir.path(), "AS_HOUSES", None);
        assert_eq!(found.len(), 2);
    }
}
