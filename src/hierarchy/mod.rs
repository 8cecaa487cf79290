//! In-memory hierarchy index over GAR address objects.
//!
//! The source ships two parent/child relations that disagree at intermediate
//! levels: the municipal hierarchy (`AS_MUN_HIERARCHY`) and the
//! administrative one (`AS_ADM_HIERARCHY`). Consumers need the municipal
//! chain, so municipal edges always win at the same child. That priority is
//! encoded purely by load order: MUN edges are written unconditionally, ADM
//! edges only where the child has no edge yet.
//!
//! Object ids stay strings throughout the index; they are parsed to i64 only
//! when a resolved parent is persisted.

use std::path::{Path, PathBuf};

use hashbrown::{HashMap, HashSet};
use tracing::info;

use crate::error::IngestError;
use crate::xml::ElementStream;

/// Levels that classify an address object.
pub const MUNICIPALITY_LEVELS: &[&str] = &["3", "4"];
pub const SETTLEMENT_LEVELS: &[&str] = &["5", "6"];
pub const STREET_LEVELS: &[&str] = &["7", "8"];

/// Level and parent maps, read-only after [`HierarchyIndex::load`].
#[derive(Debug, Default)]
pub struct HierarchyIndex {
    levels: HashMap<String, String>,
    parents: HashMap<String, String>,
}

impl HierarchyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the index with the three-scan ordering: levels from
    /// `AS_ADDR_OBJ`, then MUN edges, then ADM edges for children MUN missed.
    pub fn load(
        addr_files: &[PathBuf],
        mun_files: &[PathBuf],
        adm_files: &[PathBuf],
    ) -> Result<Self, IngestError> {
        let mut index = Self::new();

        for path in addr_files {
            let mut count = 0u64;
            let mut stream = ElementStream::open(path, "OBJECT")?;
            while let Some(attrs) = stream.next_element()? {
                if attrs.get("ISACTUAL").map(String::as_str) != Some("1")
                    || attrs.get("ISACTIVE").map(String::as_str) != Some("1")
                {
                    continue;
                }
                if let (Some(object_id), Some(level)) = (attrs.get("OBJECTID"), attrs.get("LEVEL"))
                {
                    index.record_level(object_id.clone(), level.clone());
                    count += 1;
                }
            }
            info!("Loaded {} levels from {}", count, path.display());
        }

        let mut mun_edges = 0u64;
        for path in mun_files {
            mun_edges += index.load_edges(path, true)?;
        }
        info!("Loaded {} municipal hierarchy edges", mun_edges);

        let mut adm_edges = 0u64;
        for path in adm_files {
            adm_edges += index.load_edges(path, false)?;
        }
        info!(
            "Supplemented {} administrative hierarchy edges ({} objects total)",
            adm_edges,
            index.parents.len()
        );

        Ok(index)
    }

    fn load_edges(&mut self, path: &Path, municipal: bool) -> Result<u64, IngestError> {
        let mut added = 0u64;
        let mut stream = ElementStream::open(path, "ITEM")?;
        while let Some(attrs) = stream.next_element()? {
            if attrs.get("ISACTIVE").map(String::as_str) != Some("1") {
                continue;
            }
            let object_id = attrs.get("OBJECTID").filter(|v| !v.is_empty());
            let parent_id = attrs.get("PARENTOBJID").filter(|v| !v.is_empty());
            if let (Some(object_id), Some(parent_id)) = (object_id, parent_id) {
                if municipal {
                    self.record_mun_edge(object_id.clone(), parent_id.clone());
                    added += 1;
                } else if self.record_adm_edge(object_id.clone(), parent_id.clone()) {
                    added += 1;
                }
            }
        }
        Ok(added)
    }

    pub fn record_level(&mut self, object_id: String, level: String) {
        self.levels.insert(object_id, level);
    }

    /// Municipal edge: overwrites whatever was there.
    pub fn record_mun_edge(&mut self, object_id: String, parent_id: String) {
        self.parents.insert(object_id, parent_id);
    }

    /// Administrative edge: kept only when the child has no municipal edge.
    /// Returns whether the edge was recorded.
    pub fn record_adm_edge(&mut self, object_id: String, parent_id: String) -> bool {
        if self.parents.contains_key(&object_id) {
            return false;
        }
        self.parents.insert(object_id, parent_id);
        true
    }

    pub fn level(&self, object_id: &str) -> Option<&str> {
        self.levels.get(object_id).map(String::as_str)
    }

    pub fn parent(&self, object_id: &str) -> Option<&str> {
        self.parents.get(object_id).map(String::as_str)
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn edge_count(&self) -> usize {
        self.parents.len()
    }

    /// Walk the parent map upward from `object_id` and return the first
    /// object whose level is in `target_levels`; the object itself counts
    /// when its own level already matches. A visited set bounds the walk on
    /// cyclic input; leaving the map is a miss, not an error.
    pub fn find_parent_by_level<'a>(
        &'a self,
        object_id: &str,
        target_levels: &[&str],
    ) -> Option<&'a str> {
        if let Some((key, level)) = self.levels.get_key_value(object_id) {
            if target_levels.contains(&level.as_str()) {
                return Some(key);
            }
        }

        let mut current: &str = object_id;
        let mut visited: HashSet<&str> = HashSet::new();

        while visited.insert(current) {
            let parent = self.parents.get(current)?;
            if let Some(level) = self.levels.get(parent.as_str()) {
                if target_levels.contains(&level.as_str()) {
                    return Some(parent);
                }
            }
            current = parent;
        }

        None
    }

    /// The municipality specialization of [`find_parent_by_level`]. Invoked
    /// both from the settlement fill and the house fallback pass.
    pub fn find_mo_parent<'a>(&'a self, object_id: &str) -> Option<&'a str> {
        self.find_parent_by_level(object_id, MUNICIPALITY_LEVELS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn index_with_chain() -> HierarchyIndex {
        // 100 (mun, level 4) <- 200 (settlement, 6) <- 300 (street, 8) <- 400 (house)
        let mut index = HierarchyIndex::new();
        index.record_level("100".into(), "4".into());
        index.record_level("200".into(), "6".into());
        index.record_level("300".into(), "8".into());
        index.record_mun_edge("200".into(), "100".into());
        index.record_mun_edge("300".into(), "200".into());
        index.record_mun_edge("400".into(), "300".into());
        index
    }

    #[test]
    fn resolves_each_ancestor_of_a_house() {
        let index = index_with_chain();
        assert_eq!(index.find_parent_by_level("400", STREET_LEVELS), Some("300"));
        assert_eq!(
            index.find_parent_by_level("400", SETTLEMENT_LEVELS),
            Some("200")
        );
        assert_eq!(index.find_mo_parent("400"), Some("100"));
    }

    #[test]
    fn object_matching_target_level_resolves_to_itself() {
        let index = index_with_chain();
        assert_eq!(index.find_mo_parent("100"), Some("100"));
        assert_eq!(index.find_parent_by_level("200", SETTLEMENT_LEVELS), Some("200"));
    }

    #[test]
    fn returns_first_ancestor_of_the_target_level() {
        // Two settlements stacked: the walk must stop at the nearer one.
        let mut index = index_with_chain();
        index.record_level("250".into(), "5".into());
        index.record_mun_edge("300".into(), "250".into());
        index.record_mun_edge("250".into(), "200".into());
        assert_eq!(
            index.find_parent_by_level("300", SETTLEMENT_LEVELS),
            Some("250")
        );
    }

    #[test]
    fn municipal_edge_wins_over_administrative() {
        let mut index = HierarchyIndex::new();
        index.record_level("100".into(), "4".into());
        index.record_level("999".into(), "2".into());
        index.record_mun_edge("200".into(), "100".into());
        // ADM disagrees; it must not displace the MUN edge.
        assert!(!index.record_adm_edge("200".into(), "999".into()));
        assert_eq!(index.parent("200"), Some("100"));
        assert_eq!(index.find_mo_parent("200"), Some("100"));
    }

    #[test]
    fn administrative_edge_fills_gaps_only() {
        let mut index = HierarchyIndex::new();
        index.record_level("100".into(), "3".into());
        assert!(index.record_adm_edge("500".into(), "250".into()));
        index.record_adm_edge("250".into(), "100".into());
        assert_eq!(index.find_mo_parent("500"), Some("100"));
    }

    #[test]
    fn cyclic_parent_map_terminates_with_a_miss() {
        let mut index = HierarchyIndex::new();
        index.record_mun_edge("700".into(), "800".into());
        index.record_mun_edge("800".into(), "700".into());
        assert_eq!(index.find_mo_parent("700"), None);
    }

    #[test]
    fn missing_object_is_a_miss() {
        let index = index_with_chain();
        assert_eq!(index.find_mo_parent("12345"), None);
    }

    #[test]
    fn load_applies_active_filters_and_scan_order() {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, content: &str| {
            let path = dir.path().join(name);
            let mut f = std::fs::File::create(&path).unwrap();
            f.write_all(content.as_bytes()).unwrap();
            path
        };

        let addr = write(
            "AS_ADDR_OBJ.XML",
            r#"<ADDRESSOBJECTS>
              <OBJECT OBJECTID="100" LEVEL="4" ISACTUAL="1" ISACTIVE="1"/>
              <OBJECT OBJECTID="200" LEVEL="6" ISACTUAL="1" ISACTIVE="1"/>
              <OBJECT OBJECTID="300" LEVEL="6" ISACTUAL="0" ISACTIVE="1"/>
            </ADDRESSOBJECTS>"#,
        );
        let mun = write(
            "AS_MUN_HIERARCHY.XML",
            r#"<ITEMS>
              <ITEM OBJECTID="200" PARENTOBJID="100" ISACTIVE="1"/>
              <ITEM OBJECTID="201" PARENTOBJID="100" ISACTIVE="0"/>
            </ITEMS>"#,
        );
        let adm = write(
            "AS_ADM_HIERARCHY.XML",
            r#"<ITEMS>
              <ITEM OBJECTID="200" PARENTOBJID="999" ISACTIVE="1"/>
              <ITEM OBJECTID="202" PARENTOBJID="100" ISACTIVE="1"/>
            </ITEMS>"#,
        );

        let index = HierarchyIndex::load(&[addr], &[mun], &[adm]).unwrap();
        assert_eq!(index.level_count(), 2); // inactive object skipped
        assert_eq!(index.parent("200"), Some("100")); // MUN wins
        assert_eq!(index.parent("202"), Some("100")); // ADM fills the gap
        assert_eq!(index.parent("201"), None); // inactive edge skipped
    }
}
