use crate::server::protocol::{item_command, map_command};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Position of an entity inside its catalog; doubles as the posting value
/// stored in the prefix index
pub type EntityId = u32;

/// Which descriptor source an entity came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Item,
    Map,
}

impl EntityKind {
    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Item => "Items",
            EntityKind::Map => "Maps",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Item => write!(f, "item"),
            EntityKind::Map => write!(f, "map"),
        }
    }
}

/// A searchable item or map record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub kind: EntityKind,
    /// Canonical id, zero-padded when numeric
    pub id: String,
    pub name: String,
    pub class: Option<String>,
    pub feature: Option<String>,
    pub slot_name: Option<String>,
    /// Icon location relative to the image root
    pub icon_path: Option<String>,
    /// Normalized and synthetic tokens; fixed once the catalog is built
    pub tokens: Vec<String>,
    /// Enrichment lookup failed for this item
    pub missing_data: bool,
}

impl Entity {
    /// Relay command that spawns or warps to this entity
    pub fn relay_command(&self, map_instance: &str) -> String {
        match self.kind {
            EntityKind::Item => item_command(&self.id),
            EntityKind::Map => map_command(&self.id, map_instance),
        }
    }

    /// Attribute lines shown next to a selected entity
    pub fn detail_lines(&self) -> Vec<String> {
        let show = |v: &Option<String>| v.clone().unwrap_or_else(|| "undefined".to_string());

        let mut lines = vec![self.name.clone(), format!("id={}", self.id)];
        if self.kind == EntityKind::Item {
            lines.push(format!("class={}", show(&self.class)));
            lines.push(format!("slot={}", show(&self.slot_name)));
        }
        lines.push(format!("feature={}", show(&self.feature)));
        if let Some(icon) = &self.icon_path {
            lines.push(format!("icon={}", icon));
        }
        if self.missing_data {
            lines.push(MISSING_DATA_TOKEN.to_string());
        }
        lines
    }
}

/// Marker token attached to items whose enrichment lookup failed
pub const MISSING_DATA_TOKEN: &str = "*missing_xml_file";

/// Options controlling a catalog build
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Numeric ids shorter than this are left-padded with zeros
    pub id_width: usize,
    /// Reuse the enrichment cache file when present
    pub use_enrichment_cache: bool,
    /// Where the enrichment cache is read from and written to
    pub enrichment_cache: Option<PathBuf>,
    /// Suppress progress bars
    pub silent: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            id_width: 8,
            use_enrichment_cache: true,
            enrichment_cache: None,
            silent: true,
        }
    }
}

/// Left-pad numeric ids with zeros up to `width`.
///
/// Non-numeric ids and ids already at or beyond the width are returned unchanged.
pub fn pad_id(raw: &str, width: usize) -> String {
    let numeric = !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit());
    if numeric && raw.len() < width {
        format!("{:0>width$}", raw, width = width)
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str) -> Entity {
        Entity {
            kind: EntityKind::Item,
            id: id.to_string(),
            name: "Red Potion".to_string(),
            class: Some("consumable".to_string()),
            feature: None,
            slot_name: None,
            icon_path: None,
            tokens: Vec::new(),
            missing_data: true,
        }
    }

    #[test]
    fn test_pad_single_digit() {
        assert_eq!(pad_id("1", 8), "00000001");
    }

    #[test]
    fn test_pad_generalized_width() {
        assert_eq!(pad_id("123", 8), "00000123");
        assert_eq!(pad_id("12345678", 8), "12345678");
        assert_eq!(pad_id("123456789", 8), "123456789");
        assert_eq!(pad_id("42", 4), "0042");
    }

    #[test]
    fn test_pad_leaves_non_numeric() {
        assert_eq!(pad_id("abc", 8), "abc");
        assert_eq!(pad_id("12a", 8), "12a");
        assert_eq!(pad_id("", 8), "");
    }

    #[test]
    fn test_relay_command() {
        assert_eq!(item("00001001").relay_command("0"), "/item 00001001 1 1");

        let mut map = item("02000001");
        map.kind = EntityKind::Map;
        assert_eq!(map.relay_command("3"), "/map 02000001 3");
    }

    #[test]
    fn test_detail_lines() {
        let lines = item("00000001").detail_lines();
        assert_eq!(lines[0], "Red Potion");
        assert!(lines.contains(&"class=consumable".to_string()));
        assert!(lines.contains(&"slot=undefined".to_string()));
        assert!(lines.contains(&"feature=undefined".to_string()));
        assert_eq!(lines.last().unwrap(), MISSING_DATA_TOKEN);
    }
}
