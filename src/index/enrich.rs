//! Per-item enrichment data (icon path and slot name).
//!
//! The data comes from one XML file per item under the item tree, laid out as
//! `<root>/<group>/<subgroup>/<id>.xml`. Deriving it means parsing every file,
//! so the result is kept in a JSON cache and only missing ids are derived again.

use crate::index::error::{CatalogError, Result};
use crate::index::xml::{XmlElement, parse_document};
use crate::utils::progress::file_progress;
use globset::{GlobBuilder, GlobMatcher};
use ignore::WalkBuilder;
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Layout of item files below the item tree root
const ITEM_FILE_PATTERN: &str = "*/*/*.xml";

/// Enrichment for a single item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemExtra {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_name: Option<String>,
    /// The item tree was scanned and holds no file for this id
    #[serde(default, skip_serializing_if = "is_false")]
    pub missing_file: bool,
}

impl ItemExtra {
    fn missing_file() -> Self {
        Self {
            missing_file: true,
            ..Self::default()
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Where enrichment data is read from
#[derive(Debug, Clone, Default)]
pub struct EnrichmentSource {
    /// Root of the per-item XML tree
    pub item_xml_dir: Option<PathBuf>,
    /// Root icon paths are resolved against
    pub image_root: Option<PathBuf>,
    /// Derived cache file
    pub cache_path: Option<PathBuf>,
    /// Read the cache when it exists
    pub use_cache: bool,
    pub silent: bool,
}

/// Id → enrichment map with cache bookkeeping
#[derive(Debug, Default)]
pub struct EnrichmentStore {
    entries: HashMap<String, ItemExtra>,
    /// Entries changed since the cache was read
    dirty: bool,
}

impl EnrichmentStore {
    pub fn from_entries(entries: HashMap<String, ItemExtra>) -> Self {
        Self {
            entries,
            dirty: false,
        }
    }

    /// Enrichment for `id`, if its item file was found and parsed
    pub fn get(&self, id: &str) -> Option<&ItemExtra> {
        self.entries.get(id).filter(|extra| !extra.missing_file)
    }

    /// Number of resolved ids
    pub fn len(&self) -> usize {
        self.entries.values().filter(|extra| !extra.missing_file).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load the enrichment for `ids`, deriving whatever the cache lacks.
    ///
    /// Never fails as a whole: an unreadable cache is rebuilt, a missing item
    /// tree just leaves ids unresolved. Ids the scan found no file for are
    /// recorded as such, so a cached build does not walk the tree for them
    /// again. The cache is rewritten when anything new was recorded.
    pub fn load(source: &EnrichmentSource, ids: &[String]) -> Self {
        let mut store = match (&source.cache_path, source.use_cache) {
            (Some(path), true) if path.exists() => match read_cache(path) {
                Ok(entries) => {
                    log::info!("Loaded {} enrichment entries from {}", entries.len(), path.display());
                    Self::from_entries(entries)
                }
                Err(e) => {
                    log::warn!("Ignoring unreadable enrichment cache: {}", e);
                    Self::default()
                }
            },
            _ => Self::default(),
        };

        let missing: HashSet<&str> = ids
            .iter()
            .map(String::as_str)
            .filter(|id| !store.entries.contains_key(*id))
            .collect();

        if !missing.is_empty() {
            match &source.item_xml_dir {
                Some(dir) if dir.is_dir() => {
                    match store.derive_missing(dir, source, &missing) {
                        Ok(found) => store.mark_missing_files(&missing, &found),
                        Err(e) => log::warn!("Enrichment scan of {} failed: {}", dir.display(), e),
                    }
                }
                Some(dir) => log::warn!("Item XML directory {} does not exist", dir.display()),
                None => log::warn!("No item XML directory configured; icons and slots unavailable"),
            }
        }

        if store.dirty
            && let Some(path) = &source.cache_path
        {
            match write_cache(path, &store.entries) {
                Ok(()) => {
                    store.dirty = false;
                    log::info!("Wrote enrichment cache {}", path.display());
                }
                Err(e) => log::warn!("Failed to write enrichment cache: {}", e),
            }
        }

        store
    }

    /// Scan the item tree once and derive the entries for `wanted` ids in parallel.
    ///
    /// Returns the wanted ids that have a file in the tree, whether or not it parsed.
    fn derive_missing(
        &mut self,
        item_xml_dir: &Path,
        source: &EnrichmentSource,
        wanted: &HashSet<&str>,
    ) -> Result<HashSet<String>> {
        let files: Vec<(String, PathBuf)> = discover_item_files(item_xml_dir)?
            .into_iter()
            .filter(|(id, _)| wanted.contains(id.as_str()))
            .collect();
        let found: HashSet<String> = files.iter().map(|(id, _)| id.clone()).collect();

        if files.is_empty() {
            return Ok(found);
        }

        log::info!("Deriving enrichment for {} items", files.len());
        let progress = file_progress(files.len(), "Reading item XML...", source.silent);
        let image_root = source.image_root.as_deref();

        let derived: Vec<(String, ItemExtra)> = files
            .par_iter()
            .filter_map(|(id, path)| {
                let result = derive_item(path, image_root);
                if let Some(ref pb) = progress {
                    pb.inc(1);
                }
                match result {
                    Ok(extra) => Some((id.clone(), extra)),
                    Err(e) => {
                        log::warn!("Skipping {}: {}", path.display(), e);
                        None
                    }
                }
            })
            .collect();

        if let Some(pb) = progress {
            pb.finish_with_message(format!("Derived {} items", derived.len()));
        }

        if !derived.is_empty() {
            self.dirty = true;
        }
        self.entries.extend(derived);
        Ok(found)
    }

    /// Record the scanned ids that have no item file.
    ///
    /// Corrupt files are not recorded, so they are retried on the next build.
    fn mark_missing_files(&mut self, scanned: &HashSet<&str>, found: &HashSet<String>) {
        let absent: Vec<&str> = scanned
            .iter()
            .copied()
            .filter(|id| !found.contains(*id))
            .collect();
        if absent.is_empty() {
            return;
        }
        log::debug!("{} items have no item XML file", absent.len());
        for id in absent {
            self.entries.insert(id.to_string(), ItemExtra::missing_file());
        }
        self.dirty = true;
    }
}

/// List `(id, path)` for every item file in the tree; the id is the file stem
pub fn discover_item_files(item_xml_dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let matcher = item_file_matcher()?;

    let walker = WalkBuilder::new(item_xml_dir)
        .standard_filters(false)
        .hidden(true)
        .max_depth(Some(3))
        .build();

    let mut files: Vec<(String, PathBuf)> = walker
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
        .filter_map(|entry| {
            let path = entry.into_path();
            let rel = path.strip_prefix(item_xml_dir).ok()?;
            if !matcher.is_match(rel) {
                return None;
            }
            let id = path.file_stem()?.to_str()?.to_string();
            Some((id, path))
        })
        .collect();

    // Walk order is filesystem dependent
    files.sort();
    Ok(files)
}

fn item_file_matcher() -> Result<GlobMatcher> {
    Ok(GlobBuilder::new(ITEM_FILE_PATTERN)
        .literal_separator(true)
        .build()?
        .compile_matcher())
}

/// Read one item file and extract its icon and slot
pub fn derive_item(path: &Path, image_root: Option<&Path>) -> Result<ItemExtra> {
    let bytes = fs::read(path).map_err(|e| CatalogError::io(path, e))?;
    let root = parse_document(&bytes)?;
    extract_item_extra(&root, image_root).map_err(|message| CatalogError::Document {
        path: path.to_path_buf(),
        message,
    })
}

/// Pull icon and slot out of a parsed item document
pub fn extract_item_extra(
    root: &XmlElement,
    image_root: Option<&Path>,
) -> std::result::Result<ItemExtra, String> {
    let environment = root
        .child("environment")
        .ok_or_else(|| "missing <environment>".to_string())?;
    let property = environment
        .child("property")
        .ok_or_else(|| "missing <property>".to_string())?;

    let icon_path = resolve_icon_path(
        property.attr("slotIcon").unwrap_or(""),
        property.attr("slotIconCustom").unwrap_or(""),
        image_root,
    );

    let slot_name = environment
        .descend(&["slots", "slot"])
        .and_then(|slot| slot.attr("name"))
        .filter(|name| !name.is_empty())
        .map(str::to_string);

    Ok(ItemExtra {
        icon_path,
        slot_name,
        missing_file: false,
    })
}

fn icon_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)Image.*\.png").expect("icon pattern is valid"))
}

/// Reduce a raw descriptor path to its location below the image root.
///
/// `./Data/Resource/Image/item/icon/a.png` becomes `/item/icon/a.png`.
/// Paths without an `Image…png` segment are returned unchanged.
pub fn extract_icon_path(raw: &str) -> String {
    match icon_pattern().find(raw) {
        Some(m) => {
            // Drop the leading "Image" in whatever case it matched
            let matched = m.as_str();
            let cut = matched
                .char_indices()
                .nth(5)
                .map_or(matched.len(), |(i, _)| i);
            matched[cut..].to_string()
        }
        None => raw.to_string(),
    }
}

/// First candidate (primary, then custom) whose file exists under `image_root`
pub fn resolve_icon_path(primary: &str, custom: &str, image_root: Option<&Path>) -> Option<String> {
    let image_root = image_root?;
    [primary, custom]
        .into_iter()
        .filter(|raw| !raw.is_empty())
        .map(extract_icon_path)
        .find(|candidate| {
            let rel = candidate.trim_start_matches(['/', '\\']);
            !rel.is_empty() && image_root.join(rel).is_file()
        })
}

fn read_cache(path: &Path) -> Result<HashMap<String, ItemExtra>> {
    let content = fs::read_to_string(path).map_err(|e| CatalogError::io(path, e))?;
    Ok(serde_json::from_str(&content)?)
}

fn write_cache(path: &Path, entries: &HashMap<String, ItemExtra>) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| CatalogError::io(parent, e))?;
    }
    let json = serde_json::to_string(entries)?;
    fs::write(path, json).map_err(|e| CatalogError::io(path, e))
}
