use crate::index::catalog::Catalog;
use crate::index::enrich::{EnrichmentSource, EnrichmentStore};
use crate::index::error::{CatalogError, Result};
use crate::index::stats::CatalogStats;
use crate::index::types::{BuildOptions, Entity, EntityKind, MISSING_DATA_TOKEN, pad_id};
use crate::index::xml::{XmlElement, parse_document};
use crate::utils::{AppConfig, PathsConfig, attribute_token, tokenize};
use anyhow::Context;
use rayon::prelude::*;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Tag of the records in the primary descriptor files
const RECORD_TAG: &str = "key";

/// Both catalogs; either may be missing when its sources failed to load
#[derive(Debug, Default, Clone)]
pub struct Catalogs {
    pub items: Option<Arc<Catalog>>,
    pub maps: Option<Arc<Catalog>>,
}

impl Catalogs {
    pub fn get(&self, kind: EntityKind) -> Option<&Arc<Catalog>> {
        match kind {
            EntityKind::Item => self.items.as_ref(),
            EntityKind::Map => self.maps.as_ref(),
        }
    }
}

/// Load `paths.json` from the app config and build every catalog it names.
///
/// Only a missing or unreadable paths record is an error; each catalog's own
/// failures are logged and leave that catalog absent.
pub fn load_catalogs(config: &AppConfig, silent: bool) -> anyhow::Result<Catalogs> {
    let paths = PathsConfig::load(&config.paths_file)
        .context("Catalog sources are not configured")?;

    let options = BuildOptions {
        id_width: config.id_width,
        use_enrichment_cache: config.use_enrichment_cache,
        enrichment_cache: Some(config.enrichment_cache_path()?),
        silent,
    };

    Ok(build_catalogs(&paths, &options))
}

/// Build items and maps independently
pub fn build_catalogs(paths: &PathsConfig, options: &BuildOptions) -> Catalogs {
    let items = match build_item_catalog(paths, options) {
        Ok(catalog) => Some(Arc::new(catalog)),
        Err(e) => {
            log::error!("Item catalog unavailable: {}", e);
            None
        }
    };

    let maps = match &paths.mapname_xml_path {
        Some(path) => match build_map_catalog(path, options) {
            Ok(catalog) => Some(Arc::new(catalog)),
            Err(e) => {
                log::error!("Map catalog unavailable: {}", e);
                None
            }
        },
        None => {
            log::info!("No map descriptor configured");
            None
        }
    };

    Catalogs { items, maps }
}

/// Parse the item descriptor, enrich it and index it
pub fn build_item_catalog(paths: &PathsConfig, options: &BuildOptions) -> Result<Catalog> {
    let start = Instant::now();
    let root = read_document(&paths.itemname_xml_path)?;

    let source = EnrichmentSource {
        item_xml_dir: paths.item_xml_path.clone(),
        image_root: paths.image_folder_path.clone(),
        cache_path: options.enrichment_cache.clone(),
        use_cache: options.use_enrichment_cache,
        silent: options.silent,
    };

    let mut entities = parse_item_records(&root, options.id_width);
    let ids: Vec<String> = entities.iter().map(|e| e.id.clone()).collect();
    let enrichment = EnrichmentStore::load(&source, &ids);
    compute_tokens(&mut entities, Some(&enrichment));

    let catalog = Catalog::new(EntityKind::Item, entities);
    log_summary(&catalog, start);
    Ok(catalog)
}

/// Parse the map descriptor and index it
pub fn build_map_catalog(mapname_xml_path: &Path, options: &BuildOptions) -> Result<Catalog> {
    let start = Instant::now();
    let root = read_document(mapname_xml_path)?;

    let mut entities = parse_map_records(&root, options.id_width);
    compute_tokens(&mut entities, None);

    let catalog = Catalog::new(EntityKind::Map, entities);
    log_summary(&catalog, start);
    Ok(catalog)
}

/// Build an item catalog from in-memory descriptor bytes
pub fn items_from_xml(xml: &[u8], enrichment: &EnrichmentStore, id_width: usize) -> Result<Catalog> {
    let root = parse_document(xml)?;
    let mut entities = parse_item_records(&root, id_width);
    compute_tokens(&mut entities, Some(enrichment));
    Ok(Catalog::new(EntityKind::Item, entities))
}

/// Build a map catalog from in-memory descriptor bytes
pub fn maps_from_xml(xml: &[u8], id_width: usize) -> Result<Catalog> {
    let root = parse_document(xml)?;
    let mut entities = parse_map_records(&root, id_width);
    compute_tokens(&mut entities, None);
    Ok(Catalog::new(EntityKind::Map, entities))
}

fn read_document(path: &Path) -> Result<XmlElement> {
    let bytes = fs::read(path).map_err(|e| CatalogError::io(path, e))?;
    parse_document(&bytes).map_err(|e| CatalogError::Document {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Item records; records without a name are not items and are skipped
pub fn parse_item_records(root: &XmlElement, id_width: usize) -> Vec<Entity> {
    root.children_named(RECORD_TAG)
        .filter_map(|record| {
            let name = record.attr("name")?;
            let name = name.replacen("(F)", "(Female)", 1).replacen("(M)", "(Male)", 1);
            Some(base_entity(EntityKind::Item, record, name, id_width))
        })
        .collect()
}

/// Map records; every record is kept
pub fn parse_map_records(root: &XmlElement, id_width: usize) -> Vec<Entity> {
    root.children_named(RECORD_TAG)
        .map(|record| {
            let name = record.attr("name").unwrap_or_default().to_string();
            base_entity(EntityKind::Map, record, name, id_width)
        })
        .collect()
}

fn base_entity(kind: EntityKind, record: &XmlElement, name: String, id_width: usize) -> Entity {
    Entity {
        kind,
        id: pad_id(record.attr("id").unwrap_or_default(), id_width),
        name,
        class: normalize_attribute(record.attr("class")),
        feature: normalize_attribute(record.attr("feature")),
        slot_name: None,
        icon_path: None,
        tokens: Vec::new(),
        missing_data: false,
    }
}

/// Empty → absent; internal spaces → underscores so the value stays one token
fn normalize_attribute(value: Option<&str>) -> Option<String> {
    value
        .filter(|v| !v.is_empty())
        .map(|v| v.replace(' ', "_"))
}

/// Derive every entity's final token set in parallel
fn compute_tokens(entities: &mut [Entity], enrichment: Option<&EnrichmentStore>) {
    entities.par_iter_mut().for_each(|entity| {
        let mut tokens = tokenize(&entity.name);
        tokens.push(attribute_token("id", Some(&entity.id)));
        if entity.kind == EntityKind::Item {
            tokens.push(attribute_token("class", entity.class.as_deref()));
        }
        tokens.push(attribute_token("feature", entity.feature.as_deref()));

        if let Some(store) = enrichment {
            match store.get(&entity.id) {
                Some(extra) => {
                    entity.slot_name = extra.slot_name.clone();
                    entity.icon_path = extra.icon_path.clone();
                    entity.missing_data = false;
                }
                None => {
                    entity.missing_data = true;
                    tokens.push(MISSING_DATA_TOKEN.to_string());
                }
            }
            tokens.push(attribute_token("slot", entity.slot_name.as_deref()));
        }

        entity.tokens = tokens;
    });
}

fn log_summary(catalog: &Catalog, start: Instant) {
    let stats = CatalogStats::collect(catalog);
    log::info!(
        "Indexed {} {}s ({} tokens) in {:.1}ms",
        stats.entity_count,
        catalog.kind(),
        catalog.index().len(),
        start.elapsed().as_secs_f64() * 1000.0
    );
    if stats.missing_data > 0 {
        log::info!("{} {}s have no enrichment data", stats.missing_data, catalog.kind());
    }
    log::debug!("Classes: {:?}", stats.classes);
    log::debug!("Features: {:?}", stats.features);
    log::debug!("Slots: {:?}", stats.slots);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::enrich::ItemExtra;
    use std::collections::HashMap;

    const ITEMNAME_XML: &[u8] = br#"<ms2>
  <key id="1" name="Red Potion" class="consumable item" feature="" />
  <key id="11000001" name="Hero Sword (M)" class="" feature="Global Event" />
  <key id="11000002" />
</ms2>"#;

    const MAPNAME_XML: &[u8] = br#"<ms2>
  <key id="2000001" name="Tria" feature="city" />
  <key id="2000002" />
</ms2>"#;

    fn enrichment() -> EnrichmentStore {
        let mut entries = HashMap::new();
        entries.insert(
            "11000001".to_string(),
            ItemExtra {
                icon_path: Some("/item/icon/sword.png".to_string()),
                slot_name: Some("RH".to_string()),
                ..Default::default()
            },
        );
        EnrichmentStore::from_entries(entries)
    }

    #[test]
    fn test_item_records() {
        let catalog = items_from_xml(ITEMNAME_XML, &enrichment(), 8).unwrap();
        assert_eq!(catalog.len(), 2);

        let potion = &catalog.entities()[0];
        assert_eq!(potion.id, "00000001");
        assert_eq!(potion.class.as_deref(), Some("consumable_item"));
        assert!(potion.feature.is_none());

        let sword = &catalog.entities()[1];
        assert_eq!(sword.name, "Hero Sword (Male)");
        assert!(sword.class.is_none());
        assert_eq!(sword.feature.as_deref(), Some("Global_Event"));
    }

    #[test]
    fn test_item_tokens() {
        let catalog = items_from_xml(ITEMNAME_XML, &enrichment(), 8).unwrap();

        let sword = &catalog.entities()[1];
        for token in ["hero", "sword", "male", "id=11000001", "class=undefined", "feature=Global_Event", "slot=RH"] {
            assert!(sword.tokens.iter().any(|t| t == token), "missing {}", token);
        }
        assert!(!sword.missing_data);
        assert_eq!(sword.icon_path.as_deref(), Some("/item/icon/sword.png"));
    }

    #[test]
    fn test_missing_enrichment_marks_entity() {
        let catalog = items_from_xml(ITEMNAME_XML, &enrichment(), 8).unwrap();

        let potion = &catalog.entities()[0];
        assert!(potion.missing_data);
        assert!(potion.tokens.iter().any(|t| t == "slot=undefined"));
        assert!(potion.tokens.iter().any(|t| t == MISSING_DATA_TOKEN));
        // still searchable by name
        assert!(catalog.index().search("potion").contains(0));
    }

    #[test]
    fn test_map_records() {
        let catalog = maps_from_xml(MAPNAME_XML, 8).unwrap();
        assert_eq!(catalog.len(), 2);

        let tria = &catalog.entities()[0];
        assert_eq!(tria.id, "02000001");
        assert!(tria.tokens.iter().any(|t| t == "feature=city"));
        assert!(!tria.tokens.iter().any(|t| t.starts_with("class=")));
        assert!(!tria.tokens.iter().any(|t| t.starts_with("slot=")));
        assert!(!tria.missing_data);
    }

    #[test]
    fn test_rebuild_is_deterministic() {
        let a = items_from_xml(ITEMNAME_XML, &enrichment(), 8).unwrap();
        let b = items_from_xml(ITEMNAME_XML, &enrichment(), 8).unwrap();
        assert_eq!(a.entities(), b.entities());
    }

    #[test]
    fn test_invalid_descriptor() {
        assert!(items_from_xml(b"<ms2><key", &EnrichmentStore::default(), 8).is_err());
    }
}
