use crate::index::build::Catalogs;
use crate::index::catalog::Catalog;
use crate::index::types::EntityKind;
use std::collections::BTreeSet;

/// Summary of a built catalog
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogStats {
    pub entity_count: usize,
    pub classes: BTreeSet<String>,
    pub features: BTreeSet<String>,
    pub slots: BTreeSet<String>,
    /// Items whose enrichment lookup failed
    pub missing_data: usize,
    pub token_count: usize,
    pub node_count: usize,
}

impl CatalogStats {
    pub fn collect(catalog: &Catalog) -> Self {
        let mut stats = Self {
            entity_count: catalog.len(),
            token_count: catalog.index().len(),
            node_count: catalog.index().node_count(),
            ..Default::default()
        };

        for entity in catalog.entities() {
            if let Some(class) = &entity.class {
                stats.classes.insert(class.clone());
            }
            if let Some(feature) = &entity.feature {
                stats.features.insert(feature.clone());
            }
            if let Some(slot) = &entity.slot_name {
                stats.slots.insert(slot.clone());
            }
            if entity.missing_data {
                stats.missing_data += 1;
            }
        }

        stats
    }
}

/// Display catalog statistics
pub fn show_stats(catalogs: &Catalogs, kind: EntityKind) {
    let Some(catalog) = catalogs.get(kind) else {
        println!("No {} catalog available.", kind);
        return;
    };
    let stats = CatalogStats::collect(catalog);

    let title = format!("{} Catalog", kind.label());
    println!("{}", title);
    println!("{}", "=".repeat(title.len()));
    println!();
    println!("Entities:         {}", stats.entity_count);
    println!("Distinct tokens:  {}", stats.token_count);
    println!("Index nodes:      {}", stats.node_count);
    if kind == EntityKind::Item {
        println!("Missing XML data: {}", stats.missing_data);
        print_set("Classes", &stats.classes);
        print_set("Slots", &stats.slots);
    }
    print_set("Features", &stats.features);
}

fn print_set(title: &str, values: &BTreeSet<String>) {
    println!();
    println!("{} ({}):", title, values.len());
    for value in values.iter().take(30) {
        println!("  {}", value);
    }
    if values.len() > 30 {
        println!("  ... and {} more", values.len() - 30);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::build::items_from_xml;
    use crate::index::enrich::EnrichmentStore;

    #[test]
    fn test_collect() {
        let xml = br#"<ms2>
  <key id="1" name="Red Potion" class="potion" feature="event" />
  <key id="2" name="Blue Potion" class="potion" />
  <key id="3" name="Old Boots" class="shoes" />
</ms2>"#;
        let catalog = items_from_xml(xml, &EnrichmentStore::default(), 8).unwrap();
        let stats = CatalogStats::collect(&catalog);

        assert_eq!(stats.entity_count, 3);
        assert_eq!(stats.classes.iter().collect::<Vec<_>>(), vec!["potion", "shoes"]);
        assert_eq!(stats.features.len(), 1);
        assert!(stats.slots.is_empty());
        assert_eq!(stats.missing_data, 3);
        assert!(stats.token_count > 0);
    }
}
