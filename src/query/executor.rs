use crate::index::catalog::Catalog;
use crate::index::types::{Entity, EntityId};
use crate::utils::{is_unfiltered, tokenize};
use roaring::RoaringBitmap;

/// Result of a query against one catalog
#[derive(Debug, Clone)]
pub enum QueryResult<'a> {
    /// Unfiltered query: the whole catalog in insertion order
    All(&'a [Entity]),
    /// Entities matching every token, in ascending catalog order
    Matches(Vec<&'a Entity>),
}

impl<'a> QueryResult<'a> {
    pub fn len(&self) -> usize {
        match self {
            QueryResult::All(entities) => entities.len(),
            QueryResult::Matches(matches) => matches.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<&'a Entity> {
        match self {
            QueryResult::All(entities) => entities.get(index),
            QueryResult::Matches(matches) => matches.get(index).copied(),
        }
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = &'a Entity> + '_> {
        match self {
            QueryResult::All(entities) => Box::new(entities.iter()),
            QueryResult::Matches(matches) => Box::new(matches.iter().copied()),
        }
    }

    pub fn to_vec(&self) -> Vec<&'a Entity> {
        self.iter().collect()
    }
}

/// Multi-token prefix search over a built catalog
pub struct QueryEngine<'a> {
    catalog: &'a Catalog,
}

impl<'a> QueryEngine<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Tokenize `search` and return every entity matching all tokens by prefix.
    ///
    /// An empty search (after normalization) returns the full catalog.
    pub fn query(&self, search: &str) -> QueryResult<'a> {
        let tokens = tokenize(search);
        if is_unfiltered(&tokens) {
            return QueryResult::All(self.catalog.entities());
        }

        let matches = self
            .query_tokens(&tokens)
            .into_iter()
            .filter_map(|id| self.catalog.get(id))
            .collect();
        QueryResult::Matches(matches)
    }

    /// Intersect the prefix buckets of `tokens`, smallest bucket first
    pub fn query_tokens(&self, tokens: &[String]) -> Vec<EntityId> {
        if is_unfiltered(tokens) {
            return (0..self.catalog.len() as EntityId).collect();
        }

        let mut buckets: Vec<&RoaringBitmap> = Vec::with_capacity(tokens.len());
        for token in tokens {
            match self.catalog.index().lookup(token) {
                Some(bucket) => buckets.push(bucket),
                // One token without matches empties the whole intersection
                None => return Vec::new(),
            }
        }

        buckets.sort_by_key(|bucket| bucket.len());

        let Some((smallest, rest)) = buckets.split_first() else {
            return Vec::new();
        };
        let mut result = (*smallest).clone();
        for bucket in rest {
            if result.is_empty() {
                break;
            }
            result &= *bucket;
        }

        result.iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::build::items_from_xml;
    use crate::index::enrich::EnrichmentStore;

    const XML: &[u8] = br#"<ms2>
  <key id="1" name="Rare Potion" class="potion" />
  <key id="2" name="Common Potion" class="potion" />
  <key id="3" name="Rare Sword" class="weapon" />
  <key id="4" name="Potion Bag" class="bag" />
</ms2>"#;

    fn catalog() -> Catalog {
        items_from_xml(XML, &EnrichmentStore::default(), 8).unwrap()
    }

    fn ids(result: &QueryResult) -> Vec<String> {
        result.iter().map(|e| e.id.clone()).collect()
    }

    #[test]
    fn test_empty_query_returns_everything() {
        let catalog = catalog();
        let engine = QueryEngine::new(&catalog);

        let result = engine.query("");
        assert!(matches!(result, QueryResult::All(_)));
        assert_eq!(result.len(), 4);

        // Normalizes to nothing as well
        assert_eq!(engine.query("  ()  ").len(), 4);
    }

    #[test]
    fn test_multi_token_intersection() {
        let catalog = catalog();
        let engine = QueryEngine::new(&catalog);

        let result = engine.query("rare potion");
        assert_eq!(ids(&result), vec!["00000001"]);

        let tokens = vec!["rare".to_string(), "potion".to_string()];
        assert_eq!(engine.query_tokens(&tokens), vec![0]);
    }

    #[test]
    fn test_prefix_tokens() {
        let catalog = catalog();
        let engine = QueryEngine::new(&catalog);

        assert_eq!(ids(&engine.query("pot")), vec!["00000001", "00000002", "00000004"]);
        assert_eq!(ids(&engine.query("class=pot")), vec!["00000001", "00000002"]);
        assert_eq!(ids(&engine.query("id=00000003")), vec!["00000003"]);
    }

    #[test]
    fn test_order_follows_catalog() {
        let catalog = catalog();
        let engine = QueryEngine::new(&catalog);

        // Smallest bucket ("sword") first, but results stay in catalog order
        let result = engine.query("rare sw");
        assert_eq!(ids(&result), vec!["00000003"]);
        let result = engine.query("potion");
        assert_eq!(ids(&result), vec!["00000001", "00000002", "00000004"]);
    }

    #[test]
    fn test_no_match() {
        let catalog = catalog();
        let engine = QueryEngine::new(&catalog);

        assert!(engine.query("shield").is_empty());
        assert!(engine.query("rare zzz").is_empty());
    }

    #[test]
    fn test_case_insensitive() {
        let catalog = catalog();
        let engine = QueryEngine::new(&catalog);
        assert_eq!(engine.query("RARE Sword").len(), 1);
    }

    #[test]
    fn test_no_duplicates() {
        let catalog = catalog();
        let engine = QueryEngine::new(&catalog);
        // "potion" matches both the name and the class of the first two entities
        let result = engine.query("potion potion");
        assert_eq!(result.len(), 3);
    }
}
