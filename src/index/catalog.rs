use crate::index::trie::PrefixIndex;
use crate::index::types::{Entity, EntityId, EntityKind};
use crate::utils::attribute_token;

/// A fully built, read-only set of entities and their prefix index
///
/// Owns the entities; index postings refer to them by position.
#[derive(Debug)]
pub struct Catalog {
    kind: EntityKind,
    entities: Vec<Entity>,
    index: PrefixIndex,
}

impl Catalog {
    /// Register every token of every entity. Entities must already carry
    /// their final token sets.
    pub fn new(kind: EntityKind, entities: Vec<Entity>) -> Self {
        let mut index = PrefixIndex::new();
        for (position, entity) in entities.iter().enumerate() {
            let id = position as EntityId;
            for token in entity.tokens.iter().filter(|t| !t.is_empty()) {
                index.insert(token, id);
            }
        }

        Self {
            kind,
            entities,
            index,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id as usize)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn index(&self) -> &PrefixIndex {
        &self.index
    }

    /// Exact id lookup through the synthetic `id=` token
    pub fn find_by_id(&self, id: &str) -> Option<&Entity> {
        let bucket = self.index.lookup(&attribute_token("id", Some(id)))?;
        bucket
            .iter()
            .filter_map(|position| self.get(position))
            .find(|entity| entity.id.eq_ignore_ascii_case(id))
    }
}
