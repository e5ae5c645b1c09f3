use diesel::prelude::*;

use crate::{
    records::StoreResult,
    schema::entities::dsl as en,
    universe::Entity,
};

/// Supplies the entities a run must consider, in stable lexical symbol order.
pub trait UniverseProvider {
    fn list_entities(&self, conn: &mut SqliteConnection) -> StoreResult<Vec<Entity>>;
}

/// Active rows of the `entities` table.
#[derive(Debug, Default, Clone, Copy)]
pub struct StoredUniverse;

impl UniverseProvider for StoredUniverse {
    fn list_entities(&self, conn: &mut SqliteConnection) -> StoreResult<Vec<Entity>> {
        let rows: Vec<(String, Option<String>)> = en::entities
            .filter(en::is_active.eq(true))
            .order(en::symbol.asc())
            .select((en::symbol, en::name))
            .load(conn)?;
        Ok(rows
            .into_iter()
            .map(|(symbol, name)| Entity { symbol, name })
            .collect())
    }
}

/// A fixed in-memory universe. Sorted and de-duplicated on construction.
#[derive(Debug, Clone, Default)]
pub struct StaticUniverse {
    entities: Vec<Entity>,
}

impl StaticUniverse {
    pub fn new(entities: impl IntoIterator<Item = Entity>) -> Self {
        let mut entities: Vec<Entity> = entities.into_iter().collect();
        entities.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        entities.dedup_by(|a, b| a.symbol == b.symbol);
        Self { entities }
    }

    pub fn from_symbols<S: AsRef<str>>(symbols: impl IntoIterator<Item = S>) -> Self {
        Self::new(symbols.into_iter().map(|s| Entity::new(s.as_ref())))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl UniverseProvider for StaticUniverse {
    fn list_entities(&self, _conn: &mut SqliteConnection) -> StoreResult<Vec<Entity>> {
        Ok(self.entities.clone())
    }
}

impl<U: UniverseProvider + ?Sized> UniverseProvider for &U {
    fn list_entities(&self, conn: &mut SqliteConnection) -> StoreResult<Vec<Entity>> {
        (**self).list_entities(conn)
    }
}
