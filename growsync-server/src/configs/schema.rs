use crate::models::{EngineConfigTable, RuleTable, Table};

pub struct SchemaManager {
    tables: Vec<Box<dyn Table>>,
}

impl SchemaManager {
    pub fn new(tables: Vec<Box<dyn Table>>) -> Self {
        Self { tables: Self::sort_tables(tables) }
    }

    /// Orders tables so each one follows everything it references.
    fn sort_tables(mut pending: Vec<Box<dyn Table>>) -> Vec<Box<dyn Table>> {
        let mut sorted: Vec<Box<dyn Table>> = Vec::with_capacity(pending.len());

        while !pending.is_empty() {
            let (ready, blocked): (Vec<_>, Vec<_>) = pending.into_iter().partition(|table| {
                table
                    .dependencies()
                    .iter()
                    .all(|dependency| sorted.iter().any(|done| done.name() == *dependency))
            });

            assert!(
                !ready.is_empty(),
                "circular or unresolved table dependencies: {:?}",
                blocked.iter().map(|table| table.name()).collect::<Vec<_>>()
            );

            sorted.extend(ready);
            pending = blocked;
        }

        sorted
    }

    pub fn create_schema(&self) -> Vec<String> {
        self.tables.iter().map(|table| table.create()).collect()
    }

    pub fn dispose_schema(&self) -> Vec<String> {
        self.tables.iter().rev().map(|table| table.dispose()).collect()
    }
}

impl Default for SchemaManager {
    fn default() -> Self {
        SchemaManager::new(vec![Box::new(RuleTable), Box::new(EngineConfigTable)])
    }
}
