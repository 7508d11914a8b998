use anyhow::Result;
use rusqlite::params;

use crate::db::{connection::Database, models::ItemType};

impl Database {
    pub async fn list_item_types(&self) -> Result<Vec<ItemType>> {
        self.execute(|conn| {
            let mut stmt =
                conn.prepare("SELECT name, description FROM item_types ORDER BY name ASC")?;
            let items = stmt
                .query_map([], |row| {
                    Ok(ItemType {
                        name: row.get(0)?,
                        description: row.get(1)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(items)
        })
        .await
    }

    /// Adds catalog entries, updating descriptions of names already present.
    pub async fn import_item_types(&self, items: Vec<ItemType>) -> Result<usize> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let mut written = 0;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO item_types (name, description) VALUES (?1, ?2)
                     ON CONFLICT(name) DO UPDATE SET description = excluded.description",
                )?;
                for item in &items {
                    written += stmt.execute(params![item.name, item.description])?;
                }
            }
            tx.commit()?;
            Ok(written)
        })
        .await
    }
}
