//! Resource groups: named, curated URL collections that outlive live tabs.
//! Workspaces reference them by id through `resource_group_ids`.

use rusqlite::{params, OptionalExtension};

use crate::{now_ms, Store, StoreError};

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceGroup {
    pub id: i64,
    pub name: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: i64,
    pub group_id: i64,
    pub url: String,
    pub title: String,
    pub created_at: i64,
}

pub struct ResourceRepository<'a> {
    db: &'a Store,
}

impl<'a> ResourceRepository<'a> {
    pub fn new(db: &'a Store) -> Self {
        Self { db }
    }

    pub fn create_group(&self, name: &str) -> Result<ResourceGroup, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::Validation(
                "resource group name must not be empty".into(),
            ));
        }
        let now = now_ms();
        self.db.conn().execute(
            "INSERT INTO resource_groups (name, created_at) VALUES (?1, ?2)",
            params![name, now],
        )?;
        Ok(ResourceGroup {
            id: self.db.conn().last_insert_rowid(),
            name: name.to_string(),
            created_at: now,
        })
    }

    pub fn get_group(&self, id: i64) -> Result<ResourceGroup, StoreError> {
        let row = self
            .db
            .conn()
            .query_row(
                "SELECT id, name, created_at FROM resource_groups WHERE id = ?1",
                params![id],
                |row| {
                    Ok(ResourceGroup {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        row.ok_or(StoreError::ResourceGroupNotFound)
    }

    pub fn add_resource(
        &self,
        group_id: i64,
        url: &str,
        title: &str,
    ) -> Result<Resource, StoreError> {
        if url.trim().is_empty() {
            return Err(StoreError::Validation("resource url must not be empty".into()));
        }
        // Surface a domain error instead of a foreign key failure.
        self.get_group(group_id)?;

        let now = now_ms();
        self.db.conn().execute(
            "INSERT INTO resources (group_id, url, title, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![group_id, url, title, now],
        )?;
        Ok(Resource {
            id: self.db.conn().last_insert_rowid(),
            group_id,
            url: url.to_string(),
            title: title.to_string(),
            created_at: now,
        })
    }

    pub fn list_group_resources(&self, group_id: i64) -> Result<Vec<Resource>, StoreError> {
        let mut stmt = self.db.conn().prepare(
            "SELECT id, group_id, url, title, created_at FROM resources \
             WHERE group_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![group_id], |row| {
            Ok(Resource {
                id: row.get(0)?,
                group_id: row.get(1)?,
                url: row.get(2)?,
                title: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Distinct URLs across a set of resource groups. Cleaning passes use
    /// this to decide which tabs count as resource tabs.
    pub fn list_urls_for_groups(&self, group_ids: &[i64]) -> Result<Vec<String>, StoreError> {
        if group_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT DISTINCT url FROM resources WHERE group_id IN ({}) ORDER BY url",
            placeholders(group_ids.len())
        );
        let values: Vec<&dyn rusqlite::ToSql> =
            group_ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
        let mut stmt = self.db.conn().prepare(&sql)?;
        let rows = stmt.query_map(values.as_slice(), |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

fn placeholders(count: usize) -> String {
    let mut out = String::new();
    for i in 0..count {
        if i > 0 {
            out.push_str(", ");
        }
        out.push('?');
    }
    out
}
