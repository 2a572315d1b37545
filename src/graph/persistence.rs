//! Family graph persistence
//!
//! Each family graph is stored as a single JSON blob keyed by family id.

use super::FamilyGraph;
use crate::error::StorageError;

const GRAPH_TREE: &str = "family_graphs";

/// Storage port for whole family graphs.
pub trait GraphRepository: Send + Sync {
    fn load(&self, family_id: &str) -> Result<Option<FamilyGraph>, StorageError>;
    fn save(&self, graph: &FamilyGraph) -> Result<(), StorageError>;
    fn delete(&self, family_id: &str) -> Result<bool, StorageError>;
    fn list(&self) -> Result<Vec<String>, StorageError>;
}

/// Sled-backed graph repository
pub struct SledGraphRepository {
    tree: sled::Tree,
}

impl SledGraphRepository {
    pub fn from_db(db: &sled::Db) -> Result<Self, StorageError> {
        Ok(Self {
            tree: db.open_tree(GRAPH_TREE)?,
        })
    }
}

impl GraphRepository for SledGraphRepository {
    fn load(&self, family_id: &str) -> Result<Option<FamilyGraph>, StorageError> {
        match self.tree.get(family_id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn save(&self, graph: &FamilyGraph) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(graph)?;
        self.tree.insert(graph.family_id().as_bytes(), bytes)?;
        self.tree.flush()?;
        Ok(())
    }

    fn delete(&self, family_id: &str) -> Result<bool, StorageError> {
        let removed = self.tree.remove(family_id.as_bytes())?.is_some();
        self.tree.flush()?;
        Ok(removed)
    }

    fn list(&self) -> Result<Vec<String>, StorageError> {
        let mut ids = Vec::new();
        for entry in self.tree.iter() {
            let (key, _) = entry?;
            ids.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{PersonData, PersonPatch, RelationshipKind};
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn graphs_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let mut graph = FamilyGraph::new("okafor");
        let a = graph.add_person(PersonData::new("Ada")).unwrap();
        let b = graph.add_person(PersonData::new("Obi")).unwrap();
        graph.add_relationship(&a.id, &b.id, RelationshipKind::ParentChild, None);

        {
            let db = sled::open(dir.path()).unwrap();
            let repo = SledGraphRepository::from_db(&db).unwrap();
            repo.save(&graph).unwrap();
        }

        let db = sled::open(dir.path()).unwrap();
        let repo = SledGraphRepository::from_db(&db).unwrap();
        assert_eq!(repo.load("okafor").unwrap(), Some(graph));
        assert_eq!(repo.list().unwrap(), vec!["okafor".to_string()]);
        assert!(repo.load("other").unwrap().is_none());
        assert!(repo.delete("okafor").unwrap());
        assert!(!repo.delete("okafor").unwrap());
    }

    #[test]
    fn reserved_attribute_keys_reload_from_sled() {
        let dir = TempDir::new().unwrap();
        let mut graph = FamilyGraph::new("mensah");
        let person = graph
            .add_person(PersonData::new("Akua").with_attribute("role", json!("aunt")))
            .unwrap();
        let mut patch = PersonPatch::default();
        patch.extra.insert("full_name".to_string(), json!("Akua Mensah"));
        patch.extra.insert("village".to_string(), json!("Aburi"));
        graph.update_person(&person.id, &patch).unwrap();

        let db = sled::open(dir.path()).unwrap();
        let repo = SledGraphRepository::from_db(&db).unwrap();
        repo.save(&graph).unwrap();
        let reloaded = repo.load("mensah").unwrap().unwrap();

        assert_eq!(reloaded, graph);
        let stored = reloaded.person(&person.id).unwrap();
        assert_eq!(stored.data.full_name, "Akua Mensah");
        assert_eq!(stored.data.role.as_deref(), Some("aunt"));
        assert_eq!(stored.data.extra.get("village"), Some(&json!("Aburi")));
        assert_eq!(stored.data.extra.len(), 1);
    }
}
