use indexmap::IndexMap;

use super::record::{SyncId, SyncRecord};

/// Outstanding syncs keyed by id, in insertion order.
///
/// Names are a non-unique secondary key: lookups by name return the
/// first match.
#[derive(Debug, Clone, Default)]
pub struct SyncRegistry {
    syncs: IndexMap<SyncId, SyncRecord>,
}

impl SyncRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sync. Returns false (and leaves the stored copy untouched)
    /// if its id is already tracked.
    pub fn add(&mut self, record: SyncRecord) -> bool {
        if self.syncs.contains_key(&record.id) {
            return false;
        }
        self.syncs.insert(record.id, record);
        true
    }

    /// Union with `records`; existing entries win. Returns how many were added.
    pub fn merge(&mut self, records: impl IntoIterator<Item = SyncRecord>) -> usize {
        let mut added = 0;
        for record in records {
            if self.add(record) {
                added += 1;
            }
        }
        added
    }

    pub fn remove(&mut self, id: &SyncId) -> Option<SyncRecord> {
        self.syncs.shift_remove(id)
    }

    pub fn remove_all(&mut self) -> Vec<SyncRecord> {
        self.syncs.drain(..).map(|(_, record)| record).collect()
    }

    /// Look up by id, falling back to the first sync with that name
    pub fn get(&self, key: &str) -> Option<&SyncRecord> {
        key.parse::<SyncId>()
            .ok()
            .and_then(|id| self.syncs.get(&id))
            .or_else(|| self.find_by_name(key))
    }

    pub fn get_by_id(&self, id: &SyncId) -> Option<&SyncRecord> {
        self.syncs.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &SyncId) -> Option<&mut SyncRecord> {
        self.syncs.get_mut(id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&SyncRecord> {
        self.syncs
            .values()
            .find(|record| record.name.as_deref() == Some(name))
    }

    /// Named syncs, in insertion order
    pub fn list(&self) -> Vec<&SyncRecord> {
        self.syncs.values().filter(|record| record.is_named()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.syncs
            .values()
            .filter_map(|record| record.name.clone())
            .collect()
    }

    pub fn contains(&self, id: &SyncId) -> bool {
        self.syncs.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SyncRecord> {
        self.syncs.values()
    }

    pub fn len(&self) -> usize {
        self.syncs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.syncs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn named(name: &str) -> SyncRecord {
        SyncRecord::new(Some(name.to_string()), json!({"url": format!("https://api/{name}")}))
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut registry = SyncRegistry::new();
        let record = named("daily");

        assert!(registry.add(record.clone()));
        let mut changed = record.clone();
        changed.name = Some("renamed".into());
        assert!(!registry.add(changed));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get_by_id(&record.id).unwrap().name.as_deref(), Some("daily"));
    }

    #[test]
    fn test_get_by_id_or_first_name_match() {
        let mut registry = SyncRegistry::new();
        let first = named("report");
        let second = named("report");
        let anonymous = SyncRecord::new(None, json!({}));
        registry.add(first.clone());
        registry.add(second.clone());
        registry.add(anonymous.clone());

        assert_eq!(registry.get("report").unwrap().id, first.id);
        assert_eq!(registry.get(&second.id.to_string()).unwrap().id, second.id);
        assert_eq!(registry.get(&anonymous.id.to_string()).unwrap().id, anonymous.id);
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_list_only_named_in_order() {
        let mut registry = SyncRegistry::new();
        registry.add(named("b"));
        registry.add(SyncRecord::new(None, json!({})));
        registry.add(named("a"));

        assert_eq!(registry.names(), vec!["b".to_string(), "a".to_string()]);
        assert_eq!(registry.list().len(), 2);
    }

    #[test]
    fn test_merge_keeps_local_copies() {
        let mut registry = SyncRegistry::new();
        let mut local = named("daily");
        local.response = Some(Default::default());
        registry.add(local.clone());

        let mut remote = local.clone();
        remote.response = None;
        let added = registry.merge(vec![remote, named("weekly")]);

        assert_eq!(added, 1);
        assert!(registry.get_by_id(&local.id).unwrap().response.is_some());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_remove_and_remove_all() {
        let mut registry = SyncRegistry::new();
        let a = named("a");
        let b = named("b");
        registry.add(a.clone());
        registry.add(b.clone());

        assert!(registry.remove(&a.id).is_some());
        assert!(registry.remove(&a.id).is_none());
        assert_eq!(registry.remove_all().len(), 1);
        assert!(registry.is_empty());
    }
}
