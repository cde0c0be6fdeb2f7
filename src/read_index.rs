use crate::alignment::ReadId;
use rustc_hash::FxHashMap;

/// Interns read names as dense numeric ids in first-seen order.
#[derive(Debug, Default)]
pub struct ReadIndex {
    name_to_id: FxHashMap<String, ReadId>,
    names: Vec<String>,
}

impl ReadIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id for `name`, and whether it was newly assigned
    pub fn get_or_insert_id(&mut self, name: &str) -> (ReadId, bool) {
        if let Some(&id) = self.name_to_id.get(name) {
            return (id, false);
        }
        let id = self.names.len() as ReadId;
        self.name_to_id.insert(name.to_owned(), id);
        self.names.push(name.to_owned());
        (id, true)
    }

    pub fn get_id(&self, name: &str) -> Option<ReadId> {
        self.name_to_id.get(name).copied()
    }

    pub fn get_name(&self, id: ReadId) -> Option<&str> {
        self.names.get(id as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_dense_and_stable() {
        let mut index = ReadIndex::new();
        assert_eq!(index.get_or_insert_id("read_a"), (0, true));
        assert_eq!(index.get_or_insert_id("read_b"), (1, true));
        assert_eq!(index.get_or_insert_id("read_a"), (0, false));
        assert_eq!(index.get_id("read_b"), Some(1));
        assert_eq!(index.get_name(1), Some("read_b"));
        assert_eq!(index.get_id("missing"), None);
        assert_eq!(index.len(), 2);
    }
}
