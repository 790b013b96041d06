use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named bag of scraped fields produced by a spider callback.
///
/// Identity is the `item_name`, defaulting to a caller-chosen type tag
/// (the reference implementation renames the Python class itself; here the
/// tag is just a field since Rust has no runtime class renaming).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub item_name: String,
    #[serde(flatten)]
    pub values: HashMap<String, Value>,
}

impl Item {
    pub fn new(item_name: impl Into<String>) -> Self {
        Self {
            item_name: item_name.into(),
            values: HashMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_values() {
        let item = Item::new("Product").with("title", "Widget").with("price", 9.99);
        assert_eq!(item.item_name, "Product");
        assert_eq!(item.get("title").unwrap(), "Widget");
    }
}
