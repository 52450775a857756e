use indexmap::IndexMap;
use mongodb::bson::{Bson, DateTime, Document, doc};
use serde::{Deserialize, Serialize};

use crate::dao::models::{Timestamp, UserEntity, UserPatch, zeroed_items};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MongoUserDocument {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    seva_points: u32,
    #[serde(default)]
    items_served: IndexMap<String, u32>,
    #[serde(default)]
    is_anonymous: bool,
    #[serde(default)]
    last_active: Option<DateTime>,
}

impl From<UserEntity> for MongoUserDocument {
    fn from(value: UserEntity) -> Self {
        Self {
            id: value.id,
            display_name: value.display_name,
            seva_points: value.seva_points,
            items_served: value.items_served,
            is_anonymous: value.is_anonymous,
            last_active: value.last_active.map(DateTime::from_system_time),
        }
    }
}

impl From<MongoUserDocument> for UserEntity {
    fn from(value: MongoUserDocument) -> Self {
        Self {
            id: value.id,
            display_name: value.display_name,
            seva_points: value.seva_points,
            items_served: value.items_served,
            is_anonymous: value.is_anonymous,
            last_active: value.last_active.map(DateTime::to_system_time),
        }
    }
}

pub fn doc_id(id: &str) -> Document {
    doc! {"_id": id}
}

fn items_document(items: &IndexMap<String, u32>) -> Document {
    items
        .iter()
        .map(|(name, count)| (name.clone(), Bson::Int64(i64::from(*count))))
        .collect()
}

/// Translate a patch into an upserting update document.
///
/// Fields the patch leaves out are only written on insert, so a merge into a
/// missing record yields the same defaults as [`UserEntity::new_anonymous`].
pub fn update_document(patch: &UserPatch) -> Document {
    let mut set = Document::new();
    let mut set_on_insert = Document::new();
    let mut current_date = Document::new();

    match &patch.display_name {
        Some(name) => set.insert("displayName", name.as_str()),
        None => set_on_insert.insert("displayName", ""),
    };
    match patch.seva_points {
        Some(points) => set.insert("sevaPoints", i64::from(points)),
        None => set_on_insert.insert("sevaPoints", 0_i64),
    };
    match &patch.items_served {
        Some(items) => set.insert("itemsServed", items_document(items)),
        None => set_on_insert.insert("itemsServed", items_document(&zeroed_items())),
    };
    match patch.is_anonymous {
        Some(flag) => set.insert("isAnonymous", flag),
        None => set_on_insert.insert("isAnonymous", true),
    };
    match patch.last_active {
        Some(Timestamp::Server) => {
            current_date.insert("lastActive", true);
        }
        Some(Timestamp::At(at)) => {
            set.insert("lastActive", DateTime::from_system_time(at));
        }
        None => {}
    }

    let mut update = Document::new();
    for (operator, fields) in [
        ("$set", set),
        ("$setOnInsert", set_on_insert),
        ("$currentDate", current_date),
    ] {
        if !fields.is_empty() {
            update.insert(operator, fields);
        }
    }
    update
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_only_stamps_last_active() {
        let update = update_document(&UserPatch::touch());

        assert!(update.get_document("$set").is_err());
        let current_date = update.get_document("$currentDate").unwrap();
        assert_eq!(current_date.get_bool("lastActive").unwrap(), true);

        let on_insert = update.get_document("$setOnInsert").unwrap();
        assert_eq!(on_insert.get_str("displayName").unwrap(), "");
        assert_eq!(on_insert.get_bool("isAnonymous").unwrap(), true);
        assert_eq!(on_insert.get_document("itemsServed").unwrap().len(), 5);
    }

    #[test]
    fn set_fields_never_repeat_on_insert() {
        let patch = UserPatch {
            display_name: Some("Amrit".into()),
            seva_points: Some(9),
            ..UserPatch::default()
        };
        let update = update_document(&patch);

        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_str("displayName").unwrap(), "Amrit");
        assert_eq!(set.get_i64("sevaPoints").unwrap(), 9);

        let on_insert = update.get_document("$setOnInsert").unwrap();
        assert!(!on_insert.contains_key("displayName"));
        assert!(!on_insert.contains_key("sevaPoints"));
        assert!(on_insert.contains_key("itemsServed"));
    }
}
