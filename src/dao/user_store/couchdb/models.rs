use std::time::SystemTime;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::CouchDaoError;
use crate::dao::models::UserEntity;

pub const USER_PREFIX: &str = "user::";
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    #[serde(default)]
    pub doc: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchUserDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub user: UserBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBody {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub seva_points: u32,
    #[serde(default)]
    pub items_served: IndexMap<String, u32>,
    #[serde(default)]
    pub is_anonymous: bool,
    #[serde(default)]
    pub last_active: Option<SystemTime>,
}

impl From<(UserEntity, Option<String>)> for CouchUserDocument {
    fn from((user, rev): (UserEntity, Option<String>)) -> Self {
        Self {
            id: user_doc_id(&user.id),
            rev,
            user: UserBody {
                display_name: user.display_name,
                seva_points: user.seva_points,
                items_served: user.items_served,
                is_anonymous: user.is_anonymous,
                last_active: user.last_active,
            },
        }
    }
}

impl TryFrom<CouchUserDocument> for UserEntity {
    type Error = CouchDaoError;

    fn try_from(doc: CouchUserDocument) -> Result<Self, Self::Error> {
        let id = doc
            .id
            .strip_prefix(USER_PREFIX)
            .ok_or_else(|| CouchDaoError::InvalidDocId {
                doc_id: doc.id.clone(),
            })?
            .to_owned();

        Ok(Self {
            id,
            display_name: doc.user.display_name,
            seva_points: doc.user.seva_points,
            items_served: doc.user.items_served,
            is_anonymous: doc.user.is_anonymous,
            last_active: doc.user.last_active,
        })
    }
}

pub fn user_doc_id(id: &str) -> String {
    format!("{USER_PREFIX}{id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_id_is_prefixed_and_stripped() {
        let doc: CouchUserDocument = (UserEntity::new_anonymous("abc"), None).into();
        assert_eq!(doc.id, "user::abc");

        let value = serde_json::to_value(&doc).unwrap();
        assert!(value.get("_rev").is_none());
        assert_eq!(value["isAnonymous"], Value::Bool(true));

        let user = UserEntity::try_from(doc).unwrap();
        assert_eq!(user.id, "abc");
    }

    #[test]
    fn foreign_document_is_rejected() {
        let doc = CouchUserDocument {
            id: "game::1".into(),
            rev: Some("1-a".into()),
            user: UserBody {
                display_name: String::new(),
                seva_points: 0,
                items_served: IndexMap::new(),
                is_anonymous: true,
                last_active: None,
            },
        };
        assert!(matches!(
            UserEntity::try_from(doc),
            Err(CouchDaoError::InvalidDocId { .. })
        ));
    }
}
