use serde::{Deserialize, Serialize};

use crate::database::{Database, DbError, Model};

use super::Profile;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(default, rename = "profiles", skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
}

impl Model for Author {
    const TABLE: &'static str = "authors";
}

impl Author {
    pub async fn find_with_profile(db: &Database, id: i64) -> Result<Option<Self>, DbError> {
        let record = Self::query()
            .has_one::<Profile>("author_id")
            .find(db, id)
            .await?;
        Ok(record.map(|r| r.into_model()).transpose()?)
    }
}
