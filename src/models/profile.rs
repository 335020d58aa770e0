use serde::{Deserialize, Serialize};

use crate::database::Model;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: i64,
    pub author_id: i64,
    pub bio: Option<String>,
    pub website: Option<String>,
}

impl Model for Profile {
    const TABLE: &'static str = "profiles";
}
