//! Diesel row structs for the session store.

use chrono::NaiveDateTime;
use diesel::prelude::*;

use crate::schema;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = schema::sessions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct StoredSession {
    pub device_name: String,
    pub format_version: i32,
    /// `SessionRecord` as JSON.
    pub record: String,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::sessions)]
pub struct NewStoredSession<'a> {
    pub device_name: &'a str,
    pub format_version: i32,
    pub record: String,
    pub updated_at: NaiveDateTime,
}
