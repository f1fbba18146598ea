use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct MirrorRecordRow {
    pub record_key: String,
    pub body: String,
}
