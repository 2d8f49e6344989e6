//! Lease table creation

use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, Schema};
use tracing::info;

use crate::entity::leasehold_record;

/// Create the `leasehold_record` table if it does not exist yet
pub async fn create_table(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let mut statement = schema.create_table_from_entity(leasehold_record::Entity);
    statement.if_not_exists();

    db.execute(backend.build(&statement)).await?;
    info!(?backend, "lease table ready");

    Ok(())
}
