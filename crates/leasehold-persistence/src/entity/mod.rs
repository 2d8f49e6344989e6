//! `SeaORM` entities

pub mod leasehold_record;

pub mod prelude {
    pub use super::leasehold_record::Entity as LeaseholdRecord;
}
