//! `SeaORM` entity definitions.

pub mod files;
pub mod sea_orm_active_enums;
