pub mod build_index;
pub mod get_block;
pub mod get_transaction;
pub mod migrate_magic;
pub mod stats;
pub mod verify_index;
