pub mod bounce;
pub mod dict_cache;
pub mod queue_id;
pub mod store;
