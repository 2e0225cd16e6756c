// Engine modules: encoding, matching, paging, storage, scans, and mutations.
pub mod codec;
pub mod error;
pub mod mutate;
pub mod page;
pub mod predicate;
pub mod scan;
pub mod store;
