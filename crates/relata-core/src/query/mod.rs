//! Query construction, planning, and result mapping.

mod builder;
mod eager;
mod mapper;
mod page;
mod predicate;

pub use builder::QueryBuilder;
pub use eager::EagerPath;
pub use mapper::RowContext;
pub use page::Page;
