mod compiled;
mod descriptor;
mod encode;
mod error;
mod executor;
mod join;
mod mutation;
mod operators;
mod pipeline;
mod predicate;
mod row;
mod shape;
mod sql_writer;
mod table_ref;
mod util;
mod value;

pub use ::anyhow::Context as ErrorContext;
pub use compiled::*;
pub use descriptor::*;
pub use encode::*;
pub use error::*;
pub use executor::*;
pub use join::*;
pub use mutation::*;
pub use operators::*;
pub use pipeline::*;
pub use predicate::*;
pub use row::*;
pub use shape::*;
pub use sql_writer::*;
pub use table_ref::*;
pub use util::*;
pub use value::*;
pub mod stream {
    pub use ::futures::stream::*;
}
pub use ::futures::future;

pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;
