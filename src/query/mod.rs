pub mod ast;
pub mod executor;
pub mod parser;

pub use ast::QueryNode;
pub use executor::{execute, ExecuteOptions, ExecuteResult};
pub use parser::parse_query;
