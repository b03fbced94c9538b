pub mod config;
pub mod decoders;
pub mod error;
pub mod merger;
pub mod scratch;
pub mod summary;
pub mod util;
