pub mod api;
pub mod broker;
pub mod parser;
pub mod source;
pub mod storage;
