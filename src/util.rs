pub mod endpoint;
pub mod mime;
pub mod path;
pub mod poll;
