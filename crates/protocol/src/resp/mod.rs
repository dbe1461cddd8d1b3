//! Redis RESP protocol support: request parsing with multi-key
//! fragmentation (`MGET`/`MSET`/`DEL`) and response parsing for
//! fragment recombination.

mod message;
mod request;
mod response;

pub use message::{RespCommand, RespRequest, RespResponse, RespResponseKind};
pub use request::RespRequestParser;
pub use response::RespResponseParser;
