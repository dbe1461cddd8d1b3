//! Memcached-ASCII request and response parsers, plus the warm-up
//! rewrite that turns a parsed `VALUE` response into a synthesised
//! `set ... noreply` request.

mod message;
mod request;
mod response;
mod warmup;

pub use message::{
    MemcacheOpcode, MemcacheRequest, MemcacheResponse, MemcacheResponseKind,
};
pub use request::RequestParser;
pub use response::ResponseParser;
pub use warmup::build_warmup_request;
