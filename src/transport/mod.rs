//! Transports for embedded (stdio) use; the HTTP transports live in the
//! gateway router

pub mod stdio;
