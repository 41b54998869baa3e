//! Application services: writer, sweeper, stream and publisher.

pub mod change_stream;
pub mod event_writer;
pub mod publish;
pub mod retention;
