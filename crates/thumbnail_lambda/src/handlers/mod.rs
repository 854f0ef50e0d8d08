pub mod dispatcher;
pub mod invocation;
