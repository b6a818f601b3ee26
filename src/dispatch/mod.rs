//! Request dispatch: the types a request travels through between the
//! connection coroutine and an application's worker pool.
//!
//! The server builds a [`HandlerRequest`] plus a pooled [`Response`], queues
//! them to the owning application as a [`DispatchJob`], and receives the
//! written response back over the job's reply channel. Interceptors run
//! before the action handler and may short-circuit the chain.

mod core;
mod table;

pub use core::{
    execute, ActionHandler, DispatchJob, Flow, HandlerRequest, HeaderVec, Interceptor, ParamVec,
    Response, MAX_INLINE_HEADERS, MAX_INLINE_PARAMS,
};
pub use table::{ActionRoute, DispatchTable};
