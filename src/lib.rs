//! slipway - request dispatch engine for buffered HTTP handlers.
//!
//! Given an already-routed request, slipway runs its handler chain (pre
//! interceptors, one terminal handler, post interceptors, after-completion
//! cleanup) through an iterative trampoline with cooperative cancellation and
//! guaranteed response finalization, resolves the terminal handler's declared
//! parameters from path/query/header/body sources through a memoized resolver
//! registry, and serializes the response per negotiated content type.
//!
//! Routing, transport sockets, and pool management live outside this crate;
//! they meet the core at the [`HandlerChain`], [`Transport`], and
//! `prepare`/`reset` seams.

pub mod binding;
pub mod chain;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod media;
pub mod recovery;
pub mod request;
pub mod resolver;
pub mod response;
pub mod transport;

pub use chain::{ChainBuilder, ChainError, HandlerChain, HandlerFn};
pub use config::{ConfigError, EngineConfig};
pub use context::RequestContext;
pub use engine::{AppContext, Engine, EngineBuilder};
pub use error::{
    BindError, DispatchError, ErrorKind, HandlerError, HandlerResult, HttpError, ResolveError,
};
pub use media::MediaType;
pub use recovery::{DefaultErrorHandler, ErrorHandler, ErrorManager, ErrorPayload};
pub use request::Request;
pub use resolver::{
    BindingResolver, ContextResolver, ParameterResolver, ParameterSpec, ResolverRegistry,
    resolving_handler,
};
pub use response::ResponseEntity;
pub use transport::{RecordingTransport, Transport, WireResponse};
