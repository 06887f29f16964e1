//! Handler chains.
//!
//! A chain is the resolved, immutable sequence of steps for one route+method
//! combination: pre-processing interceptors, exactly one terminal (main)
//! handler, post-processing interceptors, then after-completion handlers that
//! run even when earlier steps were cancelled or crashed. One chain is built
//! per route by the external route matcher and shared read-only across every
//! concurrent request context for that route.

use crate::context::RequestContext;
use crate::error::HandlerResult;
use std::sync::Arc;
use thiserror::Error;

/// A single chain step. Handlers read and write through the context's
/// accessor methods and report failure through their return value.
pub type HandlerFn = Arc<dyn Fn(&mut RequestContext) -> HandlerResult + Send + Sync>;

/// Chain construction errors.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("handler chain requires exactly one main handler, got {0}")]
    MainHandlerCount(usize),
}

/// Immutable, phase-indexed sequence of handlers for one resolved route.
///
/// Layout: `[pre...][main][post...][after-completion...]`. The indices are
/// fixed at construction and never change:
/// `0 <= handler_index < after_completion_start <= end_index + 1`.
pub struct HandlerChain {
    handlers: Vec<HandlerFn>,
    handler_index: usize,
    after_completion_start: usize,
    end_index: usize,
    path_variable_names: Vec<String>,
}

impl HandlerChain {
    pub fn builder() -> ChainBuilder {
        ChainBuilder::default()
    }

    /// Index of the terminal (main) handler; everything before it is the
    /// pre phase.
    pub fn handler_index(&self) -> usize {
        self.handler_index
    }

    /// Index of the first after-completion handler (equals `len` when the
    /// chain has none). The response is finalized when the cursor reaches
    /// this boundary.
    pub fn after_completion_start(&self) -> usize {
        self.after_completion_start
    }

    /// Index of the chain's last handler.
    pub fn end_index(&self) -> usize {
        self.end_index
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Path-variable names the route declares, in segment order.
    pub fn path_variable_names(&self) -> &[String] {
        &self.path_variable_names
    }

    pub(crate) fn handler(&self, index: usize) -> &HandlerFn {
        &self.handlers[index]
    }
}

/// Builder collecting handlers per phase.
#[derive(Default)]
pub struct ChainBuilder {
    pre: Vec<HandlerFn>,
    main: Vec<HandlerFn>,
    post: Vec<HandlerFn>,
    after: Vec<HandlerFn>,
    path_variable_names: Vec<String>,
}

impl ChainBuilder {
    /// Add a pre-processing interceptor.
    pub fn pre<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut RequestContext) -> HandlerResult + Send + Sync + 'static,
    {
        self.pre.push(Arc::new(handler));
        self
    }

    /// Set the terminal business handler. Exactly one is required.
    pub fn main<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut RequestContext) -> HandlerResult + Send + Sync + 'static,
    {
        self.main.push(Arc::new(handler));
        self
    }

    /// Add a post-processing interceptor.
    pub fn post<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut RequestContext) -> HandlerResult + Send + Sync + 'static,
    {
        self.post.push(Arc::new(handler));
        self
    }

    /// Add an after-completion handler. These run after the response has been
    /// written, for cleanup and logging, and are never skipped.
    pub fn after_completion<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut RequestContext) -> HandlerResult + Send + Sync + 'static,
    {
        self.after.push(Arc::new(handler));
        self
    }

    /// Declare the route's path-variable names.
    pub fn path_variables<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.path_variable_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> Result<Arc<HandlerChain>, ChainError> {
        if self.main.len() != 1 {
            return Err(ChainError::MainHandlerCount(self.main.len()));
        }

        let handler_index = self.pre.len();
        let after_completion_start = self.pre.len() + 1 + self.post.len();

        let mut handlers = self.pre;
        handlers.extend(self.main);
        handlers.extend(self.post);
        handlers.extend(self.after);
        let end_index = handlers.len() - 1;

        debug_assert!(handler_index < after_completion_start);
        debug_assert!(after_completion_start <= end_index + 1);

        Ok(Arc::new(HandlerChain {
            handlers,
            handler_index,
            after_completion_start,
            end_index,
            path_variable_names: self.path_variable_names,
        }))
    }
}
