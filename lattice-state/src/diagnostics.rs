//! Diagnostics Channel
//!
//! The runtime never aborts on misuse. Anything worth telling the user
//! about (a failing getter, a write to a root structure, an invalid watch
//! path) becomes a [`Diagnostic`]: it is logged through `tracing`, kept in
//! a per-thread buffer that tests can drain with [`take`], and forwarded
//! to a handler if one is installed.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// A watcher getter failed or panicked.
    EvaluationFailure,
    /// A watch callback failed or panicked.
    CallbackFailure,
    /// `set`/`del` was called on something that is not a record or list.
    InvalidTarget,
    /// A key was added to or deleted from a root structure or raw record.
    RootMutation,
    /// A watch expression is not a simple dotted path.
    InvalidWatchPath,
    /// A computed value without a setter was assigned to.
    ComputedWithoutSetter,
    /// A child state mutated one of its props directly.
    PropMutation,
    /// A prop uses a reserved attribute name.
    ReservedKey,
    /// Two definitions (prop, data, computed) claim the same key.
    KeyConflict,
    /// A data factory returned something other than a record.
    InvalidData,
    /// A watcher kept re-queuing itself during a single flush.
    InfiniteUpdateLoop,
}

impl DiagnosticKind {
    /// Failures of user code, as opposed to usage warnings.
    pub fn is_error(self) -> bool {
        matches!(self, Self::EvaluationFailure | Self::CallbackFailure)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    /// Label of the watcher or state the diagnostic originated from.
    pub context: Option<String>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(context) => write!(f, "{} (found in {})", self.message, context),
            None => f.write_str(&self.message),
        }
    }
}

pub type Handler = Rc<dyn Fn(&Diagnostic)>;

thread_local! {
    static BUFFER: RefCell<Vec<Diagnostic>> = const { RefCell::new(Vec::new()) };
    static HANDLER: RefCell<Option<Handler>> = const { RefCell::new(None) };
}

/// Report a diagnostic without context.
pub fn report(kind: DiagnosticKind, message: impl Into<String>) {
    emit(Diagnostic {
        kind,
        message: message.into(),
        context: None,
    });
}

/// Report a diagnostic attributed to a watcher or state.
pub fn report_in(kind: DiagnosticKind, message: impl Into<String>, context: impl Into<String>) {
    emit(Diagnostic {
        kind,
        message: message.into(),
        context: Some(context.into()),
    });
}

fn emit(diagnostic: Diagnostic) {
    if !config::is_silent() {
        if diagnostic.kind.is_error() {
            tracing::error!(kind = ?diagnostic.kind, "{diagnostic}");
        } else {
            tracing::warn!(kind = ?diagnostic.kind, "{diagnostic}");
        }
    }

    let handler = HANDLER.with(|handler| handler.borrow().clone());
    if let Some(handler) = handler {
        handler(&diagnostic);
    }

    BUFFER.with(|buffer| buffer.borrow_mut().push(diagnostic));
}

/// Drain every diagnostic collected on this thread so far.
pub fn take() -> Vec<Diagnostic> {
    BUFFER.with(|buffer| std::mem::take(&mut *buffer.borrow_mut()))
}

/// Install a handler that sees every diagnostic as it is reported.
/// Returns the previously installed handler.
pub fn set_handler(handler: Option<Handler>) -> Option<Handler> {
    HANDLER.with(|current| std::mem::replace(&mut *current.borrow_mut(), handler))
}
