use tracing::Span;

/// Logging handle and switches shared by every component of one run.
///
/// Created once per process invocation and handed to each component at
/// construction; components log inside `span`.
#[derive(Clone, Debug)]
pub struct EvalContext {
    pub verbose: bool,
    pub span: Span,
}

impl EvalContext {
    pub fn new() -> Self {
        Self {
            verbose: false,
            span: tracing::info_span!("cellseg_eval"),
        }
    }

    /// Enable per-file debug output
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Same switches, logging under a child span named after `component`
    pub fn child(&self, component: &'static str) -> Self {
        Self {
            verbose: self.verbose,
            span: tracing::info_span!(parent: &self.span, "component", name = component),
        }
    }
}

impl Default for EvalContext {
    fn default() -> Self {
        Self::new()
    }
}
