//! VM execution tracing.
//!
//! Mirrors the teacher's trait-based tracer: a [`VmTracer`] with default
//! no-op hooks, monomorphized into [`crate::interp::Interpreter`] so the
//! production [`NoopTracer`] path compiles away entirely.

use crate::bytecode::Opcode;

/// Hook points the interpreter fires at key execution events.
///
/// All methods default to no-ops; implementations override only the hooks
/// they need.
pub trait VmTracer: std::fmt::Debug {
    /// Called before each opcode dispatch in the run loop. The hottest hook —
    /// keep implementations cheap.
    #[inline(always)]
    fn on_opcode(&mut self, _ip: usize, _opcode: Opcode, _stack_depth: usize) {}

    /// Called when `Call`/`CallStatement`/`CreateObject` resolves a proc and
    /// is about to invoke it.
    #[inline(always)]
    fn on_call(&mut self, _proc_name: &str, _scope_depth: usize) {}

    /// Called when the run loop is about to unwind with `error`.
    #[inline(always)]
    fn on_error(&mut self, _error: &crate::error::RuntimeError) {}
}

/// Zero-cost production default: every hook is the trait's no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl VmTracer for NoopTracer {}

/// Human-readable execution log to stderr, useful for interactive debugging.
#[derive(Debug, Default)]
pub struct StderrTracer {
    limit: Option<usize>,
    count: usize,
}

impl StderrTracer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self { limit: Some(limit), count: 0 }
    }
}

impl VmTracer for StderrTracer {
    fn on_opcode(&mut self, ip: usize, opcode: Opcode, stack_depth: usize) {
        if let Some(limit) = self.limit {
            if self.count >= limit {
                return;
            }
        }
        eprintln!("[{ip:>5}] {opcode:?}  stack={stack_depth}");
        self.count += 1;
    }

    fn on_call(&mut self, proc_name: &str, scope_depth: usize) {
        eprintln!("  >>> call {proc_name}  scopes={scope_depth}");
    }

    fn on_error(&mut self, error: &crate::error::RuntimeError) {
        eprintln!("  !!! error: {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_tracer_is_inert() {
        let mut t = NoopTracer;
        t.on_opcode(0, Opcode::Return, 0);
        t.on_call("x", 1);
    }
}
