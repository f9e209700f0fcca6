//! Persistent REPL session: a single long-lived `World`, one
//! lex+parse+evaluate cycle per input line, no AST retained or replayed
//! across turns. The `World` carries state forward exactly the way a file
//! run would, so a REPL session is indistinguishable from a script that grew
//! one line at a time.

use std::cell::RefCell;
use std::rc::Rc;

use crate::config::RuntimeConfig;
use crate::context::Context;
use crate::error::EarlResult;
use crate::eval::{eval_program, Evaluator};
use crate::io::PrintWriter;
use crate::module_loader::ModuleLoader;
use crate::value::Value;

/// One REPL's persistent state: the `World` every line evaluates into, plus
/// the module cache threaded across turns the same way a single file run
/// would see it.
pub struct ReplSession {
    world: Rc<RefCell<Context>>,
    loader: ModuleLoader,
    cfg: RuntimeConfig,
    /// Set by a `stop()` call (e.g. a host-side Ctrl-D/`exit` keystroke
    /// handler); `eval_line` still runs, but callers should check this after
    /// each turn and end the loop once it is `true`.
    stopped: bool,
}

impl ReplSession {
    #[must_use]
    pub fn new(cfg: RuntimeConfig) -> Self {
        Self { world: Context::new_world(Rc::from("<repl>")), loader: ModuleLoader::new(cfg.include.iter().map(std::path::PathBuf::from).collect()), cfg, stopped: false }
    }

    /// Lexes, parses, and evaluates one line (or multi-line paste) of input
    /// against the session's persistent `World`. Declarations and `let`
    /// bindings from earlier turns remain visible; nothing here re-parses or
    /// replays prior input.
    pub fn eval_line(&mut self, out: &mut dyn PrintWriter, line: &str) -> EarlResult<Value> {
        let tokens = crate::lexer::lex(line, &Rc::from("<repl>"))?;
        let program = crate::parser::parse(tokens)?;
        let mut ev = Evaluator::new(out, &mut self.cfg, &mut self.loader);
        eval_program(&mut ev, &self.world, &program)
    }

    /// Hook an external watcher calls to request the host loop stop polling
    /// for more input. Checked only between top-level statements.
    pub fn request_stop(&mut self) {
        self.stopped = true;
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.cfg
    }

    pub fn config_mut(&mut self) -> &mut RuntimeConfig {
        &mut self.cfg
    }
}

#[cfg(test)]
mod tests {
    use super::ReplSession;
    use crate::config::RuntimeConfig;
    use crate::io::CollectStringPrint;

    #[test]
    fn let_binding_persists_across_lines() {
        let mut session = ReplSession::new(RuntimeConfig::default());
        let mut out = CollectStringPrint::new();
        session.eval_line(&mut out, "let x = 41;").unwrap();
        session.eval_line(&mut out, "x += 1;").unwrap();
        session.eval_line(&mut out, "print(x);").unwrap();
        assert_eq!(out.output(), "42");
    }

    #[test]
    fn stop_flag_is_observable_by_the_host_loop() {
        let mut session = ReplSession::new(RuntimeConfig::default());
        assert!(!session.is_stopped());
        session.request_stop();
        assert!(session.is_stopped());
    }
}
