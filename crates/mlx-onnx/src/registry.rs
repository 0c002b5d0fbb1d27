//! Translation rule registry.
//!
//! Maps an operator name (the `OpKind::name()` of a builtin node, or the name
//! of a custom call) to the rule that emits its ONNX nodes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::symbolic::{self, BuiltinRule, GraphContext, Sym, SymArg};

type CustomBody = dyn Fn(&mut GraphContext, &[SymArg]) -> Result<Sym> + Send + Sync;

/// A user-supplied rule for a custom call.
#[derive(Clone)]
pub struct CustomRule {
    params: Vec<String>,
    body: Arc<CustomBody>,
}

impl CustomRule {
    /// Declared parameter names; their count is the arity the rule accepts.
    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn apply(&self, ctx: &mut GraphContext, args: &[SymArg]) -> Result<Sym> {
        (self.body)(ctx, args)
    }
}

impl fmt::Debug for CustomRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomRule")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
pub enum TranslationRule {
    Builtin(BuiltinRule),
    Custom(CustomRule),
}

#[derive(Clone, Debug, Default)]
pub struct SymbolicRegistry {
    rules: HashMap<String, TranslationRule>,
}

impl SymbolicRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding a rule for every builtin operator opset 6 can
    /// express.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        let builtins: [(&str, BuiltinRule); 19] = [
            ("add", symbolic::add),
            ("sub", symbolic::sub),
            ("mul", symbolic::mul),
            ("div", symbolic::div),
            ("neg", symbolic::neg),
            ("sigmoid", symbolic::sigmoid),
            ("tanh", symbolic::tanh),
            ("sqrt", symbolic::sqrt),
            ("mean", symbolic::mean),
            ("mm", symbolic::mm),
            ("addmm", symbolic::addmm),
            ("view", symbolic::view),
            ("permute", symbolic::permute),
            ("split", symbolic::split),
            ("cat", symbolic::cat),
            ("reflection_pad", symbolic::reflection_pad),
            ("conv2d", symbolic::conv2d),
            ("max_pool1d", symbolic::max_pool1d),
            ("batch_norm", symbolic::batch_norm),
        ];
        for (name, rule) in builtins {
            reg.register_builtin(name, rule);
        }
        reg
    }

    pub fn register_builtin(&mut self, name: &str, rule: BuiltinRule) {
        self.rules
            .insert(name.to_string(), TranslationRule::Builtin(rule));
    }

    /// Register `body` as the translation of custom calls named `name`.
    ///
    /// `params` names the arguments the rule expects; a call site that
    /// supplies a different number is rejected before `body` runs.
    pub fn register_custom<F>(&mut self, name: &str, params: &[&str], body: F)
    where
        F: Fn(&mut GraphContext, &[SymArg]) -> Result<Sym> + Send + Sync + 'static,
    {
        self.rules.insert(
            name.to_string(),
            TranslationRule::Custom(CustomRule {
                params: params.iter().map(|p| p.to_string()).collect(),
                body: Arc::new(body),
            }),
        );
    }

    pub fn get(&self, name: &str) -> Option<&TranslationRule> {
        self.rules.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered() {
        let reg = SymbolicRegistry::with_builtins();
        for name in ["add", "view", "batch_norm", "split"] {
            assert!(matches!(reg.get(name), Some(TranslationRule::Builtin(_))));
        }
        assert!(reg.get("expand").is_none());
    }

    #[test]
    fn test_custom_rule_replaces_builtin() {
        let mut reg = SymbolicRegistry::with_builtins();
        reg.register_custom("add", &["a", "b"], |ctx, args| {
            Ok(Sym::Value(ctx.op("Sum", &[args[0].name()?, args[1].name()?], Vec::new())))
        });
        match reg.get("add") {
            Some(TranslationRule::Custom(rule)) => assert_eq!(rule.params().len(), 2),
            other => panic!("expected a custom rule, got {other:?}"),
        }
    }
}
