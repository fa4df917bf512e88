pub mod tuner;

pub use crate::tuner::*;
use inkwell::OptimizationLevel;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Codegen optimization level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CodegenOptLevel {
    None,
    Less,
    Default,
    #[default]
    Aggressive,
}

impl CodegenOptLevel {
    pub fn name(self) -> &'static str {
        match self {
            CodegenOptLevel::None => "none",
            CodegenOptLevel::Less => "less",
            CodegenOptLevel::Default => "default",
            CodegenOptLevel::Aggressive => "aggressive",
        }
    }
}

impl FromStr for CodegenOptLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "0" | "none" => Ok(CodegenOptLevel::None),
            "1" | "less" => Ok(CodegenOptLevel::Less),
            "2" | "default" => Ok(CodegenOptLevel::Default),
            "3" | "aggressive" => Ok(CodegenOptLevel::Aggressive),
            _ => Err(format!("Unknown optimization level: {}", s)),
        }
    }
}

impl From<CodegenOptLevel> for OptimizationLevel {
    fn from(value: CodegenOptLevel) -> Self {
        match value {
            CodegenOptLevel::None => OptimizationLevel::None,
            CodegenOptLevel::Less => OptimizationLevel::Less,
            CodegenOptLevel::Default => OptimizationLevel::Default,
            CodegenOptLevel::Aggressive => OptimizationLevel::Aggressive,
        }
    }
}

/// Options forwarded to the native execution engine when an artifact is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompileOptions {
    pub opt_level: CodegenOptLevel,
    /// Use the fast instruction selector instead of the default selector
    pub fast_isel: bool,
    /// Interprocedural register allocation. Accepted and recorded, but MCJIT
    /// offers no way to turn it on, so it does not change generated code.
    pub ipra: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            opt_level: CodegenOptLevel::Aggressive,
            fast_isel: false,
            ipra: false,
        }
    }
}

impl CompileOptions {
    pub fn with_opt_level(opt_level: CodegenOptLevel) -> Self {
        Self {
            opt_level,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opt_level_parsing() {
        assert_eq!("0".parse::<CodegenOptLevel>(), Ok(CodegenOptLevel::None));
        assert_eq!("Less".parse::<CodegenOptLevel>(), Ok(CodegenOptLevel::Less));
        assert_eq!(
            "aggressive".parse::<CodegenOptLevel>(),
            Ok(CodegenOptLevel::Aggressive)
        );
        assert!("O7".parse::<CodegenOptLevel>().is_err());
    }

    #[test]
    fn test_default_compile_options() {
        let options = CompileOptions::default();
        assert_eq!(options.opt_level, CodegenOptLevel::Aggressive);
        assert!(!options.fast_isel);
        assert!(!options.ipra);
    }

    #[test]
    fn test_inkwell_level_mapping() {
        assert_eq!(
            OptimizationLevel::from(CodegenOptLevel::Default),
            OptimizationLevel::Default
        );
        assert_eq!(
            OptimizationLevel::from(CodegenOptLevel::None),
            OptimizationLevel::None
        );
    }
}
