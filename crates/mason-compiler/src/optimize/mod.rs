//! IR optimization passes.
//!
//! A fixed pass list runs once per code unit, in an order where earlier
//! passes expose opportunities for later ones; no fixed-point iteration.
//! Every pass leaves the terminator, edge-consistency and SSA invariants
//! intact.

mod constant_prop;
mod cse;
mod dom;
mod licm;
mod remove_branches;
mod simplify_branches;

pub use constant_prop::ConstantPropagation;
pub use cse::CommonSubexpressionElimination;
pub use licm::LoopInvariantMotion;
pub use remove_branches::RemoveRedundantBranches;
pub use simplify_branches::SimplifyBranches;

use mason_parser::options::OptimizeLevel;

use crate::ir::CodeUnit;

/// One rewrite over a code unit.
pub trait Pass {
    fn name(&self) -> &'static str;
    fn run(&self, unit: &mut CodeUnit);
}

/// Runs the pass list over each code unit.
pub struct Optimizer {
    level: OptimizeLevel,
}

impl Optimizer {
    pub fn new(level: OptimizeLevel) -> Self {
        Self { level }
    }

    fn passes() -> Vec<Box<dyn Pass>> {
        vec![
            Box::new(ConstantPropagation),
            Box::new(CommonSubexpressionElimination),
            Box::new(LoopInvariantMotion),
            Box::new(SimplifyBranches),
            Box::new(RemoveRedundantBranches),
        ]
    }

    pub fn optimize(&self, units: &mut [CodeUnit]) {
        if self.level == OptimizeLevel::None {
            return;
        }

        let passes = Self::passes();
        for unit in units {
            for pass in &passes {
                pass.run(unit);
                debug_assert!(
                    unit.validate().is_ok(),
                    "pass '{}' broke unit '{}': {:?}",
                    pass.name(),
                    unit.name,
                    unit.validate()
                );
            }
        }
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new(OptimizeLevel::Optimize)
    }
}
