//! Preconditioner lifecycle management.
//!
//! A [`PcContext`] owns a preconditioner and tracks where it is in its
//! lifecycle: unconfigured, configured (type chosen, no data), or set up
//! (factored against a concrete operator). Re-setup against an operator
//! with an unchanged sparsity pattern takes the cheap numeric-only path.
//!
//! Types are instantiated by name through a [`PcRegistry`], so runtime
//! options can select the preconditioner.

use std::collections::HashMap;

use crate::config::OptionsDb;
use crate::error::{Error, FactorFailure};
use crate::matrix::dist::{DistMatrix, MatStructure};
use crate::matrix::ordering::OrderingType;
use crate::preconditioner::{
    BlockJacobi, Icc, Identity, Ilu0, Jacobi, Preconditioner, lu::DenseLu,
};
use crate::vector::dist::DistVector;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcState {
    /// No type selected; applying is an error, solves run unpreconditioned.
    Unconfigured,
    /// Type selected, no operator data yet.
    Configured,
    /// Factored and ready to apply.
    SetUp,
}

pub struct PcContext<M, V> {
    name: Option<String>,
    pc: Option<Box<dyn Preconditioner<M, V>>>,
    state: PcState,
}

impl<M, V> Default for PcContext<M, V> {
    fn default() -> Self {
        PcContext {
            name: None,
            pc: None,
            state: PcState::Unconfigured,
        }
    }
}

impl<M, V> PcContext<M, V> {
    pub fn new() -> Self {
        PcContext::default()
    }

    pub fn state(&self) -> PcState {
        self.state
    }

    pub fn type_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Install a concrete preconditioner, replacing any previous one.
    pub fn set(&mut self, name: &str, pc: Box<dyn Preconditioner<M, V>>) {
        self.name = Some(name.to_string());
        self.pc = Some(pc);
        self.state = PcState::Configured;
    }

    /// Instantiate by registered name.
    pub fn configure(
        &mut self,
        name: &str,
        registry: &PcRegistry<M, V>,
        db: &OptionsDb,
    ) -> Result<(), Error> {
        let pc = registry.create(name, db)?;
        self.set(name, pc);
        Ok(())
    }

    /// Build preconditioner data from the operator.
    pub fn setup(&mut self, a: &M) -> Result<(), Error> {
        let pc = self
            .pc
            .as_mut()
            .ok_or(Error::InvalidState("pc setup before a type was configured"))?;
        pc.setup(a)?;
        self.state = PcState::SetUp;
        Ok(())
    }

    /// React to an operator change. `SameNonzeroPattern` permits reuse of
    /// symbolic state; anything else redoes the full setup.
    pub fn refresh(&mut self, a: &M, structure: MatStructure) -> Result<(), Error> {
        match (self.state, structure) {
            (PcState::SetUp, MatStructure::SameNonzeroPattern) => {
                let pc = self.pc.as_mut().ok_or(Error::InvalidState("pc lost"))?;
                pc.refresh_numeric(a)?;
                Ok(())
            }
            _ => self.setup(a),
        }
    }

    pub fn apply(&self, r: &V, z: &mut V) -> Result<(), Error> {
        if self.state != PcState::SetUp {
            return Err(Error::InvalidState("pc applied before setup"));
        }
        self.pc
            .as_ref()
            .ok_or(Error::InvalidState("pc lost"))?
            .apply(r, z)
    }

    /// Discard operator data (factors, patterns, sub-solvers) but keep the
    /// configured type. The next solve must set up again.
    pub fn reset(&mut self) {
        if self.state == PcState::SetUp {
            if let Some(pc) = &mut self.pc {
                pc.reset();
            }
            self.state = PcState::Configured;
        }
    }

    pub fn failed(&self) -> Option<&FactorFailure> {
        self.pc.as_ref().and_then(|pc| pc.failed())
    }

    pub fn inner(&self) -> Option<&dyn Preconditioner<M, V>> {
        self.pc.as_deref()
    }

    pub fn inner_mut(&mut self) -> Option<&mut (dyn Preconditioner<M, V> + '_)> {
        match &mut self.pc {
            Some(p) => Some(&mut **p),
            None => None,
        }
    }
}

type PcCtor<M, V> =
    Box<dyn Fn(&OptionsDb) -> Result<Box<dyn Preconditioner<M, V>>, Error> + Send + Sync>;

/// Name-to-constructor table for preconditioner types. Constructors receive
/// the options database so type-specific settings resolve at creation.
pub struct PcRegistry<M, V> {
    ctors: HashMap<String, PcCtor<M, V>>,
}

impl<M, V> Default for PcRegistry<M, V> {
    fn default() -> Self {
        PcRegistry {
            ctors: HashMap::new(),
        }
    }
}

impl<M, V> PcRegistry<M, V> {
    pub fn new() -> Self {
        PcRegistry::default()
    }

    pub fn register<F>(&mut self, name: &str, ctor: F)
    where
        F: Fn(&OptionsDb) -> Result<Box<dyn Preconditioner<M, V>>, Error> + Send + Sync + 'static,
    {
        self.ctors.insert(name.to_string(), Box::new(ctor));
    }

    pub fn create(
        &self,
        name: &str,
        db: &OptionsDb,
    ) -> Result<Box<dyn Preconditioner<M, V>>, Error> {
        let ctor = self
            .ctors
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("preconditioner type '{name}'")))?;
        ctor(db)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.ctors.keys().map(String::as_str)
    }
}

impl PcRegistry<DistMatrix, DistVector> {
    /// The built-in preconditioner types.
    pub fn with_builtins() -> Self {
        let mut reg = PcRegistry::new();
        reg.register("none", |_| Ok(Box::new(Identity)));
        reg.register("jacobi", |_| Ok(Box::new(Jacobi::new())));
        reg.register("icc", |db| {
            let levels = db.get_usize("pc_factor_levels")?.unwrap_or(0);
            let ordering = match db.get_string("pc_factor_mat_ordering_type") {
                Some(name) => OrderingType::from_name(name)?,
                None => OrderingType::Natural,
            };
            let shift = db.get_bool("pc_factor_shift_positive_definite")?.unwrap_or(true);
            Ok(Box::new(
                Icc::new(levels).with_ordering(ordering).with_shift(shift),
            ))
        });
        reg.register("ilu", |_| Ok(Box::new(Ilu0::new())));
        reg.register("lu", |_| Ok(Box::new(DenseLu::new())));
        reg.register("bjacobi", |db| {
            let blocks = db.get_usize("pc_bjacobi_blocks")?.unwrap_or(1);
            let mut pc = BlockJacobi::new(blocks);
            pc.set_sub_options(db);
            Ok(Box::new(pc))
        });
        reg
    }
}
